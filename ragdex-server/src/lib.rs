//! # ragdex-server
//!
//! HTTP query service over an index built by `ragdex-retriever`.
//!
//! ## Endpoints
//!
//! - `POST /query` with `Authorization: Bearer <token>` and a body of
//!   `{"query": "...", "k": 5}`. Returns a JSON array of `{source, text}`,
//!   best match first. The token is checked before the body is read.
//! - `GET /healthz` returns the number of indexed chunks and the model name.
//!
//! ## Running
//!
//! ```bash
//! # Build an index first
//! ragdex-retriever build --docs ./docs --code ./web
//!
//! # Then serve it
//! AUTH_TOKEN=s3cret ragdex-server --bind 127.0.0.1:5001
//! ```
//!
//! Sending `SIGHUP` reloads the index from disk after a rebuild.
//!
//! ## Library use
//!
//! ```no_run
//! use ragdex_retriever::config::AppConfig;
//! use ragdex_server::{ServerConfig, run_server};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = ServerConfig::from_app_config(&AppConfig::from_env()?)?;
//! run_server(config).await?;
//! # Ok(())
//! # }
//! ```

pub mod index_handle;
pub mod server;
pub mod service;

pub use index_handle::{ReloadError, SharedIndex};
pub use server::router;
pub use service::{QueryRequest, QueryResult, RetrievalService, ServiceError, ServiceSettings};

use anyhow::{Context, Result, bail};
use ragdex_embed::EmbeddingProvider;
use ragdex_retriever::config::AppConfig;
use ragdex_retriever::storage::{FlatIndex, VectorIndex};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// Everything needed to start serving.
#[derive(Clone)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    pub index_location: PathBuf,
    pub auth_token: String,
    pub provider: Arc<dyn EmbeddingProvider>,
    pub settings: ServiceSettings,
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("bind", &self.bind)
            .field("index_location", &self.index_location)
            .field("auth_token", &"<redacted>")
            .field("provider", &self.provider.provider_name())
            .field("settings", &self.settings)
            .finish()
    }
}

impl ServerConfig {
    /// Fails when `AUTH_TOKEN` is unset or the provider cannot be built.
    pub fn from_app_config(config: &AppConfig) -> Result<Self> {
        let auth_token = config.require_auth_token()?.to_string();
        let provider = config.build_provider()?;
        Ok(Self {
            bind: config.bind,
            index_location: config.index_location(),
            auth_token,
            provider,
            settings: ServiceSettings::from_config(config),
        })
    }
}

/// Load the index, then serve until Ctrl-C.
///
/// # Errors
/// - The index is missing or corrupt
/// - The index was built with a different model than the configured provider
/// - The bind address is unavailable
pub async fn run_server(config: ServerConfig) -> Result<()> {
    let location = config.index_location.clone();
    let index = tokio::task::spawn_blocking(move || FlatIndex::load(&location))
        .await
        .context("index load task failed")?
        .with_context(|| format!("failed to load index from {}", config.index_location.display()))?;

    let model = config.provider.model_name();
    if index.manifest().model != model {
        bail!(
            "index at {} was built with {} but the provider is {}",
            config.index_location.display(),
            index.manifest().model,
            model
        );
    }
    info!(
        "Loaded {} entries ({} dimensions, {}) from {}",
        index.len(),
        index.dimension(),
        index.metric(),
        config.index_location.display()
    );

    let service = Arc::new(RetrievalService::new(
        config.auth_token,
        config.provider,
        Arc::new(SharedIndex::new(index)),
        config.settings,
    ));

    let reloader = tokio::spawn(server::reload_on_hangup(
        Arc::clone(&service),
        config.index_location.clone(),
    ));

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.bind))?;
    info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, router(service))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    reloader.abort();
    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl-C: {e}");
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}
