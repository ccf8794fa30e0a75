//! ragdex-retriever: document indexing for semantic retrieval
//!
//! This crate turns a set of prose and source files into a persisted vector
//! index. Documents are discovered by [`loader`], split into overlapping
//! chunks by `ragdex-context`, embedded through a `ragdex-embed` provider,
//! and stored by a [`storage::VectorIndex`] backend.
//!
//! ## Key Modules
//!
//! - **[`config`]**: startup configuration from environment and TOML
//! - **[`loader`]**: source discovery with glob and `.gitignore` filtering
//! - **[`pipeline`]**: the build job tying loading, splitting and embedding together
//! - **[`storage`]**: the vector index capability and its flat backend
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ragdex_retriever::{
//!     config::{AppConfig, SourceKind, SourceSpec},
//!     loader::DocumentLoader,
//!     pipeline::{BuildSettings, run_build},
//! };
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = AppConfig::from_env()?;
//! let provider = config.build_provider()?;
//! let loader = DocumentLoader::new(vec![SourceSpec::new("docs", SourceKind::Prose)]);
//! let stats = run_build(
//!     &loader,
//!     provider.as_ref(),
//!     &BuildSettings::from_config(&config),
//!     &config.index_location(),
//! )
//! .await?;
//! println!("indexed {} chunks", stats.chunks);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! Sources → DocumentLoader → TextSplitter → EmbeddingProvider → FlatIndex → index.json
//! ```

pub mod config;
pub mod loader;
pub mod pipeline;
pub mod storage;
