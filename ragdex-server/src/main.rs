use anyhow::Result;
use clap::{Arg, Command};
use ragdex_retriever::config::{AppConfig, ProviderKind};
use ragdex_server::{ServerConfig, run_server};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let matches = Command::new("ragdex-server")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Authenticated semantic query service over a ragdex index")
        .arg(
            Arg::new("bind")
                .short('b')
                .long("bind")
                .value_name("ADDR")
                .help("Address to listen on (overrides RAGDEX_BIND)")
                .value_parser(clap::value_parser!(SocketAddr)),
        )
        .arg(
            Arg::new("index")
                .short('i')
                .long("index")
                .value_name("DIR")
                .help("Index directory (defaults to the location for the configured model)")
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("provider")
                .long("provider")
                .value_name("NAME")
                .help("Embedding provider: openai or hashing")
                .value_parser(clap::value_parser!(ProviderKind)),
        )
        .get_matches();

    let mut app_config = AppConfig::from_env()?;
    if let Some(provider) = matches.get_one::<ProviderKind>("provider") {
        app_config.provider = *provider;
    }
    if let Some(bind) = matches.get_one::<SocketAddr>("bind") {
        app_config.bind = *bind;
    }

    let mut config = ServerConfig::from_app_config(&app_config)?;
    if let Some(index) = matches.get_one::<PathBuf>("index") {
        config.index_location = index.clone();
    }

    run_server(config).await
}
