use clap::{Parser, Subcommand};
use ragdex_retriever::{
    config::{AppConfig, ProviderKind, SourceKind, SourceSpec},
    loader::DocumentLoader,
    pipeline::{BuildSettings, run_build},
    storage::{FlatIndex, Metric, VectorIndex},
};
use serde::Serialize;
use std::path::PathBuf;
use std::process;
use tracing_subscriber::EnvFilter;

/// Build and inspect ragdex vector indexes.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Embedding provider, overriding RAGDEX_PROVIDER and the config file
    #[arg(long, global = true)]
    provider: Option<ProviderKind>,

    /// Index directory, overriding the location derived from the model name
    #[arg(long, global = true, alias = "out")]
    index: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Split, embed and index documents, replacing any existing index
    Build {
        /// Prose source as ROOT[=GLOB]; the glob defaults to **/*.md
        #[arg(long = "docs", value_name = "ROOT[=GLOB]")]
        docs: Vec<String>,
        /// Code source as ROOT[=GLOB]; the glob defaults to **/*.ts
        #[arg(long = "code", value_name = "ROOT[=GLOB]")]
        code: Vec<String>,
        /// Similarity metric stored in the index
        #[arg(long)]
        metric: Option<Metric>,
    },
    /// Run a query against the index and print ranked results
    Query {
        /// Question to search for
        #[arg(long)]
        text: String,
        /// Maximum number of results
        #[arg(short, default_value_t = 10)]
        k: usize,
        /// Output format
        #[arg(short, long, default_value = "json")]
        format: OutputFormat,
    },
    /// Show the index manifest
    Stats,
}

#[derive(Debug, Clone, PartialEq)]
enum OutputFormat {
    Summary,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "summary" => Ok(OutputFormat::Summary),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Invalid format: {s}")),
        }
    }
}

#[derive(Serialize)]
struct QueryHit {
    rank: usize,
    score: f32,
    source: String,
    text: String,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run().await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let args = Args::parse();
    let mut config = AppConfig::from_env()?;
    if let Some(provider) = args.provider {
        config.provider = provider;
    }
    let location = args.index.unwrap_or_else(|| config.index_location());

    match args.command {
        Commands::Build { docs, code, metric } => {
            if let Some(metric) = metric {
                config.metric = metric;
            }
            let mut sources = docs
                .iter()
                .map(|d| SourceSpec::parse(d, SourceKind::Prose))
                .chain(code.iter().map(|c| SourceSpec::parse(c, SourceKind::Code)))
                .collect::<Result<Vec<_>, _>>()?;
            if sources.is_empty() {
                sources = config.sources.clone();
            }
            if sources.is_empty() {
                anyhow::bail!("no sources configured; pass --docs or --code, or list [[sources]] in RAGDEX_CONFIG");
            }

            let provider = config.build_provider()?;
            let loader = DocumentLoader::new(sources);
            let settings = BuildSettings::from_config(&config);
            let stats = run_build(&loader, provider.as_ref(), &settings, &location).await?;

            println!("Indexed {} documents into {} chunks", stats.documents, stats.chunks);
            println!("Dimension: {}", stats.dimension);
            println!("Location: {}", location.display());
            Ok(())
        }
        Commands::Query { text, k, format } => {
            let index = FlatIndex::load(&location)?;
            let provider = config.build_provider()?;
            if index.manifest().model != provider.model_name() {
                anyhow::bail!(
                    "index at {} was built with model {}, but the configured model is {}",
                    location.display(),
                    index.manifest().model,
                    provider.model_name()
                );
            }

            let vector = provider.embed_text(&text).await?;
            let hits: Vec<QueryHit> = index
                .query(&vector, k)?
                .into_iter()
                .enumerate()
                .map(|(i, hit)| QueryHit {
                    rank: i + 1,
                    score: hit.score,
                    source: hit.source,
                    text: hit.text,
                })
                .collect();

            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&hits)?),
                OutputFormat::Summary => {
                    println!("Found {} results:", hits.len());
                    for hit in hits {
                        let preview: String = hit.text.chars().take(80).collect();
                        println!(
                            "  {}. [{:.4}] {} | {}",
                            hit.rank,
                            hit.score,
                            hit.source,
                            preview.replace('\n', " ")
                        );
                    }
                }
            }
            Ok(())
        }
        Commands::Stats => {
            let index = FlatIndex::load(&location)?;
            println!("{}", serde_json::to_string_pretty(index.manifest())?);
            Ok(())
        }
    }
}
