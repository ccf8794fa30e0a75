//! Runtime configuration shared by the build CLI and the query server.
//!
//! Configuration is assembled once at startup: built-in defaults, then an
//! optional TOML file named by `RAGDEX_CONFIG`, then environment variables.
//! Command-line flags are applied on top by the binaries. Secrets (the
//! provider key and the bearer token) are read from the environment only.
//!
//! ```toml
//! provider = "openai"
//! model = "text-embedding-ada-002"
//! index_root = "/var/lib/ragdex"
//! metric = "cosine"
//!
//! [prose]
//! chunk_size = 3000
//! chunk_overlap = 300
//!
//! [[sources]]
//! root = "docs"
//! kind = "prose"
//!
//! [[sources]]
//! root = "web/src"
//! glob = "**/*.ts"
//! kind = "code"
//! ```

use crate::storage::Metric;
use ragdex_context::text::{
    DEFAULT_CODE_CHUNK_OVERLAP, DEFAULT_CODE_CHUNK_SIZE, DEFAULT_PROSE_CHUNK_OVERLAP,
    DEFAULT_PROSE_CHUNK_SIZE, DEFAULT_PROSE_SEPARATOR,
};
use ragdex_embed::{
    DEFAULT_HASHING_DIMENSION, DEFAULT_MODEL, EmbedConfig, EmbeddingProvider, HashingProvider,
    OpenAiProvider,
};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

pub const ENV_OPENAI_KEY: &str = "OPENAI_KEY";
pub const ENV_EMBEDDING_NAME: &str = "EMBEDDING_NAME";
pub const ENV_AUTH_TOKEN: &str = "AUTH_TOKEN";
pub const ENV_OPENAI_BASE_URL: &str = "OPENAI_BASE_URL";
pub const ENV_INDEX_ROOT: &str = "RAGDEX_INDEX_ROOT";
pub const ENV_BIND: &str = "RAGDEX_BIND";
pub const ENV_CONFIG: &str = "RAGDEX_CONFIG";
pub const ENV_PROVIDER: &str = "RAGDEX_PROVIDER";

pub const DEFAULT_BIND: &str = "0.0.0.0:5001";
pub const DEFAULT_K: usize = 10;
pub const DEFAULT_MAX_K: usize = 50;
pub const DEFAULT_PROSE_GLOB: &str = "**/*.md";
pub const DEFAULT_CODE_GLOB: &str = "**/*.ts";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("required environment variable {0} is not set")]
    Missing(&'static str),

    #[error("invalid value for {key}: {message}")]
    Invalid { key: String, message: String },

    #[error("failed to read config file {}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

impl ConfigError {
    fn invalid(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Invalid {
            key: key.into(),
            message: message.into(),
        }
    }
}

/// Which embedding backend to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    OpenAi,
    Hashing,
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(ProviderKind::OpenAi),
            "hashing" => Ok(ProviderKind::Hashing),
            _ => Err(format!("Invalid provider: {s}")),
        }
    }
}

/// Whether a source tree holds prose or code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Prose,
    Code,
}

impl SourceKind {
    pub fn default_glob(self) -> &'static str {
        match self {
            SourceKind::Prose => DEFAULT_PROSE_GLOB,
            SourceKind::Code => DEFAULT_CODE_GLOB,
        }
    }
}

/// A directory tree to index and the files in it to pick up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSpec {
    pub root: PathBuf,
    pub glob: String,
    pub kind: SourceKind,
}

impl SourceSpec {
    pub fn new(root: impl Into<PathBuf>, kind: SourceKind) -> Self {
        Self {
            root: root.into(),
            glob: kind.default_glob().to_string(),
            kind,
        }
    }

    pub fn with_glob(self, glob: impl Into<String>) -> Self {
        Self {
            glob: glob.into(),
            ..self
        }
    }

    /// Parse the `ROOT[=GLOB]` command-line form.
    pub fn parse(value: &str, kind: SourceKind) -> Result<Self, ConfigError> {
        let (root, glob) = match value.split_once('=') {
            Some((root, glob)) => (root, Some(glob)),
            None => (value, None),
        };
        if root.is_empty() {
            return Err(ConfigError::invalid("source", format!("empty root in {value:?}")));
        }
        let spec = Self::new(root, kind);
        Ok(match glob {
            Some("") => return Err(ConfigError::invalid("source", format!("empty glob in {value:?}"))),
            Some(glob) => spec.with_glob(glob),
            None => spec,
        })
    }
}

/// Chunk limits for one kind of document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkSettings {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    /// Prose separator. Ignored for code.
    pub separator: String,
}

impl ChunkSettings {
    fn validate(&self, section: &str) -> Result<(), ConfigError> {
        if self.chunk_size == 0 {
            return Err(ConfigError::invalid(
                format!("{section}.chunk_size"),
                "must be greater than zero",
            ));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(ConfigError::invalid(
                format!("{section}.chunk_overlap"),
                format!(
                    "overlap {} must be smaller than chunk size {}",
                    self.chunk_overlap, self.chunk_size
                ),
            ));
        }
        if self.separator.is_empty() {
            return Err(ConfigError::invalid(
                format!("{section}.separator"),
                "must not be empty",
            ));
        }
        Ok(())
    }
}

/// Everything the binaries need, fixed at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub provider: ProviderKind,
    /// Provider settings. The API key may be empty for the hashing provider.
    pub embed: EmbedConfig,
    pub hashing_dimension: usize,
    pub auth_token: Option<String>,
    pub index_root: PathBuf,
    pub bind: SocketAddr,
    pub metric: Metric,
    pub prose: ChunkSettings,
    pub code: ChunkSettings,
    pub sources: Vec<SourceSpec>,
    pub default_k: usize,
    pub max_k: usize,
    pub embed_timeout: Duration,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    provider: Option<ProviderKind>,
    model: Option<String>,
    base_url: Option<String>,
    batch_size: Option<usize>,
    max_retries: Option<u32>,
    request_timeout_secs: Option<u64>,
    max_input_chars: Option<usize>,
    dimension: Option<usize>,
    hashing_dimension: Option<usize>,
    index_root: Option<PathBuf>,
    bind: Option<String>,
    metric: Option<Metric>,
    default_k: Option<usize>,
    max_k: Option<usize>,
    embed_timeout_secs: Option<u64>,
    prose: Option<FileChunkSettings>,
    code: Option<FileChunkSettings>,
    #[serde(default)]
    sources: Vec<FileSource>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileChunkSettings {
    chunk_size: Option<usize>,
    chunk_overlap: Option<usize>,
    separator: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileSource {
    root: PathBuf,
    glob: Option<String>,
    kind: SourceKind,
}

impl AppConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through `lookup`, which maps a variable name to its
    /// value.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let file = match lookup(ENV_CONFIG) {
            Some(path) => read_file_config(Path::new(&path))?,
            None => FileConfig::default(),
        };

        let provider = match lookup(ENV_PROVIDER) {
            Some(value) => value
                .parse()
                .map_err(|e: String| ConfigError::invalid(ENV_PROVIDER, e))?,
            None => file.provider.unwrap_or_default(),
        };

        let model = lookup(ENV_EMBEDDING_NAME)
            .or(file.model)
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let mut embed = EmbedConfig::new(lookup(ENV_OPENAI_KEY).unwrap_or_default(), model);
        if let Some(base_url) = lookup(ENV_OPENAI_BASE_URL).or(file.base_url) {
            embed = embed.with_base_url(base_url);
        }
        if let Some(batch_size) = file.batch_size {
            embed = embed.with_batch_size(batch_size);
        }
        if let Some(max_retries) = file.max_retries {
            embed = embed.with_max_retries(max_retries);
        }
        if let Some(secs) = file.request_timeout_secs {
            embed = embed.with_request_timeout(Duration::from_secs(secs));
        }
        if let Some(max_input_chars) = file.max_input_chars {
            embed = embed.with_max_input_chars(max_input_chars);
        }
        if let Some(dimension) = file.dimension {
            embed = embed.with_dimension(dimension);
        }

        let bind_value = lookup(ENV_BIND)
            .or(file.bind)
            .unwrap_or_else(|| DEFAULT_BIND.to_string());
        let bind = bind_value
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::invalid(ENV_BIND, format!("{bind_value:?}: {e}")))?;

        let prose = merge_chunk_settings(
            file.prose,
            DEFAULT_PROSE_CHUNK_SIZE,
            DEFAULT_PROSE_CHUNK_OVERLAP,
        );
        let code = merge_chunk_settings(
            file.code,
            DEFAULT_CODE_CHUNK_SIZE,
            DEFAULT_CODE_CHUNK_OVERLAP,
        );

        let config = Self {
            provider,
            embed,
            hashing_dimension: file.hashing_dimension.unwrap_or(DEFAULT_HASHING_DIMENSION),
            auth_token: lookup(ENV_AUTH_TOKEN).map(|token| token.trim().to_string()),
            index_root: lookup(ENV_INDEX_ROOT)
                .map(PathBuf::from)
                .or(file.index_root)
                .unwrap_or_else(|| PathBuf::from(".")),
            bind,
            metric: file.metric.unwrap_or_default(),
            prose,
            code,
            sources: file
                .sources
                .into_iter()
                .map(|s| {
                    let spec = SourceSpec::new(s.root, s.kind);
                    match s.glob {
                        Some(glob) => spec.with_glob(glob),
                        None => spec,
                    }
                })
                .collect(),
            default_k: file.default_k.unwrap_or(DEFAULT_K),
            max_k: file.max_k.unwrap_or(DEFAULT_MAX_K),
            embed_timeout: Duration::from_secs(file.embed_timeout_secs.unwrap_or(30)),
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.prose.validate("prose")?;
        self.code.validate("code")?;
        if self.default_k == 0 {
            return Err(ConfigError::invalid("default_k", "must be at least 1"));
        }
        if self.max_k < self.default_k {
            return Err(ConfigError::invalid(
                "max_k",
                format!("{} is smaller than default_k {}", self.max_k, self.default_k),
            ));
        }
        if self.embed_timeout.is_zero() {
            return Err(ConfigError::invalid("embed_timeout_secs", "must be non-zero"));
        }
        if self.hashing_dimension == 0 {
            return Err(ConfigError::invalid("hashing_dimension", "must be non-zero"));
        }
        Ok(())
    }

    /// The bearer token the server checks requests against.
    pub fn require_auth_token(&self) -> Result<&str, ConfigError> {
        self.auth_token
            .as_deref()
            .ok_or(ConfigError::Missing(ENV_AUTH_TOKEN))
    }

    /// Name of the model vectors are produced with for the configured provider.
    pub fn model_name(&self) -> String {
        match self.provider {
            ProviderKind::OpenAi => self.embed.model_name.clone(),
            ProviderKind::Hashing => format!("hashing-{}", self.hashing_dimension),
        }
    }

    /// Directory holding the index for the configured model.
    pub fn index_location(&self) -> PathBuf {
        index_location(&self.index_root, &self.model_name())
    }

    /// Construct the configured embedding provider.
    pub fn build_provider(&self) -> Result<Arc<dyn EmbeddingProvider>, ConfigError> {
        match self.provider {
            ProviderKind::OpenAi => {
                if self.embed.api_key.is_empty() {
                    return Err(ConfigError::Missing(ENV_OPENAI_KEY));
                }
                let provider = OpenAiProvider::new(self.embed.clone())
                    .map_err(|e| ConfigError::invalid("embedding", e.to_string()))?;
                Ok(Arc::new(provider))
            }
            ProviderKind::Hashing => {
                let provider = HashingProvider::new(self.hashing_dimension)
                    .map_err(|e| ConfigError::invalid("hashing_dimension", e.to_string()))?;
                Ok(Arc::new(provider))
            }
        }
    }
}

/// `{root}/index_{model}`, with characters that are unsafe in a file name
/// replaced by `_`.
pub fn index_location(root: &Path, model: &str) -> PathBuf {
    let sanitized: String = model
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let sanitized = match sanitized.trim_matches('.') {
        "" => "_".to_string(),
        _ => sanitized,
    };
    root.join(format!("index_{sanitized}"))
}

fn merge_chunk_settings(
    file: Option<FileChunkSettings>,
    default_size: usize,
    default_overlap: usize,
) -> ChunkSettings {
    let file = file.unwrap_or_default();
    ChunkSettings {
        chunk_size: file.chunk_size.unwrap_or(default_size),
        chunk_overlap: file.chunk_overlap.unwrap_or(default_overlap),
        separator: file
            .separator
            .unwrap_or_else(|| DEFAULT_PROSE_SEPARATOR.to_string()),
    }
}

fn read_file_config(path: &Path) -> Result<FileConfig, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}
