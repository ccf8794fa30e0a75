//! Configuration for embedding providers

use crate::error::{EmbedError, Result};
use std::time::Duration;

/// Default OpenAI-compatible endpoint.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
/// Model used when none is configured.
pub const DEFAULT_MODEL: &str = "text-embedding-ada-002";

/// Output dimension of the hosted models we know about.
pub fn known_dimension(model_name: &str) -> Option<usize> {
    match model_name {
        "text-embedding-ada-002" | "text-embedding-3-small" => Some(1536),
        "text-embedding-3-large" => Some(3072),
        _ => None,
    }
}

/// Settings for an embedding provider.
///
/// Built once at startup and never changed afterwards. Use the `with_*`
/// methods to adjust the defaults.
#[derive(Clone)]
pub struct EmbedConfig {
    /// Bearer credential for the provider API.
    pub api_key: String,
    /// Model identifier sent with every request.
    pub model_name: String,
    /// API root, without the trailing `/embeddings`.
    pub base_url: String,
    /// Maximum number of texts per request.
    pub batch_size: usize,
    /// Upper bound for a single HTTP request.
    pub request_timeout: Duration,
    /// How many times a rate-limited request is re-sent before giving up.
    pub max_retries: u32,
    /// Longest accepted input, in characters.
    pub max_input_chars: usize,
    /// Expected vector length; inferred from the model name when `None`.
    pub dimension: Option<usize>,
}

impl std::fmt::Debug for EmbedConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbedConfig")
            .field("api_key", &"<redacted>")
            .field("model_name", &self.model_name)
            .field("base_url", &self.base_url)
            .field("batch_size", &self.batch_size)
            .field("request_timeout", &self.request_timeout)
            .field("max_retries", &self.max_retries)
            .field("max_input_chars", &self.max_input_chars)
            .field("dimension", &self.dimension)
            .finish()
    }
}

impl EmbedConfig {
    /// Create a configuration for `model_name` authenticated with `api_key`.
    pub fn new(api_key: impl Into<String>, model_name: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model_name: model_name.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            batch_size: 64,
            request_timeout: Duration::from_secs(30),
            max_retries: 3,
            max_input_chars: 24_000,
            dimension: None,
        }
    }

    pub fn with_base_url(self, base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            ..self
        }
    }

    pub fn with_batch_size(self, batch_size: usize) -> Self {
        Self { batch_size, ..self }
    }

    pub fn with_request_timeout(self, request_timeout: Duration) -> Self {
        Self {
            request_timeout,
            ..self
        }
    }

    pub fn with_max_retries(self, max_retries: u32) -> Self {
        Self {
            max_retries,
            ..self
        }
    }

    pub fn with_max_input_chars(self, max_input_chars: usize) -> Self {
        Self {
            max_input_chars,
            ..self
        }
    }

    pub fn with_dimension(self, dimension: usize) -> Self {
        Self {
            dimension: Some(dimension),
            ..self
        }
    }

    /// The configured dimension, or the known dimension of the model.
    pub fn expected_dimension(&self) -> Option<usize> {
        self.dimension.or_else(|| known_dimension(&self.model_name))
    }

    /// Check the settings a remote provider cannot work without.
    pub fn validate(&self) -> Result<()> {
        if self.api_key.trim().is_empty() {
            return Err(EmbedError::invalid_config("API key is empty"));
        }
        if self.model_name.trim().is_empty() {
            return Err(EmbedError::invalid_config("model name is empty"));
        }
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(EmbedError::invalid_config(format!(
                "base URL must be http(s): {}",
                self.base_url
            )));
        }
        if self.batch_size == 0 {
            return Err(EmbedError::invalid_config("batch size must be at least 1"));
        }
        if self.request_timeout.is_zero() {
            return Err(EmbedError::invalid_config("request timeout must be non-zero"));
        }
        if self.dimension == Some(0) {
            return Err(EmbedError::invalid_config("dimension must be non-zero"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_and_builders() {
        let config = EmbedConfig::new("sk-test", DEFAULT_MODEL)
            .with_base_url("http://127.0.0.1:8080/v1/")
            .with_batch_size(8)
            .with_max_retries(0);

        assert_eq!(config.base_url, "http://127.0.0.1:8080/v1");
        assert_eq!(config.batch_size, 8);
        assert_eq!(config.max_retries, 0);
        assert_eq!(config.expected_dimension(), Some(1536));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_failures() {
        assert!(EmbedConfig::new("", DEFAULT_MODEL).validate().is_err());
        assert!(EmbedConfig::new("k", " ").validate().is_err());
        assert!(
            EmbedConfig::new("k", DEFAULT_MODEL)
                .with_base_url("ftp://example.com")
                .validate()
                .is_err()
        );
        assert!(
            EmbedConfig::new("k", DEFAULT_MODEL)
                .with_batch_size(0)
                .validate()
                .is_err()
        );
    }

    #[test]
    fn test_debug_redacts_key() {
        let config = EmbedConfig::new("sk-very-secret", "text-embedding-3-large");
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("sk-very-secret"));
        assert_eq!(config.expected_dimension(), Some(3072));
        assert_eq!(
            EmbedConfig::new("k", "custom").with_dimension(8).expected_dimension(),
            Some(8)
        );
    }
}
