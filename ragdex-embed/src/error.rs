//! Error types for embedding providers

use std::time::Duration;

/// Result type for embedding operations.
pub type Result<T> = std::result::Result<T, EmbedError>;

/// Failures an embedding provider can report to its callers.
///
/// Callers only branch on the variant. [`EmbedError::is_retriable`] separates
/// transient failures from ones that repeat on every attempt.
#[derive(Debug, thiserror::Error)]
pub enum EmbedError {
    /// Transport failure or an error response from the provider.
    #[error("Embedding provider unavailable: {message}")]
    Unavailable {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The provider asked us to slow down.
    #[error("Embedding provider rate limited the request")]
    RateLimited { retry_after: Option<Duration> },

    /// The text cannot be embedded (empty, too long, rejected by validation).
    #[error("Invalid embedding input: {message}")]
    InvalidInput { message: String },

    /// The request did not complete in time.
    #[error("Embedding request timed out after {after:?}")]
    Timeout { after: Duration },

    /// The provider was constructed with unusable settings.
    #[error("Invalid embedding configuration: {message}")]
    InvalidConfig { message: String },
}

impl EmbedError {
    /// Create an [`EmbedError::Unavailable`] without an underlying cause.
    pub fn unavailable<S: Into<String>>(message: S) -> Self {
        Self::Unavailable {
            message: message.into(),
            source: None,
        }
    }

    /// Create an [`EmbedError::Unavailable`] wrapping the error that caused it.
    pub fn unavailable_from<S, E>(message: S, source: E) -> Self
    where
        S: Into<String>,
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Unavailable {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn invalid_input<S: Into<String>>(message: S) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    pub fn invalid_config<S: Into<String>>(message: S) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Whether the same request may succeed if sent again later.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            Self::Unavailable { .. } | Self::RateLimited { .. } | Self::Timeout { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retriable_classification() {
        assert!(EmbedError::unavailable("down").is_retriable());
        assert!(EmbedError::RateLimited { retry_after: None }.is_retriable());
        assert!(
            EmbedError::Timeout {
                after: Duration::from_secs(1)
            }
            .is_retriable()
        );
        assert!(!EmbedError::invalid_input("empty").is_retriable());
        assert!(!EmbedError::invalid_config("no key").is_retriable());
    }

    #[test]
    fn test_unavailable_keeps_source() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err = EmbedError::unavailable_from("connect failed", io);
        let source = std::error::Error::source(&err).expect("source");
        assert_eq!(source.to_string(), "refused");
        assert_eq!(
            err.to_string(),
            "Embedding provider unavailable: connect failed"
        );
    }
}
