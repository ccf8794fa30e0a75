//! Authorized query handling, independent of the HTTP layer.

use crate::index_handle::SharedIndex;
use ragdex_embed::{EmbedError, EmbeddingProvider};
use ragdex_retriever::config::{AppConfig, DEFAULT_K, DEFAULT_MAX_K};
use ragdex_retriever::storage::{IndexError, VectorIndex};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Deserialize)]
pub struct QueryRequest {
    pub query: String,
    /// Number of results wanted; defaults to the service's `default_k`.
    #[serde(default)]
    pub k: Option<usize>,
}

impl QueryRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            k: None,
        }
    }
}

/// One retrieved chunk, as returned to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryResult {
    pub source: String,
    pub text: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("unauthorized")]
    Unauthorized,

    #[error("{message}")]
    InvalidArgument { message: String },

    #[error("{message}")]
    InvalidInput { message: String },

    #[error("embedding provider failed: {message}")]
    Provider { retriable: bool, message: String },

    #[error("index error")]
    Index(#[from] IndexError),
}

impl ServiceError {
    fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }
}

impl From<EmbedError> for ServiceError {
    fn from(err: EmbedError) -> Self {
        match err {
            EmbedError::InvalidInput { message } => ServiceError::InvalidInput { message },
            other => ServiceError::Provider {
                retriable: other.is_retriable(),
                message: other.to_string(),
            },
        }
    }
}

/// Limits applied to each query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceSettings {
    pub default_k: usize,
    pub max_k: usize,
    pub embed_timeout: Duration,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            default_k: DEFAULT_K,
            max_k: DEFAULT_MAX_K,
            embed_timeout: Duration::from_secs(30),
        }
    }
}

impl ServiceSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            default_k: config.default_k,
            max_k: config.max_k,
            embed_timeout: config.embed_timeout,
        }
    }
}

/// Answers queries for holders of the configured bearer token.
pub struct RetrievalService<I> {
    auth_token: String,
    provider: Arc<dyn EmbeddingProvider>,
    index: Arc<SharedIndex<I>>,
    settings: ServiceSettings,
}

impl<I: VectorIndex> RetrievalService<I> {
    pub fn new(
        auth_token: impl Into<String>,
        provider: Arc<dyn EmbeddingProvider>,
        index: Arc<SharedIndex<I>>,
        settings: ServiceSettings,
    ) -> Self {
        Self {
            auth_token: auth_token.into(),
            provider,
            index,
            settings,
        }
    }

    pub fn index(&self) -> &Arc<SharedIndex<I>> {
        &self.index
    }

    pub fn provider(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.provider
    }

    /// Check an `Authorization` header value.
    pub fn authorize(&self, authorization: Option<&str>) -> Result<(), ServiceError> {
        let presented = authorization
            .and_then(bearer_token)
            .ok_or(ServiceError::Unauthorized)?;
        if constant_time_eq(presented.as_bytes(), self.auth_token.as_bytes()) {
            Ok(())
        } else {
            Err(ServiceError::Unauthorized)
        }
    }

    /// Authorize, then run `request`.
    pub async fn handle(
        &self,
        authorization: Option<&str>,
        request: QueryRequest,
    ) -> Result<Vec<QueryResult>, ServiceError> {
        if let Err(e) = self.authorize(authorization) {
            warn!("Rejected query without valid credentials");
            return Err(e);
        }
        self.query(request).await
    }

    /// Embed the question and return the closest chunks, best first.
    ///
    /// Callers must have authorized the request.
    pub async fn query(&self, request: QueryRequest) -> Result<Vec<QueryResult>, ServiceError> {
        let query = request.query.trim();
        if query.is_empty() {
            return Err(ServiceError::invalid_argument("query must not be empty"));
        }
        let k = match request.k {
            Some(0) => return Err(ServiceError::invalid_argument("k must be at least 1")),
            Some(k) => k.min(self.settings.max_k),
            None => self.settings.default_k,
        };

        let vector = tokio::time::timeout(self.settings.embed_timeout, self.provider.embed_text(query))
            .await
            .map_err(|_| {
                warn!(
                    "Embedding timed out after {:?}",
                    self.settings.embed_timeout
                );
                ServiceError::from(EmbedError::Timeout {
                    after: self.settings.embed_timeout,
                })
            })??;

        let index = self.index.snapshot();
        let hits = index.query(&vector, k)?;
        debug!(
            "Top scores: {:?}",
            hits.iter().map(|h| h.score).collect::<Vec<_>>()
        );

        let results: Vec<QueryResult> = hits
            .into_iter()
            .map(|hit| QueryResult {
                source: hit.source,
                text: hit.text,
            })
            .collect();
        info!(
            "Answered query of {} chars with k={}: {:?}",
            query.chars().count(),
            k,
            results.iter().map(|r| r.source.as_str()).collect::<Vec<_>>()
        );
        Ok(results)
    }
}

/// The credential in a `Bearer <token>` header value.
fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim().split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

/// Compare without exiting early on the first differing byte.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    let len = a.len().max(b.len());
    let mut diff = a.len() ^ b.len();
    for i in 0..len {
        let x = a.get(i).copied().unwrap_or(0);
        let y = b.get(i).copied().unwrap_or(0);
        diff |= usize::from(x ^ y);
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use ragdex_embed::{EmbeddingResult, HashingProvider};
    use ragdex_retriever::storage::{FlatIndex, IndexEntry, Metric};

    /// Embeds every text as the same fixed vector.
    struct FixedProvider(Vec<f32>);

    #[async_trait]
    impl EmbeddingProvider for FixedProvider {
        async fn embed_text(&self, _text: &str) -> ragdex_embed::Result<Vec<f32>> {
            Ok(self.0.clone())
        }

        async fn embed_texts(&self, texts: &[String]) -> ragdex_embed::Result<EmbeddingResult> {
            Ok(EmbeddingResult::new(vec![self.0.clone(); texts.len()]))
        }

        fn embedding_dimension(&self) -> Option<usize> {
            Some(self.0.len())
        }

        fn provider_name(&self) -> &str {
            "fixed"
        }

        fn model_name(&self) -> &str {
            "fixed"
        }
    }

    fn far_apart_index() -> FlatIndex {
        FlatIndex::build(
            vec![
                IndexEntry::new(vec![1.0, 0.0, 0.0], "one", "chunk1.md"),
                IndexEntry::new(vec![0.0, 1.0, 0.0], "two", "chunk2.md"),
                IndexEntry::new(vec![0.0, 0.0, 1.0], "three", "chunk3.md"),
            ],
            Metric::Cosine,
            "fixed",
        )
        .unwrap()
    }

    fn service(provider: Arc<dyn EmbeddingProvider>) -> RetrievalService<FlatIndex> {
        RetrievalService::new(
            "s3cret",
            provider,
            Arc::new(SharedIndex::new(far_apart_index())),
            ServiceSettings::default(),
        )
    }

    #[tokio::test]
    async fn test_query_near_second_chunk_returns_two() {
        let service = service(Arc::new(FixedProvider(vec![0.1, 0.9, 0.05])));
        let request = QueryRequest {
            query: "near two".to_string(),
            k: Some(2),
        };

        let results = service.handle(Some("Bearer s3cret"), request).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].source, "chunk2.md");
        assert_eq!(results[0].text, "two");
    }

    #[tokio::test]
    async fn test_invalid_token_never_embeds() {
        let provider = HashingProvider::new(3).unwrap();
        let service = service(Arc::new(provider.clone()));

        for header in [None, Some("Bearer wrong"), Some("Basic s3cret"), Some("Bearer ")] {
            let result = service.handle(header, QueryRequest::new("anything")).await;
            assert!(matches!(result, Err(ServiceError::Unauthorized)));
        }
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn test_argument_validation() {
        let provider = HashingProvider::new(3).unwrap();
        let service = service(Arc::new(provider.clone()));

        let empty = service.query(QueryRequest::new("   ")).await;
        assert!(matches!(empty, Err(ServiceError::InvalidArgument { .. })));

        let zero = service
            .query(QueryRequest {
                query: "x".to_string(),
                k: Some(0),
            })
            .await;
        assert!(matches!(zero, Err(ServiceError::InvalidArgument { .. })));
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn test_k_is_bounded_and_defaulted() {
        let service = service(Arc::new(FixedProvider(vec![1.0, 1.0, 1.0])));
        let all = service
            .query(QueryRequest {
                query: "q".to_string(),
                k: Some(100),
            })
            .await
            .unwrap();
        assert_eq!(all.len(), 3);

        let default = service.query(QueryRequest::new("q")).await.unwrap();
        assert_eq!(default.len(), 3);
    }

    #[tokio::test]
    async fn test_provider_errors_are_classified() {
        let down = HashingProvider::new(3)
            .unwrap()
            .with_failure(|_| Some(EmbedError::unavailable("down")));
        let result = service(Arc::new(down)).query(QueryRequest::new("q")).await;
        assert!(matches!(
            result,
            Err(ServiceError::Provider {
                retriable: true,
                ..
            })
        ));

        let rejecting = HashingProvider::new(3)
            .unwrap()
            .with_failure(|_| Some(EmbedError::invalid_input("too long")));
        let result = service(Arc::new(rejecting)).query(QueryRequest::new("q")).await;
        assert!(matches!(result, Err(ServiceError::InvalidInput { .. })));
    }

    #[tokio::test]
    async fn test_slow_provider_times_out_as_retriable() {
        let slow = HashingProvider::new(3)
            .unwrap()
            .with_delay(Duration::from_millis(500));
        let service = RetrievalService::new(
            "s3cret",
            Arc::new(slow),
            Arc::new(SharedIndex::new(far_apart_index())),
            ServiceSettings {
                embed_timeout: Duration::from_millis(20),
                ..ServiceSettings::default()
            },
        );

        let result = service.query(QueryRequest::new("q")).await;
        assert!(matches!(
            result,
            Err(ServiceError::Provider {
                retriable: true,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_dimension_mismatch_is_an_index_error() {
        let service = service(Arc::new(FixedProvider(vec![1.0, 0.0])));
        let result = service.query(QueryRequest::new("q")).await;
        assert!(matches!(
            result,
            Err(ServiceError::Index(IndexError::DimensionMismatch { .. }))
        ));
    }

    #[tokio::test]
    #[tracing_test::traced_test]
    async fn test_logs_never_contain_the_token() {
        let service = service(Arc::new(FixedProvider(vec![0.0, 1.0, 0.0])));

        service
            .handle(Some("Bearer s3cret"), QueryRequest::new("q"))
            .await
            .unwrap();
        let rejected = service
            .handle(Some("Bearer guessed-token"), QueryRequest::new("q"))
            .await;
        assert!(rejected.is_err());

        assert!(logs_contain("Answered query"));
        assert!(logs_contain("Rejected query without valid credentials"));
        assert!(!logs_contain("s3cret"));
        assert!(!logs_contain("guessed-token"));
    }

    #[test]
    fn test_bearer_parsing_and_comparison() {
        assert_eq!(bearer_token("Bearer abc"), Some("abc"));
        assert_eq!(bearer_token("bearer   abc "), Some("abc"));
        assert_eq!(bearer_token("Basic abc"), None);
        assert_eq!(bearer_token("Bearer"), None);

        assert!(constant_time_eq(b"token", b"token"));
        assert!(!constant_time_eq(b"token", b"tokem"));
        assert!(!constant_time_eq(b"token", b"token2"));
        assert!(!constant_time_eq(b"", b"x"));
    }
}
