//! The embedding provider boundary

use crate::error::Result;
use async_trait::async_trait;

/// Result of embedding generation
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingResult {
    /// The generated embeddings, one per input text, in input order
    pub embeddings: Vec<Vec<f32>>,
    /// The dimension of each embedding vector
    pub dimension: usize,
}

impl EmbeddingResult {
    /// Create a new embedding result.
    ///
    /// The dimension is inferred from the first embedding vector and is 0
    /// when there are no embeddings.
    pub fn new(embeddings: Vec<Vec<f32>>) -> Self {
        let dimension = embeddings.first().map(|e| e.len()).unwrap_or(0);
        Self {
            embeddings,
            dimension,
        }
    }

    /// Returns the number of embedding vectors in this result.
    pub fn len(&self) -> usize {
        self.embeddings.len()
    }

    /// Returns `true` if this result contains no embedding vectors.
    pub fn is_empty(&self) -> bool {
        self.embeddings.is_empty()
    }
}

/// Turns text into fixed-length vectors.
///
/// Implementations are shared between the index builder and the query
/// service, so they must be usable from many tasks at once. Every vector a
/// single provider returns has the same length.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single text.
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed many texts. The result holds one vector per input, in order.
    async fn embed_texts(&self, texts: &[String]) -> Result<EmbeddingResult>;

    /// Vector length, if known before the first call.
    fn embedding_dimension(&self) -> Option<usize>;

    /// Short identifier of the provider kind, e.g. `openai`.
    fn provider_name(&self) -> &str;

    /// The model this provider embeds with. Index artifacts record it.
    fn model_name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedding_result() {
        let result = EmbeddingResult::new(vec![vec![0.1, 0.2, 0.3], vec![0.4, 0.5, 0.6]]);

        assert_eq!(result.len(), 2);
        assert_eq!(result.dimension, 3);
        assert!(!result.is_empty());
    }

    #[test]
    fn test_empty_embedding_result() {
        let result = EmbeddingResult::new(Vec::new());
        assert!(result.is_empty());
        assert_eq!(result.dimension, 0);
    }
}
