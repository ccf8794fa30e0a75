//! Deterministic offline embedding provider

use crate::error::{EmbedError, Result};
use crate::provider::{EmbeddingProvider, EmbeddingResult};
use async_trait::async_trait;
use fnv::FnvHasher;
use std::hash::Hasher;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Dimension used when none is given.
pub const DEFAULT_HASHING_DIMENSION: usize = 256;

type FailureFn = dyn Fn(&str) -> Option<EmbedError> + Send + Sync;

/// Feature-hashing embedder that needs no network and no model files.
///
/// Each lowercase alphanumeric token (and each adjacent token pair) is hashed
/// with FNV into one of `dimension` buckets with a hash-derived sign; the
/// result is L2-normalized. Texts sharing words end up close under cosine
/// similarity, which is enough for offline runs and tests.
///
/// The provider counts how often it is called and can be told to fail, so
/// callers can check that a code path did or did not reach the embedder.
#[derive(Clone)]
pub struct HashingProvider {
    dimension: usize,
    model_name: String,
    calls: Arc<AtomicUsize>,
    failure: Option<Arc<FailureFn>>,
    delay: Option<Duration>,
}

impl std::fmt::Debug for HashingProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HashingProvider")
            .field("dimension", &self.dimension)
            .field("model_name", &self.model_name)
            .field("calls", &self.calls())
            .field("failure", &self.failure.is_some())
            .field("delay", &self.delay)
            .finish()
    }
}

impl HashingProvider {
    pub fn new(dimension: usize) -> Result<Self> {
        if dimension == 0 {
            return Err(EmbedError::invalid_config("dimension must be non-zero"));
        }
        Ok(Self {
            dimension,
            model_name: format!("hashing-{dimension}"),
            calls: Arc::new(AtomicUsize::new(0)),
            failure: None,
            delay: None,
        })
    }

    pub fn with_model_name(self, model_name: impl Into<String>) -> Self {
        Self {
            model_name: model_name.into(),
            ..self
        }
    }

    /// Fail any text for which `failure` returns an error.
    pub fn with_failure<F>(self, failure: F) -> Self
    where
        F: Fn(&str) -> Option<EmbedError> + Send + Sync + 'static,
    {
        Self {
            failure: Some(Arc::new(failure)),
            ..self
        }
    }

    /// Sleep before answering each call.
    pub fn with_delay(self, delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..self
        }
    }

    /// Number of `embed_text`/`embed_texts` calls made so far.
    ///
    /// Clones share the counter.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn vectorize(&self, text: &str) -> Result<Vec<f32>> {
        if text.trim().is_empty() {
            return Err(EmbedError::invalid_input("text is empty"));
        }
        if let Some(err) = self.failure.as_ref().and_then(|f| f(text)) {
            return Err(err);
        }

        let tokens: Vec<String> = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(str::to_lowercase)
            .collect();

        let mut vector = vec![0.0f32; self.dimension];
        for token in &tokens {
            self.add_feature(&mut vector, token.as_bytes(), 1.0);
        }
        for pair in tokens.windows(2) {
            let joined = format!("{} {}", pair[0], pair[1]);
            self.add_feature(&mut vector, joined.as_bytes(), 0.5);
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|x| *x /= norm);
        }
        Ok(vector)
    }

    fn add_feature(&self, vector: &mut [f32], feature: &[u8], weight: f32) {
        let mut hasher = FnvHasher::default();
        hasher.write(feature);
        let hash = hasher.finish();
        let bucket = (hash % self.dimension as u64) as usize;
        let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
        vector[bucket] += sign * weight;
    }

    async fn begin_call(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl EmbeddingProvider for HashingProvider {
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        self.begin_call().await;
        self.vectorize(text)
    }

    async fn embed_texts(&self, texts: &[String]) -> Result<EmbeddingResult> {
        self.begin_call().await;
        let embeddings = texts
            .iter()
            .map(|t| self.vectorize(t))
            .collect::<Result<Vec<_>>>()?;
        Ok(EmbeddingResult::new(embeddings))
    }

    fn embedding_dimension(&self) -> Option<usize> {
        Some(self.dimension)
    }

    fn provider_name(&self) -> &str {
        "hashing"
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}
