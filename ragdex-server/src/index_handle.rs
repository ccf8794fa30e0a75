//! Shared, swappable index snapshot.

use ragdex_retriever::storage::{IndexError, VectorIndex};
use std::path::Path;
use std::sync::{Arc, RwLock};
use tracing::info;

#[derive(Debug, thiserror::Error)]
pub enum ReloadError {
    #[error(transparent)]
    Index(#[from] IndexError),

    #[error("index was built with {found} but the provider is {expected}")]
    ModelMismatch { expected: String, found: String },
}

/// Holds the index queries run against.
///
/// Readers take a snapshot (an `Arc` clone under a short read lock) and query
/// it without holding any lock. [`SharedIndex::swap`] installs a new index;
/// queries already running keep the snapshot they started with.
pub struct SharedIndex<I> {
    current: RwLock<Arc<I>>,
}

impl<I: VectorIndex> SharedIndex<I> {
    pub fn new(index: I) -> Self {
        Self {
            current: RwLock::new(Arc::new(index)),
        }
    }

    /// The index as of now.
    pub fn snapshot(&self) -> Arc<I> {
        let guard = self.current.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&guard)
    }

    /// Replace the index and return the one it replaced.
    pub fn swap(&self, index: I) -> Arc<I> {
        let replacement = Arc::new(index);
        let mut guard = self.current.write().unwrap_or_else(|e| e.into_inner());
        std::mem::replace(&mut *guard, replacement)
    }

    /// Load the index at `location` and swap it in. On error, including an
    /// index built with a model other than `expected_model`, the current
    /// index stays in place.
    pub fn reload(&self, location: &Path, expected_model: &str) -> Result<Arc<I>, ReloadError> {
        let index = I::load(location)?;
        let found = &index.manifest().model;
        if found != expected_model {
            return Err(ReloadError::ModelMismatch {
                expected: expected_model.to_string(),
                found: found.clone(),
            });
        }
        info!(
            "Reloaded index from {}: {} entries",
            location.display(),
            index.len()
        );
        self.swap(index);
        Ok(self.snapshot())
    }
}
