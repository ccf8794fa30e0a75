//! Vector index abstraction for ragdex-retriever
//!
//! An index owns a set of [`IndexEntry`] values (a vector plus the chunk text
//! and its provenance) and answers k-nearest-neighbour queries over them. It
//! is built once from a complete entry list, persisted to a directory, and
//! loaded read-only by the query service.
//!
//! ## Key Components
//!
//! - **VectorIndex**: build / persist / load / query capability
//! - **FlatIndex**: exact linear-scan backend stored as JSON
//! - **IndexManifest**: model, metric and dimension recorded with the entries
//!
//! ## Usage
//!
//! ```rust,no_run
//! use ragdex_retriever::storage::{FlatIndex, IndexEntry, Metric, VectorIndex};
//! use std::path::Path;
//!
//! # fn example() -> Result<(), ragdex_retriever::storage::IndexError> {
//! let entries = vec![
//!     IndexEntry::new(vec![1.0, 0.0], "first chunk", "docs/a.md"),
//!     IndexEntry::new(vec![0.0, 1.0], "second chunk", "docs/b.md"),
//! ];
//! let index = FlatIndex::build(entries, Metric::Cosine, "text-embedding-ada-002")?;
//! index.persist(Path::new("index_text-embedding-ada-002"))?;
//!
//! let loaded = FlatIndex::load(Path::new("index_text-embedding-ada-002"))?;
//! let hits = loaded.query(&[0.9, 0.1], 1)?;
//! assert_eq!(hits[0].source, "docs/a.md");
//! # Ok(())
//! # }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub mod flat_index;

pub use flat_index::FlatIndex;

/// Version of the on-disk layout written by this crate.
pub const FORMAT_VERSION: u32 = 1;

/// File name of the index inside its location directory.
pub const INDEX_FILE_NAME: &str = "index.json";

/// Similarity function, fixed when the index is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    #[default]
    Cosine,
    InnerProduct,
}

impl std::str::FromStr for Metric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "cosine" => Ok(Metric::Cosine),
            "inner_product" | "dot" => Ok(Metric::InnerProduct),
            _ => Err(format!("Invalid metric: {s}")),
        }
    }
}

impl std::fmt::Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Metric::Cosine => write!(f, "cosine"),
            Metric::InnerProduct => write!(f, "inner_product"),
        }
    }
}

/// One indexed chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub vector: Vec<f32>,
    pub text: String,
    /// Path of the document the chunk came from.
    pub source: String,
}

impl IndexEntry {
    pub fn new(vector: Vec<f32>, text: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            vector,
            text: text.into(),
            source: source.into(),
        }
    }
}

/// A query hit. Higher scores are closer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredEntry {
    pub score: f32,
    pub text: String,
    pub source: String,
}

/// Metadata persisted with the entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexManifest {
    pub format_version: u32,
    /// Embedding model the vectors were produced with.
    pub model: String,
    pub metric: Metric,
    pub dimension: usize,
    pub entry_count: usize,
    pub built_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("cannot build an index from zero entries")]
    Empty,

    #[error("dimension mismatch for {source_path}: expected {expected}, found {found}")]
    DimensionMismatch {
        expected: usize,
        found: usize,
        source_path: String,
    },

    #[error("failed to write index to {}", path.display())]
    StorageWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("index at {} is corrupt: {message}", path.display())]
    StorageCorrupt { path: PathBuf, message: String },

    #[error("no index found at {}", path.display())]
    NotFound { path: PathBuf },

    #[error("invalid argument: {message}")]
    InvalidArgument { message: String },
}

impl IndexError {
    pub(crate) fn write(path: &Path, source: impl Into<std::io::Error>) -> Self {
        Self::StorageWrite {
            path: path.to_path_buf(),
            source: source.into(),
        }
    }

    pub(crate) fn corrupt(path: &Path, message: impl Into<String>) -> Self {
        Self::StorageCorrupt {
            path: path.to_path_buf(),
            message: message.into(),
        }
    }
}

/// Nearest-neighbour search over a fixed set of entries.
///
/// Implementations are immutable once built; a new index is built and swapped
/// in rather than updating entries in place. Query results are ordered by
/// descending score, with equal scores kept in insertion order.
pub trait VectorIndex: Send + Sync + Sized {
    /// Build an index over `entries`, all of which must share one dimension.
    fn build(entries: Vec<IndexEntry>, metric: Metric, model: &str) -> Result<Self, IndexError>;

    /// Write the index into the `location` directory, replacing any previous
    /// index there in one step.
    fn persist(&self, location: &Path) -> Result<(), IndexError>;

    /// Read an index previously written by [`VectorIndex::persist`].
    fn load(location: &Path) -> Result<Self, IndexError>;

    /// The at most `k` entries closest to `vector`.
    fn query(&self, vector: &[f32], k: usize) -> Result<Vec<ScoredEntry>, IndexError>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn dimension(&self) -> usize;

    fn metric(&self) -> Metric;

    fn manifest(&self) -> &IndexManifest;
}

/// Path of the index file inside `location`.
pub fn index_file(location: &Path) -> PathBuf {
    location.join(INDEX_FILE_NAME)
}
