//! Index build pipeline: documents → chunks → embeddings → persisted index.
//!
//! The build is all-or-nothing. Every document is split and embedded before
//! the index is built, and the index is persisted only when every step
//! succeeded, so a failed run never replaces a previous index.

use crate::config::{AppConfig, ChunkSettings};
use crate::loader::{Document, DocumentKind, DocumentLoader};
use crate::storage::{FlatIndex, IndexEntry, IndexError, Metric, VectorIndex};
use indicatif::{ProgressBar, ProgressStyle};
use ragdex_context::{Chunk, Language, SplitError, SplitterConfig, TextSplitter};
use ragdex_embed::{EmbedError, EmbeddingProvider};
use std::collections::HashMap;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("failed to load {}", path.display())]
    Load {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid source glob {glob:?}")]
    InvalidGlob {
        glob: String,
        #[source]
        source: ignore::Error,
    },

    #[error("invalid splitter settings")]
    Split(#[from] SplitError),

    #[error("failed to embed {source_path} (chunks starting at {sequence_index})")]
    Embedding {
        source_path: String,
        sequence_index: usize,
        #[source]
        source: EmbedError,
    },

    #[error("failed to build index")]
    Index(#[from] IndexError),

    #[error("no documents to index")]
    NoDocuments,
}

/// Chunking and index settings for one build.
#[derive(Debug, Clone)]
pub struct BuildSettings {
    pub prose: ChunkSettings,
    pub code: ChunkSettings,
    pub metric: Metric,
}

impl BuildSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            prose: config.prose.clone(),
            code: config.code.clone(),
            metric: config.metric,
        }
    }
}

/// Counters reported after a build.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct BuildStats {
    pub documents: usize,
    pub chunks: usize,
    /// Chunks holding only whitespace, which are not embedded.
    pub blank_chunks_skipped: usize,
    pub dimension: usize,
    #[serde(skip)]
    pub elapsed: Duration,
}

/// Splitters keyed by document kind, created on first use.
struct Splitters<'a> {
    settings: &'a BuildSettings,
    cache: HashMap<Option<Language>, TextSplitter>,
}

impl<'a> Splitters<'a> {
    fn new(settings: &'a BuildSettings) -> Self {
        Self {
            settings,
            cache: HashMap::new(),
        }
    }

    fn split(&mut self, document: &Document) -> Result<Vec<Chunk>, BuildError> {
        let key = match document.kind {
            DocumentKind::Prose => None,
            DocumentKind::Code(language) => Some(language),
        };
        if !self.cache.contains_key(&key) {
            let config = match key {
                None => SplitterConfig::prose(
                    self.settings.prose.chunk_size,
                    self.settings.prose.chunk_overlap,
                )
                .with_separator(self.settings.prose.separator.clone()),
                Some(language) => SplitterConfig::code(
                    language,
                    self.settings.code.chunk_size,
                    self.settings.code.chunk_overlap,
                ),
            };
            self.cache.insert(key, TextSplitter::new(config)?);
        }
        let splitter = &self.cache[&key];
        Ok(splitter.split(&document.source_path, &document.raw_text))
    }
}

/// Split and embed `documents`, then build an index over the results.
///
/// Nothing is written to disk.
pub async fn build_index<I: VectorIndex>(
    documents: &[Document],
    provider: &dyn EmbeddingProvider,
    settings: &BuildSettings,
) -> Result<(I, BuildStats), BuildError> {
    if documents.is_empty() {
        return Err(BuildError::NoDocuments);
    }

    let start = Instant::now();
    let mut splitters = Splitters::new(settings);
    let mut entries = Vec::new();
    let mut stats = BuildStats {
        documents: documents.len(),
        ..BuildStats::default()
    };

    info!(
        "Indexing {} documents with {} ({})",
        documents.len(),
        provider.provider_name(),
        provider.model_name()
    );

    let progress = progress_bar(documents.len() as u64, std::io::stderr().is_terminal());
    for document in documents {
        progress.set_message(document.source_path.clone());
        progress.inc(1);
        let chunks = splitters.split(document)?;
        let (chunks, blank): (Vec<Chunk>, Vec<Chunk>) =
            chunks.into_iter().partition(|c| !c.text.trim().is_empty());
        stats.blank_chunks_skipped += blank.len();
        if chunks.is_empty() {
            debug!("{}: nothing to embed", document.source_path);
            continue;
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let result = provider.embed_texts(&texts).await.map_err(|source| {
            error!("Embedding failed for {}: {}", document.source_path, source);
            BuildError::Embedding {
                source_path: document.source_path.clone(),
                sequence_index: chunks[0].sequence_index,
                source,
            }
        })?;
        if result.len() != chunks.len() {
            return Err(BuildError::Embedding {
                source_path: document.source_path.clone(),
                sequence_index: chunks[0].sequence_index,
                source: EmbedError::unavailable(format!(
                    "provider returned {} vectors for {} chunks",
                    result.len(),
                    chunks.len()
                )),
            });
        }

        debug!(
            "{}: {} chunks embedded",
            document.source_path,
            chunks.len()
        );
        stats.chunks += chunks.len();
        entries.extend(
            chunks
                .into_iter()
                .zip(result.embeddings)
                .map(|(chunk, vector)| IndexEntry::new(vector, chunk.text, chunk.source_path)),
        );
    }

    progress.finish_and_clear();

    if entries.is_empty() {
        return Err(BuildError::NoDocuments);
    }

    let index = I::build(entries, settings.metric, provider.model_name())?;
    stats.dimension = index.dimension();
    stats.elapsed = start.elapsed();
    info!(
        "Built index: {} documents, {} chunks, dimension {} in {:?}",
        stats.documents, stats.chunks, stats.dimension, stats.elapsed
    );
    Ok((index, stats))
}

// Drawn on stderr, and only when stderr is a terminal.
fn progress_bar(len: u64, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(len);
    if let Ok(style) = ProgressStyle::default_bar().template(
        "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} documents {msg}",
    ) {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb
}

/// Load the documents named by `loader`, build a [`FlatIndex`] and persist it
/// at `location`.
pub async fn run_build(
    loader: &DocumentLoader,
    provider: &dyn EmbeddingProvider,
    settings: &BuildSettings,
    location: &Path,
) -> Result<BuildStats, BuildError> {
    let documents = loader.load().await?;
    info!("Loaded {} documents", documents.len());

    let (index, stats) = build_index::<FlatIndex>(&documents, provider, settings).await?;
    index.persist(location)?;
    Ok(stats)
}
