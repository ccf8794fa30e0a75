use super::{
    FORMAT_VERSION, IndexEntry, IndexError, IndexManifest, Metric, ScoredEntry, VectorIndex,
    index_file,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// Exact nearest-neighbour index: every query scores every entry.
///
/// Stored on disk as a single JSON document holding the manifest and the
/// entries. Entry norms are recomputed on load rather than stored.
#[derive(Debug, Clone)]
pub struct FlatIndex {
    manifest: IndexManifest,
    entries: Vec<IndexEntry>,
    norms: Vec<f32>,
}

#[derive(Serialize)]
struct StoredIndexRef<'a> {
    manifest: &'a IndexManifest,
    entries: &'a [IndexEntry],
}

#[derive(Deserialize)]
struct StoredIndex {
    manifest: IndexManifest,
    entries: Vec<IndexEntry>,
}

impl FlatIndex {
    fn from_parts(manifest: IndexManifest, entries: Vec<IndexEntry>) -> Self {
        let norms = entries.iter().map(|e| l2_norm(&e.vector)).collect();
        Self {
            manifest,
            entries,
            norms,
        }
    }

    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    fn score(&self, query: &[f32], query_norm: f32, position: usize) -> f32 {
        let dot = dot(query, &self.entries[position].vector);
        match self.manifest.metric {
            Metric::InnerProduct => dot,
            Metric::Cosine => {
                let norm = self.norms[position];
                if norm == 0.0 || query_norm == 0.0 {
                    0.0
                } else {
                    dot / (norm * query_norm)
                }
            }
        }
    }
}

impl VectorIndex for FlatIndex {
    fn build(entries: Vec<IndexEntry>, metric: Metric, model: &str) -> Result<Self, IndexError> {
        let dimension = entries.first().ok_or(IndexError::Empty)?.vector.len();
        if dimension == 0 {
            return Err(IndexError::DimensionMismatch {
                expected: 1,
                found: 0,
                source_path: entries[0].source.clone(),
            });
        }
        if let Some(bad) = entries.iter().find(|e| e.vector.len() != dimension) {
            return Err(IndexError::DimensionMismatch {
                expected: dimension,
                found: bad.vector.len(),
                source_path: bad.source.clone(),
            });
        }

        let manifest = IndexManifest {
            format_version: FORMAT_VERSION,
            model: model.to_string(),
            metric,
            dimension,
            entry_count: entries.len(),
            built_at: Utc::now(),
        };
        debug!(
            "Built flat index: {} entries, dimension {}, metric {}",
            manifest.entry_count, dimension, metric
        );
        Ok(Self::from_parts(manifest, entries))
    }

    fn persist(&self, location: &Path) -> Result<(), IndexError> {
        std::fs::create_dir_all(location).map_err(|e| IndexError::write(location, e))?;
        let final_path = index_file(location);

        // Write to a sibling temp file so the rename below stays on one filesystem.
        let tmp = NamedTempFile::new_in(location).map_err(|e| IndexError::write(location, e))?;
        {
            let mut writer = BufWriter::new(tmp.as_file());
            let stored = StoredIndexRef {
                manifest: &self.manifest,
                entries: &self.entries,
            };
            serde_json::to_writer(&mut writer, &stored)
                .map_err(|e| IndexError::write(tmp.path(), e))?;
            writer
                .flush()
                .map_err(|e| IndexError::write(tmp.path(), e))?;
        }
        tmp.as_file()
            .sync_all()
            .map_err(|e| IndexError::write(tmp.path(), e))?;
        tmp.persist(&final_path)
            .map_err(|e| IndexError::write(&final_path, e))?;

        sync_dir(location);

        info!(
            "Persisted index with {} entries to {}",
            self.manifest.entry_count,
            final_path.display()
        );
        Ok(())
    }

    fn load(location: &Path) -> Result<Self, IndexError> {
        let path = index_file(location);
        if !location.is_dir() || !path.is_file() {
            return Err(IndexError::NotFound {
                path: location.to_path_buf(),
            });
        }

        let file = File::open(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => IndexError::NotFound {
                path: location.to_path_buf(),
            },
            _ => IndexError::corrupt(&path, e.to_string()),
        })?;
        let stored: StoredIndex = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| IndexError::corrupt(&path, e.to_string()))?;

        let manifest = stored.manifest;
        if manifest.format_version != FORMAT_VERSION {
            return Err(IndexError::corrupt(
                &path,
                format!("unsupported format version {}", manifest.format_version),
            ));
        }
        if manifest.entry_count != stored.entries.len() {
            return Err(IndexError::corrupt(
                &path,
                format!(
                    "manifest lists {} entries, file holds {}",
                    manifest.entry_count,
                    stored.entries.len()
                ),
            ));
        }
        if manifest.dimension == 0 || stored.entries.is_empty() {
            return Err(IndexError::corrupt(&path, "index holds no vectors"));
        }
        if let Some(bad) = stored
            .entries
            .iter()
            .find(|e| e.vector.len() != manifest.dimension)
        {
            return Err(IndexError::corrupt(
                &path,
                format!(
                    "entry from {} has dimension {}, manifest says {}",
                    bad.source,
                    bad.vector.len(),
                    manifest.dimension
                ),
            ));
        }

        info!(
            "Loaded index from {}: {} entries, model {}",
            path.display(),
            manifest.entry_count,
            manifest.model
        );
        Ok(Self::from_parts(manifest, stored.entries))
    }

    fn query(&self, vector: &[f32], k: usize) -> Result<Vec<ScoredEntry>, IndexError> {
        if k == 0 {
            return Err(IndexError::InvalidArgument {
                message: "k must be at least 1".to_string(),
            });
        }
        if vector.len() != self.manifest.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.manifest.dimension,
                found: vector.len(),
                source_path: "query".to_string(),
            });
        }

        let query_norm = l2_norm(vector);
        let mut scored: Vec<(usize, f32)> = (0..self.entries.len())
            .map(|i| (i, self.score(vector, query_norm, i)))
            .collect();
        // Stable sort keeps insertion order among equal scores.
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(i, score)| ScoredEntry {
                score,
                text: self.entries[i].text.clone(),
                source: self.entries[i].source.clone(),
            })
            .collect())
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn dimension(&self) -> usize {
        self.manifest.dimension
    }

    fn metric(&self) -> Metric {
        self.manifest.metric
    }

    fn manifest(&self) -> &IndexManifest {
        &self.manifest
    }
}

// Makes the rename durable. Not every filesystem supports it.
#[cfg(unix)]
fn sync_dir(location: &Path) {
    if let Ok(dir) = File::open(location) {
        let _ = dir.sync_all();
    }
}

#[cfg(not(unix))]
fn sync_dir(_location: &Path) {}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn l2_norm(v: &[f32]) -> f32 {
    dot(v, v).sqrt()
}
