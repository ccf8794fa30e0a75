//! Document discovery and loading.
//!
//! Each [`SourceSpec`] names a root directory and a glob. Files under the
//! root that match the glob are read as documents; hidden files and paths
//! excluded by `.gitignore` are skipped.

use crate::config::{SourceKind, SourceSpec};
use crate::pipeline::BuildError;
use ignore::WalkBuilder;
use ignore::gitignore::{Gitignore, GitignoreBuilder};
use ragdex_context::Language;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Files larger than this are skipped.
pub const DEFAULT_MAX_FILE_BYTES: u64 = 4 << 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Prose,
    Code(Language),
}

/// A loaded source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// Path the document was found at, used as its provenance.
    pub source_path: String,
    pub raw_text: String,
    pub kind: DocumentKind,
}

#[derive(Debug, Clone)]
pub struct DocumentLoader {
    sources: Vec<SourceSpec>,
    max_file_bytes: u64,
}

impl DocumentLoader {
    pub fn new(sources: Vec<SourceSpec>) -> Self {
        Self {
            sources,
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
        }
    }

    pub fn with_max_file_bytes(self, max_file_bytes: u64) -> Self {
        Self {
            max_file_bytes,
            ..self
        }
    }

    /// Paths of all matching files, in source order and sorted within each
    /// source. A file matched by several sources is returned once.
    pub fn discover(&self) -> Result<Vec<(PathBuf, DocumentKind)>, BuildError> {
        let mut seen = HashSet::new();
        let mut found = Vec::new();

        for spec in &self.sources {
            if !spec.root.is_dir() {
                return Err(BuildError::Load {
                    path: spec.root.clone(),
                    source: std::io::Error::new(
                        std::io::ErrorKind::NotFound,
                        "source root is not a directory",
                    ),
                });
            }

            let matcher = glob_matcher(spec)?;
            let walker = WalkBuilder::new(&spec.root)
                .hidden(true)
                .require_git(false)
                .sort_by_file_path(|a, b| a.cmp(b))
                .build();

            for entry in walker {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(e) => {
                        warn!("Skipping unreadable path under {}: {}", spec.root.display(), e);
                        continue;
                    }
                };
                if !entry.file_type().is_some_and(|t| t.is_file()) {
                    continue;
                }
                if !matcher.matched(entry.path(), false).is_ignore() {
                    continue;
                }
                let path = entry.into_path();
                if let Ok(metadata) = path.metadata() {
                    if metadata.len() > self.max_file_bytes {
                        warn!(
                            "Skipping {}: {} bytes exceeds limit of {}",
                            path.display(),
                            metadata.len(),
                            self.max_file_bytes
                        );
                        continue;
                    }
                }
                if seen.insert(path.clone()) {
                    let kind = document_kind(&path, spec.kind);
                    found.push((path, kind));
                }
            }
        }

        Ok(found)
    }

    /// Discover and read every matching file.
    pub async fn load(&self) -> Result<Vec<Document>, BuildError> {
        let mut documents = Vec::new();
        for (path, kind) in self.discover()? {
            let bytes = tokio::fs::read(&path)
                .await
                .map_err(|source| BuildError::Load {
                    path: path.clone(),
                    source,
                })?;
            debug!("Loaded {} ({} bytes)", path.display(), bytes.len());
            documents.push(Document {
                source_path: display_path(&path),
                raw_text: String::from_utf8_lossy(&bytes).into_owned(),
                kind,
            });
        }
        Ok(documents)
    }
}

// A single-line gitignore set: "ignored" here means "matches the glob".
fn glob_matcher(spec: &SourceSpec) -> Result<Gitignore, BuildError> {
    let invalid = |source| BuildError::InvalidGlob {
        glob: spec.glob.clone(),
        source,
    };
    let mut builder = GitignoreBuilder::new(&spec.root);
    builder.add_line(None, &spec.glob).map_err(invalid)?;
    builder.build().map_err(invalid)
}

fn document_kind(path: &Path, source_kind: SourceKind) -> DocumentKind {
    match source_kind {
        SourceKind::Prose => DocumentKind::Prose,
        SourceKind::Code => match Language::from_path(path) {
            Some(Language::Markdown) | None => {
                debug!(
                    "No code grammar for {}, splitting as prose",
                    path.display()
                );
                DocumentKind::Prose
            }
            Some(language) => DocumentKind::Code(language),
        },
    }
}

fn display_path(path: &Path) -> String {
    path.strip_prefix(".")
        .unwrap_or(path)
        .to_string_lossy()
        .into_owned()
}
