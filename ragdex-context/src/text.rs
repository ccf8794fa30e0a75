//! Splitting of raw documents into bounded, overlapping chunks.
//!
//! A [`TextSplitter`] turns the text of one document into an ordered list of
//! [`Chunk`]s. Every chunk holds at most `chunk_size` characters, and every
//! chunk after the first starts with a copy of the tail of its predecessor
//! (the overlap). The overlap is recorded on the chunk, so the original
//! document can always be rebuilt from the chunks:
//!
//! ```
//! use ragdex_context::text::{SplitterConfig, TextSplitter};
//!
//! let splitter = TextSplitter::new(SplitterConfig::prose(40, 10)).unwrap();
//! let document = "First paragraph of text.\n\nSecond paragraph, a bit longer than the first.";
//! let chunks = splitter.split("notes.md", document);
//!
//! assert!(chunks.len() > 1);
//! let rebuilt: String = chunks.iter().map(|c| c.fresh_text()).collect();
//! assert_eq!(rebuilt, document);
//! assert!(chunks.iter().all(|c| c.text.chars().count() <= 40));
//! ```
//!
//! # Splitting strategy
//!
//! Splitting happens in two phases:
//!
//! 1. The text is broken into *segments* by recursively applying an ordered
//!    list of delimiter patterns. A segment that is still too large for one
//!    chunk is handed to the next, finer delimiter; when the delimiters run
//!    out it is cut at character granularity. Delimiters start the segment
//!    they introduce, so `function foo` stays attached to its body.
//! 2. Segments are merged greedily into chunks. When the next segment does
//!    not fit, the current chunk is emitted and the next one is seeded with
//!    the overlap.
//!
//! Prose uses a single literal separator (a paragraph break by default).
//! Code uses a per-[`Language`] list of declaration, block and line patterns.
//!
//! Sizes are counted in characters (Unicode scalar values) and cuts never
//! land inside a UTF-8 sequence.

use regex::Regex;
use std::collections::VecDeque;
use std::ops::Range;
use std::path::Path;

/// Default chunk size for prose documents, in characters.
pub const DEFAULT_PROSE_CHUNK_SIZE: usize = 3000;
/// Default overlap for prose documents, in characters.
pub const DEFAULT_PROSE_CHUNK_OVERLAP: usize = 300;
/// Default chunk size for source code, in characters.
pub const DEFAULT_CODE_CHUNK_SIZE: usize = 1000;
/// Default overlap for source code, in characters.
pub const DEFAULT_CODE_CHUNK_OVERLAP: usize = 100;
/// Paragraph break, the preferred split point for prose.
pub const DEFAULT_PROSE_SEPARATOR: &str = "\n\n";

const TYPESCRIPT_DELIMITERS: &[&str] = &[
    r"\n(?:export\s+)?(?:default\s+)?(?:declare\s+)?(?:abstract\s+)?(?:enum|interface|namespace|type|class)\s",
    r"\n(?:export\s+)?(?:default\s+)?(?:async\s+)?function\b",
    r"\n(?:export\s+)?(?:const|let|var)\s",
    r"\n[ \t]*(?:if|for|while|switch|case|default|try)\b",
    r"\n\n",
    r"\n",
    r" ",
];

const RUST_DELIMITERS: &[&str] = &[
    r"\n(?:pub(?:\([^)\n]*\))?\s+)?(?:unsafe\s+)?(?:struct|enum|trait|impl|mod|union)\b",
    r"\n[ \t]*(?:pub(?:\([^)\n]*\))?\s+)?(?:const\s+|async\s+|unsafe\s+)*fn\s",
    r"\n(?:pub(?:\([^)\n]*\))?\s+)?(?:const|static|type|use)\s",
    r"\n[ \t]*(?:if|for|while|loop|match)\b",
    r"\n\n",
    r"\n",
    r" ",
];

const PYTHON_DELIMITERS: &[&str] = &[
    r"\nclass\s",
    r"\n[ \t]*(?:async\s+)?def\s",
    r"\n[ \t]*(?:if|for|while|try|with)\b",
    r"\n\n",
    r"\n",
    r" ",
];

const GO_DELIMITERS: &[&str] = &[
    r"\nfunc\s",
    r"\n(?:var|const|type)\s",
    r"\n[ \t]*(?:if|for|switch|case|select)\b",
    r"\n\n",
    r"\n",
    r" ",
];

const MARKDOWN_DELIMITERS: &[&str] = &[
    r"\n#{1,6}[ \t]",
    r"\n```",
    r"\n\n",
    r"\n",
    r" ",
];

/// Errors raised while configuring a [`TextSplitter`].
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SplitError {
    #[error("chunk size must be greater than zero")]
    ZeroChunkSize,

    #[error("chunk overlap ({overlap}) must be smaller than chunk size ({size})")]
    OverlapTooLarge { size: usize, overlap: usize },

    #[error("prose separator must not be empty")]
    EmptySeparator,

    #[error("invalid delimiter pattern {pattern:?}: {message}")]
    InvalidDelimiter { pattern: String, message: String },
}

/// Source languages with syntax-aware split points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    TypeScript,
    JavaScript,
    Rust,
    Python,
    Go,
    Markdown,
}

impl Language {
    /// Guess the language from a file extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("ts") | Some("tsx") | Some("mts") | Some("cts") => Some(Self::TypeScript),
            Some("js") | Some("jsx") | Some("mjs") | Some("cjs") => Some(Self::JavaScript),
            Some("rs") => Some(Self::Rust),
            Some("py") => Some(Self::Python),
            Some("go") => Some(Self::Go),
            Some("md") | Some("markdown") | Some("mdx") => Some(Self::Markdown),
            _ => None,
        }
    }

    /// Parse a language from its lowercase name or a common short form.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "ts" | "typescript" => Some(Self::TypeScript),
            "js" | "javascript" => Some(Self::JavaScript),
            "rs" | "rust" => Some(Self::Rust),
            "py" | "python" => Some(Self::Python),
            "go" | "golang" => Some(Self::Go),
            "md" | "markdown" => Some(Self::Markdown),
            _ => None,
        }
    }

    /// Ordered delimiter patterns, coarsest first.
    pub fn separators(&self) -> &'static [&'static str] {
        match self {
            // The JS grammar is a subset of what the TS patterns look for.
            Self::TypeScript | Self::JavaScript => TYPESCRIPT_DELIMITERS,
            Self::Rust => RUST_DELIMITERS,
            Self::Python => PYTHON_DELIMITERS,
            Self::Go => GO_DELIMITERS,
            Self::Markdown => MARKDOWN_DELIMITERS,
        }
    }
}

/// How a document is broken into segments before merging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SplitMode {
    /// Split at a literal separator, then cut oversized pieces by character.
    Prose { separator: String },
    /// Split recursively at syntax boundaries of the given language.
    Code(Language),
}

/// Size limits and mode for a [`TextSplitter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitterConfig {
    /// Maximum number of characters in one chunk.
    pub chunk_size: usize,
    /// Number of trailing characters of a chunk repeated at the start of the next.
    pub chunk_overlap: usize,
    pub mode: SplitMode,
}

impl SplitterConfig {
    pub fn prose(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            chunk_size,
            chunk_overlap,
            mode: SplitMode::Prose {
                separator: DEFAULT_PROSE_SEPARATOR.to_string(),
            },
        }
    }

    pub fn code(language: Language, chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            chunk_size,
            chunk_overlap,
            mode: SplitMode::Code(language),
        }
    }

    /// Code mode for programming languages, prose mode for Markdown and
    /// anything unrecognised.
    pub fn for_language(
        language: Option<Language>,
        chunk_size: usize,
        chunk_overlap: usize,
    ) -> Self {
        match language {
            Some(Language::Markdown) | None => Self::prose(chunk_size, chunk_overlap),
            Some(language) => Self::code(language, chunk_size, chunk_overlap),
        }
    }

    /// Replace the prose separator. Has no effect in code mode.
    pub fn with_separator(mut self, separator: impl Into<String>) -> Self {
        if let SplitMode::Prose { .. } = self.mode {
            self.mode = SplitMode::Prose {
                separator: separator.into(),
            };
        }
        self
    }
}

impl Default for SplitterConfig {
    fn default() -> Self {
        Self::prose(DEFAULT_PROSE_CHUNK_SIZE, DEFAULT_PROSE_CHUNK_OVERLAP)
    }
}

/// One bounded piece of a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Identifier of the document this chunk came from.
    pub source_path: String,
    /// Position of this chunk within its document (0-indexed).
    pub sequence_index: usize,
    /// Byte offset of `text` within the document.
    pub start: usize,
    /// Byte length of the leading part of `text` repeated from the previous chunk.
    pub overlap: usize,
    /// Chunk content, overlap included.
    pub text: String,
}

impl Chunk {
    /// The part of the chunk that no earlier chunk contains.
    pub fn fresh_text(&self) -> &str {
        &self.text[self.overlap..]
    }

    /// Byte offset one past the end of this chunk within its document.
    pub fn end(&self) -> usize {
        self.start + self.text.len()
    }
}

/// Splits documents into chunks according to a [`SplitterConfig`].
#[derive(Debug, Clone)]
pub struct TextSplitter {
    delimiters: Vec<Regex>,
    chunk_size: usize,
    chunk_overlap: usize,
}

impl TextSplitter {
    /// Validate the configuration and compile its delimiters.
    pub fn new(config: SplitterConfig) -> Result<Self, SplitError> {
        if config.chunk_size == 0 {
            return Err(SplitError::ZeroChunkSize);
        }
        if config.chunk_overlap >= config.chunk_size {
            return Err(SplitError::OverlapTooLarge {
                size: config.chunk_size,
                overlap: config.chunk_overlap,
            });
        }

        let patterns: Vec<String> = match &config.mode {
            SplitMode::Prose { separator } => {
                if separator.is_empty() {
                    return Err(SplitError::EmptySeparator);
                }
                vec![regex::escape(separator)]
            }
            SplitMode::Code(language) => language
                .separators()
                .iter()
                .map(|p| p.to_string())
                .collect(),
        };

        Self::with_patterns(&patterns, config.chunk_size, config.chunk_overlap)
    }

    /// Build a splitter from raw delimiter patterns, coarsest first.
    pub fn with_patterns<S: AsRef<str>>(
        patterns: &[S],
        chunk_size: usize,
        chunk_overlap: usize,
    ) -> Result<Self, SplitError> {
        if chunk_size == 0 {
            return Err(SplitError::ZeroChunkSize);
        }
        if chunk_overlap >= chunk_size {
            return Err(SplitError::OverlapTooLarge {
                size: chunk_size,
                overlap: chunk_overlap,
            });
        }

        let delimiters = patterns
            .iter()
            .map(|pattern| {
                Regex::new(pattern.as_ref()).map_err(|e| SplitError::InvalidDelimiter {
                    pattern: pattern.as_ref().to_string(),
                    message: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            delimiters,
            chunk_size,
            chunk_overlap,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Split `text` into chunks attributed to `source_path`.
    ///
    /// An empty document yields no chunks. A document of at most
    /// `chunk_size` characters yields exactly one chunk without overlap.
    pub fn split(&self, source_path: &str, text: &str) -> Vec<Chunk> {
        let mut segments: VecDeque<Segment> = self
            .split_recursively_into_segments(text, 0, 0, self.chunk_size, Fallback::Characters)
            .into();

        let mut chunks: Vec<Chunk> = Vec::new();
        let mut chunk_start = 0;
        let mut chunk_end = 0;
        let mut overlap = 0;
        let mut used = 0;

        while let Some(segment) = segments.pop_front() {
            let segment_chars = char_len(&text[segment.range.clone()]);

            if used + segment_chars <= self.chunk_size {
                chunk_end = segment.range.end;
                used += segment_chars;
                continue;
            }

            if chunk_end > chunk_start + overlap {
                chunks.push(Chunk {
                    source_path: source_path.to_string(),
                    sequence_index: chunks.len(),
                    start: chunk_start,
                    overlap,
                    text: text[chunk_start..chunk_end].to_string(),
                });

                // Seed the next chunk with the tail of the one just emitted.
                let carry = self.chunk_overlap.min(used);
                chunk_start = retreat_chars(text, chunk_end, carry);
                overlap = chunk_end - chunk_start;
                used = carry;
                segments.push_front(segment);
            } else {
                // Only overlap so far and the segment does not fit after it.
                // Break it at the next finer delimiter into pieces that fit the
                // remaining room. `used <= chunk_overlap < chunk_size`, so the
                // room is at least one character and the first piece always fits.
                let room = self.chunk_size - used;
                let pieces = self.split_recursively_into_segments(
                    &text[segment.range.clone()],
                    segment.depth,
                    segment.range.start,
                    room,
                    Fallback::Whitespace,
                );
                for piece in pieces.into_iter().rev() {
                    segments.push_front(piece);
                }
            }
        }

        if chunk_end > chunk_start + overlap {
            chunks.push(Chunk {
                source_path: source_path.to_string(),
                sequence_index: chunks.len(),
                start: chunk_start,
                overlap,
                text: text[chunk_start..chunk_end].to_string(),
            });
        }

        chunks
    }

    // Returns contiguous segments covering `text`, each at most `limit`
    // characters long.
    fn split_recursively_into_segments(
        &self,
        text: &str,
        delimiter_idx: usize,
        current_offset: usize,
        limit: usize,
        fallback: Fallback,
    ) -> Vec<Segment> {
        let mut result_segments: Vec<Segment> = Vec::new();

        if text.is_empty() {
            return result_segments;
        }

        if char_len(text) <= limit {
            result_segments.push(Segment {
                range: current_offset..current_offset + text.len(),
                depth: delimiter_idx,
            });
            return result_segments;
        }

        let Some(delimiter) = self.delimiters.get(delimiter_idx) else {
            let mut local_start = 0;
            while local_start < text.len() {
                let local_end = fallback.cut(text, local_start, limit);
                result_segments.push(Segment {
                    range: current_offset + local_start..current_offset + local_end,
                    depth: self.delimiters.len(),
                });
                local_start = local_end;
            }
            return result_segments;
        };

        let mut piece_start = 0;
        for mat in delimiter.find_iter(text) {
            if mat.start() == mat.end() || mat.start() <= piece_start {
                continue;
            }
            result_segments.extend(self.split_recursively_into_segments(
                &text[piece_start..mat.start()],
                delimiter_idx + 1,
                current_offset + piece_start,
                limit,
                fallback,
            ));
            piece_start = mat.start();
        }

        result_segments.extend(self.split_recursively_into_segments(
            &text[piece_start..],
            delimiter_idx + 1,
            current_offset + piece_start,
            limit,
            fallback,
        ));

        result_segments
    }
}

/// A contiguous byte range of the document awaiting merge.
#[derive(Debug, Clone)]
struct Segment {
    range: Range<usize>,
    /// First delimiter to try if the segment has to be broken up further.
    depth: usize,
}

/// How a piece is cut once the delimiters are exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fallback {
    /// Exactly `limit` characters per piece.
    Characters,
    /// At the last space or newline within `limit` characters, if any.
    Whitespace,
}

impl Fallback {
    // Byte index of the end of the piece starting at `from`.
    fn cut(self, text: &str, from: usize, limit: usize) -> usize {
        let window_end = advance_chars(text, from, limit);
        if self == Fallback::Characters || window_end == text.len() {
            return window_end;
        }
        match text[from..window_end].rfind([' ', '\n']) {
            Some(i) if i > 0 => from + i,
            _ => window_end,
        }
    }
}

/// Create a splitter suited to `path`: code mode for known programming
/// languages, prose mode for everything else.
pub fn splitter_for_path(
    path: &Path,
    chunk_size: usize,
    chunk_overlap: usize,
) -> Result<TextSplitter, SplitError> {
    TextSplitter::new(SplitterConfig::for_language(
        Language::from_path(path),
        chunk_size,
        chunk_overlap,
    ))
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

// Byte index `count` characters after `from`, clamped to the end of `text`.
fn advance_chars(text: &str, from: usize, count: usize) -> usize {
    text[from..]
        .char_indices()
        .nth(count)
        .map(|(i, _)| from + i)
        .unwrap_or(text.len())
}

// Byte index `count` characters before `to`, clamped to the start of `text`.
fn retreat_chars(text: &str, to: usize, count: usize) -> usize {
    if count == 0 {
        return to;
    }
    text[..to]
        .char_indices()
        .rev()
        .nth(count - 1)
        .map(|(i, _)| i)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reconstruct(chunks: &[Chunk]) -> String {
        chunks.iter().map(|c| c.fresh_text()).collect()
    }

    fn sample_documents() -> Vec<String> {
        vec![
            String::new(),
            "short".to_string(),
            " ".repeat(250),
            (0..200).map(|_| "This is a test sentence. ").collect(),
            (0..40)
                .map(|i| format!("Paragraph {i} has a few words in it.\n\n"))
                .collect(),
            "x".repeat(1234),
            "naïve café — ünïcödé テキスト 🚀 ".repeat(30),
            "\n\n\n\n\n\n".repeat(50),
            include_str!("text.rs").to_string(),
        ]
    }

    #[test]
    fn test_overlap_must_be_smaller_than_size() {
        let err = TextSplitter::new(SplitterConfig::prose(100, 100)).unwrap_err();
        assert_eq!(
            err,
            SplitError::OverlapTooLarge {
                size: 100,
                overlap: 100
            }
        );
        assert!(TextSplitter::new(SplitterConfig::prose(100, 250)).is_err());
        assert_eq!(
            TextSplitter::new(SplitterConfig::prose(0, 0)).unwrap_err(),
            SplitError::ZeroChunkSize
        );
        assert_eq!(
            TextSplitter::new(SplitterConfig::prose(10, 1).with_separator("")).unwrap_err(),
            SplitError::EmptySeparator
        );
    }

    #[test]
    fn test_invalid_delimiter_is_reported() {
        let err = TextSplitter::with_patterns(&["(unclosed"], 10, 2).unwrap_err();
        assert!(matches!(err, SplitError::InvalidDelimiter { .. }));
    }

    #[test]
    fn test_empty_document_has_no_chunks() {
        let splitter = TextSplitter::new(SplitterConfig::prose(100, 10)).unwrap();
        assert!(splitter.split("empty.md", "").is_empty());
    }

    #[test]
    fn test_small_document_is_single_chunk_without_overlap() {
        let splitter = TextSplitter::new(SplitterConfig::prose(100, 10)).unwrap();
        let chunks = splitter.split("small.md", "A small document.\n\nTwo paragraphs.");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].overlap, 0);
        assert_eq!(chunks[0].start, 0);
        assert_eq!(chunks[0].text, "A small document.\n\nTwo paragraphs.");
        assert_eq!(chunks[0].source_path, "small.md");
    }

    #[test]
    fn test_reconstruction_and_size_bounds() {
        let configs = vec![
            SplitterConfig::prose(50, 10),
            SplitterConfig::prose(300, 0),
            SplitterConfig::prose(3000, 300),
            SplitterConfig::code(Language::TypeScript, 200, 20),
            SplitterConfig::code(Language::Rust, 120, 119),
            SplitterConfig::code(Language::Markdown, 64, 8),
            SplitterConfig::prose(1, 0),
        ];

        for config in configs {
            let splitter = TextSplitter::new(config.clone()).unwrap();
            for document in sample_documents() {
                let chunks = splitter.split("doc", &document);
                assert_eq!(reconstruct(&chunks), document, "config {config:?}");
                for (i, chunk) in chunks.iter().enumerate() {
                    assert_eq!(chunk.sequence_index, i);
                    assert!(
                        chunk.text.chars().count() <= config.chunk_size,
                        "chunk {i} has {} chars with {config:?}",
                        chunk.text.chars().count()
                    );
                    assert_eq!(&document[chunk.start..chunk.end()], chunk.text);
                    assert!(!chunk.fresh_text().is_empty());
                }
            }
        }
    }

    #[test]
    fn test_consecutive_chunks_share_overlap() {
        let splitter = TextSplitter::new(SplitterConfig::prose(120, 30)).unwrap();
        let document: String = (0..60)
            .map(|i| format!("Sentence number {i} goes here. "))
            .collect();
        let chunks = splitter.split("long.md", &document);
        assert!(chunks.len() > 2);

        for pair in chunks.windows(2) {
            let (prev, next) = (&pair[0], &pair[1]);
            let shared = &next.text[..next.overlap];
            assert_eq!(shared.chars().count(), 30);
            assert!(prev.text.ends_with(shared));
            assert_eq!(next.start + next.overlap, prev.end());
        }
    }

    #[test]
    fn test_prose_prefers_paragraph_boundaries() {
        let splitter = TextSplitter::new(SplitterConfig::prose(60, 0)).unwrap();
        let document = "alpha alpha alpha alpha alpha\n\nbeta beta beta beta beta\n\ngamma gamma gamma gamma";
        let chunks = splitter.split("p.md", document);
        assert_eq!(chunks.len(), 2);
        assert_eq!(
            chunks[0].text,
            "alpha alpha alpha alpha alpha\n\nbeta beta beta beta beta"
        );
        assert_eq!(chunks[1].text, "\n\ngamma gamma gamma gamma");
    }

    #[test]
    fn test_oversized_paragraph_is_cut_by_character() {
        let splitter = TextSplitter::new(SplitterConfig::prose(10, 0)).unwrap();
        let chunks = splitter.split("p.md", "abcdefghijklmnopqrstuvwxyz");
        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["abcdefghij", "klmnopqrst", "uvwxyz"]);
    }

    #[test]
    fn test_code_mode_splits_at_function_boundaries() {
        let source = r#"import { Hono } from "hono";

export function first(a: number): number {
  return a + 1;
}

export function second(b: number): number {
  return b * 2;
}

export class Proxy {
  handle() {
    return "ok";
  }
}
"#;
        let splitter =
            TextSplitter::new(SplitterConfig::code(Language::TypeScript, 90, 0)).unwrap();
        let chunks = splitter.split("src/index.ts", source);
        assert_eq!(reconstruct(&chunks), source);
        assert!(chunks.len() >= 3);

        // Declarations never get separated from their keyword.
        for chunk in &chunks[1..] {
            let trimmed = chunk.text.trim_start();
            assert!(
                trimmed.starts_with("export function") || trimmed.starts_with("export class"),
                "unexpected chunk start: {:?}",
                chunk.text
            );
        }
    }

    // Every chunk ends at the document end or right before whitespace.
    fn assert_ends_on_boundaries(document: &str, chunks: &[Chunk]) {
        for chunk in chunks {
            let rest = &document[chunk.end()..];
            assert!(
                rest.is_empty() || rest.starts_with([' ', '\n']),
                "chunk {} ends mid-word: {:?}",
                chunk.sequence_index,
                chunk.text
            );
        }
    }

    #[test]
    fn test_overlapped_chunk_breaks_between_words() {
        let splitter = TextSplitter::new(SplitterConfig::prose(50, 10)).unwrap();
        let document = "alpha beta gamma delta epsilon zeta eta theta\n\nbravo charlie delta echoes foxtrot golfing hotel";
        let chunks = splitter.split("p.md", document);

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].text, "alpha beta gamma delta epsilon zeta eta theta");
        assert_eq!(
            chunks[1].text,
            " eta theta\n\nbravo charlie delta echoes foxtrot"
        );
        assert_eq!(chunks[2].text, "es foxtrot golfing hotel");
        assert_eq!(chunks[2].fresh_text(), " golfing hotel");
        assert_ends_on_boundaries(document, &chunks);
    }

    #[test]
    fn test_overlapped_prose_keeps_word_boundaries() {
        let splitter = TextSplitter::new(SplitterConfig::prose(300, 30)).unwrap();
        let document = (0..12)
            .map(|i| "lorem ipsum dolor sit amet ".repeat(6 + i % 5).trim_end().to_string())
            .collect::<Vec<_>>()
            .join("\n\n");
        let chunks = splitter.split("long.md", &document);

        assert!(chunks.len() > 5);
        assert_eq!(reconstruct(&chunks), document);
        for chunk in &chunks {
            assert!(chunk.text.chars().count() <= 300);
        }
        assert_ends_on_boundaries(&document, &chunks);
    }

    #[test]
    fn test_overlapped_code_keeps_function_boundaries() {
        let source: String = (0..8)
            .map(|i| {
                format!(
                    "export function step{i}(input: number): number {{\n  const scaled = input * {};\n  return scaled + {i};\n}}\n\n",
                    i + 2
                )
            })
            .collect();
        let splitter =
            TextSplitter::new(SplitterConfig::code(Language::TypeScript, 120, 12)).unwrap();
        let chunks = splitter.split("src/steps.ts", &source);

        assert_eq!(chunks.len(), 8);
        assert_eq!(reconstruct(&chunks), source);
        assert_ends_on_boundaries(&source, &chunks);
        for (i, chunk) in chunks.iter().enumerate().skip(1) {
            assert_eq!(chunk.overlap, 12);
            assert!(
                chunk
                    .fresh_text()
                    .trim_start()
                    .starts_with(&format!("export function step{i}(")),
                "unexpected fresh text: {:?}",
                chunk.fresh_text()
            );
        }
    }

    #[test]
    fn test_multibyte_text_never_splits_inside_a_character() {
        let splitter = TextSplitter::new(SplitterConfig::prose(7, 3)).unwrap();
        let document = "日本語のテキストを分割します🚀🚀🚀";
        let chunks = splitter.split("jp.md", document);
        assert_eq!(reconstruct(&chunks), document);
        for chunk in &chunks {
            assert!(chunk.text.chars().count() <= 7);
        }
    }

    #[test]
    fn test_language_detection() {
        assert_eq!(
            Language::from_path(Path::new("src/index.ts")),
            Some(Language::TypeScript)
        );
        assert_eq!(
            Language::from_path(Path::new("lib.rs")),
            Some(Language::Rust)
        );
        assert_eq!(
            Language::from_path(Path::new("README.md")),
            Some(Language::Markdown)
        );
        assert_eq!(Language::from_path(Path::new("notes.txt")), None);
        assert_eq!(Language::from_name("TS"), Some(Language::TypeScript));
        assert_eq!(Language::from_name("cobol"), None);
    }

    #[test]
    fn test_splitter_for_path_chooses_mode() {
        let code = splitter_for_path(Path::new("a.py"), 100, 10).unwrap();
        assert_eq!(code.delimiters.len(), PYTHON_DELIMITERS.len());
        let prose = splitter_for_path(Path::new("a.md"), 100, 10).unwrap();
        assert_eq!(prose.delimiters.len(), 1);
    }

    #[test]
    fn test_markdown_is_split_as_prose() {
        assert_eq!(
            SplitterConfig::for_language(Some(Language::Markdown), 100, 10),
            SplitterConfig::prose(100, 10)
        );
        assert_eq!(
            SplitterConfig::for_language(None, 100, 10),
            SplitterConfig::prose(100, 10)
        );
        assert_eq!(
            SplitterConfig::for_language(Some(Language::Go), 100, 10).mode,
            SplitMode::Code(Language::Go)
        );
    }
}
