//! Document chunking for ragdex.
//!
//! See [`text`] for the splitting strategy and its guarantees.

pub mod text;

pub use text::{
    Chunk, Language, SplitError, SplitMode, SplitterConfig, TextSplitter, splitter_for_path,
};
