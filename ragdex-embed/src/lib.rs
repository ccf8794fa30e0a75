//! # ragdex-embed
//!
//! Embedding providers for the ragdex indexing pipeline. A provider turns a
//! piece of text into a fixed-length `f32` vector; the index builder and the
//! query service both talk to it through the [`EmbeddingProvider`] trait.
//!
//! ## Providers
//!
//! - [`OpenAiProvider`]: any server implementing the OpenAI `/embeddings`
//!   endpoint. Batches inputs and retries rate-limited requests.
//! - [`HashingProvider`]: deterministic feature hashing, no network. Used for
//!   offline builds and tests.
//!
//! ## Quick Start
//!
//! ```no_run
//! use ragdex_embed::{EmbedConfig, EmbeddingProvider, OpenAiProvider};
//!
//! # async fn example() -> Result<(), ragdex_embed::EmbedError> {
//! let config = EmbedConfig::new("sk-...", "text-embedding-ada-002");
//! let provider = OpenAiProvider::new(config)?;
//!
//! let texts = vec!["Hello world".to_string(), "How are you?".to_string()];
//! let result = provider.embed_texts(&texts).await?;
//!
//! println!("Generated {} embeddings of dimension {}",
//!          result.len(), result.dimension);
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! All operations return [`EmbedError`]. Use [`EmbedError::is_retriable`] to
//! tell transient provider trouble from input the provider will never accept.

pub mod config;
pub mod error;
pub mod hashing;
pub mod openai;
pub mod provider;

pub use config::{DEFAULT_BASE_URL, DEFAULT_MODEL, EmbedConfig, known_dimension};
pub use error::{EmbedError, Result};
pub use hashing::{DEFAULT_HASHING_DIMENSION, HashingProvider};
pub use openai::OpenAiProvider;
pub use provider::{EmbeddingProvider, EmbeddingResult};
