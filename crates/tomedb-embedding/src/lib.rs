//! Embedding generation for TomeDB.
//!
//! Defines the `EmbeddingProvider` trait plus two implementations: a client
//! for OpenAI-compatible embeddings APIs and a deterministic mock for tests.

mod mock;
mod openai;
mod provider;
mod types;

pub use mock::MockEmbeddingProvider;
pub use openai::{OpenAiConfig, OpenAiEmbeddingProvider};
pub use provider::EmbeddingProvider;
pub use types::{
    BatchEmbeddingRequest, BatchEmbeddingResponse, EmbeddingError, EmbeddingResult, ModelInfo,
    Usage,
};
