//! Document chunking, vector search, and the store facade for TomeDB.
//!
//! The crate exposes three layers:
//!
//! - [`chunking`] splits raw document text into chunks sized for the
//!   embedding model.
//! - [`engine`] is the exact cosine-similarity index persisted inside the
//!   database directory.
//! - [`store`] ties chunking, an [`tomedb_embedding::EmbeddingProvider`],
//!   the index, and interval backups into the surface the API serves.

pub mod chunking;
pub mod engine;
pub mod store;
pub mod types;

pub use chunking::{chunk_text, ChunkConfig};
pub use engine::FlatIndex;
pub use store::{AddReport, VectorStore};
pub use types::{ChunkMetadata, ChunkRecord, QueryMatch};
