//! Chunk records stored by the engine and query result types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tomedb_core::DocumentId;

/// Provenance carried with every chunk and returned with query results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Source document filename.
    pub source: String,
    /// Zero-based position of the chunk within its document.
    pub part: usize,
    /// MIME type supplied at upload, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    /// Caller-supplied metadata, carried through verbatim.
    #[serde(default, flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ChunkMetadata {
    /// Creates metadata for chunk `part` of `source` with no extras.
    #[must_use]
    pub fn new(source: impl Into<String>, part: usize) -> Self {
        Self {
            source: source.into(),
            part,
            content_type: None,
            extra: serde_json::Map::new(),
        }
    }
}

/// One embedded chunk of an ingested document.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkRecord {
    /// Unique chunk identifier.
    pub id: DocumentId,
    /// Identifier of the upload that produced this chunk.
    pub document_id: DocumentId,
    /// Chunk text.
    pub content: String,
    /// Embedding vector.
    pub embedding: Vec<f32>,
    /// Provenance metadata.
    pub metadata: ChunkMetadata,
    /// When the chunk was inserted.
    pub inserted_at: DateTime<Utc>,
}

impl ChunkRecord {
    /// Creates a record with a fresh chunk id.
    #[must_use]
    pub fn new(
        document_id: DocumentId,
        content: impl Into<String>,
        embedding: Vec<f32>,
        metadata: ChunkMetadata,
    ) -> Self {
        Self {
            id: DocumentId::new(),
            document_id,
            content: content.into(),
            embedding,
            metadata,
            inserted_at: Utc::now(),
        }
    }
}

/// One scored result of a similarity search.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryMatch {
    /// Chunk identifier.
    pub id: DocumentId,
    /// Chunk text.
    pub content: String,
    /// Cosine similarity to the query, higher is closer.
    pub score: f32,
    /// Provenance metadata.
    pub metadata: ChunkMetadata,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_round_trips_extras_inline() {
        let json = serde_json::json!({
            "source": "report.pdf",
            "part": 2,
            "content_type": "application/pdf",
            "author": "jane",
            "year": 2024
        });

        let metadata: ChunkMetadata = serde_json::from_value(json.clone()).unwrap();
        assert_eq!(metadata.source, "report.pdf");
        assert_eq!(metadata.part, 2);
        assert_eq!(metadata.content_type.as_deref(), Some("application/pdf"));
        assert_eq!(metadata.extra["author"], "jane");
        assert_eq!(metadata.extra["year"], 2024);

        // Extras serialize back at the top level, not under a nested key
        let back = serde_json::to_value(&metadata).unwrap();
        assert_eq!(back, json);
    }

    #[test]
    fn test_metadata_content_type_omitted_when_absent() {
        let metadata = ChunkMetadata::new("notes.md", 0);
        let value = serde_json::to_value(&metadata).unwrap();
        assert!(value.get("content_type").is_none());
    }
}
