//! Flat cosine-similarity index persisted inside the database directory.
//!
//! The index keeps every chunk record in memory and scans all of them per
//! query. That is exact (no recall loss) and fast enough for the
//! collection sizes TomeDB targets (tens of thousands of chunks). State is
//! persisted as two JSON files inside the database directory, which is the
//! unit the persistence coordinator snapshots to remote storage:
//!
//! - `index.json` holds the embedding vectors keyed by chunk id.
//! - `documents.json` holds chunk content and metadata.
//!
//! Load joins the two by chunk id and tolerates absent files (empty
//! store). A chunk present in only one file is dropped with a warning.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use tomedb_core::{CoreError, CoreResult, DocumentId};

use crate::types::{ChunkMetadata, ChunkRecord, QueryMatch};

/// File holding the embedding vectors.
pub const INDEX_FILE: &str = "index.json";

/// File holding chunk content and metadata.
pub const DOCUMENTS_FILE: &str = "documents.json";

/// Format version written to both files.
const FORMAT_VERSION: &str = "1.0";

#[derive(Debug, Serialize, Deserialize)]
struct IndexFile {
    version: String,
    #[serde(default)]
    dimension: Option<usize>,
    updated_at: DateTime<Utc>,
    vectors: Vec<VectorRow>,
}

#[derive(Debug, Serialize, Deserialize)]
struct VectorRow {
    id: DocumentId,
    embedding: Vec<f32>,
}

#[derive(Debug, Serialize, Deserialize)]
struct DocumentsFile {
    version: String,
    documents: Vec<DocumentRow>,
}

#[derive(Debug, Serialize, Deserialize)]
struct DocumentRow {
    id: DocumentId,
    document_id: DocumentId,
    content: String,
    metadata: ChunkMetadata,
    inserted_at: DateTime<Utc>,
}

#[derive(Default)]
struct IndexState {
    records: Vec<ChunkRecord>,
}

/// Exact nearest-neighbour index over the local database directory.
///
/// Time complexity: O(n·d) per search where n = number of chunks,
/// d = embedding dimension. Space complexity: O(n·d).
///
/// # Example
///
/// ```no_run
/// use tomedb_core::DocumentId;
/// use tomedb_vector::engine::FlatIndex;
/// use tomedb_vector::types::{ChunkMetadata, ChunkRecord};
///
/// # #[tokio::main]
/// # async fn main() -> tomedb_core::CoreResult<()> {
/// let index = FlatIndex::open("/var/lib/tomedb/db").await?;
///
/// let record = ChunkRecord::new(
///     DocumentId::new(),
///     "hello world",
///     vec![0.1, 0.2, 0.3],
///     ChunkMetadata::new("notes.md", 0),
/// );
/// index.insert(vec![record]).await?;
///
/// let matches = index.search(&[0.1, 0.2, 0.3], 3, 0.0)?;
/// assert_eq!(matches.len(), 1);
/// # Ok(())
/// # }
/// ```
pub struct FlatIndex {
    /// Directory the index persists into.
    db_dir: PathBuf,

    /// In-memory chunk records.
    state: RwLock<IndexState>,

    /// Serializes flushes so both files always come from one snapshot.
    flush_lock: tokio::sync::Mutex<()>,
}

impl FlatIndex {
    /// Opens the index over `db_dir`, creating the directory when absent
    /// and loading any previously persisted state.
    pub async fn open(db_dir: impl AsRef<Path>) -> CoreResult<Self> {
        let db_dir = db_dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&db_dir).await?;

        let records = load_records(&db_dir).await?;
        debug!(
            db_dir = %db_dir.display(),
            chunks = records.len(),
            "Opened flat index"
        );

        Ok(Self {
            db_dir,
            state: RwLock::new(IndexState { records }),
            flush_lock: tokio::sync::Mutex::new(()),
        })
    }

    /// Inserts a batch of chunk records and persists the updated state.
    ///
    /// All embeddings in the batch must share the dimension of the chunks
    /// already stored. An empty batch is a no-op.
    pub async fn insert(&self, records: Vec<ChunkRecord>) -> CoreResult<()> {
        if records.is_empty() {
            return Ok(());
        }

        {
            let mut state = self.state.write();
            let mut expected = state.records.first().map(|r| r.embedding.len());
            for record in &records {
                if record.embedding.is_empty() {
                    return Err(CoreError::ValidationError(
                        "embedding must not be empty".to_string(),
                    ));
                }
                match expected {
                    Some(dim) if record.embedding.len() != dim => {
                        return Err(CoreError::ValidationError(format!(
                            "embedding dimension mismatch: expected {}, got {}",
                            dim,
                            record.embedding.len()
                        )));
                    }
                    Some(_) => {}
                    None => expected = Some(record.embedding.len()),
                }
            }
            state.records.extend(records);
        }

        self.flush().await
    }

    /// Scores every stored chunk against `query`, drops scores below
    /// `min_score`, and returns the `top_k` best matches, most similar
    /// first.
    pub fn search(&self, query: &[f32], top_k: usize, min_score: f32) -> CoreResult<Vec<QueryMatch>> {
        let state = self.state.read();

        if let Some(dim) = state.records.first().map(|r| r.embedding.len()) {
            if query.len() != dim {
                return Err(CoreError::ValidationError(format!(
                    "query dimension mismatch: expected {}, got {}",
                    dim,
                    query.len()
                )));
            }
        }

        let mut matches: Vec<QueryMatch> = state
            .records
            .iter()
            .filter_map(|record| {
                let score = cosine_similarity(query, &record.embedding);
                (score >= min_score).then(|| QueryMatch {
                    id: record.id,
                    content: record.content.clone(),
                    score,
                    metadata: record.metadata.clone(),
                })
            })
            .collect();

        // Higher cosine similarity is more similar
        matches.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        matches.truncate(top_k);
        Ok(matches)
    }

    /// Returns the number of stored chunks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.read().records.len()
    }

    /// Returns `true` when no chunks are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.read().records.is_empty()
    }

    /// Returns the number of distinct ingested documents.
    #[must_use]
    pub fn document_count(&self) -> usize {
        let state = self.state.read();
        state
            .records
            .iter()
            .map(|r| r.document_id)
            .collect::<std::collections::HashSet<_>>()
            .len()
    }

    /// Returns the embedding dimension, or `None` while the index is empty.
    #[must_use]
    pub fn dimension(&self) -> Option<usize> {
        self.state
            .read()
            .records
            .first()
            .map(|r| r.embedding.len())
    }

    /// Returns the directory the index persists into.
    #[must_use]
    pub fn db_dir(&self) -> &Path {
        &self.db_dir
    }

    /// Persists both index files.
    ///
    /// Later snapshots always include earlier inserts, so whichever flush
    /// runs last leaves a complete pair on disk.
    async fn flush(&self) -> CoreResult<()> {
        let _guard = self.flush_lock.lock().await;

        // Serialize under the lock, write after it is released
        let (index_json, documents_json) = {
            let state = self.state.read();
            let index = IndexFile {
                version: FORMAT_VERSION.to_string(),
                dimension: state.records.first().map(|r| r.embedding.len()),
                updated_at: Utc::now(),
                vectors: state
                    .records
                    .iter()
                    .map(|r| VectorRow {
                        id: r.id,
                        embedding: r.embedding.clone(),
                    })
                    .collect(),
            };
            let documents = DocumentsFile {
                version: FORMAT_VERSION.to_string(),
                documents: state
                    .records
                    .iter()
                    .map(|r| DocumentRow {
                        id: r.id,
                        document_id: r.document_id,
                        content: r.content.clone(),
                        metadata: r.metadata.clone(),
                        inserted_at: r.inserted_at,
                    })
                    .collect(),
            };
            (
                serde_json::to_vec_pretty(&index)?,
                serde_json::to_vec_pretty(&documents)?,
            )
        };

        tokio::fs::write(self.db_dir.join(INDEX_FILE), index_json).await?;
        tokio::fs::write(self.db_dir.join(DOCUMENTS_FILE), documents_json).await?;
        Ok(())
    }
}

async fn load_records(db_dir: &Path) -> CoreResult<Vec<ChunkRecord>> {
    let index: Option<IndexFile> = read_json(&db_dir.join(INDEX_FILE)).await?;
    let documents: Option<DocumentsFile> = read_json(&db_dir.join(DOCUMENTS_FILE)).await?;

    let (Some(index), Some(documents)) = (index, documents) else {
        return Ok(Vec::new());
    };

    let mut vectors: HashMap<DocumentId, Vec<f32>> = index
        .vectors
        .into_iter()
        .map(|row| (row.id, row.embedding))
        .collect();

    let mut records = Vec::with_capacity(documents.documents.len());
    for row in documents.documents {
        let Some(embedding) = vectors.remove(&row.id) else {
            warn!(chunk_id = %row.id, "Chunk has no stored vector, dropping");
            continue;
        };
        records.push(ChunkRecord {
            id: row.id,
            document_id: row.document_id,
            content: row.content,
            embedding,
            metadata: row.metadata,
            inserted_at: row.inserted_at,
        });
    }

    if !vectors.is_empty() {
        warn!(
            orphaned = vectors.len(),
            "Vectors without a matching chunk record were dropped"
        );
    }

    Ok(records)
}

async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> CoreResult<Option<T>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err.into()),
    }
}

/// Cosine similarity between two vectors.
///
/// Returns 0.0 when either vector has zero magnitude, which keeps such
/// chunks below any positive score threshold without poisoning the sort
/// with NaN.
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    let magnitude = norm_a.sqrt() * norm_b.sqrt();
    if magnitude == 0.0 {
        0.0
    } else {
        dot / magnitude
    }
}
