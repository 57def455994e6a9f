// LanceDB vector database module
// Handles vector storage and similarity search for chunk embeddings

pub mod vector_store;

pub use vector_store::VectorStore;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::retrieval::ChunkMatch;

/// Embedding record stored in LanceDB
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    /// Unique identifier for this embedding
    pub id: String,
    /// The chunk's embedding vector
    pub vector: Vec<f32>,
    /// ID of the chunk row in the SQLite database
    pub chunk_id: String,
    /// ID of the document this chunk belongs to
    pub document_id: String,
    /// Page the chunk was extracted from
    pub page_number: u32,
    /// The chunk text, stored alongside the vector so retrieval needs no
    /// second lookup
    pub content: String,
    /// Position of the chunk within the document
    pub chunk_index: u32,
    /// Timestamp when this embedding was created
    pub created_at: String,
}

/// Vector storage and similarity search over chunk embeddings.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Insert a batch of embedding records.
    async fn insert_batch(&self, records: Vec<EmbeddingRecord>) -> Result<()>;

    /// Find the chunks of one document most similar to a query vector,
    /// best match first. Matches below `threshold` are dropped.
    async fn search(
        &self,
        query: &[f32],
        document_id: &str,
        threshold: f32,
        limit: usize,
    ) -> Result<Vec<ChunkMatch>>;

    /// Count stored embeddings for one document.
    async fn count_for_document(&self, document_id: &str) -> Result<usize>;
}
