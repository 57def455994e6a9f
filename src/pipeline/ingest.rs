use chrono::Utc;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::chunker::{self, ChunkerConfig};
use crate::database::Database;
use crate::database::lancedb::{EmbeddingRecord, VectorIndex};
use crate::database::sqlite::models::{Document, NewDocument};
use crate::embeddings::{EmbeddingProvider, embed_in_batches};
use crate::extraction::TextExtractor;
use crate::pipeline::run_blocking;
use crate::storage::BlobStore;
use crate::{RagError, Result};

/// Document ingestion pipeline: download, extract, chunk, embed, store.
///
/// A document enters `processing` once its content is downloaded and
/// leaves it exactly once, to `complete` or to `failed` with the error
/// recorded on the row.
pub struct IngestPipeline {
    database: Database,
    index: Arc<dyn VectorIndex>,
    store: Arc<dyn BlobStore>,
    extractor: Arc<dyn TextExtractor>,
    embedder: Arc<dyn EmbeddingProvider>,
    chunker_config: ChunkerConfig,
    batch_size: usize,
}

impl IngestPipeline {
    #[inline]
    pub fn new(
        database: Database,
        index: Arc<dyn VectorIndex>,
        store: Arc<dyn BlobStore>,
        extractor: Arc<dyn TextExtractor>,
        embedder: Arc<dyn EmbeddingProvider>,
        chunker_config: ChunkerConfig,
        batch_size: usize,
    ) -> Self {
        Self {
            database,
            index,
            store,
            extractor,
            embedder,
            chunker_config,
            batch_size,
        }
    }

    /// Ingest one document from the blob store.
    ///
    /// Ingesting the same `(bucket, storage_path)` twice is rejected
    /// before any work happens.
    #[inline]
    pub async fn ingest(
        &self,
        bucket: &str,
        storage_path: &str,
        title: Option<&str>,
    ) -> Result<Document> {
        if let Some(existing) = self
            .database
            .get_document_by_storage_path(bucket, storage_path)
            .await
            .map_err(|e| RagError::Persistence(e.to_string()))?
        {
            return Err(RagError::Duplicate(format!(
                "{bucket}/{storage_path} (document {})",
                existing.id
            )));
        }

        let content = {
            let store = Arc::clone(&self.store);
            let bucket = bucket.to_string();
            let path = storage_path.to_string();
            run_blocking(move || store.download(&bucket, &path))
                .await
                .map_err(|e| RagError::Download(e.to_string()))?
        };

        let file_name = file_name_of(storage_path);
        let title = title.map_or_else(|| title_of(storage_path), ToString::to_string);

        let document = self
            .database
            .create_document(NewDocument {
                title,
                file_name: file_name.clone(),
                file_size: content.len() as i64,
                bucket: bucket.to_string(),
                storage_path: storage_path.to_string(),
                page_count: 0,
            })
            .await
            .map_err(|e| RagError::Persistence(e.to_string()))?;

        info!(
            "Processing document {} ({}, {} bytes)",
            document.id,
            file_name,
            content.len()
        );

        match self.process(&document.id, content, &file_name).await {
            Ok(()) => {
                let completed = self
                    .database
                    .get_document(&document.id)
                    .await
                    .map_err(|e| RagError::Persistence(e.to_string()))?
                    .ok_or_else(|| {
                        RagError::Persistence(format!("Document {} disappeared", document.id))
                    })?;
                info!("Document {} ingested successfully", completed.id);
                Ok(completed)
            }
            Err(error) => {
                // Compensating write. If it fails too, surface the
                // original error and log the new one.
                if let Err(mark_error) = self
                    .database
                    .mark_document_failed(&document.id, &error.to_string())
                    .await
                {
                    warn!(
                        "Failed to mark document {} as failed: {mark_error}",
                        document.id
                    );
                }
                Err(error)
            }
        }
    }

    async fn process(&self, document_id: &str, content: Vec<u8>, file_name: &str) -> Result<()> {
        let text = {
            let extractor = Arc::clone(&self.extractor);
            let file_name = file_name.to_string();
            run_blocking(move || extractor.extract(&content, &file_name))
                .await
                .map_err(|e| RagError::Extraction(e.to_string()))?
        };

        let page_count = chunker::estimate_page_count(&text)
            .map_err(|e| RagError::Extraction(e.to_string()))?;
        self.database
            .set_document_page_count(document_id, i64::from(page_count))
            .await
            .map_err(|e| RagError::Persistence(e.to_string()))?;

        let chunks = chunker::chunk(&text, Some(page_count), &self.chunker_config)
            .map_err(|e| RagError::Extraction(e.to_string()))?;
        info!(
            "Document {document_id}: {page_count} pages, {} chunks",
            chunks.len()
        );

        let chunk_ids = self
            .database
            .insert_chunks(document_id, &chunks)
            .await
            .map_err(|e| RagError::Persistence(e.to_string()))?;

        let vectors = {
            let embedder = Arc::clone(&self.embedder);
            let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
            let batch_size = self.batch_size;
            run_blocking(move || embed_in_batches(embedder.as_ref(), &texts, batch_size))
                .await
                .map_err(|e| RagError::Embedding(e.to_string()))?
        };

        let created_at = Utc::now().naive_utc().to_string();
        let records = chunks
            .iter()
            .zip(chunk_ids.iter())
            .zip(vectors)
            .map(|((chunk, chunk_id), vector)| EmbeddingRecord {
                id: Uuid::new_v4().to_string(),
                vector,
                chunk_id: chunk_id.clone(),
                document_id: document_id.to_string(),
                page_number: chunk.page_number,
                content: chunk.content.clone(),
                chunk_index: chunk.chunk_index as u32,
                created_at: created_at.clone(),
            })
            .collect();

        self.index
            .insert_batch(records)
            .await
            .map_err(|e| RagError::Persistence(e.to_string()))?;

        let completed = self
            .database
            .mark_document_complete(document_id)
            .await
            .map_err(|e| RagError::Persistence(e.to_string()))?;
        if !completed {
            warn!("Document {document_id} was no longer in the processing state");
        }

        Ok(())
    }
}

fn file_name_of(storage_path: &str) -> String {
    Path::new(storage_path)
        .file_name()
        .map_or_else(|| storage_path.to_string(), |name| name.to_string_lossy().into_owned())
}

fn title_of(storage_path: &str) -> String {
    Path::new(storage_path)
        .file_stem()
        .map_or_else(|| storage_path.to_string(), |stem| stem.to_string_lossy().into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_name_strips_directories() {
        assert_eq!(file_name_of("reports/2026/q3.pdf"), "q3.pdf");
        assert_eq!(file_name_of("q3.pdf"), "q3.pdf");
    }

    #[test]
    fn default_title_is_the_file_stem() {
        assert_eq!(title_of("reports/q3.pdf"), "q3");
        assert_eq!(title_of("summary.pdf"), "summary");
    }
}
