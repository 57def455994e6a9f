
use anyhow::{Context, Result, anyhow, ensure};
use arrow::array::{
    Array, FixedSizeListArray, Float32Array, RecordBatchIterator, StringArray, UInt32Array,
};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{Connection, DistanceType};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use super::{EmbeddingRecord, VectorIndex};
use crate::retrieval::ChunkMatch;

const TABLE_NAME: &str = "embeddings";

/// Chunk embedding store backed by LanceDB.
///
/// The table is created lazily on the first insert, taking its vector
/// dimension from the inserted records. Searches use cosine distance so
/// that `1 - distance` is the cosine similarity the retrieval threshold
/// is defined against.
pub struct VectorStore {
    connection: Connection,
}

impl VectorStore {
    #[inline]
    pub async fn new(db_path: &Path) -> Result<Self> {
        debug!("Initializing LanceDB at path: {:?}", db_path);

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .context("Failed to create vector database directory")?;
        }

        let uri = format!("file://{}", db_path.display());
        let connection = lancedb::connect(&uri)
            .execute()
            .await
            .map_err(|e| anyhow!("Failed to connect to LanceDB: {e}"))?;

        Ok(Self { connection })
    }

    async fn table_exists(&self) -> Result<bool> {
        let names = self
            .connection
            .table_names()
            .execute()
            .await
            .map_err(|e| anyhow!("Failed to list tables: {e}"))?;
        Ok(names.contains(&TABLE_NAME.to_string()))
    }

    fn schema(vector_dim: usize) -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new(
                "vector",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, false)),
                    vector_dim as i32,
                ),
                false,
            ),
            Field::new("chunk_id", DataType::Utf8, false),
            Field::new("document_id", DataType::Utf8, false),
            Field::new("page_number", DataType::UInt32, false),
            Field::new("content", DataType::Utf8, false),
            Field::new("chunk_index", DataType::UInt32, false),
            Field::new("created_at", DataType::Utf8, false),
        ]))
    }

    fn record_batch(records: &[EmbeddingRecord], vector_dim: usize) -> Result<RecordBatch> {
        let len = records.len();

        let mut ids = Vec::with_capacity(len);
        let mut chunk_ids = Vec::with_capacity(len);
        let mut document_ids = Vec::with_capacity(len);
        let mut page_numbers = Vec::with_capacity(len);
        let mut contents = Vec::with_capacity(len);
        let mut chunk_indices = Vec::with_capacity(len);
        let mut created_ats = Vec::with_capacity(len);
        let mut flat_values = Vec::with_capacity(len * vector_dim);

        for record in records {
            ensure!(
                record.vector.len() == vector_dim,
                "Inconsistent vector dimensions in batch: expected {vector_dim}, got {}",
                record.vector.len()
            );
            ids.push(record.id.as_str());
            chunk_ids.push(record.chunk_id.as_str());
            document_ids.push(record.document_id.as_str());
            page_numbers.push(record.page_number);
            contents.push(record.content.as_str());
            chunk_indices.push(record.chunk_index);
            created_ats.push(record.created_at.as_str());
            flat_values.extend_from_slice(&record.vector);
        }

        let values = Float32Array::from(flat_values);
        let item_field = Arc::new(Field::new("item", DataType::Float32, false));
        let vector_array =
            FixedSizeListArray::try_new(item_field, vector_dim as i32, Arc::new(values), None)
                .context("Failed to create vector array")?;

        let arrays: Vec<Arc<dyn Array>> = vec![
            Arc::new(StringArray::from(ids)),
            Arc::new(vector_array),
            Arc::new(StringArray::from(chunk_ids)),
            Arc::new(StringArray::from(document_ids)),
            Arc::new(UInt32Array::from(page_numbers)),
            Arc::new(StringArray::from(contents)),
            Arc::new(UInt32Array::from(chunk_indices)),
            Arc::new(StringArray::from(created_ats)),
        ];

        RecordBatch::try_new(Self::schema(vector_dim), arrays)
            .context("Failed to create record batch")
    }

    fn parse_matches(batch: &RecordBatch, threshold: f32) -> Result<Vec<ChunkMatch>> {
        let chunk_ids = string_column(batch, "chunk_id")?;
        let page_numbers = u32_column(batch, "page_number")?;
        let contents = string_column(batch, "content")?;

        let distances = batch
            .column_by_name("_distance")
            .and_then(|col| col.as_any().downcast_ref::<Float32Array>());

        let mut matches = Vec::new();
        for row in 0..batch.num_rows() {
            let distance = distances
                .map_or(0.0, |d| if d.is_null(row) { 0.0 } else { d.value(row) });
            let similarity = 1.0 - distance;
            if similarity < threshold {
                continue;
            }

            matches.push(ChunkMatch {
                chunk_id: chunk_ids.value(row).to_string(),
                page_number: page_numbers.value(row),
                content: contents.value(row).to_string(),
                similarity,
            });
        }
        Ok(matches)
    }
}

#[async_trait]
impl VectorIndex for VectorStore {
    async fn insert_batch(&self, records: Vec<EmbeddingRecord>) -> Result<()> {
        if records.is_empty() {
            debug!("No embeddings to store");
            return Ok(());
        }

        let vector_dim = records[0].vector.len();
        ensure!(vector_dim > 0, "Embedding vectors must not be empty");

        let batch = Self::record_batch(&records, vector_dim)?;
        let schema = batch.schema();
        let reader = RecordBatchIterator::new(std::iter::once(Ok(batch)), schema);

        if self.table_exists().await? {
            let table = self
                .connection
                .open_table(TABLE_NAME)
                .execute()
                .await
                .map_err(|e| anyhow!("Failed to open embeddings table: {e}"))?;
            table
                .add(reader)
                .execute()
                .await
                .map_err(|e| anyhow!("Failed to insert embeddings: {e}"))?;
        } else {
            info!("Creating embeddings table with {vector_dim} dimensions");
            self.connection
                .create_table(TABLE_NAME, reader)
                .execute()
                .await
                .map_err(|e| anyhow!("Failed to create embeddings table: {e}"))?;
        }

        debug!("Stored {} embeddings", records.len());
        Ok(())
    }

    async fn search(
        &self,
        query: &[f32],
        document_id: &str,
        threshold: f32,
        limit: usize,
    ) -> Result<Vec<ChunkMatch>> {
        if !self.table_exists().await? {
            return Ok(Vec::new());
        }

        let table = self
            .connection
            .open_table(TABLE_NAME)
            .execute()
            .await
            .map_err(|e| anyhow!("Failed to open embeddings table: {e}"))?;

        let mut stream = table
            .vector_search(query)
            .map_err(|e| anyhow!("Failed to create vector search: {e}"))?
            .column("vector")
            .distance_type(DistanceType::Cosine)
            .only_if(document_filter(document_id))
            .limit(limit)
            .execute()
            .await
            .map_err(|e| anyhow!("Failed to execute vector search: {e}"))?;

        let mut matches = Vec::new();
        while let Some(batch) = stream
            .try_next()
            .await
            .map_err(|e| anyhow!("Failed to read search results: {e}"))?
        {
            matches.extend(Self::parse_matches(&batch, threshold)?);
        }

        debug!(
            "Vector search returned {} matches above threshold {}",
            matches.len(),
            threshold
        );
        Ok(matches)
    }

    async fn count_for_document(&self, document_id: &str) -> Result<usize> {
        if !self.table_exists().await? {
            return Ok(0);
        }

        let table = self
            .connection
            .open_table(TABLE_NAME)
            .execute()
            .await
            .map_err(|e| anyhow!("Failed to open embeddings table: {e}"))?;

        let count = table
            .count_rows(Some(document_filter(document_id)))
            .await
            .map_err(|e| anyhow!("Failed to count embeddings: {e}"))?;

        Ok(count)
    }
}

/// Filter expression scoping a query to one document. The id is escaped
/// as an SQL string literal, so ids are not restricted to UUIDs.
fn document_filter(document_id: &str) -> String {
    format!("document_id = '{}'", document_id.replace('\'', "''"))
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .ok_or_else(|| anyhow!("Missing {name} column"))?
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| anyhow!("Invalid {name} column type"))
}

fn u32_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a UInt32Array> {
    batch
        .column_by_name(name)
        .ok_or_else(|| anyhow!("Missing {name} column"))?
        .as_any()
        .downcast_ref::<UInt32Array>()
        .ok_or_else(|| anyhow!("Invalid {name} column type"))
}
