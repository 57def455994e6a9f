use super::models::*;
use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use crate::chunker::DocumentChunk;

const DOCUMENT_COLUMNS: &str = "id, title, file_name, file_size, bucket, storage_path, \
     page_count, processing_status, error_message, created_date";

pub struct DocumentQueries;

impl DocumentQueries {
    /// Insert a new document in the `processing` state.
    #[inline]
    pub async fn create(pool: &SqlitePool, new_document: NewDocument) -> Result<Document> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().naive_utc();

        sqlx::query(
            "INSERT INTO documents (id, title, file_name, file_size, bucket, storage_path, \
             page_count, processing_status, created_date) \
             VALUES (?, ?, ?, ?, ?, ?, ?, 'processing', ?)",
        )
        .bind(&id)
        .bind(&new_document.title)
        .bind(&new_document.file_name)
        .bind(new_document.file_size)
        .bind(&new_document.bucket)
        .bind(&new_document.storage_path)
        .bind(new_document.page_count)
        .bind(now)
        .execute(pool)
        .await
        .context("Failed to create document")?;

        Self::get_by_id(pool, &id)
            .await?
            .ok_or_else(|| anyhow!("Failed to retrieve created document"))
    }

    #[inline]
    pub async fn get_by_id(pool: &SqlitePool, id: &str) -> Result<Option<Document>> {
        sqlx::query_as::<_, Document>(&format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get document by id")
    }

    #[inline]
    pub async fn get_by_storage_path(
        pool: &SqlitePool,
        bucket: &str,
        storage_path: &str,
    ) -> Result<Option<Document>> {
        sqlx::query_as::<_, Document>(&format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE bucket = ? AND storage_path = ?"
        ))
        .bind(bucket)
        .bind(storage_path)
        .fetch_optional(pool)
        .await
        .context("Failed to get document by storage path")
    }

    #[inline]
    pub async fn list_all(pool: &SqlitePool) -> Result<Vec<Document>> {
        sqlx::query_as::<_, Document>(&format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents ORDER BY created_date DESC, rowid DESC"
        ))
        .fetch_all(pool)
        .await
        .context("Failed to list documents")
    }

    #[inline]
    pub async fn set_page_count(pool: &SqlitePool, id: &str, page_count: i64) -> Result<()> {
        sqlx::query("UPDATE documents SET page_count = ? WHERE id = ?")
            .bind(page_count)
            .bind(id)
            .execute(pool)
            .await
            .context("Failed to set document page count")?;
        Ok(())
    }

    /// Transition a document from `processing` to `complete`.
    ///
    /// Guarded in SQL so a document already in a terminal state stays
    /// there; returns whether the transition happened.
    #[inline]
    pub async fn mark_complete(pool: &SqlitePool, id: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE documents SET processing_status = 'complete', error_message = NULL \
             WHERE id = ? AND processing_status = 'processing'",
        )
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to mark document complete")?;

        debug!("Marked document {id} complete: {}", result.rows_affected() > 0);
        Ok(result.rows_affected() > 0)
    }

    /// Transition a document from `processing` to `failed`, recording the
    /// error. Returns whether the transition happened.
    #[inline]
    pub async fn mark_failed(pool: &SqlitePool, id: &str, error_message: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE documents SET processing_status = 'failed', error_message = ? \
             WHERE id = ? AND processing_status = 'processing'",
        )
        .bind(error_message)
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to mark document failed")?;

        Ok(result.rows_affected() > 0)
    }
}

pub struct DocumentChunkQueries;

impl DocumentChunkQueries {
    /// Insert a document's chunks in one transaction, preserving chunk
    /// order. Returns the generated chunk ids, index-aligned with the
    /// input.
    #[inline]
    pub async fn insert_batch(
        pool: &SqlitePool,
        document_id: &str,
        chunks: &[DocumentChunk],
    ) -> Result<Vec<String>> {
        let now = Utc::now().naive_utc();
        let mut tx = pool
            .begin()
            .await
            .context("Failed to begin chunk insert transaction")?;

        let mut ids = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            let id = Uuid::new_v4().to_string();
            sqlx::query(
                "INSERT INTO document_chunks (id, document_id, content, page_number, \
                 chunk_index, char_start, char_end, created_date) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&id)
            .bind(document_id)
            .bind(&chunk.content)
            .bind(i64::from(chunk.page_number))
            .bind(chunk.chunk_index as i64)
            .bind(chunk.char_start as i64)
            .bind(chunk.char_end as i64)
            .bind(now)
            .execute(&mut *tx)
            .await
            .context("Failed to insert document chunk")?;
            ids.push(id);
        }

        tx.commit()
            .await
            .context("Failed to commit chunk insert transaction")?;

        debug!("Inserted {} chunks for document {document_id}", ids.len());
        Ok(ids)
    }

    #[inline]
    pub async fn list_for_document(
        pool: &SqlitePool,
        document_id: &str,
    ) -> Result<Vec<DocumentChunkRecord>> {
        sqlx::query_as::<_, DocumentChunkRecord>(
            "SELECT id, document_id, content, page_number, chunk_index, char_start, char_end, \
             created_date FROM document_chunks WHERE document_id = ? ORDER BY chunk_index",
        )
        .bind(document_id)
        .fetch_all(pool)
        .await
        .context("Failed to list document chunks")
    }

    #[inline]
    pub async fn count_for_document(pool: &SqlitePool, document_id: &str) -> Result<i64> {
        sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM document_chunks WHERE document_id = ?",
        )
        .bind(document_id)
        .fetch_one(pool)
        .await
        .context("Failed to count document chunks")
    }
}

pub struct ChatSessionQueries;

impl ChatSessionQueries {
    #[inline]
    pub async fn create(pool: &SqlitePool, document_id: &str, title: &str) -> Result<ChatSession> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().naive_utc();

        sqlx::query(
            "INSERT INTO chat_sessions (id, document_id, title, created_date) VALUES (?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(document_id)
        .bind(title)
        .bind(now)
        .execute(pool)
        .await
        .context("Failed to create chat session")?;

        Self::get_by_id(pool, &id)
            .await?
            .ok_or_else(|| anyhow!("Failed to retrieve created chat session"))
    }

    #[inline]
    pub async fn get_by_id(pool: &SqlitePool, id: &str) -> Result<Option<ChatSession>> {
        sqlx::query_as::<_, ChatSession>(
            "SELECT id, document_id, title, created_date FROM chat_sessions WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get chat session by id")
    }

    #[inline]
    pub async fn list_for_document(
        pool: &SqlitePool,
        document_id: &str,
    ) -> Result<Vec<ChatSession>> {
        sqlx::query_as::<_, ChatSession>(
            "SELECT id, document_id, title, created_date FROM chat_sessions \
             WHERE document_id = ? ORDER BY created_date DESC, rowid DESC",
        )
        .bind(document_id)
        .fetch_all(pool)
        .await
        .context("Failed to list chat sessions")
    }
}

pub struct ChatMessageQueries;

impl ChatMessageQueries {
    /// Append a message to a session. Messages are never updated or
    /// deleted.
    #[inline]
    pub async fn insert(pool: &SqlitePool, new_message: NewChatMessage) -> Result<ChatMessage> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().naive_utc();
        let citations = serde_json::to_string(&new_message.citations)
            .context("Failed to encode message citations")?;

        sqlx::query(
            "INSERT INTO chat_messages (id, session_id, role, content, citations, created_date) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(&new_message.session_id)
        .bind(new_message.role)
        .bind(&new_message.content)
        .bind(&citations)
        .bind(now)
        .execute(pool)
        .await
        .context("Failed to insert chat message")?;

        Self::get_by_id(pool, &id)
            .await?
            .ok_or_else(|| anyhow!("Failed to retrieve created chat message"))
    }

    #[inline]
    pub async fn get_by_id(pool: &SqlitePool, id: &str) -> Result<Option<ChatMessage>> {
        sqlx::query_as::<_, ChatMessage>(
            "SELECT id, session_id, role, content, citations, created_date \
             FROM chat_messages WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get chat message by id")
    }

    /// Messages in insertion order; the rowid tiebreak keeps ordering
    /// stable when timestamps collide.
    #[inline]
    pub async fn list_for_session(pool: &SqlitePool, session_id: &str) -> Result<Vec<ChatMessage>> {
        sqlx::query_as::<_, ChatMessage>(
            "SELECT id, session_id, role, content, citations, created_date \
             FROM chat_messages WHERE session_id = ? ORDER BY created_date, rowid",
        )
        .bind(session_id)
        .fetch_all(pool)
        .await
        .context("Failed to list chat messages")
    }
}
