use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use tracing::{debug, info};

use crate::chunker::DocumentChunk;
use crate::database::sqlite::models::{
    ChatMessage, ChatSession, Document, DocumentChunkRecord, NewChatMessage, NewDocument,
};
use crate::database::sqlite::queries::{
    ChatMessageQueries, ChatSessionQueries, DocumentChunkQueries, DocumentQueries,
};


pub mod models;
pub mod queries;

pub type DbPool = Pool<Sqlite>;

#[derive(Debug, Clone)]
pub struct Database {
    pool: DbPool,
}

impl Database {
    #[inline]
    pub async fn new<P: AsRef<Path>>(database_url: P) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(database_url)
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(10)
            .connect_with(options)
            .await
            .context("Failed to create database connection pool")?;

        let database = Self { pool };
        database.run_migrations().await?;

        Ok(database)
    }

    #[inline]
    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    #[inline]
    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations");

        sqlx::migrate!("src/database/sqlite/migrations")
            .run(&self.pool)
            .await
            .context("Failed to run schema migration")?;

        debug!("Database migrations completed successfully");
        Ok(())
    }

    // Document operations
    #[inline]
    pub async fn create_document(&self, new_document: NewDocument) -> Result<Document> {
        DocumentQueries::create(&self.pool, new_document).await
    }

    #[inline]
    pub async fn get_document(&self, id: &str) -> Result<Option<Document>> {
        DocumentQueries::get_by_id(&self.pool, id).await
    }

    #[inline]
    pub async fn get_document_by_storage_path(
        &self,
        bucket: &str,
        storage_path: &str,
    ) -> Result<Option<Document>> {
        DocumentQueries::get_by_storage_path(&self.pool, bucket, storage_path).await
    }

    #[inline]
    pub async fn list_documents(&self) -> Result<Vec<Document>> {
        DocumentQueries::list_all(&self.pool).await
    }

    #[inline]
    pub async fn set_document_page_count(&self, id: &str, page_count: i64) -> Result<()> {
        DocumentQueries::set_page_count(&self.pool, id, page_count).await
    }

    #[inline]
    pub async fn mark_document_complete(&self, id: &str) -> Result<bool> {
        DocumentQueries::mark_complete(&self.pool, id).await
    }

    #[inline]
    pub async fn mark_document_failed(&self, id: &str, error_message: &str) -> Result<bool> {
        DocumentQueries::mark_failed(&self.pool, id, error_message).await
    }

    // Chunk operations
    #[inline]
    pub async fn insert_chunks(
        &self,
        document_id: &str,
        chunks: &[DocumentChunk],
    ) -> Result<Vec<String>> {
        DocumentChunkQueries::insert_batch(&self.pool, document_id, chunks).await
    }

    #[inline]
    pub async fn chunks_for_document(&self, document_id: &str) -> Result<Vec<DocumentChunkRecord>> {
        DocumentChunkQueries::list_for_document(&self.pool, document_id).await
    }

    #[inline]
    pub async fn count_chunks(&self, document_id: &str) -> Result<i64> {
        DocumentChunkQueries::count_for_document(&self.pool, document_id).await
    }

    // Chat session operations
    #[inline]
    pub async fn create_session(&self, document_id: &str, title: &str) -> Result<ChatSession> {
        ChatSessionQueries::create(&self.pool, document_id, title).await
    }

    #[inline]
    pub async fn get_session(&self, id: &str) -> Result<Option<ChatSession>> {
        ChatSessionQueries::get_by_id(&self.pool, id).await
    }

    #[inline]
    pub async fn sessions_for_document(&self, document_id: &str) -> Result<Vec<ChatSession>> {
        ChatSessionQueries::list_for_document(&self.pool, document_id).await
    }

    // Chat message operations
    #[inline]
    pub async fn insert_message(&self, new_message: NewChatMessage) -> Result<ChatMessage> {
        ChatMessageQueries::insert(&self.pool, new_message).await
    }

    #[inline]
    pub async fn messages_for_session(&self, session_id: &str) -> Result<Vec<ChatMessage>> {
        ChatMessageQueries::list_for_session(&self.pool, session_id).await
    }
}
