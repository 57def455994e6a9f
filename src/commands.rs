use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use crate::config::{Config, get_config_dir};
use crate::database::Database;
use crate::database::lancedb::{VectorIndex, VectorStore};
use crate::embeddings::EmbeddingClient;
use crate::extraction::ParseClient;
use crate::generation::GenerationClient;
use crate::pipeline::{ChatPipeline, IngestPipeline};
use crate::retrieval::RetrievalEngine;
use crate::storage::{BlobStore, LocalBlobStore};

/// Show the current configuration, or write the default one when no
/// config file exists yet.
#[inline]
pub fn configure(show: bool) -> Result<()> {
    let config_dir = get_config_dir()?;
    let config = Config::load(&config_dir)?;

    if show || config.config_file_path().exists() {
        let rendered =
            toml::to_string_pretty(&config).context("Failed to render configuration")?;
        println!("Configuration ({})", config.config_file_path().display());
        println!("{rendered}");
        return Ok(());
    }

    config.save()?;
    println!(
        "Wrote default configuration to {}",
        config.config_file_path().display()
    );
    println!("Set your API keys there before ingesting documents.");
    Ok(())
}

/// Ingest a document from the blob store, optionally staging a local
/// file into it first.
#[inline]
pub async fn ingest_document(
    bucket: String,
    storage_path: String,
    title: Option<String>,
    file: Option<&Path>,
) -> Result<()> {
    let config = load_config()?;
    let store = LocalBlobStore::new(config.storage_path());

    if let Some(local_path) = file {
        let content = std::fs::read(local_path)
            .with_context(|| format!("Failed to read {}", local_path.display()))?;
        store.store(&bucket, &storage_path, &content)?;
        info!("Staged {} into {bucket}/{storage_path}", local_path.display());
    }

    let database = open_database(&config).await?;
    let index: Arc<dyn VectorIndex> =
        Arc::new(VectorStore::new(&config.vector_database_path()).await?);
    let extractor = Arc::new(ParseClient::new(&config.extraction)?);
    let embedder = Arc::new(EmbeddingClient::new(&config.embedding)?);

    let pipeline = IngestPipeline::new(
        database,
        index,
        Arc::new(store) as Arc<dyn BlobStore>,
        extractor,
        embedder,
        config.chunker.clone(),
        config.embedding.batch_size,
    );

    let document = pipeline.ingest(&bucket, &storage_path, title.as_deref()).await?;

    println!("Ingested: {} (ID: {})", document.title, document.id);
    println!("  Pages: {}", document.page_count);
    println!("  Status: {}", document.processing_status);
    Ok(())
}

/// Ask a question about an ingested document.
#[inline]
pub async fn ask_question(
    document_id: String,
    question: String,
    session_id: Option<String>,
) -> Result<()> {
    let config = load_config()?;
    let database = open_database(&config).await?;
    let index: Arc<dyn VectorIndex> =
        Arc::new(VectorStore::new(&config.vector_database_path()).await?);
    let embedder = Arc::new(EmbeddingClient::new(&config.embedding)?);
    let generator = Arc::new(GenerationClient::new(&config.generation)?);

    let pipeline = ChatPipeline::new(
        database,
        RetrievalEngine::new(index),
        embedder,
        generator,
    );

    let reply = pipeline
        .answer_question(&document_id, &question, session_id.as_deref())
        .await?;

    println!("{}", reply.response);
    if !reply.citations.is_empty() {
        println!();
        println!("Sources:");
        for citation in &reply.citations {
            println!("  [Page {}] {}", citation.page, citation.content);
        }
    }
    println!();
    println!("Session: {}", reply.session_id);
    Ok(())
}

/// List all ingested documents.
#[inline]
pub async fn list_documents() -> Result<()> {
    let config = load_config()?;
    let database = open_database(&config).await?;

    let documents = database.list_documents().await?;
    if documents.is_empty() {
        println!("No documents have been ingested yet.");
        println!("Use 'pdf-rag ingest <bucket> <path>' to ingest one.");
        return Ok(());
    }

    println!("Documents ({} total):", documents.len());
    println!();
    for document in &documents {
        println!("{} (ID: {})", document.title, document.id);
        println!("  File: {} ({} bytes)", document.file_name, document.file_size);
        println!("  Status: {}", document.processing_status);
        if let Some(error) = &document.error_message {
            println!("  Error: {error}");
        }
        println!();
    }
    Ok(())
}

/// Show detailed status for one document.
#[inline]
pub async fn show_status(document_id: String) -> Result<()> {
    let config = load_config()?;
    let database = open_database(&config).await?;

    let Some(document) = database.get_document(&document_id).await? else {
        println!("Document {document_id} not found.");
        return Ok(());
    };

    let chunk_count = database.count_chunks(&document.id).await?;
    let sessions = database.sessions_for_document(&document.id).await?;
    let index = VectorStore::new(&config.vector_database_path()).await?;
    let vector_count = index.count_for_document(&document.id).await?;

    println!("{} (ID: {})", document.title, document.id);
    println!("  Source: {}/{}", document.bucket, document.storage_path);
    println!("  Status: {}", document.processing_status);
    if let Some(error) = &document.error_message {
        println!("  Error: {error}");
    }
    println!("  Pages: {}", document.page_count);
    println!("  Chunks: {chunk_count} stored, {vector_count} indexed");
    println!("  Chat sessions: {}", sessions.len());
    Ok(())
}

fn load_config() -> Result<Config> {
    let config_dir = get_config_dir()?;
    Config::load(config_dir)
}

async fn open_database(config: &Config) -> Result<Database> {
    std::fs::create_dir_all(&config.base_dir).with_context(|| {
        format!("Failed to create data directory: {}", config.base_dir.display())
    })?;
    Database::new(config.database_path()).await
}
