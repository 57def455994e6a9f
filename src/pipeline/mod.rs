// Pipeline module
// Orchestrates document ingestion and question answering over the
// storage, extraction, embedding, generation, and database layers

pub mod chat;
pub mod ingest;

pub use chat::{ChatPipeline, ChatReply};
pub use ingest::IngestPipeline;

use anyhow::anyhow;

/// Run a synchronous closure on the blocking pool. The HTTP clients and
/// the blob store are synchronous and must not run on the async runtime.
pub(crate) async fn run_blocking<T, F>(f: F) -> anyhow::Result<T>
where
    F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| anyhow!("Blocking task failed: {e}"))?
}
