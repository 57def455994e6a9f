
pub mod http;

use anyhow::{Result, ensure};
use tracing::debug;

pub use http::EmbeddingClient;

/// Upper bound on texts per provider call, matching provider payload limits.
pub const MAX_BATCH_SIZE: usize = 100;

/// A provider that turns a bounded batch of texts into fixed-dimension
/// vectors, one per input, in input order.
pub trait EmbeddingProvider: Send + Sync {
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Embed an ordered sequence of texts in bounded batches.
///
/// Calls the provider once per group of at most `batch_size` texts and
/// concatenates the results in input order. Fails atomically: if any group
/// fails, the whole operation fails and no partial vectors are returned.
/// Batches run sequentially to bound provider load.
#[inline]
pub fn embed_in_batches(
    provider: &dyn EmbeddingProvider,
    texts: &[String],
    batch_size: usize,
) -> Result<Vec<Vec<f32>>> {
    ensure!(batch_size > 0, "batch size must be positive");

    if texts.is_empty() {
        return Ok(Vec::new());
    }

    let mut vectors = Vec::with_capacity(texts.len());

    for (group, batch) in texts.chunks(batch_size).enumerate() {
        debug!(
            "Embedding batch {} ({} texts)",
            group + 1,
            batch.len()
        );

        let batch_vectors = provider.embed(batch)?;
        ensure!(
            batch_vectors.len() == batch.len(),
            "embedding provider returned {} vectors for {} texts",
            batch_vectors.len(),
            batch.len()
        );
        vectors.extend(batch_vectors);
    }

    debug!("Generated {} embeddings total", vectors.len());
    Ok(vectors)
}
