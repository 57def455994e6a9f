
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use crate::Result;
use crate::database::lancedb::VectorIndex;

/// Minimum cosine similarity for a chunk to count as relevant.
pub const MATCH_THRESHOLD: f32 = 0.7;
/// Maximum number of chunks retrieved per question.
pub const MATCH_COUNT: usize = 5;
/// Citation snippets are truncated to this many characters.
pub const SNIPPET_LENGTH: usize = 100;

/// Answer returned when no chunk clears the similarity threshold.
pub const NO_CONTEXT_FALLBACK: &str = "I couldn't find relevant information in the document to answer your question. Please try rephrasing your question or ask about different topics covered in the document.";

/// A stored chunk matched against a query vector.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkMatch {
    pub chunk_id: String,
    pub page_number: u32,
    pub content: String,
    pub similarity: f32,
}

/// Provenance record attached to an answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    pub page: u32,
    pub content: String,
    pub similarity: f32,
}

/// Prompt context and citations assembled from retrieved chunks.
#[derive(Debug, Clone, PartialEq)]
pub struct AssembledContext {
    pub context: String,
    pub citations: Vec<Citation>,
}

/// Similarity search over a document's stored chunk vectors.
pub struct RetrievalEngine {
    index: Arc<dyn VectorIndex>,
    threshold: f32,
    top_k: usize,
}

impl RetrievalEngine {
    #[inline]
    pub fn new(index: Arc<dyn VectorIndex>) -> Self {
        Self {
            index,
            threshold: MATCH_THRESHOLD,
            top_k: MATCH_COUNT,
        }
    }

    #[inline]
    #[must_use]
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    /// Retrieve the best-matching chunks of one document, most similar
    /// first. Chunks below the threshold never appear, even when fewer
    /// than `top_k` clear it.
    #[inline]
    pub async fn retrieve(&self, query_vector: &[f32], document_id: &str) -> Result<Vec<ChunkMatch>> {
        let matches = self
            .index
            .search(query_vector, document_id, self.threshold, self.top_k)
            .await?;

        debug!(
            "Retrieved {} chunks above threshold {} for document {}",
            matches.len(),
            self.threshold,
            document_id
        );

        Ok(matches)
    }
}

/// Build the prompt context and citation list from retrieved chunks.
///
/// Chunk order is preserved. The context tags every chunk with its page
/// number so the model can cite pages; citations carry a truncated
/// snippet rather than the full chunk.
#[inline]
pub fn assemble_context(matches: &[ChunkMatch]) -> AssembledContext {
    let context = matches
        .iter()
        .map(|chunk| format!("[Page {}] {}", chunk.page_number, chunk.content))
        .collect::<Vec<_>>()
        .join("\n\n");

    let citations = matches
        .iter()
        .map(|chunk| Citation {
            page: chunk.page_number,
            content: snippet(&chunk.content),
            similarity: chunk.similarity,
        })
        .collect();

    AssembledContext { context, citations }
}

fn snippet(content: &str) -> String {
    let mut text: String = content.chars().take(SNIPPET_LENGTH).collect();
    text.push_str("...");
    text
}
