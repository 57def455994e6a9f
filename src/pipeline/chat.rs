use std::sync::Arc;
use tracing::{info, warn};

use crate::database::Database;
use crate::database::sqlite::models::{ChatSession, MessageRole, NewChatMessage};
use crate::embeddings::EmbeddingProvider;
use crate::generation::AnswerProvider;
use crate::pipeline::run_blocking;
use crate::retrieval::{Citation, NO_CONTEXT_FALLBACK, RetrievalEngine, assemble_context};
use crate::{RagError, Result};

/// Session titles are derived from the first question, truncated to this
/// many characters.
const SESSION_TITLE_LENGTH: usize = 50;

/// Answer returned when the generation provider fails; the citations
/// from retrieval are kept.
const GENERATION_FALLBACK: &str = "Sorry, I could not generate a response.";

/// An answered question: the assistant response plus where it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatReply {
    pub session_id: String,
    pub message_id: String,
    pub response: String,
    pub citations: Vec<Citation>,
}

/// Question answering pipeline over one ingested document.
pub struct ChatPipeline {
    database: Database,
    engine: RetrievalEngine,
    embedder: Arc<dyn EmbeddingProvider>,
    generator: Arc<dyn AnswerProvider>,
}

impl ChatPipeline {
    #[inline]
    pub fn new(
        database: Database,
        engine: RetrievalEngine,
        embedder: Arc<dyn EmbeddingProvider>,
        generator: Arc<dyn AnswerProvider>,
    ) -> Self {
        Self {
            database,
            engine,
            embedder,
            generator,
        }
    }

    /// Answer a question about a document, appending both the question and
    /// the answer to the chat session. A new session is created lazily when
    /// none is given, titled after the question.
    ///
    /// Retrieval finding nothing and the generation provider failing both
    /// produce fallback answers rather than errors; the conversation record
    /// stays intact either way.
    #[inline]
    pub async fn answer_question(
        &self,
        document_id: &str,
        message: &str,
        session_id: Option<&str>,
    ) -> Result<ChatReply> {
        let document = self
            .database
            .get_document(document_id)
            .await
            .map_err(|e| RagError::Persistence(e.to_string()))?
            .ok_or_else(|| RagError::Retrieval(format!("Document {document_id} not found")))?;

        if !document.is_complete() {
            return Err(RagError::Retrieval(format!(
                "Document {document_id} is not ready for questions (status: {})",
                document.processing_status
            )));
        }

        let session = self.resolve_session(document_id, message, session_id).await?;

        self.database
            .insert_message(NewChatMessage {
                session_id: session.id.clone(),
                role: MessageRole::User,
                content: message.to_string(),
                citations: Vec::new(),
            })
            .await
            .map_err(|e| RagError::Persistence(e.to_string()))?;

        let query_vector = {
            let embedder = Arc::clone(&self.embedder);
            let texts = vec![message.to_string()];
            let mut vectors = run_blocking(move || embedder.embed(&texts))
                .await
                .map_err(|e| RagError::Embedding(e.to_string()))?;
            if vectors.is_empty() {
                return Err(RagError::Embedding(
                    "provider returned no vector for the question".to_string(),
                ));
            }
            vectors.swap_remove(0)
        };

        let matches = self
            .engine
            .retrieve(&query_vector, document_id)
            .await
            .map_err(|e| RagError::Retrieval(e.to_string()))?;

        let (response, citations) = if matches.is_empty() {
            info!("No relevant chunks found for question in document {document_id}");
            (NO_CONTEXT_FALLBACK.to_string(), Vec::new())
        } else {
            let assembled = assemble_context(&matches);
            let response = {
                let generator = Arc::clone(&self.generator);
                let question = message.to_string();
                let context = assembled.context;
                run_blocking(move || generator.generate(&question, &context)).await
            };
            let response = match response {
                Ok(answer) => answer,
                Err(error) => {
                    // A failed generation still yields a reply; the
                    // retrieved citations are kept.
                    warn!("Answer generation failed: {error}");
                    GENERATION_FALLBACK.to_string()
                }
            };
            (response, assembled.citations)
        };

        let assistant_message = self
            .database
            .insert_message(NewChatMessage {
                session_id: session.id.clone(),
                role: MessageRole::Assistant,
                content: response.clone(),
                citations: citations.clone(),
            })
            .await
            .map_err(|e| RagError::Persistence(e.to_string()))?;

        Ok(ChatReply {
            session_id: session.id,
            message_id: assistant_message.id,
            response,
            citations,
        })
    }

    async fn resolve_session(
        &self,
        document_id: &str,
        message: &str,
        session_id: Option<&str>,
    ) -> Result<ChatSession> {
        match session_id {
            Some(id) => {
                let session = self
                    .database
                    .get_session(id)
                    .await
                    .map_err(|e| RagError::Persistence(e.to_string()))?
                    .ok_or_else(|| {
                        RagError::Persistence(format!("Chat session {id} not found"))
                    })?;
                if session.document_id != document_id {
                    return Err(RagError::Persistence(format!(
                        "Chat session {id} belongs to a different document"
                    )));
                }
                Ok(session)
            }
            None => {
                let title = session_title(message);
                self.database
                    .create_session(document_id, &title)
                    .await
                    .map_err(|e| RagError::Persistence(e.to_string()))
            }
        }
    }
}

fn session_title(message: &str) -> String {
    let mut title: String = message.chars().take(SESSION_TITLE_LENGTH).collect();
    if message.chars().count() > SESSION_TITLE_LENGTH {
        title.push_str("...");
    }
    title
}
