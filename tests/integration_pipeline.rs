#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

/// End-to-end pipeline tests with fake providers and real storage
use anyhow::bail;
use std::sync::Arc;
use tempfile::TempDir;

use pdf_rag::RagError;
use pdf_rag::chunker::ChunkerConfig;
use pdf_rag::database::Database;
use pdf_rag::database::lancedb::{VectorIndex, VectorStore};
use pdf_rag::database::sqlite::models::{DocumentStatus, MessageRole};
use pdf_rag::embeddings::EmbeddingProvider;
use pdf_rag::extraction::TextExtractor;
use pdf_rag::generation::AnswerProvider;
use pdf_rag::pipeline::{ChatPipeline, IngestPipeline};
use pdf_rag::retrieval::{NO_CONTEXT_FALLBACK, RetrievalEngine};
use pdf_rag::storage::{BlobStore, LocalBlobStore};

const DOCUMENT_TEXT: &str = "--- page 1 ---\nThe total revenue is 42 million dollars.\n--- page 2 ---\nThe forecast for next year remains stable.";

struct FakeExtractor;

impl TextExtractor for FakeExtractor {
    fn extract(&self, _content: &[u8], _file_name: &str) -> anyhow::Result<String> {
        Ok(DOCUMENT_TEXT.to_string())
    }
}

struct FailingExtractor;

impl TextExtractor for FailingExtractor {
    fn extract(&self, _content: &[u8], _file_name: &str) -> anyhow::Result<String> {
        bail!("parsing service rejected the file")
    }
}

/// Deterministic embedder: questions about the moon point away from
/// everything else, so retrieval finds nothing for them.
struct FakeEmbedder;

impl EmbeddingProvider for FakeEmbedder {
    fn embed(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|text| {
                if text.contains("moon") {
                    vec![0.0, 1.0, 0.0]
                } else {
                    vec![1.0, 0.0, 0.0]
                }
            })
            .collect())
    }
}

struct FailingEmbedder;

impl EmbeddingProvider for FailingEmbedder {
    fn embed(&self, _texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        bail!("provider unavailable")
    }
}

struct FakeGenerator;

impl AnswerProvider for FakeGenerator {
    fn generate(&self, _question: &str, _context: &str) -> anyhow::Result<String> {
        Ok("The total is 42 million dollars (page 1).".to_string())
    }
}

struct FailingGenerator;

impl AnswerProvider for FailingGenerator {
    fn generate(&self, _question: &str, _context: &str) -> anyhow::Result<String> {
        bail!("model overloaded")
    }
}

struct TestEnv {
    _dir: TempDir,
    database: Database,
    index: Arc<VectorStore>,
    store: Arc<LocalBlobStore>,
}

async fn test_env() -> TestEnv {
    let dir = TempDir::new().expect("tempdir");
    let database = Database::new(dir.path().join("metadata.db"))
        .await
        .expect("database should initialize");
    let index = Arc::new(
        VectorStore::new(&dir.path().join("vectors"))
            .await
            .expect("vector store should initialize"),
    );
    let store = Arc::new(LocalBlobStore::new(dir.path().join("storage")));
    TestEnv {
        _dir: dir,
        database,
        index,
        store,
    }
}

fn ingest_pipeline(
    env: &TestEnv,
    extractor: Arc<dyn TextExtractor>,
    embedder: Arc<dyn EmbeddingProvider>,
) -> IngestPipeline {
    IngestPipeline::new(
        env.database.clone(),
        Arc::clone(&env.index) as Arc<dyn VectorIndex>,
        Arc::clone(&env.store) as Arc<dyn BlobStore>,
        extractor,
        embedder,
        ChunkerConfig::default(),
        100,
    )
}

fn chat_pipeline(env: &TestEnv, generator: Arc<dyn AnswerProvider>) -> ChatPipeline {
    ChatPipeline::new(
        env.database.clone(),
        RetrievalEngine::new(Arc::clone(&env.index) as Arc<dyn VectorIndex>),
        Arc::new(FakeEmbedder),
        generator,
    )
}

fn stage_document(env: &TestEnv) {
    env.store
        .store("documents", "reports/q3.pdf", b"%PDF-1.4 fake")
        .expect("staging should succeed");
}

async fn ingest_complete_document(env: &TestEnv) -> String {
    stage_document(env);
    let pipeline = ingest_pipeline(env, Arc::new(FakeExtractor), Arc::new(FakeEmbedder));
    let document = pipeline
        .ingest("documents", "reports/q3.pdf", Some("Q3 Report"))
        .await
        .expect("ingest should succeed");
    document.id
}

#[tokio::test]
async fn ingest_produces_a_complete_document() {
    let env = test_env().await;
    stage_document(&env);

    let pipeline = ingest_pipeline(&env, Arc::new(FakeExtractor), Arc::new(FakeEmbedder));
    let document = pipeline
        .ingest("documents", "reports/q3.pdf", Some("Q3 Report"))
        .await
        .expect("ingest should succeed");

    assert_eq!(document.processing_status, DocumentStatus::Complete);
    assert_eq!(document.title, "Q3 Report");
    assert_eq!(document.page_count, 2);
    assert!(document.error_message.is_none());

    let chunks = env
        .database
        .chunks_for_document(&document.id)
        .await
        .expect("chunks");
    assert_eq!(chunks.len(), 2);
    assert_eq!(chunks[0].page_number, 1);
    assert_eq!(chunks[1].page_number, 2);

    let vector_count = env
        .index
        .count_for_document(&document.id)
        .await
        .expect("count");
    assert_eq!(vector_count, 2);
}

#[tokio::test]
async fn repeated_ingest_of_the_same_blob_is_rejected() {
    let env = test_env().await;
    ingest_complete_document(&env).await;

    let pipeline = ingest_pipeline(&env, Arc::new(FakeExtractor), Arc::new(FakeEmbedder));
    let error = pipeline
        .ingest("documents", "reports/q3.pdf", None)
        .await
        .expect_err("second ingest should fail");

    assert!(matches!(error, RagError::Duplicate(_)));

    let documents = env.database.list_documents().await.expect("list");
    assert_eq!(documents.len(), 1);
}

#[tokio::test]
async fn missing_blob_is_a_download_error_without_a_row() {
    let env = test_env().await;

    let pipeline = ingest_pipeline(&env, Arc::new(FakeExtractor), Arc::new(FakeEmbedder));
    let error = pipeline
        .ingest("documents", "missing.pdf", None)
        .await
        .expect_err("ingest should fail");

    assert!(matches!(error, RagError::Download(_)));
    assert!(env.database.list_documents().await.expect("list").is_empty());
}

#[tokio::test]
async fn extraction_failure_marks_the_document_failed() {
    let env = test_env().await;
    stage_document(&env);

    let pipeline = ingest_pipeline(&env, Arc::new(FailingExtractor), Arc::new(FakeEmbedder));
    let error = pipeline
        .ingest("documents", "reports/q3.pdf", None)
        .await
        .expect_err("ingest should fail");

    assert!(matches!(error, RagError::Extraction(_)));

    let documents = env.database.list_documents().await.expect("list");
    assert_eq!(documents.len(), 1);
    assert_eq!(documents[0].processing_status, DocumentStatus::Failed);
    assert!(
        documents[0]
            .error_message
            .as_deref()
            .expect("error recorded")
            .contains("parsing service rejected the file")
    );
}

#[tokio::test]
async fn embedding_failure_marks_failed_and_stores_no_vectors() {
    let env = test_env().await;
    stage_document(&env);

    let pipeline = ingest_pipeline(&env, Arc::new(FakeExtractor), Arc::new(FailingEmbedder));
    let error = pipeline
        .ingest("documents", "reports/q3.pdf", None)
        .await
        .expect_err("ingest should fail");

    assert!(matches!(error, RagError::Embedding(_)));

    let documents = env.database.list_documents().await.expect("list");
    assert_eq!(documents[0].processing_status, DocumentStatus::Failed);

    let vector_count = env
        .index
        .count_for_document(&documents[0].id)
        .await
        .expect("count");
    assert_eq!(vector_count, 0);
}

#[tokio::test]
async fn asking_a_question_creates_a_session_and_cites_pages() {
    let env = test_env().await;
    let document_id = ingest_complete_document(&env).await;

    let pipeline = chat_pipeline(&env, Arc::new(FakeGenerator));
    let reply = pipeline
        .answer_question(&document_id, "What is the total revenue?", None)
        .await
        .expect("question should be answered");

    assert_eq!(reply.response, "The total is 42 million dollars (page 1).");
    assert!(!reply.citations.is_empty());
    assert!(reply.citations.iter().all(|c| c.content.ends_with("...")));

    let session = env
        .database
        .get_session(&reply.session_id)
        .await
        .expect("get session")
        .expect("session exists");
    assert_eq!(session.title, "What is the total revenue?");

    let messages = env
        .database
        .messages_for_session(&reply.session_id)
        .await
        .expect("messages");
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].role, MessageRole::User);
    assert_eq!(messages[1].role, MessageRole::Assistant);
    assert_eq!(messages[1].id, reply.message_id);
}

#[tokio::test]
async fn follow_up_questions_extend_the_same_session() {
    let env = test_env().await;
    let document_id = ingest_complete_document(&env).await;
    let pipeline = chat_pipeline(&env, Arc::new(FakeGenerator));

    let first = pipeline
        .answer_question(&document_id, "What is the total revenue?", None)
        .await
        .expect("first question");
    let second = pipeline
        .answer_question(
            &document_id,
            "What about the forecast?",
            Some(&first.session_id),
        )
        .await
        .expect("second question");

    assert_eq!(second.session_id, first.session_id);

    let messages = env
        .database
        .messages_for_session(&first.session_id)
        .await
        .expect("messages");
    assert_eq!(messages.len(), 4);
    assert_eq!(messages[2].content, "What about the forecast?");
}

#[tokio::test]
async fn unanswerable_questions_get_the_fallback_with_no_citations() {
    let env = test_env().await;
    let document_id = ingest_complete_document(&env).await;

    let pipeline = chat_pipeline(&env, Arc::new(FakeGenerator));
    let reply = pipeline
        .answer_question(&document_id, "What about the moon landing?", None)
        .await
        .expect("question should still be answered");

    assert_eq!(reply.response, NO_CONTEXT_FALLBACK);
    assert!(reply.citations.is_empty());

    // The fallback is still part of the conversation record.
    let messages = env
        .database
        .messages_for_session(&reply.session_id)
        .await
        .expect("messages");
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[1].content, NO_CONTEXT_FALLBACK);
}

#[tokio::test]
async fn generation_failure_degrades_to_an_apology_with_citations() {
    let env = test_env().await;
    let document_id = ingest_complete_document(&env).await;

    let pipeline = chat_pipeline(&env, Arc::new(FailingGenerator));
    let reply = pipeline
        .answer_question(&document_id, "What is the total revenue?", None)
        .await
        .expect("question should still be answered");

    assert_eq!(reply.response, "Sorry, I could not generate a response.");
    assert!(!reply.citations.is_empty());
}

#[tokio::test]
async fn questions_about_unfinished_documents_are_refused() {
    let env = test_env().await;
    stage_document(&env);

    // A failed ingest leaves the document in a terminal failed state.
    let ingest = ingest_pipeline(&env, Arc::new(FailingExtractor), Arc::new(FakeEmbedder));
    let _ = ingest.ingest("documents", "reports/q3.pdf", None).await;
    let documents = env.database.list_documents().await.expect("list");
    let failed_id = documents[0].id.clone();

    let pipeline = chat_pipeline(&env, Arc::new(FakeGenerator));
    let error = pipeline
        .answer_question(&failed_id, "What is the total?", None)
        .await
        .expect_err("question should be refused");
    assert!(matches!(error, RagError::Retrieval(_)));

    let error = pipeline
        .answer_question("no-such-document", "What is the total?", None)
        .await
        .expect_err("unknown document should be refused");
    assert!(matches!(error, RagError::Retrieval(_)));
}
