
use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};

use crate::retrieval::Citation;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Document {
    pub id: String,
    pub title: String,
    pub file_name: String,
    pub file_size: i64,
    pub bucket: String,
    pub storage_path: String,
    pub page_count: i64,
    pub processing_status: DocumentStatus,
    pub error_message: Option<String>,
    pub created_date: NaiveDateTime,
}

/// Processing lifecycle of an ingested document. `Complete` and `Failed`
/// are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
pub enum DocumentStatus {
    Processing,
    Complete,
    Failed,
}

impl std::fmt::Display for DocumentStatus {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            DocumentStatus::Processing => write!(f, "processing"),
            DocumentStatus::Complete => write!(f, "complete"),
            DocumentStatus::Failed => write!(f, "failed"),
        }
    }
}

impl Document {
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.processing_status == DocumentStatus::Complete
    }

    #[inline]
    pub fn is_failed(&self) -> bool {
        self.processing_status == DocumentStatus::Failed
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewDocument {
    pub title: String,
    pub file_name: String,
    pub file_size: i64,
    pub bucket: String,
    pub storage_path: String,
    pub page_count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct DocumentChunkRecord {
    pub id: String,
    pub document_id: String,
    pub content: String,
    pub page_number: i64,
    pub chunk_index: i64,
    pub char_start: i64,
    pub char_end: i64,
    pub created_date: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct ChatSession {
    pub id: String,
    pub document_id: String,
    pub title: String,
    pub created_date: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct ChatMessage {
    pub id: String,
    pub session_id: String,
    pub role: MessageRole,
    pub content: String,
    /// JSON-encoded citation list; use [`ChatMessage::citations`] to decode.
    pub citations: String,
    pub created_date: NaiveDateTime,
}

impl ChatMessage {
    #[inline]
    pub fn citations(&self) -> Result<Vec<Citation>> {
        serde_json::from_str(&self.citations).context("Failed to decode message citations")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

impl std::fmt::Display for MessageRole {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewChatMessage {
    pub session_id: String,
    pub role: MessageRole,
    pub content: String,
    pub citations: Vec<Citation>,
}
