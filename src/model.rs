//! Domain entities shared by storage, ingestion and retrieval

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Kind of source a document was ingested from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Audio,
    Pdf,
    Markdown,
    Web,
    Text,
    Image,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Audio => "audio",
            SourceType::Pdf => "pdf",
            SourceType::Markdown => "markdown",
            SourceType::Web => "web",
            SourceType::Text => "text",
            SourceType::Image => "image",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "audio" => Some(SourceType::Audio),
            "pdf" => Some(SourceType::Pdf),
            "markdown" => Some(SourceType::Markdown),
            "web" => Some(SourceType::Web),
            "text" => Some(SourceType::Text),
            "image" => Some(SourceType::Image),
            _ => None,
        }
    }
}

impl std::fmt::Display for SourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status shared by documents and their ingestion jobs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(JobStatus::Queued),
            "running" => Some(JobStatus::Running),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }

    /// Terminal statuses never change again
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// Last completed stage of the ingestion state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum JobStage {
    Received,
    Extracted,
    Chunked,
    Embedded,
    Indexed,
}

impl JobStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStage::Received => "received",
            JobStage::Extracted => "extracted",
            JobStage::Chunked => "chunked",
            JobStage::Embedded => "embedded",
            JobStage::Indexed => "indexed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "received" => Some(JobStage::Received),
            "extracted" => Some(JobStage::Extracted),
            "chunked" => Some(JobStage::Chunked),
            "embedded" => Some(JobStage::Embedded),
            "indexed" => Some(JobStage::Indexed),
            _ => None,
        }
    }
}

/// A known user; every document, chunk and job is scoped to one
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

/// An ingested source document
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Document {
    pub id: Uuid,
    pub user_id: Uuid,
    pub source_type: SourceType,
    pub title: String,
    pub source_uri: Option<String>,
    pub original_filename: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_text: Option<String>,
    pub content_hash: Option<String>,
    pub created_at: DateTime<Utc>,
    pub ingested_at: Option<DateTime<Utc>>,
    pub fetched_at: Option<DateTime<Utc>>,
    pub metadata: Option<serde_json::Value>,
    pub status: JobStatus,
}

/// A retrievable passage cut from a document.
///
/// `char_start`/`char_end` always locate the passage in the document's
/// canonical text. Page anchors exist for PDFs, time anchors for audio;
/// the millisecond offsets are either both present or both absent.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Chunk {
    pub id: Uuid,
    pub document_id: Uuid,
    pub user_id: Uuid,
    pub chunk_index: i32,
    pub text: String,
    pub token_count: Option<i32>,
    pub char_start: Option<i32>,
    pub char_end: Option<i32>,
    pub page_start: Option<i32>,
    pub page_end: Option<i32>,
    pub time_start: Option<DateTime<Utc>>,
    pub time_end: Option<DateTime<Utc>>,
    pub source_offset_ms_start: Option<i64>,
    pub source_offset_ms_end: Option<i64>,
    pub metadata: Option<serde_json::Value>,
}

/// The vector for one chunk; 1:1 with `Chunk`
#[derive(Debug, Clone)]
pub struct ChunkEmbedding {
    pub chunk_id: Uuid,
    pub embedding: Vec<f32>,
    pub embedding_model: String,
    pub created_at: DateTime<Utc>,
}

/// Durable progress record for one document's ingestion
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct IngestionJob {
    pub id: Uuid,
    pub user_id: Uuid,
    pub document_id: Uuid,
    pub status: JobStatus,
    pub stage: JobStage,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A chat thread
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Conversation {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One turn in a conversation; assistant turns carry citations
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub role: String,
    pub content: String,
    pub citations: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_type_round_trip() {
        for s in ["audio", "pdf", "markdown", "web", "text", "image"] {
            let parsed = SourceType::parse(s).unwrap();
            assert_eq!(parsed.as_str(), s);
        }
        assert!(SourceType::parse("docx").is_none());
    }

    #[test]
    fn test_status_terminality() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(!JobStatus::Queued.is_terminal());
    }

    #[test]
    fn test_stage_parse() {
        assert_eq!(JobStage::parse("embedded"), Some(JobStage::Embedded));
        assert!(JobStage::parse("unknown").is_none());
    }
}
