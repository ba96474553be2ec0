//! Ingestion pipeline
//!
//! Orchestrates extractor -> chunker -> embedder -> writer for every source
//! variant. Progress is tracked on an [`IngestionJob`] whose stage is
//! persisted before each phase's work begins, so an interrupted job shows
//! the last completed stage:
//!
//! ```text
//! RECEIVED -> EXTRACTED -> CHUNKED -> EMBEDDED -> INDEXED
//! ```
//!
//! Chunks, embeddings and the terminal COMPLETED status land in a single
//! transaction. Extraction and provider failures mark both the job and the
//! document FAILED; a failure of the final write marks only the job, and
//! retrieval never sees documents that are not COMPLETED.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::chunker::{chunk_segments, ChunkPiece, TextChunker};
use crate::config::AppConfig;
use crate::embedding::EmbeddingClient;
use crate::error::{HindsightError, IngestError, Result};
use crate::extract::{
    extract_markdown, extract_pdf, extract_plain_text, ExtractedContent, Transcriber, WebExtractor,
};
use crate::model::{Document, IngestionJob, JobStage, JobStatus, SourceType};
use crate::storage::Storage;

/// Orchestrates the ingestion of every content type
pub struct IngestionPipeline {
    storage: Arc<Storage>,
    embeddings: Arc<EmbeddingClient>,
    transcriber: Arc<Transcriber>,
    web: Arc<WebExtractor>,
    chunker: TextChunker,
    config: Arc<AppConfig>,
}

impl IngestionPipeline {
    pub fn new(
        storage: Arc<Storage>,
        embeddings: Arc<EmbeddingClient>,
        transcriber: Arc<Transcriber>,
        web: Arc<WebExtractor>,
        config: Arc<AppConfig>,
    ) -> Self {
        let chunker = TextChunker::new(config.chunking.chunk_size, config.chunking.chunk_overlap);
        Self {
            storage,
            embeddings,
            transcriber,
            web,
            chunker,
            config,
        }
    }

    /// Ingest plain text content
    pub async fn ingest_text(
        &self,
        user_id: Uuid,
        text: &str,
        title: Option<String>,
        created_at: Option<DateTime<Utc>>,
    ) -> Result<Document> {
        let content_hash = sha256_hex(text.as_bytes());
        let title = title.unwrap_or_else(|| snippet_title(text));

        let doc = self
            .create_document(DocumentSeed {
                user_id,
                source_type: SourceType::Text,
                title,
                source_uri: None,
                original_filename: None,
                content_text: Some(text.to_string()),
                content_hash,
                created_at: created_at.unwrap_or_else(Utc::now),
                fetched_at: None,
                metadata: None,
            })
            .await?;
        let job = self.create_job(&doc, JobStage::Received).await?;

        let extracted = extract_plain_text(text);
        self.run_to_completion(&doc, &job, &extracted, None).await
    }

    /// Fetch a URL and ingest its main content
    pub async fn ingest_url(&self, user_id: Uuid, url: &str) -> Result<Document> {
        info!(url, "Ingesting URL");

        let extracted = self.web.fetch_and_extract(url).await?;
        let content_hash = sha256_hex(extracted.text.as_bytes());

        let doc = self
            .create_document(DocumentSeed {
                user_id,
                source_type: SourceType::Web,
                title: extracted
                    .title
                    .clone()
                    .unwrap_or_else(|| url.to_string()),
                source_uri: Some(url.to_string()),
                original_filename: None,
                content_text: Some(extracted.text.clone()),
                content_hash,
                created_at: extracted.published_at.unwrap_or_else(Utc::now),
                fetched_at: Some(Utc::now()),
                metadata: Some(extracted.metadata.clone()),
            })
            .await?;
        let job = self.create_job(&doc, JobStage::Extracted).await?;

        self.run_to_completion(&doc, &job, &extracted, None).await
    }

    /// Ingest an uploaded file (audio, PDF, Markdown, or plain text)
    pub async fn ingest_file(
        &self,
        user_id: Uuid,
        bytes: Vec<u8>,
        original_filename: &str,
        source_type: SourceType,
        created_at: Option<DateTime<Utc>>,
    ) -> Result<Document> {
        info!(
            filename = original_filename,
            source_type = source_type.as_str(),
            size = bytes.len(),
            "Ingesting file"
        );

        match source_type {
            SourceType::Audio => {
                self.ingest_audio(user_id, bytes, original_filename, created_at)
                    .await
            }
            SourceType::Pdf | SourceType::Markdown => {
                self.ingest_document_file(user_id, bytes, original_filename, source_type, created_at)
                    .await
            }
            SourceType::Text => {
                let text = String::from_utf8(bytes).map_err(|_| {
                    IngestError::ExtractionFailed("file is not valid UTF-8 text".to_string())
                })?;
                self.ingest_text(
                    user_id,
                    &text,
                    Some(original_filename.to_string()),
                    created_at,
                )
                .await
            }
            SourceType::Web | SourceType::Image => Err(HindsightError::Validation(format!(
                "source_type '{}' cannot be ingested as a file upload",
                source_type
            ))),
        }
    }

    async fn ingest_audio(
        &self,
        user_id: Uuid,
        bytes: Vec<u8>,
        original_filename: &str,
        created_at: Option<DateTime<Utc>>,
    ) -> Result<Document> {
        let content_hash = sha256_hex(&bytes);
        let stored_path = self
            .stage_file(user_id, "audio", original_filename, &bytes)
            .await?;

        let created_at = created_at.unwrap_or_else(Utc::now);
        let doc = self
            .create_document(DocumentSeed {
                user_id,
                source_type: SourceType::Audio,
                title: original_filename.to_string(),
                source_uri: Some(stored_path),
                original_filename: Some(original_filename.to_string()),
                content_text: None,
                content_hash,
                created_at,
                fetched_at: None,
                metadata: None,
            })
            .await?;
        let job = self.create_job(&doc, JobStage::Received).await?;

        let result = self
            .run_audio_stages(&doc, &job, bytes, original_filename, created_at)
            .await;
        self.finish(doc, job, result).await
    }

    async fn run_audio_stages(
        &self,
        doc: &Document,
        job: &IngestionJob,
        bytes: Vec<u8>,
        original_filename: &str,
        base_time: DateTime<Utc>,
    ) -> Result<()> {
        self.storage
            .update_job_stage(job.id, JobStage::Extracted)
            .await?;
        let transcript = self.transcriber.transcribe(bytes, original_filename).await?;

        let metadata = serde_json::json!({
            "duration_ms": transcript.duration_ms,
            "language": transcript.language,
            "segment_count": transcript.segments.len(),
        });
        self.storage
            .update_document_content(doc.id, &transcript.text, Some(&metadata))
            .await?;

        self.storage
            .update_job_stage(job.id, JobStage::Chunked)
            .await?;
        let pieces = chunk_segments(
            &transcript.segments,
            self.config.chunking.audio_chunk_duration_ms,
        );

        self.embed_and_commit(doc, job, &pieces, Some(base_time))
            .await
    }

    async fn ingest_document_file(
        &self,
        user_id: Uuid,
        bytes: Vec<u8>,
        original_filename: &str,
        source_type: SourceType,
        created_at: Option<DateTime<Utc>>,
    ) -> Result<Document> {
        let content_hash = sha256_hex(&bytes);
        let stored_path = self
            .stage_file(user_id, "documents", original_filename, &bytes)
            .await?;

        let extracted = match source_type {
            SourceType::Pdf => {
                // PDF decoding is CPU-bound; keep it off the request task.
                let pdf_bytes = bytes.clone();
                tokio::task::spawn_blocking(move || extract_pdf(&pdf_bytes))
                    .await
                    .map_err(|e| anyhow::anyhow!("extraction task panicked: {}", e))??
            }
            _ => {
                let text = String::from_utf8(bytes).map_err(|_| {
                    IngestError::ExtractionFailed("file is not valid UTF-8 text".to_string())
                })?;
                extract_markdown(&text)
            }
        };

        let doc = self
            .create_document(DocumentSeed {
                user_id,
                source_type,
                title: extracted
                    .title
                    .clone()
                    .unwrap_or_else(|| original_filename.to_string()),
                source_uri: Some(stored_path),
                original_filename: Some(original_filename.to_string()),
                content_text: Some(extracted.text.clone()),
                content_hash,
                created_at: created_at.unwrap_or_else(Utc::now),
                fetched_at: None,
                metadata: Some(extracted.metadata.clone()),
            })
            .await?;
        let job = self.create_job(&doc, JobStage::Extracted).await?;

        self.run_to_completion(&doc, &job, &extracted, None).await
    }

    /// Shared tail of every textual path: chunk, embed, commit, and record
    /// the outcome on failure.
    async fn run_to_completion(
        &self,
        doc: &Document,
        job: &IngestionJob,
        extracted: &ExtractedContent,
        base_time: Option<DateTime<Utc>>,
    ) -> Result<Document> {
        let result = self
            .run_text_stages(doc, job, extracted, base_time)
            .await;
        self.finish(doc.clone(), job.clone(), result).await
    }

    async fn run_text_stages(
        &self,
        doc: &Document,
        job: &IngestionJob,
        extracted: &ExtractedContent,
        base_time: Option<DateTime<Utc>>,
    ) -> Result<()> {
        self.storage
            .update_job_stage(job.id, JobStage::Chunked)
            .await?;
        let pieces = self
            .chunker
            .chunk(&extracted.text, extracted.page_boundaries.as_deref());

        self.embed_and_commit(doc, job, &pieces, base_time).await
    }

    async fn embed_and_commit(
        &self,
        doc: &Document,
        job: &IngestionJob,
        pieces: &[ChunkPiece],
        base_time: Option<DateTime<Utc>>,
    ) -> Result<()> {
        self.storage
            .update_job_stage(job.id, JobStage::Embedded)
            .await?;

        // One round-trip for the whole document.
        let texts: Vec<&str> = pieces.iter().map(|p| p.text.as_str()).collect();
        let vectors = self.embeddings.embed_batch(&texts).await?;

        self.storage
            .commit_chunks(
                doc.id,
                doc.user_id,
                job.id,
                pieces,
                vectors,
                self.embeddings.model(),
                base_time,
            )
            .await
    }

    /// Record the outcome and return the fresh document state
    async fn finish(
        &self,
        doc: Document,
        job: IngestionJob,
        result: Result<()>,
    ) -> Result<Document> {
        match result {
            Ok(()) => {
                info!(document_id = %doc.id, "Ingestion completed");
                Ok(self
                    .storage
                    .get_document(doc.user_id, doc.id)
                    .await?
                    .unwrap_or(doc))
            }
            Err(err) => {
                error!(document_id = %doc.id, "Ingestion failed: {}", err);
                let message = err.to_string();
                let recorded = match &err {
                    // A failed write leaves the document untouched; only the
                    // job records the failure and retrieval ignores it.
                    HindsightError::Database(_)
                    | HindsightError::Ingest(IngestError::StorageFailed(_)) => {
                        self.storage.mark_job_failed(job.id, &message).await
                    }
                    _ => self.storage.mark_failed(doc.id, job.id, &message).await,
                };
                if let Err(record_err) = recorded {
                    warn!(
                        document_id = %doc.id,
                        "Could not record ingestion failure: {}", record_err
                    );
                }
                Err(err)
            }
        }
    }

    async fn create_document(&self, seed: DocumentSeed) -> Result<Document> {
        let doc = Document {
            id: Uuid::new_v4(),
            user_id: seed.user_id,
            source_type: seed.source_type,
            title: seed.title,
            source_uri: seed.source_uri,
            original_filename: seed.original_filename,
            content_text: seed.content_text,
            content_hash: Some(seed.content_hash),
            created_at: seed.created_at,
            ingested_at: None,
            fetched_at: seed.fetched_at,
            metadata: seed.metadata,
            status: JobStatus::Running,
        };
        self.storage.insert_document(&doc).await?;
        Ok(doc)
    }

    async fn create_job(&self, doc: &Document, stage: JobStage) -> Result<IngestionJob> {
        let job = IngestionJob {
            id: Uuid::new_v4(),
            user_id: doc.user_id,
            document_id: doc.id,
            status: JobStatus::Running,
            stage,
            error: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        self.storage.insert_job(&job).await?;
        Ok(job)
    }

    /// Persist uploaded bytes under
    /// `{upload_dir}/{user_id}/{kind}/{uuid}{ext}` so the source stays
    /// retrievable for citation playback.
    async fn stage_file(
        &self,
        user_id: Uuid,
        kind: &str,
        original_filename: &str,
        bytes: &[u8],
    ) -> Result<String> {
        let dir = Path::new(&self.config.storage.upload_dir)
            .join(user_id.to_string())
            .join(kind);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| IngestError::StorageFailed(format!("creating upload dir: {}", e)))?;

        let ext = Path::new(original_filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| format!(".{}", e))
            .unwrap_or_default();
        let stored = dir.join(format!("{}{}", Uuid::new_v4(), ext));

        tokio::fs::write(&stored, bytes)
            .await
            .map_err(|e| IngestError::StorageFailed(format!("staging upload: {}", e)))?;

        Ok(stored.to_string_lossy().into_owned())
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

/// Title for untitled text ingests: the first 100 characters, with a
/// trailing ellipsis when truncated.
fn snippet_title(text: &str) -> String {
    let trimmed = text.trim();
    let mut title: String = trimmed.chars().take(100).collect();
    if title.len() < trimmed.len() {
        title.push('…');
    }
    title
}

struct DocumentSeed {
    user_id: Uuid,
    source_type: SourceType,
    title: String,
    source_uri: Option<String>,
    original_filename: Option<String>,
    content_text: Option<String>,
    content_hash: String,
    created_at: DateTime<Utc>,
    fetched_at: Option<DateTime<Utc>>,
    metadata: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_hex_is_stable() {
        let a = sha256_hex(b"the same content");
        let b = sha256_hex(b"the same content");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert_ne!(a, sha256_hex(b"different content"));
    }

    #[test]
    fn test_sha256_known_vector() {
        // SHA-256 of the empty string.
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_snippet_title_short_text() {
        assert_eq!(snippet_title("A short note"), "A short note");
    }

    #[test]
    fn test_snippet_title_truncates_long_text() {
        let text = "x".repeat(250);
        let title = snippet_title(&text);
        assert_eq!(title.chars().count(), 101);
        assert!(title.ends_with('…'));
    }

    #[test]
    fn test_snippet_title_trims_whitespace() {
        assert_eq!(snippet_title("  padded  "), "padded");
    }
}
