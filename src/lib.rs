//! Hindsight: a personal knowledge base
//!
//! Ingests heterogeneous content (plain text, web pages, PDFs, Markdown,
//! audio recordings), decomposes it into retrievable chunks with positional
//! anchors, and answers natural-language questions with grounded citations.
//! Retrieval is hybrid: a dense vector search and a sparse full-text search
//! run against the same per-user index and their scores are fused linearly.
//!
//! # Example
//!
//! ```rust,no_run
//! use hindsight::api::{create_router, AppState};
//! use hindsight::config::AppConfig;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = AppConfig::from_env();
//!     config.validate()?;
//!
//!     let state = AppState::new(config).await?;
//!     let router = create_router(state);
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:8000").await?;
//!     axum::serve(listener, router).await?;
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod chunker;
pub mod config;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod llm;
pub mod model;
pub mod pipeline;
pub mod retrieval;
pub mod storage;
pub mod temporal;
pub mod tokenizer;

// Re-export main types
pub use chunker::{chunk_segments, ChunkPiece, TextChunker};
pub use config::AppConfig;
pub use embedding::EmbeddingClient;
pub use error::{HindsightError, IngestError, Result, SearchError};
pub use extract::{ExtractedContent, PageBoundary, Transcriber, TranscriptSegment, WebExtractor};
pub use llm::{AnswerService, ChatMessage, Citation};
pub use model::{
    Chunk, Conversation, Document, IngestionJob, JobStage, JobStatus, Message, SourceType, User,
};
pub use pipeline::IngestionPipeline;
pub use retrieval::{RetrievalService, RetrievedChunk};
pub use storage::Storage;
pub use temporal::{TemporalParser, TimeInterval};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(VERSION.starts_with(char::is_numeric));
    }
}
