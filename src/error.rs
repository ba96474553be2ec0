//! Error handling for the knowledge base

use thiserror::Error;

/// Result type alias for the knowledge base
pub type Result<T> = std::result::Result<T, HindsightError>;

/// Main error type for the knowledge base
#[derive(Error, Debug)]
pub enum HindsightError {
    #[error("Ingestion error: {0}")]
    Ingest(#[from] IngestError),

    #[error("Search error: {0}")]
    Search(#[from] SearchError),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Generic error: {0}")]
    Generic(#[from] anyhow::Error),
}

/// Errors raised while ingesting a source into the knowledge base
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Extraction failed: {0}")]
    ExtractionFailed(String),

    #[error("Embedding failed: {0}")]
    EmbeddingFailed(String),

    #[error("Transcription failed: {0}")]
    TranscriptionFailed(String),

    #[error("Storage failed: {0}")]
    StorageFailed(String),

    #[error("Unsupported source type: {0}")]
    UnsupportedSource(String),
}

/// Errors raised on the retrieval path
#[derive(Error, Debug)]
pub enum SearchError {
    #[error("Query rejected: {0}")]
    QueryRejected(String),

    #[error("Answer generation failed: {0}")]
    GenerationFailed(String),

    #[error("Invalid embedding dimension: expected {expected}, got {actual}")]
    InvalidDimension { expected: usize, actual: usize },
}

impl HindsightError {
    /// Get error category for logging/metrics
    pub fn category(&self) -> &'static str {
        match self {
            HindsightError::Ingest(_) => "ingest",
            HindsightError::Search(_) => "search",
            HindsightError::Validation(_) => "validation",
            HindsightError::NotFound(_) => "not_found",
            HindsightError::Config(_) => "config",
            HindsightError::Io(_) => "io",
            HindsightError::Serialization(_) => "serialization",
            HindsightError::Http(_) => "http",
            HindsightError::Database(_) => "database",
            HindsightError::Generic(_) => "generic",
        }
    }

    /// Whether the error should surface as a client error (4xx) rather than 500
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            HindsightError::Validation(_) | HindsightError::NotFound(_)
        )
    }
}
