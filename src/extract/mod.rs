//! Content extraction for ingestion sources
//!
//! One extractor per source variant; each produces an [`ExtractedContent`]
//! with canonical text and whatever positional metadata the source carries
//! (page boundaries for PDFs, timed segments for audio).

pub mod audio;
pub mod pdf;
pub mod text;
pub mod web;

pub use audio::Transcriber;
pub use pdf::extract_pdf;
pub use text::{extract_markdown, extract_plain_text};
pub use web::WebExtractor;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Half-open span of one page inside the concatenated document text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageBoundary {
    pub page: i32,
    pub char_start: usize,
    pub char_end: usize,
}

/// One timed span of an audio transcript, in milliseconds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub text: String,
    pub start_ms: i64,
    pub end_ms: i64,
}

/// Canonical output of every extractor
#[derive(Debug, Clone, Default)]
pub struct ExtractedContent {
    /// UTF-8 canonical content
    pub text: String,
    pub title: Option<String>,
    /// Contiguous half-open page spans, for paged sources
    pub page_boundaries: Option<Vec<PageBoundary>>,
    /// Timed transcript segments, for audio sources
    pub segments: Option<Vec<TranscriptSegment>>,
    /// Best-effort provenance (author, language, duration, ...)
    pub metadata: serde_json::Value,
    pub published_at: Option<DateTime<Utc>>,
}

impl ExtractedContent {
    pub fn from_text(text: String) -> Self {
        Self {
            text,
            metadata: serde_json::json!({}),
            ..Default::default()
        }
    }
}

/// Title fallback shared by file-based extractors: the first line, if it is
/// short enough to plausibly be one.
pub(crate) fn first_line_title(text: &str) -> Option<String> {
    let first_line = text.trim().lines().next()?.trim();
    if first_line.is_empty() || first_line.len() >= 200 {
        None
    } else {
        Some(first_line.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_line_title() {
        assert_eq!(
            first_line_title("Meeting notes\nmore text"),
            Some("Meeting notes".to_string())
        );
        assert_eq!(first_line_title(""), None);

        let long_line = "x".repeat(250);
        assert_eq!(first_line_title(&long_line), None);
    }
}
