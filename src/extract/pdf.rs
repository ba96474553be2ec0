//! PDF text extraction with per-page boundaries
//!
//! Text is pulled page by page so chunk anchors can cite exact pages. Any
//! page the primary extractor cannot read is retried with a secondary pass
//! over that page's raw objects; only a document where both extractors
//! produce no text at all fails extraction.

use tracing::warn;

use crate::error::{IngestError, Result};

use super::{first_line_title, ExtractedContent, PageBoundary};

/// Extract a PDF from raw bytes
pub fn extract_pdf(bytes: &[u8]) -> Result<ExtractedContent> {
    let mut pages = match pdf_extract::extract_text_from_mem_by_pages(bytes) {
        Ok(pages) => pages,
        Err(e) => {
            warn!("Primary PDF extractor failed ({}), trying secondary", e);
            Vec::new()
        }
    };

    if pages.is_empty() || pages.iter().any(|p| p.trim().is_empty()) {
        recover_empty_pages(bytes, &mut pages);
    }

    let (text, boundaries) = assemble_pages(&pages);
    if text.trim().is_empty() {
        return Err(IngestError::ExtractionFailed(
            "no text could be extracted from any page".to_string(),
        )
        .into());
    }

    let title = first_line_title(&text);
    let page_count = pages.len();

    Ok(ExtractedContent {
        title,
        page_boundaries: Some(boundaries),
        metadata: serde_json::json!({ "page_count": page_count }),
        text,
        ..Default::default()
    })
}

/// Retry each unreadable page with the secondary extractor, splicing its
/// text in by page position. With no primary pages at all, every page is
/// taken from the secondary pass.
fn recover_empty_pages(bytes: &[u8], pages: &mut Vec<String>) {
    let doc = match lopdf::Document::load_mem(bytes) {
        Ok(doc) => doc,
        Err(e) => {
            warn!("Secondary PDF extractor could not load document: {}", e);
            return;
        }
    };

    let page_numbers: Vec<u32> = doc.get_pages().keys().copied().collect();
    if pages.is_empty() {
        pages.resize(page_numbers.len(), String::new());
    }

    for (i, page_number) in page_numbers.iter().enumerate() {
        let Some(slot) = pages.get_mut(i) else { break };
        if !slot.trim().is_empty() {
            continue;
        }
        match doc.extract_text(&[*page_number]) {
            Ok(text) if !text.trim().is_empty() => {
                warn!(page = *page_number, "Recovered page with secondary extractor");
                *slot = text;
            }
            Ok(_) => {}
            Err(e) => warn!(page = *page_number, "Secondary extractor failed: {}", e),
        }
    }
}

/// Concatenate non-empty pages into one text with contiguous half-open
/// page spans. Pages are joined by a newline; each span except the last
/// covers its joining newline so every byte maps to exactly one page.
fn assemble_pages(pages: &[String]) -> (String, Vec<PageBoundary>) {
    let mut parts: Vec<&str> = Vec::new();
    let mut boundaries = Vec::new();
    let mut offset = 0usize;

    for (i, page_text) in pages.iter().enumerate() {
        if page_text.trim().is_empty() {
            continue;
        }
        let start = offset;
        offset += page_text.len() + 1;
        boundaries.push(PageBoundary {
            page: (i + 1) as i32,
            char_start: start,
            char_end: offset,
        });
        parts.push(page_text);
    }

    let text = parts.join("\n");
    if let Some(last) = boundaries.last_mut() {
        last.char_end = text.len();
    }
    (text, boundaries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assemble_pages_boundaries_contiguous() {
        let pages = vec![
            "page one text".to_string(),
            "page two".to_string(),
            "page three here".to_string(),
        ];
        let (text, bounds) = assemble_pages(&pages);

        assert_eq!(text, "page one text\npage two\npage three here");
        assert_eq!(bounds.len(), 3);
        assert_eq!(bounds[0].char_start, 0);
        for w in bounds.windows(2) {
            assert_eq!(w[0].char_end, w[1].char_start);
        }
        assert_eq!(bounds.last().unwrap().char_end, text.len());

        // Each span's text (minus the joining newline) is the page text.
        assert_eq!(&text[bounds[1].char_start..bounds[1].char_start + 8], "page two");
    }

    #[test]
    fn test_assemble_skips_empty_pages() {
        let pages = vec![
            "first".to_string(),
            "   ".to_string(),
            "third".to_string(),
        ];
        let (text, bounds) = assemble_pages(&pages);

        assert_eq!(text, "first\nthird");
        assert_eq!(bounds.len(), 2);
        // Page numbering reflects the source pages, not the kept ones.
        assert_eq!(bounds[0].page, 1);
        assert_eq!(bounds[1].page, 3);
    }

    #[test]
    fn test_garbage_bytes_fail_extraction() {
        let err = extract_pdf(b"definitely not a pdf").unwrap_err();
        assert!(err.to_string().contains("Extraction failed") || err.to_string().contains("failed"));
    }

    #[test]
    fn test_recover_leaves_readable_pages_alone() {
        // The secondary extractor cannot load garbage bytes; pages the
        // primary already read must come through untouched.
        let mut pages = vec!["kept text".to_string(), String::new()];
        recover_empty_pages(b"not a pdf either", &mut pages);

        assert_eq!(pages[0], "kept text");
        assert_eq!(pages[1], "");
    }
}
