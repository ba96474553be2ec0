//! Web page fetching and main-content extraction

use std::sync::LazyLock;
use std::time::Duration;

use chrono::{DateTime, Utc};
use regex::Regex;
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use crate::error::{IngestError, Result};

use super::ExtractedContent;

/// Tags that never carry readable content
const STRIP_TAGS: [&str; 9] = [
    "script", "style", "nav", "footer", "header", "aside", "form", "iframe", "noscript",
];

/// Content regions tried in order before falling back to `<body>`
const CONTENT_SELECTORS: [&str; 5] = ["article", "main", r#"[role="main"]"#, ".content", "#content"];

static STRIP_CLASS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(nav|menu|sidebar|footer|header|ad|advertisement|social|share|comment)")
        .expect("strip-class pattern is static")
});

/// Fetches URLs and extracts their main content
pub struct WebExtractor {
    client: Client,
}

impl Default for WebExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl WebExtractor {
    pub fn new() -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("Mozilla/5.0 (compatible; Hindsight/1.0; +https://hindsight.local)")
            .build()
            .expect("Failed to create HTTP client");

        Self { client }
    }

    /// Fetch a URL and extract its main content.
    ///
    /// Redirects are followed; a non-2xx final status fails extraction.
    pub async fn fetch_and_extract(&self, url: &str) -> Result<ExtractedContent> {
        debug!(url, "Fetching web page");

        let response = self
            .client
            .get(url)
            .header("Accept", "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8")
            .send()
            .await
            .map_err(|e| IngestError::ExtractionFailed(format!("fetch failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(
                IngestError::ExtractionFailed(format!("fetch returned HTTP {}", status)).into(),
            );
        }

        let html = response
            .text()
            .await
            .map_err(|e| IngestError::ExtractionFailed(format!("failed to read body: {}", e)))?;

        Ok(extract_content(&html, url))
    }
}

/// Extract title, metadata and cleaned main-content text from HTML
pub fn extract_content(html: &str, url: &str) -> ExtractedContent {
    let document = Html::parse_document(html);

    let title = select_text(&document, "title")
        .or_else(|| select_meta(&document, r#"meta[property="og:title"]"#))
        .or_else(|| select_text(&document, "h1"));

    let site_name = select_meta(&document, r#"meta[property="og:site_name"]"#)
        .or_else(|| reqwest::Url::parse(url).ok()?.host_str().map(String::from));

    let published_at = select_meta(&document, r#"meta[property="article:published_time"]"#)
        .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|dt| dt.with_timezone(&Utc));

    let region = CONTENT_SELECTORS
        .iter()
        .filter_map(|s| Selector::parse(s).ok())
        .find_map(|sel| document.select(&sel).next())
        .or_else(|| {
            Selector::parse("body")
                .ok()
                .and_then(|sel| document.select(&sel).next())
        })
        .unwrap_or_else(|| document.root_element());

    let mut raw = String::new();
    collect_text(region, &mut raw);
    let text = clean_text(&raw);

    let mut metadata = serde_json::json!({
        "url": url,
        "fetched_at": Utc::now().to_rfc3339(),
        "site_name": site_name,
    });
    if let Some(description) = select_meta(&document, r#"meta[name="description"]"#) {
        metadata["description"] = serde_json::Value::String(description);
    }

    ExtractedContent {
        title: title.map(|t| t.trim().to_string()).filter(|t| !t.is_empty()),
        metadata,
        published_at,
        text,
        ..Default::default()
    }
}

fn select_text(document: &Html, selector: &str) -> Option<String> {
    let sel = Selector::parse(selector).ok()?;
    let el = document.select(&sel).next()?;
    let text = el.text().collect::<String>().trim().to_string();
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

fn select_meta(document: &Html, selector: &str) -> Option<String> {
    let sel = Selector::parse(selector).ok()?;
    let el = document.select(&sel).next()?;
    el.value()
        .attr("content")
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
}

/// Walk the element tree collecting text, skipping non-content subtrees by
/// tag name and by ad/navigation class patterns.
fn collect_text(el: ElementRef<'_>, out: &mut String) {
    for child in el.children() {
        if let Some(text) = child.value().as_text() {
            out.push_str(text);
        } else if let Some(child_el) = ElementRef::wrap(child) {
            let name = child_el.value().name();
            if STRIP_TAGS.contains(&name) {
                continue;
            }
            if let Some(class) = child_el.value().attr("class") {
                if STRIP_CLASS_RE.is_match(class) {
                    continue;
                }
            }
            collect_text(child_el, out);
            if is_block_element(name) {
                out.push('\n');
            }
        }
    }
}

fn is_block_element(name: &str) -> bool {
    matches!(
        name,
        "p" | "div"
            | "br"
            | "li"
            | "ul"
            | "ol"
            | "h1"
            | "h2"
            | "h3"
            | "h4"
            | "h5"
            | "h6"
            | "tr"
            | "table"
            | "blockquote"
            | "section"
            | "article"
            | "pre"
    )
}

/// Normalize extracted whitespace: trim lines, drop lines shorter than
/// three characters, collapse runs of blank lines.
fn clean_text(text: &str) -> String {
    static MULTI_NEWLINE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\n{3,}").expect("static pattern"));

    let cleaned: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|line| line.len() >= 3)
        .collect();

    MULTI_NEWLINE
        .replace_all(&cleaned.join("\n"), "\n\n")
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<!DOCTYPE html>
<html>
<head>
  <title>A Field Guide to Vector Indexes</title>
  <meta property="og:site_name" content="Example Blog">
  <meta property="article:published_time" content="2024-03-02T09:00:00Z">
  <meta name="description" content="Indexes compared.">
</head>
<body>
  <header><div class="site-nav">Home | About</div></header>
  <nav>Primary navigation</nav>
  <article>
    <h1>A Field Guide to Vector Indexes</h1>
    <p>HNSW graphs trade memory for recall.</p>
    <p>Inverted file indexes partition the space instead.</p>
    <div class="social-share">Share this post!</div>
    <script>trackPageView();</script>
  </article>
  <footer>Copyright 2024</footer>
</body>
</html>"#;

    #[test]
    fn test_extracts_article_content_only() {
        let extracted = extract_content(PAGE, "https://blog.example.com/vectors");

        assert!(extracted.text.contains("HNSW graphs trade memory for recall."));
        assert!(extracted.text.contains("Inverted file indexes"));
        assert!(!extracted.text.contains("Primary navigation"));
        assert!(!extracted.text.contains("Share this post"));
        assert!(!extracted.text.contains("trackPageView"));
        assert!(!extracted.text.contains("Copyright"));
    }

    #[test]
    fn test_title_from_title_tag() {
        let extracted = extract_content(PAGE, "https://blog.example.com/vectors");
        assert_eq!(
            extracted.title.as_deref(),
            Some("A Field Guide to Vector Indexes")
        );
    }

    #[test]
    fn test_published_at_parsed() {
        let extracted = extract_content(PAGE, "https://blog.example.com/vectors");
        let published = extracted.published_at.unwrap();
        assert_eq!(published.to_rfc3339(), "2024-03-02T09:00:00+00:00");
    }

    #[test]
    fn test_metadata_site_name_and_description() {
        let extracted = extract_content(PAGE, "https://blog.example.com/vectors");
        assert_eq!(extracted.metadata["site_name"], "Example Blog");
        assert_eq!(extracted.metadata["description"], "Indexes compared.");
    }

    #[test]
    fn test_og_title_fallback() {
        let html = r#"<html><head>
            <meta property="og:title" content="From OpenGraph">
        </head><body><main><p>Some body text here.</p></main></body></html>"#;
        let extracted = extract_content(html, "https://example.com");
        assert_eq!(extracted.title.as_deref(), Some("From OpenGraph"));
    }

    #[test]
    fn test_body_fallback_when_no_content_region() {
        let html = "<html><body><p>Loose paragraph without landmarks.</p></body></html>";
        let extracted = extract_content(html, "https://example.com");
        assert!(extracted.text.contains("Loose paragraph"));
    }

    #[test]
    fn test_clean_text_drops_short_lines_and_collapses_blanks() {
        let raw = "Real line of content\n\n\n\nOK\n..\nAnother real line";
        let cleaned = clean_text(raw);
        assert_eq!(cleaned, "Real line of content\nAnother real line");
    }
}
