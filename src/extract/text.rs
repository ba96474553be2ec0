//! Plain text and Markdown extraction

use pulldown_cmark::{Event, HeadingLevel, Parser, Tag, TagEnd};

use super::{first_line_title, ExtractedContent};

/// Extract plain text content; the first short line doubles as the title.
pub fn extract_plain_text(text: &str) -> ExtractedContent {
    ExtractedContent {
        title: first_line_title(text),
        metadata: serde_json::json!({ "original_format": "text" }),
        text: text.to_string(),
        ..Default::default()
    }
}

/// Render Markdown and strip it to plain text.
///
/// The title is the first top-level heading when one exists, otherwise the
/// first line under 200 characters.
pub fn extract_markdown(content: &str) -> ExtractedContent {
    let parser = Parser::new(content);

    let mut text = String::new();
    let mut title: Option<String> = None;
    let mut capturing_title = false;
    let mut title_buf = String::new();

    for event in parser {
        match event {
            Event::Start(Tag::Heading { level, .. }) => {
                if level == HeadingLevel::H1 && title.is_none() {
                    capturing_title = true;
                    title_buf.clear();
                }
            }
            Event::End(TagEnd::Heading(_)) => {
                if capturing_title {
                    capturing_title = false;
                    let t = title_buf.trim();
                    if !t.is_empty() {
                        title = Some(t.to_string());
                    }
                }
                push_newline(&mut text);
            }
            Event::Text(t) | Event::Code(t) => {
                text.push_str(&t);
                if capturing_title {
                    title_buf.push_str(&t);
                }
            }
            Event::SoftBreak | Event::HardBreak => text.push('\n'),
            Event::End(TagEnd::Paragraph)
            | Event::End(TagEnd::Item)
            | Event::End(TagEnd::CodeBlock) => push_newline(&mut text),
            _ => {}
        }
    }

    let text = text.trim().to_string();
    let title = title.or_else(|| first_line_title(&text));

    ExtractedContent {
        title,
        metadata: serde_json::json!({ "original_format": "markdown" }),
        text,
        ..Default::default()
    }
}

fn push_newline(text: &mut String) {
    if !text.ends_with('\n') {
        text.push('\n');
    }
}
