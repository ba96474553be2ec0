//! Grounded answer generation
//!
//! Turns retrieved passages into an answer via an OpenAI-compatible chat
//! completions endpoint. The context window is assembled under the
//! configured token budget, and every passage becomes a citation the
//! client can render. With zero passages the service answers with a canned
//! reply and never calls the provider.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{Result, SearchError};
use crate::model::SourceType;
use crate::retrieval::RetrievedChunk;
use crate::tokenizer;

/// Reply used when retrieval produced no passages
pub const NO_INFORMATION_REPLY: &str =
    "I don't have any information about that in your knowledge base.";

const SYSTEM_PROMPT: &str = "You are a helpful assistant that answers questions from the \
user's personal knowledge base.\n\n\
Rules:\n\
1. Answer only from the provided context. Do not make up information.\n\
2. If the context does not contain enough information, say \"I don't have \
enough information about that.\"\n\
3. Reference sources with [Source N] notation when citing specific information.";

/// One chat turn in provider wire format
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: content.into(),
        }
    }
}

/// Everything needed to locate a cited passage in its source
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Citation {
    pub chunk_id: Uuid,
    pub document_id: Uuid,
    pub title: String,
    pub source_uri: Option<String>,
    pub source_type: SourceType,
    /// Page span like "2" or "2-3", for paged sources
    pub page_range: Option<String>,
    /// Time span like "2024-06-12 09:30 - 09:31", for audio sources
    pub time_range: Option<String>,
    pub text_snippet: String,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Debug, Deserialize, Default)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

/// Answer generator over an OpenAI-compatible chat endpoint
pub struct AnswerService {
    client: Client,
    api_base: String,
    api_key: String,
    model: String,
    max_context_tokens: usize,
}

impl AnswerService {
    pub fn new(
        api_base: String,
        api_key: String,
        model: String,
        max_context_tokens: usize,
    ) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            api_base,
            api_key,
            model,
            max_context_tokens,
        }
    }

    /// Build citations for a set of retrieved passages
    pub fn build_citations(chunks: &[RetrievedChunk]) -> Vec<Citation> {
        chunks
            .iter()
            .map(|chunk| {
                let page_range = chunk.page_start.map(|start| match chunk.page_end {
                    Some(end) if end != start => format!("{}-{}", start, end),
                    _ => start.to_string(),
                });

                let time_range = chunk.time_start.map(|start| {
                    let mut range = start.format("%Y-%m-%d %H:%M").to_string();
                    if let Some(end) = chunk.time_end {
                        if end != start {
                            range.push_str(&format!(" - {}", end.format("%H:%M")));
                        }
                    }
                    range
                });

                Citation {
                    chunk_id: chunk.chunk_id,
                    document_id: chunk.document_id,
                    title: chunk.document_title.clone(),
                    source_uri: chunk.source_uri.clone(),
                    source_type: chunk.source_type,
                    page_range,
                    time_range,
                    text_snippet: snippet(&chunk.text, 200),
                }
            })
            .collect()
    }

    /// Generate a complete answer with citations
    pub async fn generate_answer(
        &self,
        query: &str,
        chunks: &[RetrievedChunk],
        history: &[ChatMessage],
    ) -> Result<(String, Vec<Citation>)> {
        let citations = Self::build_citations(chunks);

        if chunks.is_empty() {
            return Ok((NO_INFORMATION_REPLY.to_string(), citations));
        }

        let request = ChatCompletionRequest {
            model: self.model.clone(),
            messages: self.build_messages(query, chunks, history),
            temperature: 0.2,
            stream: false,
        };

        let response = self
            .client
            .post(self.completions_url())
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| SearchError::GenerationFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| format!("HTTP {} error", status));
            return Err(SearchError::GenerationFailed(format!("{}: {}", status, body)).into());
        }

        let payload: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| SearchError::GenerationFailed(e.to_string()))?;

        let answer = payload
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| SearchError::GenerationFailed("provider returned no choices".into()))?;

        Ok((answer, citations))
    }

    /// Stream an answer token by token.
    ///
    /// The returned stream yields token deltas in generator order and ends
    /// when the provider closes the stream; transport errors surface as a
    /// final `Err` item.
    pub async fn stream_answer(
        &self,
        query: &str,
        chunks: &[RetrievedChunk],
        history: &[ChatMessage],
    ) -> Result<ReceiverStream<Result<String>>> {
        let (tx, rx) = mpsc::channel::<Result<String>>(64);

        if chunks.is_empty() {
            let _ = tx.send(Ok(NO_INFORMATION_REPLY.to_string())).await;
            return Ok(ReceiverStream::new(rx));
        }

        let request = ChatCompletionRequest {
            model: self.model.clone(),
            messages: self.build_messages(query, chunks, history),
            temperature: 0.2,
            stream: true,
        };

        let response = self
            .client
            .post(self.completions_url())
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| SearchError::GenerationFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| format!("HTTP {} error", status));
            return Err(SearchError::GenerationFailed(format!("{}: {}", status, body)).into());
        }

        tokio::spawn(async move {
            use futures::StreamExt;

            let mut body = response.bytes_stream();
            let mut buffer = String::new();

            while let Some(item) = body.next().await {
                let bytes = match item {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        let _ = tx
                            .send(Err(SearchError::GenerationFailed(e.to_string()).into()))
                            .await;
                        return;
                    }
                };
                buffer.push_str(&String::from_utf8_lossy(&bytes));

                // Provider frames are newline-delimited "data: <json>" lines.
                while let Some(pos) = buffer.find('\n') {
                    let line = buffer[..pos].trim().to_string();
                    buffer.drain(..=pos);

                    let Some(data) = line.strip_prefix("data: ") else {
                        continue;
                    };
                    if data == "[DONE]" {
                        return;
                    }

                    match serde_json::from_str::<StreamChunk>(data) {
                        Ok(chunk) => {
                            let token = chunk
                                .choices
                                .into_iter()
                                .next()
                                .and_then(|c| c.delta.content);
                            if let Some(token) = token {
                                if tx.send(Ok(token)).await.is_err() {
                                    // Consumer went away; stop reading.
                                    return;
                                }
                            }
                        }
                        Err(e) => warn!("Skipping malformed stream frame: {}", e),
                    }
                }
            }
        });

        Ok(ReceiverStream::new(rx))
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.api_base.trim_end_matches('/'))
    }

    fn build_messages(
        &self,
        query: &str,
        chunks: &[RetrievedChunk],
        history: &[ChatMessage],
    ) -> Vec<ChatMessage> {
        let context = self.build_context(chunks);

        let mut messages = vec![ChatMessage::new("system", SYSTEM_PROMPT)];
        messages.extend(history.iter().cloned());
        messages.push(ChatMessage::new(
            "user",
            format!(
                "Context from the knowledge base:\n\n{}\n\nQuestion: {}",
                context, query
            ),
        ));
        messages
    }

    /// Assemble labeled source blocks under the token budget
    fn build_context(&self, chunks: &[RetrievedChunk]) -> String {
        let mut parts = Vec::new();
        let mut budget = self.max_context_tokens;

        for (i, chunk) in chunks.iter().enumerate() {
            let mut source = format!("[Source {}: {}", i + 1, chunk.document_title);
            if let Some(page_start) = chunk.page_start {
                source.push_str(&format!(", Page {}", page_start));
                if let Some(page_end) = chunk.page_end {
                    if page_end != page_start {
                        source.push_str(&format!("-{}", page_end));
                    }
                }
            }
            if let Some(time_start) = chunk.time_start {
                source.push_str(&format!(", Time: {}", time_start.format("%Y-%m-%d %H:%M")));
            }
            source.push(']');

            let block = format!("{}\n{}", source, chunk.text);
            let cost = tokenizer::count_tokens(&block);
            if cost > budget {
                debug!(
                    kept = parts.len(),
                    dropped = chunks.len() - parts.len(),
                    "Context budget reached"
                );
                break;
            }
            budget -= cost;
            parts.push(block);
        }

        parts.join("\n\n---\n\n")
    }
}

fn snippet(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let mut s: String = text.chars().take(max_chars).collect();
        s.push_str("...");
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use chrono::Utc;

    fn chunk_with_pages(page_start: Option<i32>, page_end: Option<i32>) -> RetrievedChunk {
        RetrievedChunk {
            chunk_id: Uuid::from_u128(1),
            document_id: Uuid::from_u128(2),
            document_title: "Quarterly Report".to_string(),
            source_uri: Some("/uploads/u/documents/r.pdf".to_string()),
            source_type: SourceType::Pdf,
            text: "Revenue grew in the third quarter.".to_string(),
            score: 0.9,
            page_start,
            page_end,
            time_start: None,
            time_end: None,
        }
    }

    #[test]
    fn test_citation_page_range() {
        let citations = AnswerService::build_citations(&[
            chunk_with_pages(Some(2), Some(3)),
            chunk_with_pages(Some(4), Some(4)),
            chunk_with_pages(None, None),
        ]);

        assert_eq!(citations[0].page_range.as_deref(), Some("2-3"));
        assert_eq!(citations[1].page_range.as_deref(), Some("4"));
        assert!(citations[2].page_range.is_none());
    }

    #[test]
    fn test_citation_time_range() {
        let mut chunk = chunk_with_pages(None, None);
        chunk.time_start = Some(Utc.with_ymd_and_hms(2024, 6, 12, 9, 30, 0).unwrap());
        chunk.time_end = Some(Utc.with_ymd_and_hms(2024, 6, 12, 9, 31, 0).unwrap());

        let citations = AnswerService::build_citations(&[chunk]);
        assert_eq!(
            citations[0].time_range.as_deref(),
            Some("2024-06-12 09:30 - 09:31")
        );
    }

    #[test]
    fn test_citation_snippet_truncated() {
        let mut chunk = chunk_with_pages(None, None);
        chunk.text = "word ".repeat(100);

        let citations = AnswerService::build_citations(&[chunk]);
        assert!(citations[0].text_snippet.ends_with("..."));
        assert_eq!(citations[0].text_snippet.chars().count(), 203);
    }

    #[tokio::test]
    async fn test_empty_chunks_short_circuit() {
        let service = AnswerService::new(
            "http://localhost:0".to_string(),
            "unused".to_string(),
            "gpt-4o-mini".to_string(),
            8000,
        );

        // No provider call happens: the URL is unreachable and this still
        // succeeds.
        let (answer, citations) = service.generate_answer("anything?", &[], &[]).await.unwrap();
        assert_eq!(answer, NO_INFORMATION_REPLY);
        assert!(citations.is_empty());
    }

    #[test]
    fn test_context_respects_token_budget() {
        let service = AnswerService::new(
            "http://localhost:0".to_string(),
            "unused".to_string(),
            "gpt-4o-mini".to_string(),
            40,
        );

        let chunks: Vec<RetrievedChunk> = (0..10)
            .map(|_| chunk_with_pages(None, None))
            .collect();
        let context = service.build_context(&chunks);

        // The budget admits some sources but not all ten.
        assert!(context.contains("[Source 1:"));
        assert!(!context.contains("[Source 10:"));
    }

    #[test]
    fn test_messages_order_system_history_user() {
        let service = AnswerService::new(
            "http://localhost:0".to_string(),
            "unused".to_string(),
            "gpt-4o-mini".to_string(),
            8000,
        );

        let history = vec![
            ChatMessage::new("user", "earlier question"),
            ChatMessage::new("assistant", "earlier answer"),
        ];
        let messages =
            service.build_messages("next question", &[chunk_with_pages(None, None)], &history);

        assert_eq!(messages[0].role, "system");
        assert_eq!(messages[1].content, "earlier question");
        assert_eq!(messages[2].content, "earlier answer");
        assert!(messages[3].content.contains("next question"));
        assert!(messages[3].content.contains("[Source 1:"));
    }
}
