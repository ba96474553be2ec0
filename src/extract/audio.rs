//! Audio transcription via a remote speech-to-text provider

use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::error::{IngestError, Result};

use super::TranscriptSegment;

/// A finished transcription with per-segment timing
#[derive(Debug, Clone)]
pub struct Transcript {
    pub text: String,
    pub segments: Vec<TranscriptSegment>,
    pub duration_ms: i64,
    pub language: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    duration: Option<f64>,
    #[serde(default)]
    segments: Vec<ResponseSegment>,
}

#[derive(Debug, Deserialize)]
struct ResponseSegment {
    #[serde(default)]
    text: String,
    #[serde(default)]
    start: f64,
    #[serde(default)]
    end: f64,
}

/// Client for a Whisper-style transcription endpoint
pub struct Transcriber {
    client: Client,
    api_base: String,
    api_key: String,
    model: String,
}

impl Transcriber {
    pub fn new(api_base: String, api_key: String, model: String) -> Self {
        // No request timeout: long recordings legitimately take minutes.
        let client = Client::builder()
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            api_base,
            api_key,
            model,
        }
    }

    /// Transcribe an audio file, returning text plus millisecond-timed
    /// segments.
    pub async fn transcribe(&self, bytes: Vec<u8>, filename: &str) -> Result<Transcript> {
        debug!(filename, size = bytes.len(), "Transcribing audio");

        let url = format!(
            "{}/audio/transcriptions",
            self.api_base.trim_end_matches('/')
        );

        let form = Form::new()
            .part("file", Part::bytes(bytes).file_name(filename.to_string()))
            .text("model", self.model.clone())
            .text("response_format", "verbose_json")
            .text("timestamp_granularities[]", "segment");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| IngestError::TranscriptionFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| format!("HTTP {} error", status));
            return Err(IngestError::TranscriptionFailed(format!("{}: {}", status, body)).into());
        }

        let payload: TranscriptionResponse = response
            .json()
            .await
            .map_err(|e| IngestError::TranscriptionFailed(e.to_string()))?;

        let segments: Vec<TranscriptSegment> = payload
            .segments
            .iter()
            .map(|s| TranscriptSegment {
                text: s.text.trim().to_string(),
                start_ms: (s.start * 1000.0) as i64,
                end_ms: (s.end * 1000.0) as i64,
            })
            .collect();

        let duration_ms = segments
            .last()
            .map(|s| s.end_ms)
            .or_else(|| payload.duration.map(|d| (d * 1000.0) as i64))
            .unwrap_or(0);

        Ok(Transcript {
            text: payload.text,
            segments,
            duration_ms,
            language: payload.language,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_transcribe_parses_segments_in_milliseconds() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/audio/transcriptions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "text": "hello world and more",
                "language": "english",
                "duration": 4.5,
                "segments": [
                    {"text": " hello world ", "start": 0.0, "end": 2.25},
                    {"text": "and more", "start": 2.25, "end": 4.5}
                ]
            })))
            .mount(&server)
            .await;

        let transcriber = Transcriber::new(
            server.uri(),
            "test-key".to_string(),
            "whisper-1".to_string(),
        );
        let transcript = transcriber
            .transcribe(vec![0u8; 16], "note.mp3")
            .await
            .unwrap();

        assert_eq!(transcript.text, "hello world and more");
        assert_eq!(transcript.segments.len(), 2);
        assert_eq!(transcript.segments[0].text, "hello world");
        assert_eq!(transcript.segments[0].start_ms, 0);
        assert_eq!(transcript.segments[0].end_ms, 2250);
        assert_eq!(transcript.duration_ms, 4500);
        assert_eq!(transcript.language.as_deref(), Some("english"));
    }

    #[tokio::test]
    async fn test_provider_error_maps_to_transcription_failed() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/audio/transcriptions"))
            .respond_with(ResponseTemplate::new(400).set_body_string("unsupported format"))
            .mount(&server)
            .await;

        let transcriber = Transcriber::new(
            server.uri(),
            "test-key".to_string(),
            "whisper-1".to_string(),
        );
        let err = transcriber
            .transcribe(vec![0u8; 16], "note.xyz")
            .await
            .unwrap_err();

        assert!(err.to_string().contains("Transcription failed"));
    }
}
