//! Embedding provider client
//!
//! Wraps an OpenAI-compatible `/embeddings` endpoint. The batched call is
//! the pipeline's main throughput lever: one round-trip embeds every chunk
//! of a document.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{IngestError, Result};

/// Request body for the embeddings endpoint
#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponseData {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

/// Client for a remote embedding provider
pub struct EmbeddingClient {
    client: Client,
    api_base: String,
    api_key: String,
    model: String,
    dimensions: usize,
}

impl EmbeddingClient {
    pub fn new(api_base: String, api_key: String, model: String, dimensions: usize) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            api_base,
            api_key,
            model,
            dimensions,
        }
    }

    /// Model tag recorded alongside every persisted vector
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Configured vector dimension
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Embed a single text
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_batch(&[text]).await?;
        vectors
            .pop()
            .ok_or_else(|| IngestError::EmbeddingFailed("provider returned no vector".into()).into())
    }

    /// Embed a batch of texts in one round-trip.
    ///
    /// The provider may return results in any order; output order always
    /// matches input order via the per-item index.
    pub async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/embeddings", self.api_base.trim_end_matches('/'));
        debug!(count = texts.len(), "Requesting embeddings");

        let request = EmbeddingRequest {
            model: &self.model,
            input: texts.to_vec(),
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| IngestError::EmbeddingFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| format!("HTTP {} error", status));
            return Err(IngestError::EmbeddingFailed(format!("{}: {}", status, body)).into());
        }

        let payload: EmbeddingResponseData = response
            .json()
            .await
            .map_err(|e| IngestError::EmbeddingFailed(e.to_string()))?;

        if payload.data.len() != texts.len() {
            return Err(IngestError::EmbeddingFailed(format!(
                "expected {} vectors, got {}",
                texts.len(),
                payload.data.len()
            ))
            .into());
        }

        let mut ordered = payload.data;
        ordered.sort_by_key(|d| d.index);

        for item in &ordered {
            if item.embedding.len() != self.dimensions {
                return Err(IngestError::EmbeddingFailed(format!(
                    "vector dimension {} does not match configured {}",
                    item.embedding.len(),
                    self.dimensions
                ))
                .into());
            }
        }

        Ok(ordered.into_iter().map(|d| d.embedding).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer, dimensions: usize) -> EmbeddingClient {
        EmbeddingClient::new(
            server.uri(),
            "test-key".to_string(),
            "text-embedding-3-small".to_string(),
            dimensions,
        )
    }

    #[tokio::test]
    async fn test_batch_restores_provider_order() {
        let server = MockServer::start().await;

        // Provider replies with indices out of order.
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [
                    {"embedding": [0.0, 1.0], "index": 1},
                    {"embedding": [1.0, 0.0], "index": 0},
                ],
                "model": "text-embedding-3-small"
            })))
            .mount(&server)
            .await;

        let client = client_for(&server, 2);
        let vectors = client.embed_batch(&["first", "second"]).await.unwrap();

        assert_eq!(vectors[0], vec![1.0, 0.0]);
        assert_eq!(vectors[1], vec![0.0, 1.0]);
    }

    #[tokio::test]
    async fn test_provider_error_maps_to_embedding_failed() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let client = client_for(&server, 2);
        let err = client.embed("anything").await.unwrap_err();
        assert_eq!(err.category(), "ingest");
        assert!(err.to_string().contains("Embedding failed"));
    }

    #[tokio::test]
    async fn test_dimension_mismatch_rejected() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{"embedding": [0.1, 0.2, 0.3], "index": 0}],
                "model": "text-embedding-3-small"
            })))
            .mount(&server)
            .await;

        let client = client_for(&server, 2);
        assert!(client.embed("text").await.is_err());
    }

    #[tokio::test]
    async fn test_empty_batch_is_a_no_op() {
        let server = MockServer::start().await;
        let client = client_for(&server, 2);
        let vectors = client.embed_batch(&[]).await.unwrap();
        assert!(vectors.is_empty());
    }
}
