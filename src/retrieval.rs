//! Hybrid retrieval engine
//!
//! A query is answered from two independent lookups over the same per-user
//! index: a dense nearest-neighbor search over chunk embeddings and a
//! sparse full-text search over the generated tsvector column. Temporal
//! phrases are stripped first and become a filter on both. Scores are fused
//! linearly per chunk; fusion is order-independent, so the two subqueries
//! can run concurrently.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::embedding::EmbeddingClient;
use crate::error::Result;
use crate::model::SourceType;
use crate::storage::Storage;
use crate::temporal::TemporalParser;

/// Default number of passages returned by the engine
pub const DEFAULT_TOP_K: usize = 10;
/// Default weight of the dense score in fusion
pub const DEFAULT_VECTOR_WEIGHT: f32 = 0.7;
/// Default weight of the sparse score in fusion
pub const DEFAULT_TEXT_WEIGHT: f32 = 0.3;

/// A ranked passage with everything needed to cite it
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RetrievedChunk {
    pub chunk_id: Uuid,
    pub document_id: Uuid,
    pub document_title: String,
    pub source_uri: Option<String>,
    pub source_type: SourceType,
    pub text: String,
    pub score: f32,
    pub page_start: Option<i32>,
    pub page_end: Option<i32>,
    pub time_start: Option<DateTime<Utc>>,
    pub time_end: Option<DateTime<Utc>>,
}

/// Hybrid dense + sparse retrieval over a user's knowledge base
pub struct RetrievalService {
    storage: Arc<Storage>,
    embeddings: Arc<EmbeddingClient>,
    temporal: TemporalParser,
}

impl RetrievalService {
    pub fn new(storage: Arc<Storage>, embeddings: Arc<EmbeddingClient>) -> Self {
        Self {
            storage,
            embeddings,
            temporal: TemporalParser::new(),
        }
    }

    /// Retrieve the `top_k` most relevant passages for `query`.
    ///
    /// The timezone is accepted for API compatibility; temporal phrases are
    /// resolved in UTC (see [`TemporalParser::parse`]).
    pub async fn retrieve(
        &self,
        user_id: Uuid,
        query: &str,
        _timezone: &str,
        top_k: usize,
        vector_weight: f32,
        text_weight: f32,
    ) -> Result<Vec<RetrievedChunk>> {
        let (residual, interval) = self.temporal.parse(query, Utc::now());
        let residual = residual.trim();

        if let Some((start, end)) = interval {
            debug!(%start, %end, "Temporal filter active");
        }

        let query_embedding = self.embeddings.embed(residual).await?;

        let fetch = (top_k * 3) as i64;
        let (dense, sparse) = tokio::join!(
            self.storage
                .dense_search(user_id, &query_embedding, fetch, interval),
            self.storage
                .sparse_search(user_id, residual, fetch, interval),
        );

        let dense = dense?;
        // A rejected or failed sparse query degrades to dense-only.
        let sparse = match sparse {
            Ok(results) => results,
            Err(e) => {
                warn!("Sparse search contributed nothing: {}", e);
                Vec::new()
            }
        };

        debug!(
            dense = dense.len(),
            sparse = sparse.len(),
            "Merging search results"
        );

        let mut merged = fuse(dense, sparse, vector_weight, text_weight);
        merged.truncate(top_k);
        Ok(merged)
    }
}

/// Linear score fusion keyed by chunk id, sorted descending.
///
/// A chunk found by only one side contributes zero from the other, so
/// `score = vector_weight * dense + text_weight * sparse` always holds.
fn fuse(
    dense: Vec<(RetrievedChunk, f32)>,
    sparse: Vec<(RetrievedChunk, f32)>,
    vector_weight: f32,
    text_weight: f32,
) -> Vec<RetrievedChunk> {
    struct Scored {
        chunk: RetrievedChunk,
        dense: f32,
        sparse: f32,
    }

    let mut by_chunk: HashMap<Uuid, Scored> = HashMap::new();

    for (chunk, score) in dense {
        by_chunk.insert(
            chunk.chunk_id,
            Scored {
                chunk,
                dense: score,
                sparse: 0.0,
            },
        );
    }

    for (chunk, score) in sparse {
        by_chunk
            .entry(chunk.chunk_id)
            .and_modify(|s| s.sparse = score)
            .or_insert(Scored {
                chunk,
                dense: 0.0,
                sparse: score,
            });
    }

    let mut results: Vec<RetrievedChunk> = by_chunk
        .into_values()
        .map(|s| {
            let mut chunk = s.chunk;
            chunk.score = vector_weight * s.dense + text_weight * s.sparse;
            chunk
        })
        .collect();

    results.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    results
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(id: u128, text: &str) -> RetrievedChunk {
        RetrievedChunk {
            chunk_id: Uuid::from_u128(id),
            document_id: Uuid::from_u128(id + 1000),
            document_title: "Doc".to_string(),
            source_uri: None,
            source_type: SourceType::Text,
            text: text.to_string(),
            score: 0.0,
            page_start: None,
            page_end: None,
            time_start: None,
            time_end: None,
        }
    }

    #[test]
    fn test_fusion_combines_both_sides() {
        let dense = vec![(chunk(1, "a"), 0.8), (chunk(2, "b"), 0.6)];
        let sparse = vec![(chunk(1, "a"), 1.0), (chunk(3, "c"), 0.9)];

        let results = fuse(dense, sparse, 0.7, 0.3);

        assert_eq!(results.len(), 3);
        let by_id: HashMap<Uuid, f32> =
            results.iter().map(|c| (c.chunk_id, c.score)).collect();

        // Found by both: weighted sum of both contributions.
        let expected = 0.7 * 0.8 + 0.3 * 1.0;
        assert!((by_id[&Uuid::from_u128(1)] - expected).abs() < 1e-6);
        // Dense-only: sparse contributes zero.
        assert!((by_id[&Uuid::from_u128(2)] - 0.7 * 0.6).abs() < 1e-6);
        // Sparse-only: dense contributes zero.
        assert!((by_id[&Uuid::from_u128(3)] - 0.3 * 0.9).abs() < 1e-6);
    }

    #[test]
    fn test_fusion_sorts_descending() {
        let dense = vec![(chunk(1, "low"), 0.1), (chunk(2, "high"), 0.9)];
        let results = fuse(dense, Vec::new(), 0.7, 0.3);

        assert_eq!(results[0].chunk_id, Uuid::from_u128(2));
        assert!(results[0].score >= results[1].score);
    }

    #[test]
    fn test_fusion_is_linear_in_weights() {
        let d = 0.5f32;
        let s = 0.4f32;
        for (vw, tw) in [(1.0f32, 0.0f32), (0.0, 1.0), (0.7, 0.3), (0.5, 0.5)] {
            let results = fuse(vec![(chunk(1, "x"), d)], vec![(chunk(1, "x"), s)], vw, tw);
            assert!((results[0].score - (vw * d + tw * s)).abs() < 1e-6);
        }
    }

    #[test]
    fn test_fusion_empty_inputs() {
        let results = fuse(Vec::new(), Vec::new(), 0.7, 0.3);
        assert!(results.is_empty());
    }

    #[test]
    fn test_fusion_order_independent() {
        let dense = vec![(chunk(1, "a"), 0.8), (chunk(2, "b"), 0.3)];
        let sparse = vec![(chunk(2, "b"), 0.5), (chunk(1, "a"), 0.2)];

        let forward = fuse(dense.clone(), sparse.clone(), 0.7, 0.3);
        let mut reversed_dense = dense;
        reversed_dense.reverse();
        let mut reversed_sparse = sparse;
        reversed_sparse.reverse();
        let backward = fuse(reversed_dense, reversed_sparse, 0.7, 0.3);

        let f: Vec<(Uuid, f32)> = forward.iter().map(|c| (c.chunk_id, c.score)).collect();
        let b: Vec<(Uuid, f32)> = backward.iter().map(|c| (c.chunk_id, c.score)).collect();
        assert_eq!(f, b);
    }
}
