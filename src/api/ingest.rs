//! Ingestion endpoints

use axum::extract::{Multipart, Path, State};
use axum::http::HeaderMap;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{HindsightError, Result};
use crate::model::{Document, IngestionJob, SourceType};

use super::{current_user_id, AppState};

#[derive(Debug, Deserialize, ToSchema)]
pub struct IngestTextRequest {
    pub title: Option<String>,
    pub text: String,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct IngestUrlRequest {
    pub url: String,
}

/// Ingest plain text content
#[utoipa::path(
    post,
    path = "/ingest/text",
    request_body = IngestTextRequest,
    responses(
        (status = 200, description = "Document ingested", body = Document),
        (status = 500, description = "Ingestion failed")
    )
)]
pub async fn ingest_text(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<IngestTextRequest>,
) -> Result<Json<Document>> {
    let user_id = current_user_id(&state, &headers).await?;

    let doc = state
        .pipeline
        .ingest_text(user_id, &request.text, request.title, request.created_at)
        .await?;
    Ok(Json(doc))
}

/// Fetch a URL and ingest its content
#[utoipa::path(
    post,
    path = "/ingest/url",
    request_body = IngestUrlRequest,
    responses(
        (status = 200, description = "Document ingested", body = Document),
        (status = 500, description = "Fetch or ingestion failed")
    )
)]
pub async fn ingest_url(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<IngestUrlRequest>,
) -> Result<Json<Document>> {
    let user_id = current_user_id(&state, &headers).await?;

    let doc = state.pipeline.ingest_url(user_id, &request.url).await?;
    Ok(Json(doc))
}

/// Upload and ingest a file.
///
/// Multipart fields: `file` (required), `source_type` (one of audio, pdf,
/// markdown, text, image), `created_at` (optional RFC 3339 timestamp).
#[utoipa::path(
    post,
    path = "/ingest/file",
    responses(
        (status = 200, description = "Document ingested", body = Document),
        (status = 400, description = "Missing file or invalid source_type / created_at"),
        (status = 500, description = "Ingestion failed")
    )
)]
pub async fn ingest_file(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Json<Document>> {
    let user_id = current_user_id(&state, &headers).await?;

    let mut file: Option<(Vec<u8>, String)> = None;
    let mut source_type: Option<String> = None;
    let mut created_at: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| HindsightError::Validation(format!("invalid multipart body: {}", e)))?
    {
        match field.name() {
            Some("file") => {
                let filename = field
                    .file_name()
                    .unwrap_or("uploaded_file")
                    .to_string();
                let bytes = field.bytes().await.map_err(|e| {
                    HindsightError::Validation(format!("failed to read upload: {}", e))
                })?;
                file = Some((bytes.to_vec(), filename));
            }
            Some("source_type") => {
                source_type = Some(field.text().await.map_err(|e| {
                    HindsightError::Validation(format!("invalid source_type field: {}", e))
                })?);
            }
            Some("created_at") => {
                created_at = Some(field.text().await.map_err(|e| {
                    HindsightError::Validation(format!("invalid created_at field: {}", e))
                })?);
            }
            _ => {}
        }
    }

    let (bytes, filename) =
        file.ok_or_else(|| HindsightError::Validation("missing 'file' field".to_string()))?;

    let source_type = source_type
        .as_deref()
        .and_then(SourceType::parse)
        .ok_or_else(|| {
            HindsightError::Validation(
                "invalid source_type; must be one of: audio, pdf, markdown, web, text, image"
                    .to_string(),
            )
        })?;

    let created_at = created_at
        .map(|s| {
            DateTime::parse_from_rfc3339(&s)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|_| {
                    HindsightError::Validation(
                        "invalid created_at format; use RFC 3339".to_string(),
                    )
                })
        })
        .transpose()?;

    let doc = state
        .pipeline
        .ingest_file(user_id, bytes, &filename, source_type, created_at)
        .await?;
    Ok(Json(doc))
}

/// Get the status of an ingestion job
#[utoipa::path(
    get,
    path = "/ingest/jobs/{job_id}",
    params(("job_id" = Uuid, Path, description = "Ingestion job id")),
    responses(
        (status = 200, description = "Job state", body = IngestionJob),
        (status = 404, description = "Job not found")
    )
)]
pub async fn get_job(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(job_id): Path<Uuid>,
) -> Result<Json<IngestionJob>> {
    let user_id = current_user_id(&state, &headers).await?;

    let job = state
        .storage
        .get_job(user_id, job_id)
        .await?
        .ok_or_else(|| HindsightError::NotFound("Job not found".to_string()))?;
    Ok(Json(job))
}
