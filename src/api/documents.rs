//! Document listing, inspection and deletion

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::error::{HindsightError, Result};
use crate::model::{Chunk, Document, SourceType};

use super::{current_user_id, AppState};

#[derive(Debug, Deserialize, IntoParams)]
pub struct ListDocumentsParams {
    /// Filter by source type
    pub source_type: Option<String>,
    /// Page size, 1-100
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DocumentListResponse {
    pub documents: Vec<Document>,
    pub total: i64,
}

/// List the caller's documents, newest first
#[utoipa::path(
    get,
    path = "/documents",
    params(ListDocumentsParams),
    responses((status = 200, description = "Documents", body = DocumentListResponse))
)]
pub async fn list_documents(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<ListDocumentsParams>,
) -> Result<Json<DocumentListResponse>> {
    let user_id = current_user_id(&state, &headers).await?;

    let source_type = params
        .source_type
        .as_deref()
        .map(|s| {
            SourceType::parse(s)
                .ok_or_else(|| HindsightError::Validation(format!("invalid source_type: {}", s)))
        })
        .transpose()?;

    let limit = params.limit.unwrap_or(50).clamp(1, 100);
    let offset = params.offset.unwrap_or(0).max(0);

    let (documents, total) = state
        .storage
        .list_documents(user_id, source_type, limit, offset)
        .await?;

    Ok(Json(DocumentListResponse { documents, total }))
}

/// Get one document
#[utoipa::path(
    get,
    path = "/documents/{document_id}",
    params(("document_id" = Uuid, Path, description = "Document id")),
    responses(
        (status = 200, description = "Document", body = Document),
        (status = 404, description = "Document not found")
    )
)]
pub async fn get_document(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(document_id): Path<Uuid>,
) -> Result<Json<Document>> {
    let user_id = current_user_id(&state, &headers).await?;

    let doc = state
        .storage
        .get_document(user_id, document_id)
        .await?
        .ok_or_else(|| HindsightError::NotFound("Document not found".to_string()))?;
    Ok(Json(doc))
}

/// List a document's chunks in document order
#[utoipa::path(
    get,
    path = "/documents/{document_id}/chunks",
    params(("document_id" = Uuid, Path, description = "Document id")),
    responses(
        (status = 200, description = "Chunks", body = [Chunk]),
        (status = 404, description = "Document not found")
    )
)]
pub async fn get_document_chunks(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(document_id): Path<Uuid>,
) -> Result<Json<Vec<Chunk>>> {
    let user_id = current_user_id(&state, &headers).await?;

    state
        .storage
        .get_document(user_id, document_id)
        .await?
        .ok_or_else(|| HindsightError::NotFound("Document not found".to_string()))?;

    let chunks = state.storage.get_chunks(document_id).await?;
    Ok(Json(chunks))
}

/// Delete a document; its chunks, embeddings and jobs cascade
#[utoipa::path(
    delete,
    path = "/documents/{document_id}",
    params(("document_id" = Uuid, Path, description = "Document id")),
    responses(
        (status = 200, description = "Deleted"),
        (status = 404, description = "Document not found")
    )
)]
pub async fn delete_document(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(document_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>> {
    let user_id = current_user_id(&state, &headers).await?;

    let deleted = state.storage.delete_document(user_id, document_id).await?;
    if !deleted {
        return Err(HindsightError::NotFound("Document not found".to_string()));
    }

    Ok(Json(serde_json::json!({
        "status": "deleted",
        "document_id": document_id,
    })))
}
