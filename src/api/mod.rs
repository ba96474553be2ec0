//! REST API for the knowledge base
//!
//! Thin boundary over the core services: request binding, user resolution,
//! error translation and SSE framing live here; everything else is done by
//! the pipeline, retrieval and answer services the router state carries.

pub mod chat;
pub mod documents;
pub mod ingest;

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::error;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::embedding::EmbeddingClient;
use crate::error::{HindsightError, Result};
use crate::extract::{Transcriber, WebExtractor};
use crate::llm::AnswerService;
use crate::pipeline::IngestionPipeline;
use crate::retrieval::RetrievalService;
use crate::storage::Storage;

/// Identity used when no `X-User-Email` header is sent
pub const DEFAULT_USER_EMAIL: &str = "demo@hindsight.local";

/// Shared application state: one configured instance of every service,
/// constructed at startup and passed explicitly to handlers.
#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<Storage>,
    pub pipeline: Arc<IngestionPipeline>,
    pub retrieval: Arc<RetrievalService>,
    pub answers: Arc<AnswerService>,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub async fn new(config: AppConfig) -> Result<Self> {
        let config = Arc::new(config);

        let storage = Arc::new(
            Storage::connect(&config.database, config.provider.embedding_dimensions).await?,
        );
        storage.initialize().await?;

        let embeddings = Arc::new(EmbeddingClient::new(
            config.provider.api_base.clone(),
            config.provider.openai_api_key.clone(),
            config.provider.embedding_model.clone(),
            config.provider.embedding_dimensions,
        ));
        let transcriber = Arc::new(Transcriber::new(
            config.provider.api_base.clone(),
            config.provider.openai_api_key.clone(),
            config.provider.transcription_model.clone(),
        ));
        let web = Arc::new(WebExtractor::new());

        let pipeline = Arc::new(IngestionPipeline::new(
            storage.clone(),
            embeddings.clone(),
            transcriber,
            web,
            config.clone(),
        ));
        let retrieval = Arc::new(RetrievalService::new(storage.clone(), embeddings));
        let answers = Arc::new(AnswerService::new(
            config.provider.api_base.clone(),
            config.provider.openai_api_key.clone(),
            config.provider.llm_model.clone(),
            config.provider.max_context_tokens,
        ));

        Ok(Self {
            storage,
            pipeline,
            retrieval,
            answers,
            config,
        })
    }
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        ingest::ingest_text,
        ingest::ingest_url,
        ingest::ingest_file,
        ingest::get_job,
        documents::list_documents,
        documents::get_document,
        documents::get_document_chunks,
        documents::delete_document,
        chat::chat,
        chat::chat_stream,
        chat::list_conversations,
        chat::get_conversation,
        chat::delete_conversation,
    ),
    components(schemas(
        crate::model::Document,
        crate::model::Chunk,
        crate::model::IngestionJob,
        crate::model::Conversation,
        crate::model::Message,
        crate::model::SourceType,
        crate::model::JobStatus,
        crate::model::JobStage,
        crate::llm::Citation,
        ingest::IngestTextRequest,
        ingest::IngestUrlRequest,
        documents::DocumentListResponse,
        chat::ChatRequest,
        chat::ChatResponse,
        chat::ConversationDetail,
    )),
    info(
        title = "Hindsight API",
        description = "Personal knowledge base: ingestion, hybrid retrieval and grounded chat"
    )
)]
pub struct ApiDoc;

/// Build the application router
pub fn create_router(state: AppState) -> Router {
    let max_body = state.config.storage.max_file_size_mb * 1024 * 1024;

    Router::new()
        .route("/health", get(health))
        .route("/ingest/text", post(ingest::ingest_text))
        .route("/ingest/url", post(ingest::ingest_url))
        .route("/ingest/file", post(ingest::ingest_file))
        .route("/ingest/jobs/{job_id}", get(ingest::get_job))
        .route("/documents", get(documents::list_documents))
        .route(
            "/documents/{document_id}",
            get(documents::get_document).delete(documents::delete_document),
        )
        .route(
            "/documents/{document_id}/chunks",
            get(documents::get_document_chunks),
        )
        .route("/chat", post(chat::chat))
        .route("/chat/stream", post(chat::chat_stream))
        .route("/chat/conversations", get(chat::list_conversations))
        .route(
            "/chat/conversations/{conversation_id}",
            get(chat::get_conversation).delete(chat::delete_conversation),
        )
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(DefaultBodyLimit::max(max_body))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Resolve (and lazily create) the caller from the `X-User-Email` header
pub async fn current_user_id(state: &AppState, headers: &HeaderMap) -> Result<Uuid> {
    let email = headers
        .get("x-user-email")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.trim().is_empty())
        .unwrap_or(DEFAULT_USER_EMAIL);

    let user = state.storage.get_or_create_user(email).await?;
    Ok(user.id)
}

impl IntoResponse for HindsightError {
    fn into_response(self) -> Response {
        let status = match &self {
            HindsightError::Validation(_) => StatusCode::BAD_REQUEST,
            HindsightError::NotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!(category = self.category(), "Request failed: {}", self);
        }

        let body = Json(serde_json::json!({ "detail": self.to_string() }));
        (status, body).into_response()
    }
}
