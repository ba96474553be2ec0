//! Chat endpoints: grounded answers over the knowledge base, with an SSE
//! streaming variant

use std::convert::Infallible;

use axum::extract::{Path, State};
use axum::http::{header, HeaderMap};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::Json;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::warn;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{HindsightError, Result};
use crate::llm::{AnswerService, ChatMessage, Citation};
use crate::model::{Conversation, Message};

use super::{current_user_id, AppState};

/// Passages retrieved per chat turn
const CHAT_TOP_K: usize = 5;

#[derive(Debug, Deserialize, ToSchema)]
pub struct ChatRequest {
    pub message: String,
    pub conversation_id: Option<Uuid>,
    /// Accepted for temporal queries; resolution is UTC
    pub timezone: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ChatResponse {
    pub conversation_id: Uuid,
    pub message_id: Uuid,
    pub content: String,
    pub citations: Vec<Citation>,
}

/// A conversation with its messages
#[derive(Debug, Serialize, ToSchema)]
pub struct ConversationDetail {
    pub id: Uuid,
    pub title: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
    pub messages: Vec<Message>,
}

/// Ask a question and get a grounded answer with citations
#[utoipa::path(
    post,
    path = "/chat",
    request_body = ChatRequest,
    responses(
        (status = 200, description = "Answer with citations", body = ChatResponse),
        (status = 404, description = "Conversation not found")
    )
)]
pub async fn chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>> {
    let user_id = current_user_id(&state, &headers).await?;
    let (conversation, history) = resolve_conversation(&state, user_id, &request).await?;

    let timezone = request.timezone.as_deref().unwrap_or("UTC");
    let chunks = state
        .retrieval
        .retrieve(
            user_id,
            &request.message,
            timezone,
            CHAT_TOP_K,
            crate::retrieval::DEFAULT_VECTOR_WEIGHT,
            crate::retrieval::DEFAULT_TEXT_WEIGHT,
        )
        .await?;

    let (answer, citations) = state
        .answers
        .generate_answer(&request.message, &chunks, &history)
        .await?;

    state
        .storage
        .insert_message(conversation.id, "user", &request.message, None)
        .await?;
    let assistant_message = state
        .storage
        .insert_message(
            conversation.id,
            "assistant",
            &answer,
            Some(serde_json::to_value(&citations)?),
        )
        .await?;

    Ok(Json(ChatResponse {
        conversation_id: conversation.id,
        message_id: assistant_message.id,
        content: answer,
        citations,
    }))
}

/// Ask a question and stream the answer as server-sent events.
///
/// Event order: `start`, `citations`, zero or more `token`s, `done`. The
/// user message is committed before streaming begins; the assistant
/// message is persisted only once the token stream is exhausted, so a
/// cancelled stream leaves no partial message behind.
#[utoipa::path(
    post,
    path = "/chat/stream",
    request_body = ChatRequest,
    responses(
        (status = 200, description = "SSE stream of answer events"),
        (status = 404, description = "Conversation not found")
    )
)]
pub async fn chat_stream(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<ChatRequest>,
) -> Result<impl IntoResponse> {
    let user_id = current_user_id(&state, &headers).await?;
    let (conversation, history) = resolve_conversation(&state, user_id, &request).await?;

    let timezone = request.timezone.as_deref().unwrap_or("UTC");
    let chunks = state
        .retrieval
        .retrieve(
            user_id,
            &request.message,
            timezone,
            CHAT_TOP_K,
            crate::retrieval::DEFAULT_VECTOR_WEIGHT,
            crate::retrieval::DEFAULT_TEXT_WEIGHT,
        )
        .await?;

    let citations = AnswerService::build_citations(&chunks);
    let citations_json = serde_json::to_value(&citations)?;

    // Commit the user turn before any event is emitted.
    state
        .storage
        .insert_message(conversation.id, "user", &request.message, None)
        .await?;

    let mut tokens = state
        .answers
        .stream_answer(&request.message, &chunks, &history)
        .await?;

    let (tx, rx) = mpsc::channel::<std::result::Result<Event, Infallible>>(64);
    let storage = state.storage.clone();
    let conversation_id = conversation.id;

    tokio::spawn(async move {
        let start = json!({ "type": "start", "conversation_id": conversation_id });
        if tx.send(Ok(Event::default().data(start.to_string()))).await.is_err() {
            return;
        }

        let citations_event = json!({ "type": "citations", "citations": citations_json.clone() });
        if tx
            .send(Ok(Event::default().data(citations_event.to_string())))
            .await
            .is_err()
        {
            return;
        }

        let mut full_response = String::new();
        while let Some(item) = tokens.next().await {
            match item {
                Ok(token) => {
                    full_response.push_str(&token);
                    let event = json!({ "type": "token", "token": token });
                    if tx.send(Ok(Event::default().data(event.to_string()))).await.is_err() {
                        // Client went away mid-stream: persist nothing.
                        return;
                    }
                }
                Err(e) => {
                    warn!("Answer stream failed: {}", e);
                    return;
                }
            }
        }

        // Stream exhausted cleanly: persist the assistant turn, then ack.
        match storage
            .insert_message(
                conversation_id,
                "assistant",
                &full_response,
                Some(citations_json),
            )
            .await
        {
            Ok(message) => {
                let done = json!({ "type": "done", "message_id": message.id });
                let _ = tx.send(Ok(Event::default().data(done.to_string()))).await;
            }
            Err(e) => warn!("Could not persist assistant message: {}", e),
        }
    });

    let sse = Sse::new(ReceiverStream::new(rx)).keep_alive(KeepAlive::default());
    Ok((
        [
            (header::CACHE_CONTROL, "no-cache"),
            (header::CONNECTION, "keep-alive"),
        ],
        sse,
    ))
}

/// List the caller's conversations
#[utoipa::path(
    get,
    path = "/chat/conversations",
    responses((status = 200, description = "Conversations", body = [Conversation]))
)]
pub async fn list_conversations(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<Conversation>>> {
    let user_id = current_user_id(&state, &headers).await?;
    let conversations = state.storage.list_conversations(user_id).await?;
    Ok(Json(conversations))
}

/// Get a conversation with all its messages
#[utoipa::path(
    get,
    path = "/chat/conversations/{conversation_id}",
    params(("conversation_id" = Uuid, Path, description = "Conversation id")),
    responses(
        (status = 200, description = "Conversation", body = ConversationDetail),
        (status = 404, description = "Conversation not found")
    )
)]
pub async fn get_conversation(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(conversation_id): Path<Uuid>,
) -> Result<Json<ConversationDetail>> {
    let user_id = current_user_id(&state, &headers).await?;

    let conversation = state
        .storage
        .get_conversation(user_id, conversation_id)
        .await?
        .ok_or_else(|| HindsightError::NotFound("Conversation not found".to_string()))?;
    let messages = state.storage.get_messages(conversation_id).await?;

    Ok(Json(ConversationDetail {
        id: conversation.id,
        title: conversation.title,
        created_at: conversation.created_at,
        updated_at: conversation.updated_at,
        messages,
    }))
}

/// Delete a conversation and its messages
#[utoipa::path(
    delete,
    path = "/chat/conversations/{conversation_id}",
    params(("conversation_id" = Uuid, Path, description = "Conversation id")),
    responses(
        (status = 200, description = "Deleted"),
        (status = 404, description = "Conversation not found")
    )
)]
pub async fn delete_conversation(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(conversation_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>> {
    let user_id = current_user_id(&state, &headers).await?;

    let deleted = state
        .storage
        .delete_conversation(user_id, conversation_id)
        .await?;
    if !deleted {
        return Err(HindsightError::NotFound("Conversation not found".to_string()));
    }

    Ok(Json(json!({
        "status": "deleted",
        "conversation_id": conversation_id,
    })))
}

/// Load an existing conversation (404 when missing or foreign) or create a
/// fresh one titled after the first message.
async fn resolve_conversation(
    state: &AppState,
    user_id: Uuid,
    request: &ChatRequest,
) -> Result<(Conversation, Vec<ChatMessage>)> {
    if let Some(id) = request.conversation_id {
        let conversation = state
            .storage
            .get_conversation(user_id, id)
            .await?
            .ok_or_else(|| HindsightError::NotFound("Conversation not found".to_string()))?;

        let history = state
            .storage
            .get_messages(id)
            .await?
            .into_iter()
            .map(|m| ChatMessage::new(&m.role, m.content))
            .collect();

        Ok((conversation, history))
    } else {
        let title: String = request.message.chars().take(100).collect();
        let conversation = state
            .storage
            .create_conversation(user_id, Some(&title))
            .await?;
        Ok((conversation, Vec::new()))
    }
}
