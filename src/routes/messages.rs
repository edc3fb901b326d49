use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use uuid::Uuid;

use crate::{
    dto::message_dto::{
        MarkReadResponse, SendMessagePayload, StartConversationPayload, UnreadCountResponse,
    },
    error::Result,
    middleware::auth::Claims,
    AppState,
};

/// Finds or creates the single conversation between the caller and `participant_id`.
#[utoipa::path(
    post,
    path = "/api/conversations",
    request_body = StartConversationPayload,
    responses(
        (status = 200, description = "Existing or new conversation", body = Json<Conversation>)
    )
)]
#[axum::debug_handler]
pub async fn start_conversation(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<StartConversationPayload>,
) -> Result<impl IntoResponse> {
    let conversation = state
        .messages
        .start_conversation(claims.profile_id, payload.participant_id)
        .await?;
    Ok(Json(conversation))
}

#[utoipa::path(
    get,
    path = "/api/conversations",
    responses(
        (status = 200, description = "Conversations with unread counts", body = Json<Vec<ConversationSummary>>)
    )
)]
#[axum::debug_handler]
pub async fn list_conversations(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse> {
    let conversations = state.messages.list_conversations(claims.profile_id).await?;
    Ok(Json(conversations))
}

#[utoipa::path(
    get,
    path = "/api/conversations/{id}",
    params(
        ("id" = Uuid, Path, description = "Conversation ID")
    ),
    responses(
        (status = 200, description = "Conversation found", body = Json<Conversation>),
        (status = 404, description = "Conversation not found")
    )
)]
#[axum::debug_handler]
pub async fn get_conversation(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let conversation = state.messages.get_conversation(claims.profile_id, id).await?;
    Ok(Json(conversation))
}

#[utoipa::path(
    get,
    path = "/api/conversations/{id}/messages",
    params(
        ("id" = Uuid, Path, description = "Conversation ID")
    ),
    responses(
        (status = 200, description = "Messages, oldest first", body = Json<Vec<Message>>)
    )
)]
#[axum::debug_handler]
pub async fn list_messages(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let messages = state.messages.messages(claims.profile_id, id).await?;
    Ok(Json(messages))
}

#[utoipa::path(
    post,
    path = "/api/conversations/{id}/messages",
    params(
        ("id" = Uuid, Path, description = "Conversation ID")
    ),
    request_body = SendMessagePayload,
    responses(
        (status = 201, description = "Message sent", body = Json<Message>),
        (status = 400, description = "Empty message")
    )
)]
#[axum::debug_handler]
pub async fn send_message(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Json(payload): Json<SendMessagePayload>,
) -> Result<impl IntoResponse> {
    let message = state.messages.send(claims.profile_id, id, payload).await?;
    Ok((StatusCode::CREATED, Json(message)))
}

#[utoipa::path(
    post,
    path = "/api/conversations/{id}/read",
    params(
        ("id" = Uuid, Path, description = "Conversation ID")
    ),
    responses(
        (status = 200, description = "Messages marked read", body = Json<MarkReadResponse>)
    )
)]
#[axum::debug_handler]
pub async fn mark_read(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let marked = state.messages.mark_read(claims.profile_id, id).await?;
    Ok(Json(MarkReadResponse { marked }))
}

#[utoipa::path(
    get,
    path = "/api/messages/unread-count",
    responses(
        (status = 200, description = "Unread messages addressed to the caller", body = Json<UnreadCountResponse>)
    )
)]
#[axum::debug_handler]
pub async fn unread_count(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse> {
    let unread_count = state.messages.unread_count(claims.profile_id).await?;
    Ok(Json(UnreadCountResponse { unread_count }))
}
