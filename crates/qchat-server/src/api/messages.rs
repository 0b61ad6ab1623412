use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::{error, info};

use qchat_crypto::{b64_decode, b64_encode};
use qchat_db::SqliteStore;
use qchat_db::models::MessageRow;
use qchat_types::api::{
    CreateChatRequest, CreateChatResponse, MessageQuery, MessageResponse, SendMessageRequest,
};
use qchat_types::{ConversationStore, Members, NewMessage, UserId};

use crate::error::ApiError;
use crate::state::AppState;

pub const MAX_PAGE: u32 = 200;

fn store(state: &AppState) -> Result<&SqliteStore, ApiError> {
    state.store.as_ref().ok_or(ApiError::WritesDisabled)
}

/// `POST /chats`
pub async fn create_chat(
    State(state): State<AppState>,
    Json(req): Json<CreateChatRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let store = store(&state)?;

    let [a, b]: [UserId; 2] = req
        .members
        .try_into()
        .map_err(|_| ApiError::Unprocessable("a chat has exactly two members".into()))?;
    let members = Members::new(a, b)
        .map_err(|e| ApiError::Unprocessable(format!("duplicate member {}", e.0)))?;
    let seed = b64_decode(&req.q_seed_b64)?;

    let conversation = store.create_conversation(members, seed).await?;
    info!("Chat {} created via API", conversation.id);

    Ok((
        StatusCode::CREATED,
        Json(CreateChatResponse {
            chat_id: conversation.id,
        }),
    ))
}

/// `POST /messages`: store one already-encrypted message.
pub async fn send_message(
    State(state): State<AppState>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let store = store(&state)?;

    let message = NewMessage {
        sender_id: req.sender_uid,
        iv: b64_decode(&req.iv_b64)?,
        ciphertext: b64_decode(&req.ct_b64)?,
    };
    let stored = store.append_message(&req.chat_id, message).await?;

    Ok((
        StatusCode::CREATED,
        Json(MessageResponse {
            message_id: stored.id,
            chat_id: stored.conversation_id,
            sender_uid: stored.sender_id,
            iv_b64: b64_encode(&stored.iv),
            ct_b64: b64_encode(&stored.ciphertext),
            created_at: stored.created_at,
        }),
    ))
}

/// `GET /messages?chat_id=&limit=`: latest messages, oldest first.
pub async fn list_messages(
    State(state): State<AppState>,
    Query(query): Query<MessageQuery>,
) -> Result<Json<Vec<MessageResponse>>, ApiError> {
    let db = store(&state)?.database().clone();
    let limit = query.limit.min(MAX_PAGE);
    let chat_id = query.chat_id;

    // Run blocking DB queries off the async runtime
    let rows = tokio::task::spawn_blocking(move || {
        if db.get_conversation(&chat_id)?.is_none() {
            return Ok(None);
        }
        db.get_messages(&chat_id, limit).map(Some)
    })
    .await
    .map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        ApiError::Internal(e.to_string())
    })?
    .map_err(|e| ApiError::Internal(e.to_string()))?
    .ok_or_else(|| ApiError::NotFound("chat not found".into()))?;

    Ok(Json(rows.into_iter().map(to_response).collect()))
}

fn to_response(row: MessageRow) -> MessageResponse {
    MessageResponse {
        message_id: row.id,
        chat_id: row.conversation_id,
        sender_uid: UserId::new(row.sender_id),
        iv_b64: row.iv_b64,
        ct_b64: row.ciphertext_b64,
        created_at: row.created_at,
    }
}
