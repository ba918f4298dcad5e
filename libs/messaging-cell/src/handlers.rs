// libs/messaging-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
        Extension, Path, Query, State,
    },
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_models::auth::User;
use shared_models::error::AppError;
use shared_utils::extractor::{authenticate, bearer_token};

use crate::models::{MarkReadRequest, MessagingError, SendMessageRequest, ServerEvent};
use crate::router::MessagingCellState;
use crate::services::{ChatSession, MessagingService};

impl From<MessagingError> for AppError {
    fn from(error: MessagingError) -> Self {
        match error {
            MessagingError::AppointmentNotFound => AppError::NotFound("Appointment not found".to_string()),
            MessagingError::NotAccepted => {
                AppError::Forbidden("Cannot send message. Appointment not accepted.".to_string())
            }
            MessagingError::Unauthorized(msg) => AppError::Forbidden(msg),
            MessagingError::ValidationError(msg) => AppError::ValidationError(msg),
            MessagingError::Crypto(msg) => AppError::Internal(msg),
            MessagingError::DatabaseError(msg) => AppError::Database(msg),
        }
    }
}

// ==============================================================================
// HTTP HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn send_message(
    State(state): State<MessagingCellState>,
    Extension(user): Extension<User>,
    Json(request): Json<SendMessageRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let message = state.messaging.send_message(&user, request).await?;

    Ok((StatusCode::CREATED, Json(json!({ "message": message }))))
}

#[axum::debug_handler]
pub async fn get_messages(
    State(state): State<MessagingCellState>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let messages = state.messaging.list_messages(&user, appointment_id).await?;

    Ok(Json(json!({ "messages": messages })))
}

#[axum::debug_handler]
pub async fn get_unread_count(
    State(state): State<MessagingCellState>,
    Extension(user): Extension<User>,
    Path(username): Path<String>,
) -> Result<Json<Value>, AppError> {
    let count = state.messaging.unread_count(&user, &username).await?;

    Ok(Json(json!({ "unread_count": count })))
}

#[axum::debug_handler]
pub async fn mark_read(
    State(state): State<MessagingCellState>,
    Extension(user): Extension<User>,
    Json(request): Json<MarkReadRequest>,
) -> Result<Json<Value>, AppError> {
    let updated = state
        .messaging
        .mark_read(&user, request.appointment_id, &request.username)
        .await?;

    Ok(Json(json!({ "success": true, "updated": updated })))
}

// ==============================================================================
// WEBSOCKET CHAT
// ==============================================================================

#[derive(Debug, Deserialize)]
pub struct ChatSocketQuery {
    pub token: Option<String>,
}

/// Upgrades to a chat socket. Browsers cannot set headers on a WebSocket,
/// so the token may come as `?token=` instead of `Authorization`.
pub async fn chat_socket(
    State(state): State<MessagingCellState>,
    Query(query): Query<ChatSocketQuery>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Result<Response, AppError> {
    let user = match query.token.as_deref() {
        Some(token) => authenticate(token, &state.config)?,
        None => authenticate(bearer_token(&headers)?, &state.config)?,
    };

    info!("Chat socket accepted for {}", user.username);
    let messaging = Arc::clone(&state.messaging);
    Ok(ws
        .on_upgrade(move |socket| handle_socket(socket, user, messaging))
        .into_response())
}

async fn handle_socket(socket: WebSocket, user: User, messaging: Arc<MessagingService>) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerEvent>();

    let writer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let json = match serde_json::to_string(&event) {
                Ok(json) => json,
                Err(e) => {
                    warn!("Failed to encode chat event: {}", e);
                    continue;
                }
            };
            if sink.send(WsMessage::Text(json.into())).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    let mut session = ChatSession::new(user, messaging, tx);
    while let Some(frame) = stream.next().await {
        match frame {
            Ok(WsMessage::Text(text)) => session.handle_text(text.as_str()).await,
            Ok(WsMessage::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                debug!("Chat socket {} errored: {}", session.id(), e);
                break;
            }
        }
    }

    session.close().await;
    writer.abort();
}
