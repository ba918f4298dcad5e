// libs/notification-cell/src/handlers.rs
use axum::{
    extract::{Extension, Path, State},
    Json,
};
use serde_json::{json, Value};

use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::NotificationError;
use crate::router::NotificationCellState;

impl From<NotificationError> for AppError {
    fn from(error: NotificationError) -> Self {
        match error {
            NotificationError::Unauthorized(msg) => AppError::Forbidden(msg),
            NotificationError::DatabaseError(msg) => AppError::Database(msg),
        }
    }
}

fn ensure_owner(user: &User, username: &str) -> Result<(), NotificationError> {
    if user.can_act_as(username) {
        Ok(())
    } else {
        Err(NotificationError::Unauthorized(format!(
            "{} cannot read notifications of {}",
            user.username, username
        )))
    }
}

#[axum::debug_handler]
pub async fn get_notifications(
    State(state): State<NotificationCellState>,
    Extension(user): Extension<User>,
    Path(username): Path<String>,
) -> Result<Json<Value>, AppError> {
    ensure_owner(&user, &username)?;
    let notifications = state.repository.list_for(&username).await?;

    Ok(Json(json!({ "notifications": notifications })))
}

#[axum::debug_handler]
pub async fn get_unread_count(
    State(state): State<NotificationCellState>,
    Extension(user): Extension<User>,
    Path(username): Path<String>,
) -> Result<Json<Value>, AppError> {
    ensure_owner(&user, &username)?;
    let count = state.repository.unread_count(&username).await?;

    Ok(Json(json!({ "unread_count": count })))
}

#[axum::debug_handler]
pub async fn mark_all_read(
    State(state): State<NotificationCellState>,
    Extension(user): Extension<User>,
    Path(username): Path<String>,
) -> Result<Json<Value>, AppError> {
    ensure_owner(&user, &username)?;
    let updated = state.repository.mark_all_read(&username).await?;

    Ok(Json(json!({
        "message": "Marked all as read",
        "updated": updated,
    })))
}
