// libs/user-cell/src/handlers.rs
use axum::{
    extract::{Extension, Path, State},
    Json,
};
use serde_json::{json, Value};
use tracing::info;

use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{ReplaceAvailabilityRequest, UpsertProfileRequest, UserError};
use crate::router::UserCellState;

impl From<UserError> for AppError {
    fn from(error: UserError) -> Self {
        match error {
            UserError::NotFound(_) => AppError::NotFound(error.to_string()),
            UserError::RoleMismatch { .. }
            | UserError::InvalidUsername(_)
            | UserError::ValidationError(_) => AppError::ValidationError(error.to_string()),
            UserError::Unauthorized(msg) => AppError::Forbidden(msg),
            UserError::DatabaseError(msg) => AppError::Database(msg),
        }
    }
}

#[axum::debug_handler]
pub async fn get_user_info(
    State(state): State<UserCellState>,
    Extension(_user): Extension<User>,
    Path(username): Path<String>,
) -> Result<Json<Value>, AppError> {
    let profile = state.users.get_profile(&username).await?;

    Ok(Json(json!({
        "user": profile,
        "full_name": profile.display_name(),
    })))
}

#[axum::debug_handler]
pub async fn update_profile(
    State(state): State<UserCellState>,
    Extension(user): Extension<User>,
    Path(username): Path<String>,
    Json(request): Json<UpsertProfileRequest>,
) -> Result<Json<Value>, AppError> {
    let profile = state.users.upsert_profile(&user, &username, request).await?;

    Ok(Json(json!({
        "message": "Profile updated",
        "user": profile,
    })))
}

#[axum::debug_handler]
pub async fn list_therapists(
    State(state): State<UserCellState>,
    Extension(_user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let therapists = state.users.list_therapists().await?;

    Ok(Json(json!({
        "therapists": therapists,
        "total": therapists.len(),
    })))
}

#[axum::debug_handler]
pub async fn get_therapist_availability(
    State(state): State<UserCellState>,
    Extension(_user): Extension<User>,
    Path(therapist_username): Path<String>,
) -> Result<Json<Value>, AppError> {
    let slots = state.users.get_availability(&therapist_username).await?;
    if slots.is_empty() {
        return Err(AppError::NotFound(format!(
            "Therapist {} has no availability set",
            therapist_username
        )));
    }

    Ok(Json(json!({ "slots": slots })))
}

#[axum::debug_handler]
pub async fn replace_therapist_availability(
    State(state): State<UserCellState>,
    Extension(user): Extension<User>,
    Path(therapist_username): Path<String>,
    Json(request): Json<ReplaceAvailabilityRequest>,
) -> Result<Json<Value>, AppError> {
    let slots = state
        .users
        .replace_availability(&user, &therapist_username, request.slots)
        .await?;

    info!("{} published {} availability windows", therapist_username, slots.len());

    Ok(Json(json!({
        "message": "Availability updated",
        "slots": slots,
    })))
}
