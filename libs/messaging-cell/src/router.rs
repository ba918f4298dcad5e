// libs/messaging-cell/src/router.rs
use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post, put},
    middleware,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;
use crate::services::MessagingService;

#[derive(Clone)]
pub struct MessagingCellState {
    pub config: Arc<AppConfig>,
    pub messaging: Arc<MessagingService>,
}

/// REST routes, mounted under `/api/messages`.
pub fn message_routes(state: MessagingCellState) -> Router {
    Router::new()
        .route("/", post(handlers::send_message))
        .route("/mark-read", put(handlers::mark_read))
        .route("/unread-count/{username}", get(handlers::get_unread_count))
        .route("/{appointment_id}", get(handlers::get_messages))
        .layer(middleware::from_fn_with_state(state.config.clone(), auth_middleware))
        .with_state(state)
}

/// The chat socket authenticates itself during the upgrade.
pub fn chat_routes(state: MessagingCellState) -> Router {
    Router::new()
        .route("/ws", get(handlers::chat_socket))
        .with_state(state)
}
