// libs/notification-cell/src/router.rs
use std::sync::Arc;

use axum::{
    Router,
    routing::{get, put},
    middleware,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;
use crate::services::NotificationRepository;

#[derive(Clone)]
pub struct NotificationCellState {
    pub config: Arc<AppConfig>,
    pub repository: Arc<dyn NotificationRepository>,
}

pub fn notification_routes(state: NotificationCellState) -> Router {
    Router::new()
        .route("/{username}", get(handlers::get_notifications))
        .route("/{username}/unread-count", get(handlers::get_unread_count))
        .route("/{username}/mark-read", put(handlers::mark_all_read))
        .layer(middleware::from_fn_with_state(state.config.clone(), auth_middleware))
        .with_state(state)
}
