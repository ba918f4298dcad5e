// libs/user-cell/src/router.rs
use std::sync::Arc;

use axum::{
    Router,
    routing::get,
    middleware,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;
use crate::services::UserService;

#[derive(Clone)]
pub struct UserCellState {
    pub config: Arc<AppConfig>,
    pub users: Arc<UserService>,
}

pub fn user_routes(state: UserCellState) -> Router {
    Router::new()
        .route("/users/{username}", get(handlers::get_user_info).put(handlers::update_profile))
        .route("/therapists", get(handlers::list_therapists))
        .route(
            "/therapists/{username}/availability",
            get(handlers::get_therapist_availability).put(handlers::replace_therapist_availability),
        )
        .layer(middleware::from_fn_with_state(state.config.clone(), auth_middleware))
        .with_state(state)
}
