use axum::{
    Json, Router,
    routing::get,
};
use serde_json::{json, Value};

use appointment_cell::{appointment_routes, therapist_patient_routes, AppointmentCellState};
use messaging_cell::{chat_routes, message_routes, MessagingCellState};
use notification_cell::{notification_routes, NotificationCellState};
use user_cell::{user_routes, UserCellState};

/// Per-cell state, built once at startup.
pub struct CellStates {
    pub users: UserCellState,
    pub appointments: AppointmentCellState,
    pub notifications: NotificationCellState,
    pub messaging: MessagingCellState,
}

pub fn create_router(cells: CellStates) -> Router {
    let api = Router::new()
        .nest("/appointments", appointment_routes(cells.appointments.clone()))
        .nest("/notifications", notification_routes(cells.notifications))
        .nest("/messages", message_routes(cells.messaging.clone()))
        .merge(user_routes(cells.users))
        .merge(therapist_patient_routes(cells.appointments));

    Router::new()
        .route("/", get(|| async { "SentiVoice API is running!" }))
        .route("/health", get(health))
        .nest("/api", api)
        .merge(chat_routes(cells.messaging))
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "sentivoice-api",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
