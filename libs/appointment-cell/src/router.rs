// libs/appointment-cell/src/router.rs
use std::sync::Arc;

use axum::{
    Router,
    routing::{delete, get, put},
    middleware,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;
use crate::services::AppointmentBookingService;

#[derive(Clone)]
pub struct AppointmentCellState {
    pub config: Arc<AppConfig>,
    pub appointments: Arc<AppointmentBookingService>,
}

pub fn appointment_routes(state: AppointmentCellState) -> Router {
    // All appointment operations require authentication
    Router::new()
        .route("/", get(handlers::list_appointments).post(handlers::create_appointment))
        .route("/booked", get(handlers::get_booked_times))
        .route("/open-slots", get(handlers::get_open_slots))
        .route("/{appointment_id}", get(handlers::get_appointment))
        .route("/{appointment_id}/accept", put(handlers::accept_appointment))
        .route("/{appointment_id}/reject", put(handlers::reject_appointment))
        .route("/{appointment_id}/cancel", put(handlers::cancel_appointment))
        .route("/{appointment_id}/reschedule", put(handlers::reschedule_appointment))
        .route("/{appointment_id}/finish", put(handlers::finish_appointment))
        .route("/{appointment_id}/session-note", put(handlers::add_session_note))
        .route("/{appointment_id}/session-note/{index}", delete(handlers::delete_session_note))
        .layer(middleware::from_fn_with_state(state.config.clone(), auth_middleware))
        .with_state(state)
}

/// Routes a therapist uses to follow the patients they treat.
/// Merged at the API root next to the user directory routes.
pub fn therapist_patient_routes(state: AppointmentCellState) -> Router {
    Router::new()
        .route("/therapists/{username}/patients", get(handlers::list_patients))
        .route(
            "/therapists/{username}/patients/{patient}/appointments",
            get(handlers::get_patient_appointments),
        )
        .route("/therapists/manage-patient/{patient}", put(handlers::manage_patient))
        .layer(middleware::from_fn_with_state(state.config.clone(), auth_middleware))
        .with_state(state)
}
