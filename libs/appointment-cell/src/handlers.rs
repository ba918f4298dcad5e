// libs/appointment-cell/src/handlers.rs
use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_models::auth::User;
use shared_models::error::AppError;
use user_cell::CarePlanUpdate;

use crate::models::{
    AppointmentError, BookedTimesQuery, CancelAppointmentRequest, CreateAppointmentRequest,
    ListAppointmentsQuery, OpenSlotsQuery, PatientAppointmentsQuery, RescheduleAppointmentRequest,
    SessionNoteRequest,
};
use crate::router::AppointmentCellState;

impl From<AppointmentError> for AppError {
    fn from(error: AppointmentError) -> Self {
        match error {
            AppointmentError::NotFound | AppointmentError::PatientNotFound(_) => {
                AppError::NotFound(error.to_string())
            }
            AppointmentError::SlotTaken { .. }
            | AppointmentError::DuplicateBooking
            | AppointmentError::InvalidStatusTransition { .. }
            | AppointmentError::VersionConflict => AppError::Conflict(error.to_string()),
            AppointmentError::InvalidTime
            | AppointmentError::OutsideAvailability { .. }
            | AppointmentError::InvalidNoteIndex => AppError::ValidationError(error.to_string()),
            AppointmentError::ValidationError(msg) => AppError::ValidationError(msg),
            AppointmentError::Unauthorized(msg) => AppError::Forbidden(msg),
            AppointmentError::DatabaseError(msg) => AppError::Database(msg),
        }
    }
}

// ==============================================================================
// BOOKING AND LISTING
// ==============================================================================

#[axum::debug_handler]
pub async fn create_appointment(
    State(state): State<AppointmentCellState>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateAppointmentRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let appointment = state.appointments.create_appointment(&user, request).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Appointment created successfully",
            "appointment": appointment,
        })),
    ))
}

#[axum::debug_handler]
pub async fn list_appointments(
    State(state): State<AppointmentCellState>,
    Extension(user): Extension<User>,
    Query(query): Query<ListAppointmentsQuery>,
) -> Result<Json<Value>, AppError> {
    let appointments = state
        .appointments
        .list_appointments(&user, &query.username, query.role)
        .await?;

    Ok(Json(json!({
        "appointments": appointments,
        "total": appointments.len(),
    })))
}

#[axum::debug_handler]
pub async fn get_booked_times(
    State(state): State<AppointmentCellState>,
    Extension(_user): Extension<User>,
    Query(query): Query<BookedTimesQuery>,
) -> Result<Json<Value>, AppError> {
    let booked = state.appointments.booked_times(&query.therapist, query.date).await?;

    Ok(Json(json!({ "booked_times": booked })))
}

#[axum::debug_handler]
pub async fn get_open_slots(
    State(state): State<AppointmentCellState>,
    Extension(_user): Extension<User>,
    Query(query): Query<OpenSlotsQuery>,
) -> Result<Json<Value>, AppError> {
    let slots = state
        .appointments
        .open_slots(&query.therapist, query.date, query.session_type)
        .await?;

    Ok(Json(json!({
        "therapist": query.therapist,
        "date": query.date,
        "session_type": query.session_type,
        "open_slots": slots,
    })))
}

#[axum::debug_handler]
pub async fn get_appointment(
    State(state): State<AppointmentCellState>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let appointment = state.appointments.get_appointment(&user, appointment_id).await?;

    Ok(Json(json!({ "appointment": appointment })))
}

// ==============================================================================
// STATUS TRANSITIONS
// ==============================================================================

#[axum::debug_handler]
pub async fn accept_appointment(
    State(state): State<AppointmentCellState>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let appointment = state.appointments.accept_appointment(&user, appointment_id).await?;

    Ok(Json(json!({
        "message": "Appointment accepted",
        "appointment": appointment,
    })))
}

#[axum::debug_handler]
pub async fn reject_appointment(
    State(state): State<AppointmentCellState>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let appointment = state.appointments.reject_appointment(&user, appointment_id).await?;

    Ok(Json(json!({
        "message": "Appointment rejected",
        "appointment": appointment,
    })))
}

#[axum::debug_handler]
pub async fn cancel_appointment(
    State(state): State<AppointmentCellState>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
    body: Option<Json<CancelAppointmentRequest>>,
) -> Result<Json<Value>, AppError> {
    let request = body.map(|Json(request)| request).unwrap_or_default();
    let appointment = state
        .appointments
        .cancel_appointment(&user, appointment_id, request)
        .await?;

    Ok(Json(json!({
        "message": "Appointment canceled",
        "appointment": appointment,
    })))
}

#[axum::debug_handler]
pub async fn reschedule_appointment(
    State(state): State<AppointmentCellState>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
    Json(request): Json<RescheduleAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let appointment = state
        .appointments
        .reschedule_appointment(&user, appointment_id, request)
        .await?;

    Ok(Json(json!({
        "message": "Appointment rescheduled, pending acceptance",
        "appointment": appointment,
    })))
}

#[axum::debug_handler]
pub async fn finish_appointment(
    State(state): State<AppointmentCellState>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let appointment = state.appointments.finish_appointment(&user, appointment_id).await?;

    Ok(Json(json!({
        "message": "Appointment finished",
        "appointment": appointment,
    })))
}

// ==============================================================================
// SESSION NOTES
// ==============================================================================

#[axum::debug_handler]
pub async fn add_session_note(
    State(state): State<AppointmentCellState>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
    Json(request): Json<SessionNoteRequest>,
) -> Result<Json<Value>, AppError> {
    let appointment = state
        .appointments
        .add_session_note(&user, appointment_id, &request.note)
        .await?;

    Ok(Json(json!({
        "message": "Note added",
        "appointment": appointment,
    })))
}

#[axum::debug_handler]
pub async fn delete_session_note(
    State(state): State<AppointmentCellState>,
    Extension(user): Extension<User>,
    Path((appointment_id, index)): Path<(Uuid, usize)>,
) -> Result<Json<Value>, AppError> {
    let appointment = state
        .appointments
        .delete_session_note(&user, appointment_id, index)
        .await?;

    Ok(Json(json!({
        "message": "Note deleted",
        "appointment": appointment,
    })))
}

// ==============================================================================
// THERAPIST PATIENTS
// ==============================================================================

#[axum::debug_handler]
pub async fn list_patients(
    State(state): State<AppointmentCellState>,
    Extension(user): Extension<User>,
    Path(therapist): Path<String>,
) -> Result<Json<Value>, AppError> {
    let patients = state.appointments.list_patients(&user, &therapist).await?;

    Ok(Json(json!({ "patients": patients })))
}

#[axum::debug_handler]
pub async fn get_patient_appointments(
    State(state): State<AppointmentCellState>,
    Extension(user): Extension<User>,
    Path((therapist, patient)): Path<(String, String)>,
    Query(query): Query<PatientAppointmentsQuery>,
) -> Result<Json<Value>, AppError> {
    let page = state
        .appointments
        .patient_appointments(&user, &therapist, &patient, query.page)
        .await?;

    Ok(Json(json!(page)))
}

#[axum::debug_handler]
pub async fn manage_patient(
    State(state): State<AppointmentCellState>,
    Extension(user): Extension<User>,
    Path(patient): Path<String>,
    Json(update): Json<CarePlanUpdate>,
) -> Result<Json<Value>, AppError> {
    let profile = state.appointments.manage_patient(&user, &patient, update).await?;

    Ok(Json(json!({
        "message": "Patient info updated",
        "patient": profile,
    })))
}
