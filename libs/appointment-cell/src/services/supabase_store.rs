use async_trait::async_trait;
use reqwest::Method;
use serde_json::json;
use tracing::{debug, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::{rest_path, DatabaseError, Prefer, SupabaseClient};

use crate::models::{Appointment, AppointmentError, AppointmentFilter};
use crate::services::store::AppointmentRepository;

const APPOINTMENTS_TABLE: &str = "appointments";
/// Name of the partial unique index on open (patient, therapist) pairs.
const OPEN_PAIR_INDEX: &str = "appointments_open_pair_idx";

/// PostgREST-backed store. The open-slot and open-pair rules are enforced
/// by partial unique indexes, which surface here as HTTP 409.
pub struct SupabaseAppointmentStore {
    supabase: SupabaseClient,
}

impl SupabaseAppointmentStore {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }
}

fn map_db_error(error: DatabaseError, appointment: &Appointment) -> AppointmentError {
    match error {
        DatabaseError::Conflict(body) if body.contains(OPEN_PAIR_INDEX) => AppointmentError::DuplicateBooking,
        DatabaseError::Conflict(_) => AppointmentError::SlotTaken {
            therapist: appointment.therapist_username.clone(),
            date: appointment.date,
            time: appointment.time,
        },
        other => AppointmentError::DatabaseError(other.to_string()),
    }
}

fn filter_params(filter: &AppointmentFilter) -> Vec<(&'static str, String)> {
    let mut params = Vec::new();
    if let Some(patient) = &filter.patient_username {
        params.push(("patient_username", format!("eq.{}", patient)));
    }
    if let Some(therapist) = &filter.therapist_username {
        params.push(("therapist_username", format!("eq.{}", therapist)));
    }
    if let Some(date) = filter.date {
        params.push(("date", format!("eq.{}", date)));
    }
    if !filter.statuses.is_empty() {
        let statuses: Vec<String> = filter.statuses.iter().map(|s| s.to_string()).collect();
        params.push(("status", format!("in.({})", statuses.join(","))));
    }
    params.push(("order", "created_at.desc".to_string()));
    params
}

#[async_trait]
impl AppointmentRepository for SupabaseAppointmentStore {
    async fn reserve(&self, mut appointment: Appointment) -> Result<Appointment, AppointmentError> {
        appointment.version = 1;
        let rows: Vec<Appointment> = self
            .supabase
            .request(
                Method::POST,
                &rest_path(APPOINTMENTS_TABLE, &[]),
                Some(json!(appointment)),
                Some(Prefer::ReturnRepresentation),
            )
            .await
            .map_err(|e| map_db_error(e, &appointment))?;

        rows.into_iter()
            .next()
            .ok_or_else(|| AppointmentError::DatabaseError("Insert returned no rows".to_string()))
    }

    async fn get(&self, id: Uuid) -> Result<Appointment, AppointmentError> {
        let path = rest_path(APPOINTMENTS_TABLE, &[("id", format!("eq.{}", id))]);
        let rows: Vec<Appointment> = self
            .supabase
            .request(Method::GET, &path, None, None)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        rows.into_iter().next().ok_or(AppointmentError::NotFound)
    }

    async fn update(
        &self,
        expected_version: i64,
        mut appointment: Appointment,
    ) -> Result<Appointment, AppointmentError> {
        appointment.version = expected_version + 1;
        let path = rest_path(
            APPOINTMENTS_TABLE,
            &[
                ("id", format!("eq.{}", appointment.id)),
                ("version", format!("eq.{}", expected_version)),
            ],
        );
        let rows: Vec<Appointment> = self
            .supabase
            .request(
                Method::PATCH,
                &path,
                Some(json!(appointment)),
                Some(Prefer::ReturnRepresentation),
            )
            .await
            .map_err(|e| map_db_error(e, &appointment))?;

        match rows.into_iter().next() {
            Some(stored) => Ok(stored),
            None => {
                // Nothing matched: either gone or someone else wrote first.
                self.get(appointment.id).await?;
                warn!("Version {} of appointment {} is stale", expected_version, appointment.id);
                Err(AppointmentError::VersionConflict)
            }
        }
    }

    async fn find(&self, filter: &AppointmentFilter) -> Result<Vec<Appointment>, AppointmentError> {
        let path = rest_path(APPOINTMENTS_TABLE, &filter_params(filter));
        debug!("Querying appointments: {}", path);
        self.supabase
            .request(Method::GET, &path, None, None)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))
    }
}
