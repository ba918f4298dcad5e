use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::models::{Appointment, AppointmentError, AppointmentFilter};

/// Appointment persistence. Implementations must keep reservation and
/// updates atomic with respect to the open-slot and open-pair rules.
#[async_trait]
pub trait AppointmentRepository: Send + Sync {
    /// Inserts a new appointment unless it clashes with an open one.
    async fn reserve(&self, appointment: Appointment) -> Result<Appointment, AppointmentError>;

    async fn get(&self, id: Uuid) -> Result<Appointment, AppointmentError>;

    /// Writes `appointment` only if the stored version still equals
    /// `expected_version`; the stored copy gets `expected_version + 1`.
    async fn update(
        &self,
        expected_version: i64,
        appointment: Appointment,
    ) -> Result<Appointment, AppointmentError>;

    /// Newest first.
    async fn find(&self, filter: &AppointmentFilter) -> Result<Vec<Appointment>, AppointmentError>;
}

#[derive(Default)]
pub struct InMemoryAppointmentStore {
    appointments: RwLock<HashMap<Uuid, Appointment>>,
}

impl InMemoryAppointmentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn first_clash<'a>(
    existing: impl Iterator<Item = &'a Appointment>,
    candidate: &Appointment,
) -> Option<AppointmentError> {
    existing.filter_map(|other| candidate.clashes_with(other)).next()
}

#[async_trait]
impl AppointmentRepository for InMemoryAppointmentStore {
    async fn reserve(&self, mut appointment: Appointment) -> Result<Appointment, AppointmentError> {
        // Check and insert under one write guard.
        let mut appointments = self.appointments.write().await;
        if let Some(clash) = first_clash(appointments.values(), &appointment) {
            return Err(clash);
        }
        appointment.version = 1;
        appointments.insert(appointment.id, appointment.clone());
        debug!("Reserved {} for {} on {} at {}", appointment.id, appointment.therapist_username, appointment.date, appointment.time);
        Ok(appointment)
    }

    async fn get(&self, id: Uuid) -> Result<Appointment, AppointmentError> {
        self.appointments
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(AppointmentError::NotFound)
    }

    async fn update(
        &self,
        expected_version: i64,
        mut appointment: Appointment,
    ) -> Result<Appointment, AppointmentError> {
        let mut appointments = self.appointments.write().await;
        let stored = appointments.get(&appointment.id).ok_or(AppointmentError::NotFound)?;
        if stored.version != expected_version {
            return Err(AppointmentError::VersionConflict);
        }
        if let Some(clash) = first_clash(appointments.values(), &appointment) {
            return Err(clash);
        }
        appointment.version = expected_version + 1;
        appointments.insert(appointment.id, appointment.clone());
        Ok(appointment)
    }

    async fn find(&self, filter: &AppointmentFilter) -> Result<Vec<Appointment>, AppointmentError> {
        let appointments = self.appointments.read().await;
        let mut matching: Vec<Appointment> = appointments
            .values()
            .filter(|appointment| filter.matches(appointment))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(matching)
    }
}
