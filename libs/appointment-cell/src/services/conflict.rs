// libs/appointment-cell/src/services/conflict.rs
use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{Datelike, NaiveDate};
use tracing::debug;

use shared_models::auth::UserRole;
use shared_models::scheduling::{SessionType, SlotTime};
use shared_utils::clock::Clock;
use user_cell::{UserProfile, UserService};

use crate::models::{AppointmentError, AppointmentFilter, AppointmentStatus};
use crate::services::store::AppointmentRepository;

/// Read side of slot conflicts: which labels are taken, which are free.
/// Reservation itself is guarded inside the repository.
pub struct ConflictDetectionService {
    repository: Arc<dyn AppointmentRepository>,
    users: Arc<UserService>,
    session_minutes: u32,
    clock: Clock,
}

impl ConflictDetectionService {
    pub fn new(
        repository: Arc<dyn AppointmentRepository>,
        users: Arc<UserService>,
        session_minutes: u32,
        clock: Clock,
    ) -> Self {
        Self {
            repository,
            users,
            session_minutes,
            clock,
        }
    }

    /// Labels held by open appointments of `therapist` on `date`, in clock order.
    pub async fn booked_times(&self, therapist: &str, date: NaiveDate) -> Result<Vec<SlotTime>, AppointmentError> {
        let filter = AppointmentFilter {
            therapist_username: Some(therapist.to_string()),
            date: Some(date),
            statuses: AppointmentStatus::OPEN.to_vec(),
            ..Default::default()
        };
        let booked: BTreeSet<SlotTime> = self
            .repository
            .find(&filter)
            .await?
            .into_iter()
            .map(|appointment| appointment.time)
            .collect();

        debug!("{} has {} booked slots on {}", therapist, booked.len(), date);
        Ok(booked.into_iter().collect())
    }

    /// Session starts inside the therapist's published windows for that
    /// weekday and modality, minus booked and past ones.
    pub async fn open_slots(
        &self,
        therapist: &str,
        date: NaiveDate,
        session_type: SessionType,
    ) -> Result<Vec<SlotTime>, AppointmentError> {
        let profile = self.users.require_role(therapist, UserRole::Therapist).await?;
        let booked: BTreeSet<SlotTime> = self.booked_times(therapist, date).await?.into_iter().collect();
        let now = (self.clock)();

        let open: BTreeSet<SlotTime> = profile
            .availability
            .iter()
            .filter(|window| window.day == date.weekday() && window.session_type == session_type)
            .flat_map(|window| window.session_starts(self.session_minutes))
            .filter(|start| !booked.contains(start) && date.and_time(start.time()) > now)
            .collect();

        Ok(open.into_iter().collect())
    }

    /// Rejects slots in the past.
    pub fn ensure_future(&self, date: NaiveDate, time: SlotTime) -> Result<(), AppointmentError> {
        if date.and_time(time.time()) <= (self.clock)() {
            return Err(AppointmentError::InvalidTime);
        }
        Ok(())
    }

    /// When the therapist publishes windows for this modality, the session
    /// must fit in one of them.
    pub fn ensure_within_availability(
        &self,
        therapist: &UserProfile,
        date: NaiveDate,
        time: SlotTime,
        session_type: SessionType,
    ) -> Result<(), AppointmentError> {
        if !therapist.has_availability_for(session_type) {
            return Ok(());
        }
        if therapist.is_available(date.weekday(), time, self.session_minutes, session_type) {
            Ok(())
        } else {
            Err(AppointmentError::OutsideAvailability {
                date,
                time,
                session_type,
            })
        }
    }
}
