// libs/appointment-cell/src/services/booking.rs
use std::collections::HashMap;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use notification_cell::NotificationDispatcher;
use shared_config::AppConfig;
use shared_models::auth::{User, UserRole};
use shared_models::scheduling::{SessionType, SlotTime};
use shared_utils::clock::{clinic_clock, Clock};
use user_cell::{CarePlanUpdate, UserProfile, UserService};

use crate::models::{
    Appointment, AppointmentAction, AppointmentError, AppointmentFilter, AppointmentStatus,
    AppointmentView, CancelAppointmentRequest, CreateAppointmentRequest, PartyRole,
    PatientAppointmentsPage, RescheduleAppointmentRequest, SessionNote,
};
use crate::services::conflict::ConflictDetectionService;
use crate::services::lifecycle;
use crate::services::patients::TherapistPatientService;
use crate::services::store::AppointmentRepository;

/// Attempts at a read-modify-write before a version conflict is reported.
const MAX_WRITE_ATTEMPTS: usize = 3;

pub struct AppointmentBookingService {
    repository: Arc<dyn AppointmentRepository>,
    users: Arc<UserService>,
    notifier: NotificationDispatcher,
    conflicts: ConflictDetectionService,
    patients: TherapistPatientService,
    session_minutes: u32,
    clock: Clock,
}

impl AppointmentBookingService {
    pub fn new(
        config: &AppConfig,
        repository: Arc<dyn AppointmentRepository>,
        users: Arc<UserService>,
        notifier: NotificationDispatcher,
    ) -> Self {
        Self::with_clock(config, repository, users, notifier, clinic_clock(config.clinic_utc_offset_minutes))
    }

    pub fn with_clock(
        config: &AppConfig,
        repository: Arc<dyn AppointmentRepository>,
        users: Arc<UserService>,
        notifier: NotificationDispatcher,
        clock: Clock,
    ) -> Self {
        let conflicts = ConflictDetectionService::new(
            Arc::clone(&repository),
            Arc::clone(&users),
            config.session_duration_minutes,
            Arc::clone(&clock),
        );
        let patients = TherapistPatientService::new(Arc::clone(&repository), Arc::clone(&users));

        Self {
            repository,
            users,
            notifier,
            conflicts,
            patients,
            session_minutes: config.session_duration_minutes,
            clock,
        }
    }

    // ==========================================================================
    // BOOKING
    // ==========================================================================

    pub async fn create_appointment(
        &self,
        caller: &User,
        request: CreateAppointmentRequest,
    ) -> Result<Appointment, AppointmentError> {
        info!(
            "Booking {} for {} with {} on {} at {}",
            request.session_type, request.patient_username, request.therapist_username, request.date, request.time
        );

        let initiator = match PartyRole::from_user_role(caller.role) {
            Some(PartyRole::Patient) if caller.username == request.patient_username => PartyRole::Patient,
            Some(PartyRole::Therapist) if caller.username == request.therapist_username => PartyRole::Therapist,
            Some(_) => {
                return Err(AppointmentError::Unauthorized(format!(
                    "{} cannot book on behalf of others",
                    caller.username
                )))
            }
            None => request.initiator_role.unwrap_or(PartyRole::Patient),
        };

        self.users.require_role(&request.patient_username, UserRole::Patient).await?;
        let therapist = self.users.require_role(&request.therapist_username, UserRole::Therapist).await?;

        self.conflicts.ensure_future(request.date, request.time)?;
        self.conflicts
            .ensure_within_availability(&therapist, request.date, request.time, request.session_type)?;

        let appointment = self
            .repository
            .reserve(Appointment::new(
                &request.patient_username,
                &request.therapist_username,
                request.date,
                request.time,
                request.session_type,
                initiator,
            ))
            .await?;

        let initiator_name = appointment.username_of(initiator).to_string();
        let display = self.users.display_name(&initiator_name).await;
        self.notifier.notify(
            &initiator_name,
            format!(
                "Appointment created! (Date: {}, Time: {}, Pending)",
                appointment.date, appointment.time
            ),
            Some(appointment.id),
        );
        self.notifier.notify(
            appointment.username_of(initiator.counterparty()),
            format!(
                "New appointment request from {}. (Date: {}, Time: {})",
                display, appointment.date, appointment.time
            ),
            Some(appointment.id),
        );

        info!("Appointment {} booked as Pending", appointment.id);
        Ok(appointment)
    }

    pub async fn get_appointment(&self, caller: &User, id: Uuid) -> Result<Appointment, AppointmentError> {
        let appointment = self.repository.get(id).await?;
        if !caller.is_admin() && !appointment.involves(&caller.username) {
            return Err(AppointmentError::Unauthorized(format!(
                "{} is not a party to this appointment",
                caller.username
            )));
        }
        Ok(appointment)
    }

    /// Appointments of one party, newest first. Overdue sessions are
    /// finished before reading.
    pub async fn list_appointments(
        &self,
        caller: &User,
        username: &str,
        role: PartyRole,
    ) -> Result<Vec<AppointmentView>, AppointmentError> {
        if !caller.can_act_as(username) {
            return Err(AppointmentError::Unauthorized(format!(
                "{} cannot list appointments of {}",
                caller.username, username
            )));
        }

        if let Err(e) = self.finish_overdue().await {
            warn!("Auto-finish before listing failed: {}", e);
        }

        let filter = match role {
            PartyRole::Patient => AppointmentFilter {
                patient_username: Some(username.to_string()),
                ..Default::default()
            },
            PartyRole::Therapist => AppointmentFilter {
                therapist_username: Some(username.to_string()),
                ..Default::default()
            },
        };
        let appointments = self.repository.find(&filter).await?;

        let mut names: HashMap<String, String> = HashMap::new();
        let mut views = Vec::with_capacity(appointments.len());
        for appointment in appointments {
            let patient_full_name = self.cached_name(&mut names, &appointment.patient_username).await;
            let therapist_full_name = self.cached_name(&mut names, &appointment.therapist_username).await;
            views.push(AppointmentView {
                available_actions: lifecycle::valid_actions(appointment.status),
                appointment,
                patient_full_name,
                therapist_full_name,
            });
        }
        Ok(views)
    }

    async fn cached_name(&self, names: &mut HashMap<String, String>, username: &str) -> String {
        if let Some(name) = names.get(username) {
            return name.clone();
        }
        let name = self.users.display_name(username).await;
        names.insert(username.to_string(), name.clone());
        name
    }

    pub async fn booked_times(&self, therapist: &str, date: NaiveDate) -> Result<Vec<SlotTime>, AppointmentError> {
        self.conflicts.booked_times(therapist, date).await
    }

    pub async fn open_slots(
        &self,
        therapist: &str,
        date: NaiveDate,
        session_type: SessionType,
    ) -> Result<Vec<SlotTime>, AppointmentError> {
        self.conflicts.open_slots(therapist, date, session_type).await
    }

    // ==========================================================================
    // STATUS TRANSITIONS
    // ==========================================================================

    pub async fn accept_appointment(&self, caller: &User, id: Uuid) -> Result<Appointment, AppointmentError> {
        let appointment = self.apply_transition(caller, id, AppointmentAction::Accept, None).await?;
        self.notify_parties(
            &appointment,
            format!("Appointment on {} at {} was accepted.", appointment.date, appointment.time),
        );
        Ok(appointment)
    }

    pub async fn reject_appointment(&self, caller: &User, id: Uuid) -> Result<Appointment, AppointmentError> {
        let appointment = self.apply_transition(caller, id, AppointmentAction::Reject, None).await?;
        self.notify_parties(
            &appointment,
            format!("Appointment on {} at {} was rejected.", appointment.date, appointment.time),
        );
        Ok(appointment)
    }

    pub async fn cancel_appointment(
        &self,
        caller: &User,
        id: Uuid,
        request: CancelAppointmentRequest,
    ) -> Result<Appointment, AppointmentError> {
        let reason = clean_reason(request.reason);
        let appointment = self
            .modify(id, |appointment| {
                lifecycle::authorize(appointment, caller, AppointmentAction::Cancel, request.acting_role)?;
                appointment.status = lifecycle::transition(appointment.status, AppointmentAction::Cancel)?;
                if reason.is_some() {
                    appointment.reason = reason.clone();
                }
                Ok(())
            })
            .await?;

        self.notify_parties(
            &appointment,
            format!(
                "Appointment on {} at {} was canceled. Reason: {}",
                appointment.date,
                appointment.time,
                reason.as_deref().unwrap_or("N/A")
            ),
        );
        Ok(appointment)
    }

    /// Moves the appointment to a new slot. The result is always Pending and
    /// the rescheduling side becomes the initiator.
    pub async fn reschedule_appointment(
        &self,
        caller: &User,
        id: Uuid,
        request: RescheduleAppointmentRequest,
    ) -> Result<Appointment, AppointmentError> {
        self.conflicts.ensure_future(request.new_date, request.new_time)?;

        let current = self.repository.get(id).await?;
        let therapist = self
            .users
            .require_role(&current.therapist_username, UserRole::Therapist)
            .await?;

        let reason = clean_reason(request.reason);
        let appointment = self
            .modify(id, |appointment| {
                let actor = lifecycle::authorize(appointment, caller, AppointmentAction::Reschedule, request.acting_role)?;
                appointment.status = lifecycle::transition(appointment.status, AppointmentAction::Reschedule)?;
                self.conflicts.ensure_within_availability(
                    &therapist,
                    request.new_date,
                    request.new_time,
                    appointment.session_type,
                )?;
                appointment.date = request.new_date;
                appointment.time = request.new_time;
                appointment.initiator_role = actor;
                if reason.is_some() {
                    appointment.reason = reason.clone();
                }
                Ok(())
            })
            .await?;

        self.notify_parties(
            &appointment,
            format!(
                "Appointment was rescheduled to {} at {}. Reason: {}",
                appointment.date,
                appointment.time,
                reason.as_deref().unwrap_or("N/A")
            ),
        );
        Ok(appointment)
    }

    pub async fn finish_appointment(&self, caller: &User, id: Uuid) -> Result<Appointment, AppointmentError> {
        let appointment = self.apply_transition(caller, id, AppointmentAction::Finish, None).await?;
        self.notify_finished(&appointment);
        Ok(appointment)
    }

    /// Finishes every Accepted appointment whose session has ended.
    /// Returns how many were finished.
    pub async fn finish_overdue(&self) -> Result<usize, AppointmentError> {
        let now = (self.clock)();
        let accepted = self
            .repository
            .find(&AppointmentFilter {
                statuses: vec![AppointmentStatus::Accepted],
                ..Default::default()
            })
            .await?;

        let mut finished = 0;
        for candidate in accepted
            .iter()
            .filter(|a| lifecycle::should_auto_finish(a, now, self.session_minutes))
        {
            let result = self
                .modify(candidate.id, |appointment| {
                    if !lifecycle::should_auto_finish(appointment, now, self.session_minutes) {
                        return Err(AppointmentError::InvalidStatusTransition {
                            from: appointment.status,
                            action: AppointmentAction::Finish,
                        });
                    }
                    appointment.status = lifecycle::transition(appointment.status, AppointmentAction::Finish)?;
                    Ok(())
                })
                .await;

            match result {
                Ok(appointment) => {
                    debug!("Auto-finished appointment {}", appointment.id);
                    self.notify_finished(&appointment);
                    finished += 1;
                }
                Err(e) => warn!("Could not auto-finish appointment {}: {}", candidate.id, e),
            }
        }

        if finished > 0 {
            info!("Auto-finished {} appointments", finished);
        }
        Ok(finished)
    }

    // ==========================================================================
    // THERAPIST PATIENTS
    // ==========================================================================

    pub async fn list_patients(&self, caller: &User, therapist: &str) -> Result<Vec<UserProfile>, AppointmentError> {
        self.patients.list_patients(caller, therapist).await
    }

    pub async fn patient_appointments(
        &self,
        caller: &User,
        therapist: &str,
        patient: &str,
        page: usize,
    ) -> Result<PatientAppointmentsPage, AppointmentError> {
        if let Err(e) = self.finish_overdue().await {
            warn!("Auto-finish before listing failed: {}", e);
        }
        self.patients.patient_appointments(caller, therapist, patient, page).await
    }

    pub async fn manage_patient(
        &self,
        caller: &User,
        patient: &str,
        update: CarePlanUpdate,
    ) -> Result<UserProfile, AppointmentError> {
        self.patients.update_care_plan(caller, patient, update).await
    }

    // ==========================================================================
    // SESSION NOTES
    // ==========================================================================

    pub async fn add_session_note(&self, caller: &User, id: Uuid, note: &str) -> Result<Appointment, AppointmentError> {
        let note = note.trim();
        if note.is_empty() {
            return Err(AppointmentError::ValidationError("Note cannot be empty".to_string()));
        }

        self.modify(id, |appointment| {
            lifecycle::authorize_notes(appointment, caller)?;
            appointment.session_notes.push(SessionNote {
                note: note.to_string(),
                timestamp: Utc::now(),
            });
            Ok(())
        })
        .await
    }

    pub async fn delete_session_note(
        &self,
        caller: &User,
        id: Uuid,
        index: usize,
    ) -> Result<Appointment, AppointmentError> {
        self.modify(id, |appointment| {
            lifecycle::authorize_notes(appointment, caller)?;
            if index >= appointment.session_notes.len() {
                return Err(AppointmentError::InvalidNoteIndex);
            }
            appointment.session_notes.remove(index);
            Ok(())
        })
        .await
    }

    // ==========================================================================
    // INTERNALS
    // ==========================================================================

    async fn apply_transition(
        &self,
        caller: &User,
        id: Uuid,
        action: AppointmentAction,
        acting_role: Option<PartyRole>,
    ) -> Result<Appointment, AppointmentError> {
        let appointment = self
            .modify(id, |appointment| {
                lifecycle::authorize(appointment, caller, action, acting_role)?;
                appointment.status = lifecycle::transition(appointment.status, action)?;
                Ok(())
            })
            .await?;

        info!("Appointment {} is now {} ({} by {})", id, appointment.status, action, caller.username);
        Ok(appointment)
    }

    /// Read, change, conditional write. Retries on a concurrent write,
    /// re-running `change` against the fresh copy.
    async fn modify<F>(&self, id: Uuid, mut change: F) -> Result<Appointment, AppointmentError>
    where
        F: FnMut(&mut Appointment) -> Result<(), AppointmentError> + Send,
    {
        let mut attempt = 1;
        loop {
            let current = self.repository.get(id).await?;
            let mut next = current.clone();
            change(&mut next)?;
            next.updated_at = Utc::now();

            match self.repository.update(current.version, next).await {
                Err(AppointmentError::VersionConflict) if attempt < MAX_WRITE_ATTEMPTS => {
                    debug!("Version conflict on appointment {} (attempt {}), retrying", id, attempt);
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    fn notify_parties(&self, appointment: &Appointment, message: String) {
        self.notifier
            .notify(&appointment.patient_username, message.clone(), Some(appointment.id));
        self.notifier
            .notify(&appointment.therapist_username, message, Some(appointment.id));
    }

    fn notify_finished(&self, appointment: &Appointment) {
        self.notify_parties(
            appointment,
            format!(
                "Appointment on {} at {} has been marked as finished.",
                appointment.date, appointment.time
            ),
        );
    }
}

fn clean_reason(reason: Option<String>) -> Option<String> {
    reason
        .map(|r| r.trim().to_string())
        .filter(|r| !r.is_empty())
}
