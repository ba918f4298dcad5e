// libs/appointment-cell/src/services/patients.rs
use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{info, warn};

use shared_models::auth::{User, UserRole};
use user_cell::{CarePlanUpdate, UserError, UserProfile, UserService};

use crate::models::{
    Appointment, AppointmentError, AppointmentFilter, AppointmentView, PatientAppointmentsPage,
};
use crate::services::lifecycle;
use crate::services::store::AppointmentRepository;

/// Appointments per page of a patient's history.
pub const PATIENT_HISTORY_PAGE_SIZE: usize = 5;

/// A therapist's view of the patients they treat. A patient counts as
/// treated once they share any appointment with the therapist.
pub struct TherapistPatientService {
    repository: Arc<dyn AppointmentRepository>,
    users: Arc<UserService>,
}

impl TherapistPatientService {
    pub fn new(repository: Arc<dyn AppointmentRepository>, users: Arc<UserService>) -> Self {
        Self { repository, users }
    }

    /// Patient profiles of everyone who has booked with `therapist`, by username.
    pub async fn list_patients(&self, caller: &User, therapist: &str) -> Result<Vec<UserProfile>, AppointmentError> {
        authorize_therapist(caller, therapist)?;

        let appointments = self
            .repository
            .find(&AppointmentFilter {
                therapist_username: Some(therapist.to_string()),
                ..Default::default()
            })
            .await?;
        let usernames: BTreeSet<String> = appointments.into_iter().map(|a| a.patient_username).collect();

        let mut patients = Vec::with_capacity(usernames.len());
        for username in usernames {
            match self.users.require_role(&username, UserRole::Patient).await {
                Ok(profile) => patients.push(profile),
                Err(UserError::DatabaseError(msg)) => return Err(AppointmentError::DatabaseError(msg)),
                Err(e) => warn!("Skipping patient {} of {}: {}", username, therapist, e),
            }
        }
        Ok(patients)
    }

    /// One page of the appointments between `therapist` and `patient`, newest first.
    pub async fn patient_appointments(
        &self,
        caller: &User,
        therapist: &str,
        patient: &str,
        page: usize,
    ) -> Result<PatientAppointmentsPage, AppointmentError> {
        authorize_therapist(caller, therapist)?;

        let appointments = self.shared_appointments(therapist, patient).await?;
        let total = appointments.len();
        let page = page.max(1);
        let patient_full_name = self.users.display_name(patient).await;
        let therapist_full_name = self.users.display_name(therapist).await;

        let views = appointments
            .into_iter()
            .skip((page - 1).saturating_mul(PATIENT_HISTORY_PAGE_SIZE))
            .take(PATIENT_HISTORY_PAGE_SIZE)
            .map(|appointment| AppointmentView {
                available_actions: lifecycle::valid_actions(appointment.status),
                appointment,
                patient_full_name: patient_full_name.clone(),
                therapist_full_name: therapist_full_name.clone(),
            })
            .collect();

        Ok(PatientAppointmentsPage {
            total,
            page,
            total_pages: total.div_ceil(PATIENT_HISTORY_PAGE_SIZE),
            appointments: views,
        })
    }

    /// Writes the care plan of `patient`. Therapists may only write for
    /// patients they have an appointment with; admins for anyone.
    pub async fn update_care_plan(
        &self,
        caller: &User,
        patient: &str,
        update: CarePlanUpdate,
    ) -> Result<UserProfile, AppointmentError> {
        match caller.role {
            UserRole::Admin => {}
            UserRole::Therapist => {
                if self.shared_appointments(&caller.username, patient).await?.is_empty() {
                    return Err(AppointmentError::Unauthorized(format!(
                        "{} has no appointments with {}",
                        caller.username, patient
                    )));
                }
            }
            UserRole::Patient => {
                return Err(AppointmentError::Unauthorized(
                    "Only therapists can manage patients".to_string(),
                ))
            }
        }

        let profile = self.users.update_care_plan(patient, update).await.map_err(|e| match e {
            UserError::NotFound(_) | UserError::RoleMismatch { .. } => {
                AppointmentError::PatientNotFound(patient.to_string())
            }
            other => other.into(),
        })?;

        info!("{} updated the care plan of {}", caller.username, patient);
        Ok(profile)
    }

    async fn shared_appointments(
        &self,
        therapist: &str,
        patient: &str,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        self.repository
            .find(&AppointmentFilter {
                patient_username: Some(patient.to_string()),
                therapist_username: Some(therapist.to_string()),
                ..Default::default()
            })
            .await
    }
}

fn authorize_therapist(caller: &User, therapist: &str) -> Result<(), AppointmentError> {
    let allowed = match caller.role {
        UserRole::Admin => true,
        UserRole::Therapist => caller.username == therapist,
        UserRole::Patient => false,
    };
    if !allowed {
        return Err(AppointmentError::Unauthorized(format!(
            "{} cannot view the patients of {}",
            caller.username, therapist
        )));
    }
    Ok(())
}
