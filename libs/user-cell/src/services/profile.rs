use std::sync::{Arc, OnceLock};

use chrono::Utc;
use regex::Regex;
use tracing::{debug, info};

use shared_models::auth::{User, UserRole};

use crate::models::{
    validate_availability, AvailabilitySlot, CarePlanUpdate, TherapistSummary, UpsertProfileRequest,
    UserError, UserProfile,
};
use crate::services::directory::UserDirectory;

fn username_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9_.\-]{3,32}$").expect("valid username regex"))
}

pub fn validate_username(username: &str) -> Result<(), UserError> {
    if username_pattern().is_match(username) {
        Ok(())
    } else {
        Err(UserError::InvalidUsername(format!(
            "'{}' must be 3-32 letters, digits, '.', '_' or '-'",
            username
        )))
    }
}

fn normalize_plan(plan: Vec<String>) -> Vec<String> {
    plan.into_iter()
        .map(|step| step.trim().to_string())
        .filter(|step| !step.is_empty())
        .collect()
}

pub struct UserService {
    directory: Arc<dyn UserDirectory>,
}

impl UserService {
    pub fn new(directory: Arc<dyn UserDirectory>) -> Self {
        Self { directory }
    }

    pub async fn get_profile(&self, username: &str) -> Result<UserProfile, UserError> {
        self.directory
            .get(username)
            .await?
            .ok_or_else(|| UserError::NotFound(username.to_string()))
    }

    /// Loads `username` and checks it holds `role`.
    pub async fn require_role(&self, username: &str, role: UserRole) -> Result<UserProfile, UserError> {
        let profile = self.get_profile(username).await?;
        if profile.role != role {
            return Err(UserError::RoleMismatch {
                username: username.to_string(),
                expected: role,
            });
        }
        Ok(profile)
    }

    /// Display name for notifications; falls back to the username when the
    /// profile cannot be read.
    pub async fn display_name(&self, username: &str) -> String {
        match self.directory.get(username).await {
            Ok(Some(profile)) => profile.display_name(),
            _ => username.to_string(),
        }
    }

    /// Creates or updates the caller's own profile. The role always comes from
    /// the caller's token, never from the body.
    pub async fn upsert_profile(
        &self,
        caller: &User,
        username: &str,
        request: UpsertProfileRequest,
    ) -> Result<UserProfile, UserError> {
        validate_username(username)?;
        if !caller.can_act_as(username) {
            return Err(UserError::Unauthorized(format!(
                "{} cannot edit the profile of {}",
                caller.username, username
            )));
        }

        let mut profile = match self.directory.get(username).await? {
            Some(existing) => existing,
            None if caller.username == username => UserProfile::new(username, caller.role),
            None => return Err(UserError::NotFound(username.to_string())),
        };

        if let Some(first_name) = request.first_name {
            profile.first_name = Some(first_name.trim().to_string());
        }
        if let Some(last_name) = request.last_name {
            profile.last_name = Some(last_name.trim().to_string());
        }
        if let Some(email) = request.email {
            profile.email = Some(email.trim().to_string());
        }
        if let Some(plan) = request.therapy_plan {
            profile.therapy_plan = normalize_plan(plan);
        }
        if let Some(summary) = request.past_session_summary {
            profile.past_session_summary = Some(summary);
        }
        profile.updated_at = Utc::now();

        info!("Updating profile of {} ({})", username, profile.role);
        self.directory.upsert(profile).await
    }

    /// Writes a patient's therapy plan and last session summary. Callers
    /// check that the author treats this patient before calling.
    pub async fn update_care_plan(
        &self,
        patient: &str,
        update: CarePlanUpdate,
    ) -> Result<UserProfile, UserError> {
        let mut profile = self.require_role(patient, UserRole::Patient).await?;

        if let Some(plan) = update.therapy_plan {
            profile.therapy_plan = normalize_plan(plan);
        }
        if let Some(summary) = update.past_session_summary {
            profile.past_session_summary = Some(summary);
        }
        profile.updated_at = Utc::now();

        info!("Updating care plan of {} ({} steps)", patient, profile.therapy_plan.len());
        self.directory.upsert(profile).await
    }

    pub async fn list_therapists(&self) -> Result<Vec<TherapistSummary>, UserError> {
        let therapists = self.directory.list_by_role(UserRole::Therapist).await?;
        Ok(therapists.iter().map(TherapistSummary::from).collect())
    }

    pub async fn get_availability(&self, therapist: &str) -> Result<Vec<AvailabilitySlot>, UserError> {
        let profile = self.require_role(therapist, UserRole::Therapist).await?;
        Ok(profile.availability)
    }

    pub async fn replace_availability(
        &self,
        caller: &User,
        therapist: &str,
        slots: Vec<AvailabilitySlot>,
    ) -> Result<Vec<AvailabilitySlot>, UserError> {
        if !caller.can_act_as(therapist) {
            return Err(UserError::Unauthorized(format!(
                "{} cannot change the availability of {}",
                caller.username, therapist
            )));
        }

        validate_availability(&slots)?;

        let mut profile = self.require_role(therapist, UserRole::Therapist).await?;
        profile.availability = slots;
        profile.updated_at = Utc::now();

        debug!("Replacing {} availability windows for {}", profile.availability.len(), therapist);
        let stored = self.directory.upsert(profile).await?;
        Ok(stored.availability)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validates_usernames() {
        assert!(validate_username("dr.khan_01").is_ok());
        assert!(validate_username("ab").is_err());
        assert!(validate_username("has space").is_err());
    }
}
