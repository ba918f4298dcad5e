// libs/user-cell/src/models.rs
use chrono::{DateTime, Duration, Utc, Weekday};
use serde::{Deserialize, Serialize};

use shared_models::auth::UserRole;
use shared_models::scheduling::{SessionType, SlotTime};

// ==============================================================================
// PROFILE MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserProfile {
    pub username: String,
    pub role: UserRole,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    /// Weekly windows a therapist takes sessions in, per modality.
    #[serde(default)]
    pub availability: Vec<AvailabilitySlot>,
    /// Ordered free-text steps of a patient's therapy plan.
    #[serde(default)]
    pub therapy_plan: Vec<String>,
    #[serde(default)]
    pub past_session_summary: Option<SessionSummary>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl UserProfile {
    pub fn new(username: &str, role: UserRole) -> Self {
        Self {
            username: username.to_string(),
            role,
            first_name: None,
            last_name: None,
            email: None,
            availability: Vec::new(),
            therapy_plan: Vec::new(),
            past_session_summary: None,
            updated_at: Utc::now(),
        }
    }

    /// "First Last" when both names are known, otherwise the username.
    pub fn full_name(&self) -> String {
        match (&self.first_name, &self.last_name) {
            (Some(first), Some(last)) if !first.is_empty() && !last.is_empty() => {
                format!("{} {}", first, last)
            }
            _ => self.username.clone(),
        }
    }

    pub fn display_name(&self) -> String {
        match self.role {
            UserRole::Therapist => format!("Dr. {}", self.full_name()),
            _ => self.full_name(),
        }
    }

    pub fn has_availability_for(&self, session_type: SessionType) -> bool {
        self.availability.iter().any(|slot| slot.session_type == session_type)
    }

    /// Whether a session of `duration_minutes` starting at `time` on `day`
    /// fits entirely inside one published window.
    pub fn is_available(
        &self,
        day: Weekday,
        time: SlotTime,
        duration_minutes: u32,
        session_type: SessionType,
    ) -> bool {
        self.availability
            .iter()
            .any(|slot| slot.covers(day, time, duration_minutes, session_type))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AvailabilitySlot {
    pub day: Weekday,
    pub start: SlotTime,
    pub end: SlotTime,
    #[serde(default)]
    pub session_type: SessionType,
}

impl AvailabilitySlot {
    pub fn covers(
        &self,
        day: Weekday,
        time: SlotTime,
        duration_minutes: u32,
        session_type: SessionType,
    ) -> bool {
        if self.day != day || self.session_type != session_type {
            return false;
        }
        let start = time.time();
        let (end, wrapped) = start.overflowing_add_signed(Duration::minutes(duration_minutes as i64));
        wrapped == 0 && start >= self.start.time() && end <= self.end.time()
    }

    /// Session start labels inside this window, one every `duration_minutes`.
    pub fn session_starts(&self, duration_minutes: u32) -> Vec<SlotTime> {
        let mut starts = Vec::new();
        if duration_minutes == 0 {
            return starts;
        }
        let step = Duration::minutes(duration_minutes as i64);
        let mut current = self.start.time();
        loop {
            let (end, wrapped) = current.overflowing_add_signed(step);
            if wrapped != 0 || end > self.end.time() {
                break;
            }
            starts.push(SlotTime::new(current));
            current = end;
        }
        starts
    }

    fn overlaps(&self, other: &AvailabilitySlot) -> bool {
        self.day == other.day
            && self.session_type == other.session_type
            && self.start < other.end
            && other.start < self.end
    }
}

/// Checks a therapist's windows: each must be non-empty and windows of the
/// same day and modality may not overlap.
pub fn validate_availability(slots: &[AvailabilitySlot]) -> Result<(), UserError> {
    for (i, slot) in slots.iter().enumerate() {
        if slot.start >= slot.end {
            return Err(UserError::ValidationError(format!(
                "Availability on {} must start before it ends ({} - {})",
                slot.day, slot.start, slot.end
            )));
        }
        if let Some(other) = slots[i + 1..].iter().find(|other| slot.overlaps(other)) {
            return Err(UserError::ValidationError(format!(
                "Availability windows overlap on {}: {} - {} and {} - {}",
                slot.day, slot.start, slot.end, other.start, other.end
            )));
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionSummary {
    #[serde(default)]
    pub emotion: String,
    #[serde(default)]
    pub note: String,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

// ==============================================================================
// REQUEST/RESPONSE MODELS
// ==============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpsertProfileRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub therapy_plan: Option<Vec<String>>,
    pub past_session_summary: Option<SessionSummary>,
}

/// Care fields a treating therapist writes on a patient's profile.
/// Absent fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CarePlanUpdate {
    #[serde(default, alias = "therapyPlan")]
    pub therapy_plan: Option<Vec<String>>,
    #[serde(default, alias = "pastSessionSummary")]
    pub past_session_summary: Option<SessionSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplaceAvailabilityRequest {
    pub slots: Vec<AvailabilitySlot>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TherapistSummary {
    pub username: String,
    pub display_name: String,
    pub session_types: Vec<SessionType>,
}

impl From<&UserProfile> for TherapistSummary {
    fn from(profile: &UserProfile) -> Self {
        let mut session_types: Vec<SessionType> = Vec::new();
        for slot in &profile.availability {
            if !session_types.contains(&slot.session_type) {
                session_types.push(slot.session_type);
            }
        }
        Self {
            username: profile.username.clone(),
            display_name: profile.display_name(),
            session_types,
        }
    }
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, Clone, thiserror::Error)]
pub enum UserError {
    #[error("User '{0}' not found")]
    NotFound(String),

    #[error("User '{username}' is not a {expected}")]
    RoleMismatch { username: String, expected: UserRole },

    #[error("Invalid username: {0}")]
    InvalidUsername(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Not authorized: {0}")]
    Unauthorized(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}
