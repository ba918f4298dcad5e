// libs/appointment-cell/src/models.rs
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use shared_models::auth::UserRole;
use shared_models::scheduling::{SessionType, SlotTime};
use user_cell::UserError;

// ==============================================================================
// CORE APPOINTMENT MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Appointment {
    pub id: Uuid,
    pub patient_username: String,
    pub therapist_username: String,
    pub date: NaiveDate,
    pub time: SlotTime,
    pub status: AppointmentStatus,
    #[serde(default)]
    pub session_type: SessionType,
    /// Who created the appointment or last proposed a new slot.
    pub initiator_role: PartyRole,
    #[serde(default)]
    pub session_notes: Vec<SessionNote>,
    #[serde(default)]
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Bumped on every write; updates are conditional on it.
    #[serde(default)]
    pub version: i64,
}

impl Appointment {
    pub fn new(
        patient_username: &str,
        therapist_username: &str,
        date: NaiveDate,
        time: SlotTime,
        session_type: SessionType,
        initiator_role: PartyRole,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            patient_username: patient_username.to_string(),
            therapist_username: therapist_username.to_string(),
            date,
            time,
            status: AppointmentStatus::Pending,
            session_type,
            initiator_role,
            session_notes: Vec::new(),
            reason: None,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    /// Clinic-local start of the session.
    pub fn starts_at(&self) -> NaiveDateTime {
        self.date.and_time(self.time.time())
    }

    pub fn ends_at(&self, duration_minutes: u32) -> NaiveDateTime {
        self.starts_at() + Duration::minutes(duration_minutes as i64)
    }

    pub fn username_of(&self, role: PartyRole) -> &str {
        match role {
            PartyRole::Patient => &self.patient_username,
            PartyRole::Therapist => &self.therapist_username,
        }
    }

    /// The side `username` is on, if any.
    pub fn party_role(&self, username: &str) -> Option<PartyRole> {
        if self.patient_username == username {
            Some(PartyRole::Patient)
        } else if self.therapist_username == username {
            Some(PartyRole::Therapist)
        } else {
            None
        }
    }

    pub fn involves(&self, username: &str) -> bool {
        self.party_role(username).is_some()
    }

    /// Whether two appointments may not both be open at once: same therapist
    /// slot, or the same patient and therapist pair.
    pub fn clashes_with(&self, other: &Appointment) -> Option<AppointmentError> {
        if self.id == other.id || !self.status.is_open() || !other.status.is_open() {
            return None;
        }
        if self.therapist_username == other.therapist_username
            && self.date == other.date
            && self.time == other.time
        {
            return Some(AppointmentError::SlotTaken {
                therapist: self.therapist_username.clone(),
                date: self.date,
                time: self.time,
            });
        }
        if self.patient_username == other.patient_username
            && self.therapist_username == other.therapist_username
        {
            return Some(AppointmentError::DuplicateBooking);
        }
        None
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum AppointmentStatus {
    Pending,
    Accepted,
    Rejected,
    #[serde(alias = "Cancelled", alias = "canceled", alias = "cancelled")]
    Canceled,
    Finished,
}

impl AppointmentStatus {
    /// Open appointments hold their slot.
    pub fn is_open(&self) -> bool {
        matches!(self, AppointmentStatus::Pending | AppointmentStatus::Accepted)
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_open()
    }

    pub const OPEN: [AppointmentStatus; 2] = [AppointmentStatus::Pending, AppointmentStatus::Accepted];
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentStatus::Pending => write!(f, "Pending"),
            AppointmentStatus::Accepted => write!(f, "Accepted"),
            AppointmentStatus::Rejected => write!(f, "Rejected"),
            AppointmentStatus::Canceled => write!(f, "Canceled"),
            AppointmentStatus::Finished => write!(f, "Finished"),
        }
    }
}

impl FromStr for AppointmentStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "pending" => Ok(AppointmentStatus::Pending),
            "accepted" => Ok(AppointmentStatus::Accepted),
            "rejected" => Ok(AppointmentStatus::Rejected),
            "canceled" | "cancelled" => Ok(AppointmentStatus::Canceled),
            "finished" => Ok(AppointmentStatus::Finished),
            other => Err(format!("Unknown appointment status '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum AppointmentAction {
    Accept,
    Reject,
    Cancel,
    Reschedule,
    Finish,
}

impl fmt::Display for AppointmentAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentAction::Accept => write!(f, "accept"),
            AppointmentAction::Reject => write!(f, "reject"),
            AppointmentAction::Cancel => write!(f, "cancel"),
            AppointmentAction::Reschedule => write!(f, "reschedule"),
            AppointmentAction::Finish => write!(f, "finish"),
        }
    }
}

/// The two sides of an appointment.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PartyRole {
    Patient,
    Therapist,
}

impl PartyRole {
    pub fn counterparty(self) -> PartyRole {
        match self {
            PartyRole::Patient => PartyRole::Therapist,
            PartyRole::Therapist => PartyRole::Patient,
        }
    }

    pub fn from_user_role(role: UserRole) -> Option<PartyRole> {
        match role {
            UserRole::Patient => Some(PartyRole::Patient),
            UserRole::Therapist => Some(PartyRole::Therapist),
            UserRole::Admin => None,
        }
    }
}

impl fmt::Display for PartyRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PartyRole::Patient => write!(f, "patient"),
            PartyRole::Therapist => write!(f, "therapist"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionNote {
    pub note: String,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

// ==============================================================================
// REQUEST/RESPONSE MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAppointmentRequest {
    #[serde(alias = "patientUsername")]
    pub patient_username: String,
    #[serde(alias = "therapistUsername")]
    pub therapist_username: String,
    pub date: NaiveDate,
    pub time: SlotTime,
    #[serde(default, alias = "sessionType")]
    pub session_type: SessionType,
    /// Only read when an admin books on someone's behalf.
    #[serde(default, alias = "initiatorRole")]
    pub initiator_role: Option<PartyRole>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CancelAppointmentRequest {
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub acting_role: Option<PartyRole>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RescheduleAppointmentRequest {
    #[serde(alias = "newDate")]
    pub new_date: NaiveDate,
    #[serde(alias = "newTime")]
    pub new_time: SlotTime,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default, alias = "reschedulerRole")]
    pub acting_role: Option<PartyRole>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionNoteRequest {
    pub note: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListAppointmentsQuery {
    pub username: String,
    pub role: PartyRole,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BookedTimesQuery {
    pub therapist: String,
    pub date: NaiveDate,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OpenSlotsQuery {
    pub therapist: String,
    pub date: NaiveDate,
    #[serde(default)]
    pub session_type: SessionType,
}

/// An appointment as listed to a party, with both names resolved.
#[derive(Debug, Clone, Serialize)]
pub struct AppointmentView {
    #[serde(flatten)]
    pub appointment: Appointment,
    pub patient_full_name: String,
    pub therapist_full_name: String,
    pub available_actions: Vec<AppointmentAction>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PatientAppointmentsQuery {
    #[serde(default = "first_page")]
    pub page: usize,
}

fn first_page() -> usize {
    1
}

#[derive(Debug, Clone, Serialize)]
pub struct PatientAppointmentsPage {
    pub total: usize,
    pub page: usize,
    pub total_pages: usize,
    pub appointments: Vec<AppointmentView>,
}

/// Store-level query. Empty `statuses` matches every status.
#[derive(Debug, Clone, Default)]
pub struct AppointmentFilter {
    pub patient_username: Option<String>,
    pub therapist_username: Option<String>,
    pub date: Option<NaiveDate>,
    pub statuses: Vec<AppointmentStatus>,
}

impl AppointmentFilter {
    pub fn matches(&self, appointment: &Appointment) -> bool {
        self.patient_username
            .as_deref()
            .map_or(true, |p| appointment.patient_username == p)
            && self
                .therapist_username
                .as_deref()
                .map_or(true, |t| appointment.therapist_username == t)
            && self.date.map_or(true, |d| appointment.date == d)
            && (self.statuses.is_empty() || self.statuses.contains(&appointment.status))
    }
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, Clone, thiserror::Error)]
pub enum AppointmentError {
    #[error("Appointment not found")]
    NotFound,

    #[error("{therapist} already has an appointment on {date} at {time}")]
    SlotTaken {
        therapist: String,
        date: NaiveDate,
        time: SlotTime,
    },

    #[error("An open appointment with this therapist already exists")]
    DuplicateBooking,

    #[error("Cannot book or reschedule to a past date or time")]
    InvalidTime,

    #[error("Therapist is not available on {date} at {time} for {session_type} sessions")]
    OutsideAvailability {
        date: NaiveDate,
        time: SlotTime,
        session_type: SessionType,
    },

    #[error("Cannot {action} an appointment that is {from}")]
    InvalidStatusTransition {
        from: AppointmentStatus,
        action: AppointmentAction,
    },

    #[error("Not authorized: {0}")]
    Unauthorized(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Invalid note index")]
    InvalidNoteIndex,

    #[error("Patient '{0}' not found")]
    PatientNotFound(String),

    #[error("Appointment was modified concurrently, please retry")]
    VersionConflict,

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<UserError> for AppointmentError {
    fn from(error: UserError) -> Self {
        match error {
            UserError::DatabaseError(msg) => AppointmentError::DatabaseError(msg),
            UserError::Unauthorized(msg) => AppointmentError::Unauthorized(msg),
            other => AppointmentError::ValidationError(other.to_string()),
        }
    }
}
