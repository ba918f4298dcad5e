// libs/messaging-cell/src/models.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use appointment_cell::AppointmentError;

// ==============================================================================
// MESSAGE MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub id: Uuid,
    pub appointment_id: Uuid,
    pub sender_username: String,
    pub receiver_username: String,
    /// Plain text on the way out; ciphertext at rest for `text` messages.
    pub content: String,
    #[serde(default)]
    pub message_type: MessageType,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub read: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    #[default]
    Text,
    Emoji,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendMessageRequest {
    #[serde(alias = "appointmentId")]
    pub appointment_id: Uuid,
    #[serde(alias = "message")]
    pub content: String,
    #[serde(default, alias = "messageType")]
    pub message_type: MessageType,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarkReadRequest {
    #[serde(alias = "appointmentId")]
    pub appointment_id: Uuid,
    pub username: String,
}

// ==============================================================================
// CHAT EVENTS
// ==============================================================================

/// Events a socket sends, e.g. `{"event": "join_appointment", "appointment_id": "..."}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ClientEvent {
    JoinAppointment {
        appointment_id: Uuid,
    },
    LeaveAppointment {
        appointment_id: Uuid,
    },
    SendMessage {
        appointment_id: Uuid,
        content: String,
        #[serde(default)]
        message_type: MessageType,
    },
    Typing {
        appointment_id: Uuid,
    },
    StopTyping {
        appointment_id: Uuid,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ServerEvent {
    Joined { appointment_id: Uuid },
    Left { appointment_id: Uuid },
    ReceiveMessage { message: Message },
    Typing { appointment_id: Uuid, username: String },
    StopTyping { appointment_id: Uuid, username: String },
    Error { message: String },
}

/// What travels on a room channel. `skip` names a connection that must
/// not receive its own event.
#[derive(Debug, Clone)]
pub struct RoomEvent {
    pub skip: Option<Uuid>,
    pub event: ServerEvent,
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, Clone, thiserror::Error)]
pub enum MessagingError {
    #[error("Appointment not found")]
    AppointmentNotFound,

    #[error("Cannot send message. Appointment not accepted.")]
    NotAccepted,

    #[error("Not authorized: {0}")]
    Unauthorized(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Encryption error: {0}")]
    Crypto(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<AppointmentError> for MessagingError {
    fn from(error: AppointmentError) -> Self {
        match error {
            AppointmentError::NotFound => MessagingError::AppointmentNotFound,
            other => MessagingError::DatabaseError(other.to_string()),
        }
    }
}
