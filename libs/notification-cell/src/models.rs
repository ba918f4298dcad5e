// libs/notification-cell/src/models.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Notification {
    pub id: Uuid,
    pub recipient_username: String,
    pub message: String,
    pub appointment_id: Option<Uuid>,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn from_new(new: NewNotification) -> Self {
        Self {
            id: Uuid::new_v4(),
            recipient_username: new.recipient_username,
            message: new.message,
            appointment_id: new.appointment_id,
            read: false,
            created_at: Utc::now(),
        }
    }
}

/// A notification waiting to be written by the dispatcher worker.
#[derive(Debug, Clone, PartialEq)]
pub struct NewNotification {
    pub recipient_username: String,
    pub message: String,
    pub appointment_id: Option<Uuid>,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum NotificationError {
    #[error("Not authorized: {0}")]
    Unauthorized(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}
