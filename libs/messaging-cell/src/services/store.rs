use async_trait::async_trait;
use reqwest::Method;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::RwLock;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::{rest_path, DatabaseError, Prefer, SupabaseClient};

use crate::models::{Message, MessagingError};

const MESSAGES_TABLE: &str = "messages";

#[async_trait]
pub trait MessageRepository: Send + Sync {
    async fn insert(&self, message: Message) -> Result<Message, MessagingError>;

    /// Oldest first.
    async fn list_for_appointment(&self, appointment_id: Uuid) -> Result<Vec<Message>, MessagingError>;

    /// Unread messages addressed to `receiver` across all appointments.
    async fn unread_count(&self, receiver: &str) -> Result<usize, MessagingError>;

    /// Marks messages in one appointment addressed to `receiver` as read.
    async fn mark_read(&self, appointment_id: Uuid, receiver: &str) -> Result<usize, MessagingError>;
}

#[derive(Default)]
pub struct InMemoryMessageStore {
    messages: RwLock<Vec<Message>>,
}

impl InMemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MessageRepository for InMemoryMessageStore {
    async fn insert(&self, message: Message) -> Result<Message, MessagingError> {
        self.messages.write().await.push(message.clone());
        Ok(message)
    }

    async fn list_for_appointment(&self, appointment_id: Uuid) -> Result<Vec<Message>, MessagingError> {
        let messages = self.messages.read().await;
        let mut matching: Vec<Message> = messages
            .iter()
            .filter(|m| m.appointment_id == appointment_id)
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        Ok(matching)
    }

    async fn unread_count(&self, receiver: &str) -> Result<usize, MessagingError> {
        let messages = self.messages.read().await;
        Ok(messages
            .iter()
            .filter(|m| m.receiver_username == receiver && !m.read)
            .count())
    }

    async fn mark_read(&self, appointment_id: Uuid, receiver: &str) -> Result<usize, MessagingError> {
        let mut messages = self.messages.write().await;
        let mut changed = 0;
        for message in messages
            .iter_mut()
            .filter(|m| m.appointment_id == appointment_id && m.receiver_username == receiver && !m.read)
        {
            message.read = true;
            changed += 1;
        }
        Ok(changed)
    }
}

pub struct SupabaseMessageStore {
    supabase: SupabaseClient,
}

impl SupabaseMessageStore {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }
}

fn map_db_error(error: DatabaseError) -> MessagingError {
    MessagingError::DatabaseError(error.to_string())
}

#[derive(Deserialize)]
struct IdRow {
    #[allow(dead_code)]
    id: Uuid,
}

#[async_trait]
impl MessageRepository for SupabaseMessageStore {
    async fn insert(&self, message: Message) -> Result<Message, MessagingError> {
        let rows: Vec<Message> = self
            .supabase
            .request(
                Method::POST,
                &rest_path(MESSAGES_TABLE, &[]),
                Some(json!(message)),
                Some(Prefer::ReturnRepresentation),
            )
            .await
            .map_err(map_db_error)?;
        Ok(rows.into_iter().next().unwrap_or(message))
    }

    async fn list_for_appointment(&self, appointment_id: Uuid) -> Result<Vec<Message>, MessagingError> {
        let path = rest_path(
            MESSAGES_TABLE,
            &[
                ("appointment_id", format!("eq.{}", appointment_id)),
                ("order", "timestamp.asc".to_string()),
            ],
        );
        self.supabase
            .request(Method::GET, &path, None, None)
            .await
            .map_err(map_db_error)
    }

    async fn unread_count(&self, receiver: &str) -> Result<usize, MessagingError> {
        let path = rest_path(
            MESSAGES_TABLE,
            &[
                ("receiver_username", format!("eq.{}", receiver)),
                ("read", "eq.false".to_string()),
                ("select", "id".to_string()),
            ],
        );
        let rows: Vec<IdRow> = self
            .supabase
            .request(Method::GET, &path, None, None)
            .await
            .map_err(map_db_error)?;
        Ok(rows.len())
    }

    async fn mark_read(&self, appointment_id: Uuid, receiver: &str) -> Result<usize, MessagingError> {
        let path = rest_path(
            MESSAGES_TABLE,
            &[
                ("appointment_id", format!("eq.{}", appointment_id)),
                ("receiver_username", format!("eq.{}", receiver)),
                ("read", "eq.false".to_string()),
                ("select", "id".to_string()),
            ],
        );
        let rows: Vec<IdRow> = self
            .supabase
            .request(
                Method::PATCH,
                &path,
                Some(json!({ "read": true })),
                Some(Prefer::ReturnRepresentation),
            )
            .await
            .map_err(map_db_error)?;
        Ok(rows.len())
    }
}
