use async_trait::async_trait;
use reqwest::Method;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::RwLock;

use shared_config::AppConfig;
use shared_database::{rest_path, DatabaseError, Prefer, SupabaseClient};

use crate::models::{Notification, NotificationError};

const NOTIFICATIONS_TABLE: &str = "notifications";

#[async_trait]
pub trait NotificationRepository: Send + Sync {
    async fn insert(&self, notification: Notification) -> Result<(), NotificationError>;

    /// Newest first.
    async fn list_for(&self, recipient: &str) -> Result<Vec<Notification>, NotificationError>;

    async fn unread_count(&self, recipient: &str) -> Result<usize, NotificationError>;

    /// Returns how many notifications flipped to read.
    async fn mark_all_read(&self, recipient: &str) -> Result<usize, NotificationError>;
}

#[derive(Default)]
pub struct InMemoryNotificationStore {
    notifications: RwLock<Vec<Notification>>,
}

impl InMemoryNotificationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl NotificationRepository for InMemoryNotificationStore {
    async fn insert(&self, notification: Notification) -> Result<(), NotificationError> {
        self.notifications.write().await.push(notification);
        Ok(())
    }

    async fn list_for(&self, recipient: &str) -> Result<Vec<Notification>, NotificationError> {
        let notifications = self.notifications.read().await;
        let mut matching: Vec<Notification> = notifications
            .iter()
            .filter(|n| n.recipient_username == recipient)
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(matching)
    }

    async fn unread_count(&self, recipient: &str) -> Result<usize, NotificationError> {
        let notifications = self.notifications.read().await;
        Ok(notifications
            .iter()
            .filter(|n| n.recipient_username == recipient && !n.read)
            .count())
    }

    async fn mark_all_read(&self, recipient: &str) -> Result<usize, NotificationError> {
        let mut notifications = self.notifications.write().await;
        let mut changed = 0;
        for notification in notifications
            .iter_mut()
            .filter(|n| n.recipient_username == recipient && !n.read)
        {
            notification.read = true;
            changed += 1;
        }
        Ok(changed)
    }
}

pub struct SupabaseNotificationStore {
    supabase: SupabaseClient,
}

impl SupabaseNotificationStore {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }
}

fn map_db_error(error: DatabaseError) -> NotificationError {
    NotificationError::DatabaseError(error.to_string())
}

#[derive(Deserialize)]
struct IdRow {
    #[allow(dead_code)]
    id: uuid::Uuid,
}

#[async_trait]
impl NotificationRepository for SupabaseNotificationStore {
    async fn insert(&self, notification: Notification) -> Result<(), NotificationError> {
        self.supabase
            .execute(Method::POST, &rest_path(NOTIFICATIONS_TABLE, &[]), Some(json!(notification)))
            .await
            .map_err(map_db_error)
    }

    async fn list_for(&self, recipient: &str) -> Result<Vec<Notification>, NotificationError> {
        let path = rest_path(
            NOTIFICATIONS_TABLE,
            &[
                ("recipient_username", format!("eq.{}", recipient)),
                ("order", "created_at.desc".to_string()),
            ],
        );
        self.supabase
            .request(Method::GET, &path, None, None)
            .await
            .map_err(map_db_error)
    }

    async fn unread_count(&self, recipient: &str) -> Result<usize, NotificationError> {
        let path = rest_path(
            NOTIFICATIONS_TABLE,
            &[
                ("recipient_username", format!("eq.{}", recipient)),
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

    async fn mark_all_read(&self, recipient: &str) -> Result<usize, NotificationError> {
        let path = rest_path(
            NOTIFICATIONS_TABLE,
            &[
                ("recipient_username", format!("eq.{}", recipient)),
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
