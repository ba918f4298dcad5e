use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::models::{NewNotification, Notification};
use crate::services::store::NotificationRepository;

/// Queues notifications for asynchronous delivery.
///
/// Callers never wait on the notification write and never see its failure;
/// the worker retries and logs what it could not store.
#[derive(Clone)]
pub struct NotificationDispatcher {
    sender: mpsc::UnboundedSender<NewNotification>,
}

impl NotificationDispatcher {
    /// A dispatcher plus the receiving end, for wiring a worker by hand.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<NewNotification>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    /// Starts a worker draining into `repository`.
    pub fn spawn(
        repository: Arc<dyn NotificationRepository>,
        max_retries: u32,
    ) -> (Self, JoinHandle<()>) {
        let (dispatcher, receiver) = Self::channel();
        let worker = NotificationWorker::new(repository, receiver, max_retries);
        let handle = tokio::spawn(worker.run());
        (dispatcher, handle)
    }

    pub fn notify(&self, recipient: &str, message: impl Into<String>, appointment_id: Option<Uuid>) {
        let notification = NewNotification {
            recipient_username: recipient.to_string(),
            message: message.into(),
            appointment_id,
        };
        if self.sender.send(notification).is_err() {
            warn!("Notification worker is gone, dropping notification for {}", recipient);
        }
    }
}

/// Longest pause between two delivery attempts.
pub const MAX_BACKOFF: Duration = Duration::from_secs(30);

pub struct NotificationWorker {
    repository: Arc<dyn NotificationRepository>,
    receiver: mpsc::UnboundedReceiver<NewNotification>,
    max_retries: u32,
    base_backoff: Duration,
}

impl NotificationWorker {
    pub fn new(
        repository: Arc<dyn NotificationRepository>,
        receiver: mpsc::UnboundedReceiver<NewNotification>,
        max_retries: u32,
    ) -> Self {
        Self {
            repository,
            receiver,
            max_retries,
            base_backoff: Duration::from_millis(200),
        }
    }

    pub fn with_backoff(mut self, base_backoff: Duration) -> Self {
        self.base_backoff = base_backoff;
        self
    }

    /// Runs until every dispatcher handle has been dropped.
    pub async fn run(mut self) {
        info!("Notification worker started");
        while let Some(new) = self.receiver.recv().await {
            self.deliver(new).await;
        }
        info!("Notification worker stopped");
    }

    /// Delay before retry number `attempt + 1`, doubling from the base and capped.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        self.base_backoff
            .saturating_mul(2u32.saturating_pow(attempt))
            .min(MAX_BACKOFF)
    }

    /// Stores one notification, retrying with exponential backoff.
    /// Returns whether it was stored.
    pub async fn deliver(&self, new: NewNotification) -> bool {
        let notification = Notification::from_new(new);
        let mut attempt = 0;
        loop {
            match self.repository.insert(notification.clone()).await {
                Ok(()) => {
                    debug!("Stored notification {} for {}", notification.id, notification.recipient_username);
                    return true;
                }
                Err(e) if attempt < self.max_retries => {
                    let backoff = self.backoff_for(attempt);
                    warn!(
                        "Failed to store notification for {} (attempt {}): {}; retrying in {:?}",
                        notification.recipient_username,
                        attempt + 1,
                        e,
                        backoff
                    );
                    sleep(backoff).await;
                    attempt += 1;
                }
                Err(e) => {
                    error!(
                        "Giving up on notification for {} after {} attempts: {}",
                        notification.recipient_username,
                        attempt + 1,
                        e
                    );
                    return false;
                }
            }
        }
    }
}
