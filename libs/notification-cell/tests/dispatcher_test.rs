use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use notification_cell::{
    InMemoryNotificationStore, NewNotification, Notification, NotificationDispatcher,
    NotificationError, NotificationRepository, NotificationWorker, MAX_BACKOFF,
};

/// Fails the first `failures` inserts, then delegates to an in-memory store.
struct FlakyStore {
    failures: usize,
    attempts: AtomicUsize,
    inner: InMemoryNotificationStore,
}

impl FlakyStore {
    fn new(failures: usize) -> Self {
        Self {
            failures,
            attempts: AtomicUsize::new(0),
            inner: InMemoryNotificationStore::new(),
        }
    }
}

#[async_trait]
impl NotificationRepository for FlakyStore {
    async fn insert(&self, notification: Notification) -> Result<(), NotificationError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if attempt < self.failures {
            return Err(NotificationError::DatabaseError("connection reset".into()));
        }
        self.inner.insert(notification).await
    }

    async fn list_for(&self, recipient: &str) -> Result<Vec<Notification>, NotificationError> {
        self.inner.list_for(recipient).await
    }

    async fn unread_count(&self, recipient: &str) -> Result<usize, NotificationError> {
        self.inner.unread_count(recipient).await
    }

    async fn mark_all_read(&self, recipient: &str) -> Result<usize, NotificationError> {
        self.inner.mark_all_read(recipient).await
    }
}

fn reminder(recipient: &str) -> NewNotification {
    NewNotification {
        recipient_username: recipient.to_string(),
        message: "Appointment on 2026-10-20 at 2:00 PM was accepted.".to_string(),
        appointment_id: None,
    }
}

#[tokio::test]
async fn test_spawned_worker_stores_dispatched_notifications() {
    let store = Arc::new(InMemoryNotificationStore::new());
    let (dispatcher, handle) = NotificationDispatcher::spawn(store.clone(), 2);

    dispatcher.notify("amna", "Appointment created!", None);
    dispatcher.notify("drsara", "New appointment request from amna.", None);
    drop(dispatcher);
    handle.await.unwrap();

    assert_eq!(store.unread_count("amna").await.unwrap(), 1);
    assert_eq!(store.list_for("drsara").await.unwrap()[0].message, "New appointment request from amna.");
}

#[tokio::test]
async fn test_worker_retries_transient_failures() {
    let store = Arc::new(FlakyStore::new(2));
    let (_dispatcher, receiver) = NotificationDispatcher::channel();
    let worker = NotificationWorker::new(store.clone(), receiver, 3).with_backoff(Duration::from_millis(1));

    assert!(worker.deliver(reminder("amna")).await);
    assert_eq!(store.attempts.load(Ordering::SeqCst), 3);
    assert_eq!(store.unread_count("amna").await.unwrap(), 1);
}

#[tokio::test]
async fn test_worker_gives_up_after_max_retries() {
    let store = Arc::new(FlakyStore::new(10));
    let (_dispatcher, receiver) = NotificationDispatcher::channel();
    let worker = NotificationWorker::new(store.clone(), receiver, 2).with_backoff(Duration::from_millis(1));

    assert!(!worker.deliver(reminder("amna")).await);
    assert_eq!(store.attempts.load(Ordering::SeqCst), 3);
    assert_eq!(store.unread_count("amna").await.unwrap(), 0);
}

#[tokio::test]
async fn test_long_retry_budget_does_not_overflow() {
    let store = Arc::new(FlakyStore::new(usize::MAX));
    let (_dispatcher, receiver) = NotificationDispatcher::channel();
    let worker = NotificationWorker::new(store.clone(), receiver, 40).with_backoff(Duration::ZERO);

    assert!(!worker.deliver(reminder("amna")).await);
    assert_eq!(store.attempts.load(Ordering::SeqCst), 41);
}

#[test]
fn test_backoff_doubles_up_to_the_cap() {
    let (_dispatcher, receiver) = NotificationDispatcher::channel();
    let worker = NotificationWorker::new(Arc::new(InMemoryNotificationStore::new()), receiver, 3)
        .with_backoff(Duration::from_millis(200));

    assert_eq!(worker.backoff_for(0), Duration::from_millis(200));
    assert_eq!(worker.backoff_for(3), Duration::from_millis(1600));
    assert_eq!(worker.backoff_for(10), MAX_BACKOFF);
    assert_eq!(worker.backoff_for(40), MAX_BACKOFF);
}

#[tokio::test]
async fn test_notify_after_worker_exit_does_not_panic() {
    let (dispatcher, receiver) = NotificationDispatcher::channel();
    drop(receiver);

    dispatcher.notify("amna", "lost", None);
}
