pub mod dispatcher;
pub mod store;

pub use dispatcher::{NotificationDispatcher, NotificationWorker, MAX_BACKOFF};
pub use store::{InMemoryNotificationStore, NotificationRepository, SupabaseNotificationStore};
