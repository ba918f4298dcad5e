pub mod crypto;
pub mod messaging;
pub mod rooms;
pub mod session;
pub mod store;

pub use crypto::MessageCipher;
pub use messaging::MessagingService;
pub use rooms::ChatRoomHub;
pub use session::ChatSession;
pub use store::{InMemoryMessageStore, MessageRepository, SupabaseMessageStore};
