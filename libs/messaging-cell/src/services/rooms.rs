use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{broadcast, RwLock};
use tracing::debug;
use uuid::Uuid;

use crate::models::RoomEvent;

pub type RoomSender = broadcast::Sender<RoomEvent>;
pub type RoomReceiver = broadcast::Receiver<RoomEvent>;

/// One broadcast channel per appointment chat room.
#[derive(Clone)]
pub struct ChatRoomHub {
    rooms: Arc<RwLock<HashMap<Uuid, RoomSender>>>,
    capacity: usize,
}

impl ChatRoomHub {
    pub fn new(capacity: usize) -> Self {
        Self {
            rooms: Arc::new(RwLock::new(HashMap::new())),
            capacity: capacity.max(1),
        }
    }

    pub async fn subscribe(&self, room: Uuid) -> RoomReceiver {
        let mut rooms = self.rooms.write().await;
        rooms
            .entry(room)
            .or_insert_with(|| {
                debug!("Opened chat room {}", room);
                broadcast::channel(self.capacity).0
            })
            .subscribe()
    }

    /// Returns how many subscribers received the event.
    pub async fn publish(&self, room: Uuid, event: RoomEvent) -> usize {
        let rooms = self.rooms.read().await;
        match rooms.get(&room) {
            Some(sender) => sender.send(event).unwrap_or(0),
            None => 0,
        }
    }

    /// Drops rooms nobody listens to any more.
    pub async fn prune(&self) -> usize {
        let mut rooms = self.rooms.write().await;
        let before = rooms.len();
        rooms.retain(|_, sender| sender.receiver_count() > 0);
        let removed = before - rooms.len();
        if removed > 0 {
            debug!("Closed {} idle chat rooms", removed);
        }
        removed
    }

    pub async fn active_rooms(&self) -> Vec<Uuid> {
        self.rooms.read().await.keys().copied().collect()
    }

    pub async fn room_size(&self, room: Uuid) -> usize {
        self.rooms
            .read()
            .await
            .get(&room)
            .map(|sender| sender.receiver_count())
            .unwrap_or(0)
    }
}
