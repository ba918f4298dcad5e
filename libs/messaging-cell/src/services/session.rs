// libs/messaging-cell/src/services/session.rs
use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{broadcast::error::RecvError, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use shared_models::auth::User;

use crate::models::{ClientEvent, MessageType, RoomEvent, SendMessageRequest, ServerEvent};
use crate::services::messaging::MessagingService;
use crate::services::rooms::RoomReceiver;

pub type EventSender = mpsc::UnboundedSender<ServerEvent>;

/// State of one chat socket: who it is and which rooms it listens to.
///
/// Outbound events go to `outbound`; the socket writer drains it.
pub struct ChatSession {
    id: Uuid,
    user: User,
    service: Arc<MessagingService>,
    outbound: EventSender,
    rooms: HashMap<Uuid, JoinHandle<()>>,
}

impl ChatSession {
    pub fn new(user: User, service: Arc<MessagingService>, outbound: EventSender) -> Self {
        Self {
            id: Uuid::new_v4(),
            user,
            service,
            outbound,
            rooms: HashMap::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn joined_rooms(&self) -> Vec<Uuid> {
        self.rooms.keys().copied().collect()
    }

    /// Parses one text frame. Malformed frames get an `error` event back.
    pub async fn handle_text(&mut self, text: &str) {
        match serde_json::from_str::<ClientEvent>(text) {
            Ok(event) => self.handle(event).await,
            Err(e) => {
                debug!("Unreadable chat frame from {}: {}", self.user.username, e);
                self.reply_error(format!("Invalid event: {}", e));
            }
        }
    }

    pub async fn handle(&mut self, event: ClientEvent) {
        match event {
            ClientEvent::JoinAppointment { appointment_id } => self.join(appointment_id).await,
            ClientEvent::LeaveAppointment { appointment_id } => self.leave(appointment_id).await,
            ClientEvent::SendMessage {
                appointment_id,
                content,
                message_type,
            } => self.send(appointment_id, content, message_type).await,
            ClientEvent::Typing { appointment_id } => {
                let username = self.user.username.clone();
                self.relay(appointment_id, ServerEvent::Typing { appointment_id, username })
                    .await
            }
            ClientEvent::StopTyping { appointment_id } => {
                let username = self.user.username.clone();
                self.relay(appointment_id, ServerEvent::StopTyping { appointment_id, username })
                    .await
            }
        }
    }

    /// Stops every room forwarder and releases idle rooms.
    pub async fn close(mut self) {
        for (_, forwarder) in self.rooms.drain() {
            forwarder.abort();
            let _ = forwarder.await;
        }
        self.service.hub().prune().await;
        debug!("Chat session {} for {} closed", self.id, self.user.username);
    }

    async fn join(&mut self, appointment_id: Uuid) {
        if self.rooms.contains_key(&appointment_id) {
            let _ = self.outbound.send(ServerEvent::Joined { appointment_id });
            return;
        }
        if let Err(e) = self.service.authorize_room(&self.user, appointment_id).await {
            self.reply_error(e.to_string());
            return;
        }

        let receiver = self.service.hub().subscribe(appointment_id).await;
        let forwarder = spawn_forwarder(self.id, appointment_id, receiver, self.outbound.clone());
        self.rooms.insert(appointment_id, forwarder);

        debug!("{} joined chat room {}", self.user.username, appointment_id);
        let _ = self.outbound.send(ServerEvent::Joined { appointment_id });
    }

    async fn leave(&mut self, appointment_id: Uuid) {
        if let Some(forwarder) = self.rooms.remove(&appointment_id) {
            forwarder.abort();
            let _ = forwarder.await;
            self.service.hub().prune().await;
            debug!("{} left chat room {}", self.user.username, appointment_id);
        }
        let _ = self.outbound.send(ServerEvent::Left { appointment_id });
    }

    async fn send(&mut self, appointment_id: Uuid, content: String, message_type: MessageType) {
        let request = SendMessageRequest {
            appointment_id,
            content,
            message_type,
        };
        if let Err(e) = self.service.send_message(&self.user, request).await {
            self.reply_error(e.to_string());
        }
    }

    /// Typing indicators go to the rest of the room, never back to us.
    async fn relay(&mut self, appointment_id: Uuid, event: ServerEvent) {
        if !self.rooms.contains_key(&appointment_id) {
            self.reply_error("Join the appointment before sending typing events".to_string());
            return;
        }
        self.service
            .hub()
            .publish(
                appointment_id,
                RoomEvent {
                    skip: Some(self.id),
                    event,
                },
            )
            .await;
    }

    fn reply_error(&self, message: String) {
        let _ = self.outbound.send(ServerEvent::Error { message });
    }
}

fn spawn_forwarder(
    connection: Uuid,
    appointment_id: Uuid,
    mut receiver: RoomReceiver,
    outbound: EventSender,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(RoomEvent { skip, event }) => {
                    if skip == Some(connection) {
                        continue;
                    }
                    if outbound.send(event).is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(missed)) => {
                    warn!("Connection {} lagged {} events in room {}", connection, missed, appointment_id);
                    let notice = ServerEvent::Error {
                        message: format!("Missed {} events; reload the conversation", missed),
                    };
                    if outbound.send(notice).is_err() {
                        break;
                    }
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}
