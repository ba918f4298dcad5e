// libs/messaging-cell/src/services/messaging.rs
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use appointment_cell::{Appointment, AppointmentRepository, AppointmentStatus};
use shared_models::auth::User;

use crate::models::{Message, MessageType, MessagingError, RoomEvent, SendMessageRequest, ServerEvent};
use crate::services::crypto::MessageCipher;
use crate::services::rooms::ChatRoomHub;
use crate::services::store::MessageRepository;

/// Shown in place of stored text that no longer decrypts.
const UNREADABLE_MESSAGE: &str = "[message unavailable]";

pub struct MessagingService {
    repository: Arc<dyn MessageRepository>,
    appointments: Arc<dyn AppointmentRepository>,
    cipher: MessageCipher,
    hub: ChatRoomHub,
}

impl MessagingService {
    pub fn new(
        repository: Arc<dyn MessageRepository>,
        appointments: Arc<dyn AppointmentRepository>,
        cipher: MessageCipher,
        hub: ChatRoomHub,
    ) -> Self {
        Self {
            repository,
            appointments,
            cipher,
            hub,
        }
    }

    pub fn hub(&self) -> &ChatRoomHub {
        &self.hub
    }

    /// Loads the appointment behind a room and checks the caller may see it.
    pub async fn authorize_room(&self, caller: &User, appointment_id: Uuid) -> Result<Appointment, MessagingError> {
        let appointment = self.appointments.get(appointment_id).await?;
        if !caller.is_admin() && !appointment.involves(&caller.username) {
            return Err(MessagingError::Unauthorized(format!(
                "{} is not a party to this appointment",
                caller.username
            )));
        }
        Ok(appointment)
    }

    /// Persists a message and broadcasts it to everyone in the room,
    /// the sender included.
    pub async fn send_message(&self, caller: &User, request: SendMessageRequest) -> Result<Message, MessagingError> {
        let content = request.content.trim();
        if content.is_empty() {
            return Err(MessagingError::ValidationError("Message content cannot be empty".to_string()));
        }

        let appointment = self.appointments.get(request.appointment_id).await?;
        let sender_role = appointment.party_role(&caller.username).ok_or_else(|| {
            MessagingError::Unauthorized(format!("{} is not a party to this appointment", caller.username))
        })?;
        if appointment.status != AppointmentStatus::Accepted {
            return Err(MessagingError::NotAccepted);
        }

        let stored_content = match request.message_type {
            MessageType::Text => self.cipher.encrypt(content)?,
            MessageType::Emoji => content.to_string(),
        };

        let stored = self
            .repository
            .insert(Message {
                id: Uuid::new_v4(),
                appointment_id: appointment.id,
                sender_username: caller.username.clone(),
                receiver_username: appointment.username_of(sender_role.counterparty()).to_string(),
                content: stored_content,
                message_type: request.message_type,
                timestamp: Utc::now(),
                read: false,
            })
            .await?;

        let message = self.reveal(stored);
        let delivered = self
            .hub
            .publish(
                message.appointment_id,
                RoomEvent {
                    skip: None,
                    event: ServerEvent::ReceiveMessage { message: message.clone() },
                },
            )
            .await;

        info!(
            "Message {} from {} in appointment {} ({} live recipients)",
            message.id, message.sender_username, message.appointment_id, delivered
        );
        Ok(message)
    }

    /// Oldest first, decrypted.
    pub async fn list_messages(&self, caller: &User, appointment_id: Uuid) -> Result<Vec<Message>, MessagingError> {
        self.authorize_room(caller, appointment_id).await?;
        let messages = self.repository.list_for_appointment(appointment_id).await?;
        debug!("Loaded {} messages for appointment {}", messages.len(), appointment_id);
        Ok(messages.into_iter().map(|message| self.reveal(message)).collect())
    }

    pub async fn unread_count(&self, caller: &User, username: &str) -> Result<usize, MessagingError> {
        ensure_can_act_as(caller, username)?;
        self.repository.unread_count(username).await
    }

    pub async fn mark_read(&self, caller: &User, appointment_id: Uuid, username: &str) -> Result<usize, MessagingError> {
        ensure_can_act_as(caller, username)?;
        let updated = self.repository.mark_read(appointment_id, username).await?;
        debug!("Marked {} messages read for {} in {}", updated, username, appointment_id);
        Ok(updated)
    }

    fn reveal(&self, mut message: Message) -> Message {
        if message.message_type == MessageType::Text {
            match self.cipher.decrypt(&message.content) {
                Ok(plain) => message.content = plain,
                Err(e) => {
                    warn!("Could not decrypt message {}: {}", message.id, e);
                    message.content = UNREADABLE_MESSAGE.to_string();
                }
            }
        }
        message
    }
}

fn ensure_can_act_as(caller: &User, username: &str) -> Result<(), MessagingError> {
    if caller.can_act_as(username) {
        Ok(())
    } else {
        Err(MessagingError::Unauthorized(format!(
            "{} cannot read messages of {}",
            caller.username, username
        )))
    }
}
