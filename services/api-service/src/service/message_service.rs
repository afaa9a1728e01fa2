use std::sync::Arc;

use common::{AppError, AppResult, Forbidden};
use contracts::RealtimeEvent;
use messaging::{MessageBroker, Topics};
use tracing::{debug, warn};

use crate::domain::{page_count, page_offset, Message, MessagePage, MESSAGE_PAGE_SIZE};
use crate::repo::{Store, StoreTx};

const MAX_CONTENT_LEN: usize = 4096;

/// Persists chat messages and fans them out to every member's topic.
#[derive(Clone)]
pub struct MessageService {
    store: Arc<dyn Store>,
    broker: Arc<dyn MessageBroker>,
    topics: Topics,
}

impl MessageService {
    pub fn new(store: Arc<dyn Store>, broker: Arc<dyn MessageBroker>, topics: Topics) -> Self {
        Self {
            store,
            broker,
            topics,
        }
    }

    pub async fn send_message(&self, room_id: &str, sender_id: i64, content: String) -> AppResult<Message> {
        if content.trim().is_empty() {
            return Err(AppError::invalid("message content is required"));
        }
        if content.len() > MAX_CONTENT_LEN {
            return Err(AppError::invalid("message is too long"));
        }

        let mut tx = self.store.begin().await?;
        ensure_member(tx.as_mut(), room_id, sender_id).await?;

        let message = Message::new(room_id.to_string(), sender_id, content);
        tx.insert_message(&message).await?;
        let recipients = tx.member_ids(room_id).await?;
        tx.commit().await?;

        self.fan_out(&message, &recipients).await;
        Ok(message)
    }

    /// Publishes one frame per recipient, in order. A failed publish is
    /// logged; the message stays saved.
    async fn fan_out(&self, message: &Message, recipients: &[i64]) {
        let event = RealtimeEvent::Chat {
            room_id: message.room_id.clone(),
            sender_id: message.sender_id,
            content: message.content.clone(),
            sent_at: message.sent_at,
            message_id: message.id.clone(),
        };
        let payload = match event.to_payload() {
            Ok(payload) => payload,
            Err(e) => {
                warn!(message_id = %message.id, "Failed to encode chat event: {}", e);
                return;
            }
        };

        for user_id in recipients {
            let topic = self.topics.user(*user_id);
            if let Err(e) = self.broker.publish(&topic, &payload).await {
                warn!(topic = %topic, message_id = %message.id, "Failed to publish chat message: {}", e);
            }
        }
        debug!(message_id = %message.id, recipients = recipients.len(), "Chat message dispatched");
    }

    /// One page of the room's history. Only members may read it.
    pub async fn get_messages(
        &self,
        room_id: &str,
        caller_id: i64,
        page: Option<i64>,
        asc: bool,
    ) -> AppResult<MessagePage> {
        let page = page.unwrap_or(1);
        let offset = page_offset(page, MESSAGE_PAGE_SIZE)?;

        let mut tx = self.store.begin().await?;
        ensure_member(tx.as_mut(), room_id, caller_id).await?;
        let total = tx.count_messages(room_id).await?;
        let messages = tx
            .messages_page(room_id, offset, MESSAGE_PAGE_SIZE, asc)
            .await?;
        tx.commit().await?;

        Ok(MessagePage {
            messages,
            page,
            page_count: page_count(total),
        })
    }

    pub async fn get_message(&self, room_id: &str, message_id: &str, caller_id: i64) -> AppResult<Message> {
        let mut tx = self.store.begin().await?;
        ensure_member(tx.as_mut(), room_id, caller_id).await?;
        let message = tx
            .find_message(room_id, message_id)
            .await?
            .ok_or_else(|| AppError::not_found("message"))?;
        tx.commit().await?;
        Ok(message)
    }
}

async fn ensure_member(tx: &mut dyn StoreTx, room_id: &str, user_id: i64) -> AppResult<()> {
    if tx.find_room(room_id).await?.is_none() {
        return Err(AppError::not_found("room"));
    }
    if !tx.is_member(room_id, user_id).await? {
        return Err(Forbidden::NotInRoom.into());
    }
    Ok(())
}
