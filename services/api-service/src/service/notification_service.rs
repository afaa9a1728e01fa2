use std::sync::Arc;

use common::{AppError, AppResult};
use contracts::RealtimeEvent;
use messaging::{MessageBroker, Topics};
use tracing::{info, warn};

use crate::domain::{CreateSubscriptionRequest, Notification, PushSubscription};
use crate::repo::Store;
use crate::worker::{PushJob, PushQueue};

/// Persists notifications, then fans them out to the user's live sessions
/// and to every registered push subscription.
#[derive(Clone)]
pub struct NotificationService {
    store: Arc<dyn Store>,
    broker: Arc<dyn MessageBroker>,
    topics: Topics,
    push: PushQueue,
}

impl NotificationService {
    pub fn new(
        store: Arc<dyn Store>,
        broker: Arc<dyn MessageBroker>,
        topics: Topics,
        push: PushQueue,
    ) -> Self {
        Self {
            store,
            broker,
            topics,
            push,
        }
    }

    pub async fn send_notification(
        &self,
        user_id: i64,
        title: &str,
        content: &str,
    ) -> AppResult<Notification> {
        if content.trim().is_empty() {
            return Err(AppError::invalid("notification content is required"));
        }

        let mut tx = self.store.begin().await?;
        let notification = tx.insert_notification(user_id, title, content).await?;
        let subscriptions = tx.subscriptions_for_user(user_id).await?;
        tx.commit().await?;

        self.publish(&notification).await;

        for subscription in subscriptions {
            let job = PushJob {
                subscription,
                title: notification.title.clone(),
                message: notification.content.clone(),
            };
            if let Err(e) = self.push.enqueue(job).await {
                warn!(user_id, "Failed to enqueue push notification: {}", e);
            }
        }

        info!(user_id, notification_id = notification.id, "Notification sent");
        Ok(notification)
    }

    async fn publish(&self, notification: &Notification) {
        let event = RealtimeEvent::Notification {
            notification_id: notification.id,
            title: notification.title.clone(),
            content: notification.content.clone(),
            created_at: notification.created_at,
        };

        let payload = match event.to_payload() {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Failed to encode notification event: {}", e);
                return;
            }
        };

        let topic = self.topics.user(notification.user_id);
        if let Err(e) = self.broker.publish(&topic, &payload).await {
            warn!(topic = %topic, "Failed to publish notification: {}", e);
        }
    }

    pub async fn get_notifications(&self, user_id: i64) -> AppResult<Vec<Notification>> {
        let mut tx = self.store.begin().await?;
        let notifications = tx.notifications_for_user(user_id).await?;
        tx.commit().await?;
        Ok(notifications)
    }

    pub async fn mark_read(&self, notification_id: i64, user_id: i64) -> AppResult<()> {
        let mut tx = self.store.begin().await?;
        if !tx.mark_notification_read(notification_id, user_id).await? {
            return Err(AppError::not_found("notification"));
        }
        tx.commit().await
    }

    pub async fn create_subscription(
        &self,
        user_id: i64,
        req: CreateSubscriptionRequest,
    ) -> AppResult<PushSubscription> {
        if req.endpoint.trim().is_empty() || req.auth.is_empty() || req.p256dh.is_empty() {
            return Err(AppError::invalid("endpoint, auth and p256dh are required"));
        }

        let subscription = PushSubscription::new(user_id, req.endpoint, req.auth, req.p256dh);
        let mut tx = self.store.begin().await?;
        let stored = tx.upsert_subscription(&subscription).await?;
        tx.commit().await?;
        Ok(stored)
    }

    pub async fn delete_subscription(&self, subscription_id: &str, user_id: i64) -> AppResult<()> {
        let mut tx = self.store.begin().await?;
        if !tx.delete_subscription(subscription_id, user_id).await? {
            return Err(AppError::not_found("subscription"));
        }
        tx.commit().await
    }
}
