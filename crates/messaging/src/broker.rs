use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

#[derive(Error, Debug)]
pub enum BrokerError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("broker is closed")]
    Closed,
}

/// Invoked once per message, in publish order, from the subscription task.
pub type MessageHandler = Arc<dyn Fn(String) + Send + Sync>;

#[async_trait]
pub trait MessageBroker: Send + Sync {
    /// Returns once the bus has accepted the message.
    async fn publish(&self, topic: &str, payload: &str) -> Result<(), BrokerError>;

    /// Starts a consumer on `topic`. Messages published after this returns
    /// are delivered to `handler`.
    async fn subscribe(&self, topic: &str, handler: MessageHandler)
        -> Result<Subscription, BrokerError>;
}

/// Handle to a running consumer.
///
/// [`Subscription::close`] stops the consumer and waits for it to release
/// the topic. Dropping the handle stops it without waiting.
pub struct Subscription {
    topic: String,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    pub(crate) fn new(topic: String, shutdown: oneshot::Sender<()>, task: JoinHandle<()>) -> Self {
        Self {
            topic,
            shutdown: Some(shutdown),
            task: Some(task),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub async fn close(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::warn!(topic = %self.topic, "subscription task ended abnormally: {}", e);
            }
        }
        tracing::debug!(topic = %self.topic, "subscription closed");
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}
