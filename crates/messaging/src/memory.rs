use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::{broadcast, oneshot};
use tracing::warn;

use crate::broker::{BrokerError, MessageBroker, MessageHandler, Subscription};

const TOPIC_CAPACITY: usize = 256;

/// In-process broker for colocated services and tests. A topic exists
/// while it has at least one subscriber.
#[derive(Clone, Default)]
pub struct InMemoryBroker {
    topics: Arc<DashMap<String, broadcast::Sender<String>>>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.topics
            .get(topic)
            .map(|tx| tx.receiver_count())
            .unwrap_or(0)
    }
}

#[async_trait]
impl MessageBroker for InMemoryBroker {
    async fn publish(&self, topic: &str, payload: &str) -> Result<(), BrokerError> {
        if let Some(tx) = self.topics.get(topic) {
            // No live receivers is not an error for pub/sub.
            let _ = tx.send(payload.to_string());
        }
        Ok(())
    }

    async fn subscribe(
        &self,
        topic: &str,
        handler: MessageHandler,
    ) -> Result<Subscription, BrokerError> {
        let mut rx = self
            .topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(TOPIC_CAPACITY).0)
            .subscribe();

        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        let channel = topic.to_string();
        let topics = self.topics.clone();

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    next = rx.recv() => match next {
                        Ok(payload) => handler(payload),
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(topic = %channel, skipped, "subscriber lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            }

            // Last one out drops the topic.
            drop(rx);
            topics.remove_if(&channel, |_, tx| tx.receiver_count() == 0);
        });

        Ok(Subscription::new(topic.to_string(), shutdown_tx, task))
    }
}
