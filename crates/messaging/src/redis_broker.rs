use async_trait::async_trait;
use futures::StreamExt;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use crate::broker::{BrokerError, MessageBroker, MessageHandler, Subscription};

/// Redis pub/sub broker. Publishes share one multiplexed connection; each
/// subscription owns a dedicated pub/sub connection.
#[derive(Clone)]
pub struct RedisBroker {
    client: redis::Client,
    publisher: MultiplexedConnection,
}

impl RedisBroker {
    pub async fn connect(redis_url: &str) -> Result<Self, BrokerError> {
        let client = redis::Client::open(redis_url)?;
        let publisher = client.get_multiplexed_tokio_connection().await?;
        info!("Redis connection established");
        Ok(Self { client, publisher })
    }

    pub async fn ping(&self) -> Result<(), BrokerError> {
        let mut conn = self.publisher.clone();
        redis::cmd("PING").query_async::<_, String>(&mut conn).await?;
        Ok(())
    }
}

#[async_trait]
impl MessageBroker for RedisBroker {
    async fn publish(&self, topic: &str, payload: &str) -> Result<(), BrokerError> {
        let mut conn = self.publisher.clone();
        let receivers: i64 = conn.publish(topic, payload).await?;
        debug!(topic, receivers, "published");
        Ok(())
    }

    async fn subscribe(
        &self,
        topic: &str,
        handler: MessageHandler,
    ) -> Result<Subscription, BrokerError> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.subscribe(topic).await?;

        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        let channel = topic.to_string();

        let task = tokio::spawn(async move {
            {
                let mut messages = pubsub.on_message();
                loop {
                    tokio::select! {
                        _ = &mut shutdown_rx => break,
                        next = messages.next() => match next {
                            Some(msg) => match msg.get_payload::<String>() {
                                Ok(payload) => handler(payload),
                                Err(e) => warn!(topic = %channel, "dropping undecodable message: {}", e),
                            },
                            None => {
                                error!(topic = %channel, "Redis subscription stream ended");
                                break;
                            }
                        }
                    }
                }
            }

            if let Err(e) = pubsub.unsubscribe(&channel).await {
                warn!(topic = %channel, "Failed to unsubscribe: {}", e);
            }
        });

        debug!(topic, "subscribed");
        Ok(Subscription::new(topic.to_string(), shutdown_tx, task))
    }
}
