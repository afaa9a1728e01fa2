//! Per-user pub/sub over an external bus.
//!
//! [`MessageBroker`] is the seam: [`RedisBroker`] talks to Redis pub/sub,
//! [`InMemoryBroker`] keeps everything in-process for colocated deployments
//! and tests.

pub mod broker;
pub mod memory;
pub mod redis_broker;
pub mod topics;

pub use broker::{BrokerError, MessageBroker, MessageHandler, Subscription};
pub use memory::InMemoryBroker;
pub use redis_broker::RedisBroker;
pub use topics::Topics;
