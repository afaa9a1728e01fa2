//! Per-process registry of live sessions, keyed by user.
//!
//! Every user with at least one session owns one bus subscription. The
//! first session of a user opens it; the removal that empties the user's
//! entry hands it back for teardown. Both happen under the entry's shard
//! lock, so a subscription is torn down exactly once even when connects and
//! disconnects for the same user race.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use messaging::Subscription;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryError {
    /// The session's outbound buffer is full.
    Full,
    /// The session is already gone.
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictReason {
    /// The session could not keep up with its user's topic.
    Overflow,
    /// The user's topic could not be subscribed.
    Unavailable,
}

/// Outbound side of one live session.
pub trait SessionSink: Send + Sync + 'static {
    /// Queues a frame without waiting.
    fn try_deliver(&self, payload: &str) -> Result<(), DeliveryError>;

    /// Terminates the session.
    fn evict(&self, reason: EvictReason);
}

struct UserSessions<S> {
    epoch: u64,
    sessions: HashMap<String, Arc<S>>,
    subscription: Option<Subscription>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub conn_id: String,
    /// Identifies this incarnation of the user's entry.
    pub epoch: u64,
    pub is_first: bool,
}

pub struct SessionHub<S> {
    users: DashMap<i64, UserSessions<S>>,
    sessions: AtomicUsize,
    epochs: AtomicU64,
}

impl<S: SessionSink> Default for SessionHub<S> {
    fn default() -> Self {
        Self {
            users: DashMap::new(),
            sessions: AtomicUsize::new(0),
            epochs: AtomicU64::new(0),
        }
    }
}

impl<S: SessionSink> SessionHub<S> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, user_id: i64, sink: S) -> Registration {
        let conn_id = Uuid::new_v4().to_string();

        let mut entry = self.users.entry(user_id).or_insert_with(|| UserSessions {
            epoch: self.epochs.fetch_add(1, Ordering::Relaxed) + 1,
            sessions: HashMap::new(),
            subscription: None,
        });
        let is_first = entry.sessions.is_empty();
        entry.sessions.insert(conn_id.clone(), Arc::new(sink));
        self.sessions.fetch_add(1, Ordering::Relaxed);

        Registration {
            conn_id,
            epoch: entry.epoch,
            is_first,
        }
    }

    /// Stores the user's bus subscription. Fails, handing the subscription
    /// back, when the entry it was opened for no longer exists.
    pub fn attach(&self, user_id: i64, epoch: u64, subscription: Subscription) -> Result<(), Subscription> {
        match self.users.get_mut(&user_id) {
            Some(mut entry) if entry.epoch == epoch => {
                entry.subscription = Some(subscription);
                Ok(())
            }
            _ => Err(subscription),
        }
    }

    /// Offers `payload` to every live session of the user and returns how
    /// many accepted it. Never waits on a session: a full one is evicted,
    /// a closed one skipped.
    pub fn broadcast(&self, user_id: i64, payload: &str) -> usize {
        // Snapshot so no shard lock is held while delivering.
        let targets: Vec<(String, Arc<S>)> = match self.users.get(&user_id) {
            Some(entry) => entry
                .sessions
                .iter()
                .map(|(id, sink)| (id.clone(), sink.clone()))
                .collect(),
            None => return 0,
        };

        let mut delivered = 0;
        for (conn_id, sink) in targets {
            match sink.try_deliver(payload) {
                Ok(()) => delivered += 1,
                Err(DeliveryError::Full) => {
                    warn!(user_id, conn_id = %conn_id, "Session buffer full, evicting");
                    sink.evict(EvictReason::Overflow);
                }
                Err(DeliveryError::Closed) => {
                    debug!(user_id, conn_id = %conn_id, "Session already closed, skipping");
                }
            }
        }
        delivered
    }

    /// Removes one session. When it was the user's last, `on_empty` runs
    /// once with the user's subscription, if one was attached.
    pub fn remove<F>(&self, user_id: i64, conn_id: &str, on_empty: F) -> bool
    where
        F: FnOnce(Option<Subscription>),
    {
        let mut removed = false;
        let emptied = self.users.remove_if_mut(&user_id, |_, entry| {
            removed = entry.sessions.remove(conn_id).is_some();
            entry.sessions.is_empty()
        });

        if removed {
            self.sessions.fetch_sub(1, Ordering::Relaxed);
        }
        if let Some((_, mut entry)) = emptied {
            on_empty(entry.subscription.take());
        }
        removed
    }

    /// Drops the user's entry if it is still incarnation `epoch` and hands
    /// back its sessions. The next session of the user starts a fresh entry
    /// and subscribes again; `remove` for a detached session is a no-op.
    pub fn detach(&self, user_id: i64, epoch: u64) -> Vec<Arc<S>> {
        match self.users.remove_if(&user_id, |_, entry| entry.epoch == epoch) {
            Some((_, entry)) => {
                self.sessions.fetch_sub(entry.sessions.len(), Ordering::Relaxed);
                entry.sessions.into_values().collect()
            }
            None => Vec::new(),
        }
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use messaging::{InMemoryBroker, MessageBroker};
    use std::sync::atomic::AtomicBool;
    use std::sync::Mutex;

    #[derive(Default)]
    struct TestSink {
        frames: Mutex<Vec<String>>,
        full: AtomicBool,
        closed: AtomicBool,
        evicted: Mutex<Option<EvictReason>>,
    }

    impl SessionSink for Arc<TestSink> {
        fn try_deliver(&self, payload: &str) -> Result<(), DeliveryError> {
            if self.closed.load(Ordering::SeqCst) {
                return Err(DeliveryError::Closed);
            }
            if self.full.load(Ordering::SeqCst) {
                return Err(DeliveryError::Full);
            }
            self.frames.lock().unwrap().push(payload.to_string());
            Ok(())
        }

        fn evict(&self, reason: EvictReason) {
            *self.evicted.lock().unwrap() = Some(reason);
        }
    }

    async fn subscription(broker: &InMemoryBroker, topic: &str) -> Subscription {
        broker.subscribe(topic, Arc::new(|_: String| {})).await.unwrap()
    }

    #[test]
    fn test_first_session_flag_and_broadcast() {
        let hub: SessionHub<Arc<TestSink>> = SessionHub::new();
        let a = Arc::new(TestSink::default());
        let b = Arc::new(TestSink::default());

        let ra = hub.add(1, a.clone());
        let rb = hub.add(1, b.clone());
        assert!(ra.is_first);
        assert!(!rb.is_first);
        assert_eq!(ra.epoch, rb.epoch);
        assert_ne!(ra.conn_id, rb.conn_id);

        assert_eq!(hub.broadcast(1, "x"), 2);
        assert_eq!(hub.broadcast(2, "x"), 0);
        assert_eq!(*a.frames.lock().unwrap(), vec!["x".to_string()]);
        assert_eq!(*b.frames.lock().unwrap(), vec!["x".to_string()]);
        assert_eq!(hub.session_count(), 2);
        assert_eq!(hub.user_count(), 1);
    }

    #[test]
    fn test_slow_session_does_not_block_others() {
        let hub: SessionHub<Arc<TestSink>> = SessionHub::new();
        let slow = Arc::new(TestSink::default());
        let gone = Arc::new(TestSink::default());
        let ok = Arc::new(TestSink::default());
        slow.full.store(true, Ordering::SeqCst);
        gone.closed.store(true, Ordering::SeqCst);

        hub.add(1, slow.clone());
        hub.add(1, gone.clone());
        hub.add(1, ok.clone());

        assert_eq!(hub.broadcast(1, "m"), 1);
        assert_eq!(*slow.evicted.lock().unwrap(), Some(EvictReason::Overflow));
        assert_eq!(*gone.evicted.lock().unwrap(), None);
        assert_eq!(ok.frames.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_last_removal_hands_back_subscription_once() {
        let broker = InMemoryBroker::new();
        let hub: SessionHub<Arc<TestSink>> = SessionHub::new();

        let ra = hub.add(7, Arc::new(TestSink::default()));
        let rb = hub.add(7, Arc::new(TestSink::default()));
        hub.attach(7, ra.epoch, subscription(&broker, "t7").await)
            .map_err(|_| ())
            .unwrap();

        let mut calls = 0;
        assert!(hub.remove(7, &ra.conn_id, |_| calls += 1));
        assert_eq!(calls, 0);

        let mut handed_back = None;
        assert!(hub.remove(7, &rb.conn_id, |sub| {
            calls += 1;
            handed_back = sub;
        }));
        assert_eq!(calls, 1);
        assert_eq!(handed_back.as_ref().map(|s| s.topic()), Some("t7"));

        // Removing an unknown connection is a no-op.
        assert!(!hub.remove(7, &rb.conn_id, |_| calls += 1));
        assert_eq!(calls, 1);
        assert_eq!(hub.session_count(), 0);
        assert_eq!(hub.user_count(), 0);

        if let Some(sub) = handed_back {
            sub.close().await;
        }
        assert_eq!(broker.subscriber_count("t7"), 0);
    }

    #[tokio::test]
    async fn test_attach_to_stale_entry_fails() {
        let broker = InMemoryBroker::new();
        let hub: SessionHub<Arc<TestSink>> = SessionHub::new();

        let first = hub.add(3, Arc::new(TestSink::default()));
        hub.remove(3, &first.conn_id, |_| {});
        let second = hub.add(3, Arc::new(TestSink::default()));
        assert!(second.is_first);
        assert_ne!(first.epoch, second.epoch);

        let sub = subscription(&broker, "t3").await;
        let sub = hub.attach(3, first.epoch, sub).unwrap_err();
        assert!(hub.attach(3, second.epoch, sub).is_ok());
    }

    #[test]
    fn test_detach_drops_only_the_matching_entry() {
        let hub: SessionHub<Arc<TestSink>> = SessionHub::new();
        let a = hub.add(4, Arc::new(TestSink::default()));
        let b = hub.add(4, Arc::new(TestSink::default()));

        assert!(hub.detach(4, a.epoch + 100).is_empty());
        assert_eq!(hub.detach(4, a.epoch).len(), 2);
        assert_eq!(hub.session_count(), 0);
        assert_eq!(hub.user_count(), 0);

        // Late removals of detached sessions change nothing.
        let mut calls = 0;
        assert!(!hub.remove(4, &b.conn_id, |_| calls += 1));
        assert_eq!(calls, 0);
        assert_eq!(hub.session_count(), 0);

        let fresh = hub.add(4, Arc::new(TestSink::default()));
        assert!(fresh.is_first);
        assert_ne!(fresh.epoch, a.epoch);
    }

    #[test]
    fn test_concurrent_churn_tears_down_each_entry_once() {
        let hub: SessionHub<Arc<TestSink>> = SessionHub::new();
        let firsts = AtomicUsize::new(0);
        let teardowns = AtomicUsize::new(0);

        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    for _ in 0..200 {
                        let reg = hub.add(1, Arc::new(TestSink::default()));
                        if reg.is_first {
                            firsts.fetch_add(1, Ordering::SeqCst);
                        }
                        hub.broadcast(1, "p");
                        hub.remove(1, &reg.conn_id, |_| {
                            teardowns.fetch_add(1, Ordering::SeqCst);
                        });
                    }
                });
            }
        });

        assert_eq!(firsts.load(Ordering::SeqCst), teardowns.load(Ordering::SeqCst));
        assert_eq!(hub.session_count(), 0);
        assert_eq!(hub.user_count(), 0);
    }
}
