//! Web Push worker pool.
//!
//! A fixed number of workers drain one bounded queue. A failed delivery is
//! logged and dropped; push gateways retry on their side.

use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::domain::PushSubscription;

#[derive(Error, Debug)]
pub enum PushError {
    #[error("push queue is closed")]
    QueueClosed,

    #[error("invalid payload: {0}")]
    Payload(String),

    #[error("push gateway error: {0}")]
    Gateway(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushJob {
    pub subscription: PushSubscription,
    pub title: String,
    pub message: String,
}

#[async_trait]
pub trait PushGateway: Send + Sync {
    async fn deliver(&self, job: &PushJob) -> Result<(), PushError>;
}

/// Producer side of the push queue. Cheap to clone.
#[derive(Clone)]
pub struct PushQueue {
    sender: Arc<StdMutex<Option<mpsc::Sender<PushJob>>>>,
}

impl PushQueue {
    /// Waits for room when the queue is full.
    pub async fn enqueue(&self, job: PushJob) -> Result<(), PushError> {
        let sender = self
            .sender
            .lock()
            .map_err(|_| PushError::QueueClosed)?
            .clone()
            .ok_or(PushError::QueueClosed)?;

        sender.send(job).await.map_err(|_| PushError::QueueClosed)
    }

    fn close(&self) {
        if let Ok(mut sender) = self.sender.lock() {
            sender.take();
        }
    }
}

pub struct PushWorkerPool {
    queue: PushQueue,
    workers: Vec<JoinHandle<()>>,
}

impl PushWorkerPool {
    pub fn start(gateway: Arc<dyn PushGateway>, workers: usize, capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel::<PushJob>(capacity.max(1));
        let rx = Arc::new(Mutex::new(rx));

        let handles = (0..workers.max(1))
            .map(|id| {
                let rx = rx.clone();
                let gateway = gateway.clone();
                tokio::spawn(run_worker(id, rx, gateway))
            })
            .collect();

        info!(workers = workers.max(1), capacity, "Push worker pool started");
        Self {
            queue: PushQueue {
                sender: Arc::new(StdMutex::new(Some(tx))),
            },
            workers: handles,
        }
    }

    pub fn queue(&self) -> PushQueue {
        self.queue.clone()
    }

    /// Closes the queue and waits until the workers have drained it.
    pub async fn shutdown(self) {
        self.queue.close();
        for worker in self.workers {
            if let Err(e) = worker.await {
                error!("Push worker panicked: {}", e);
            }
        }
        info!("Push worker pool stopped");
    }
}

async fn run_worker(id: usize, rx: Arc<Mutex<mpsc::Receiver<PushJob>>>, gateway: Arc<dyn PushGateway>) {
    debug!(worker = id, "push worker started");
    loop {
        let next = { rx.lock().await.recv().await };
        let Some(job) = next else {
            break;
        };

        match gateway.deliver(&job).await {
            Ok(()) => debug!(worker = id, user_id = job.subscription.user_id, "push delivered"),
            Err(e) => warn!(
                worker = id,
                user_id = job.subscription.user_id,
                endpoint = %job.subscription.endpoint,
                "push delivery failed: {}",
                e
            ),
        }
    }
    debug!(worker = id, "push worker stopped");
}
