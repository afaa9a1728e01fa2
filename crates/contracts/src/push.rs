use serde::{Deserialize, Serialize};

/// Body delivered through Web Push to the service worker.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct WebPushPayload {
    pub title: String,
    pub message: String,
}
