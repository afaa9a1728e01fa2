pub mod push;
pub mod web_push;

pub use push::{PushJob, PushQueue, PushWorkerPool};
pub use self::web_push::WebPushGateway;
