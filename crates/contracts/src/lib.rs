pub mod events;
pub mod push;

pub use events::RealtimeEvent;
pub use push::WebPushPayload;
