pub mod bill;
pub mod invitation;
pub mod message;
pub mod notification;
pub mod page;
pub mod room;
pub mod transaction;

pub use bill::*;
pub use invitation::*;
pub use message::*;
pub use notification::*;
pub use page::*;
pub use room::*;
pub use transaction::*;
