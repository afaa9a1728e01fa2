//! Persistence port.
//!
//! Services open a unit of work with [`Store::begin`] and reach every
//! aggregate through the returned [`StoreTx`]. Dropping a `StoreTx` without
//! calling [`StoreTx::commit`] rolls it back.

pub mod bill_repo;
pub mod invitation_repo;
pub mod message_repo;
pub mod mysql;
pub mod notification_repo;
pub mod room_repo;
pub mod transaction_repo;
pub mod user_repo;

#[cfg(test)]
pub mod memory;

use async_trait::async_trait;
use common::AppResult;

pub use bill_repo::BillRepository;
pub use invitation_repo::InvitationRepository;
pub use message_repo::MessageRepository;
pub use mysql::MySqlStore;
pub use notification_repo::NotificationRepository;
pub use room_repo::RoomRepository;
pub use transaction_repo::TransactionRepository;
pub use user_repo::UserRepository;

#[async_trait]
pub trait StoreTx:
    UserRepository
    + RoomRepository
    + InvitationRepository
    + BillRepository
    + TransactionRepository
    + MessageRepository
    + NotificationRepository
    + Send
{
    async fn commit(self: Box<Self>) -> AppResult<()>;
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn begin(&self) -> AppResult<Box<dyn StoreTx>>;

    async fn ping(&self) -> AppResult<()>;
}
