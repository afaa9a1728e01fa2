pub mod bill_service;
pub mod message_service;
pub mod notification_service;
pub mod room_service;
pub mod settlement_service;

pub use bill_service::BillService;
pub use message_service::MessageService;
pub use notification_service::NotificationService;
pub use room_service::RoomService;
pub use settlement_service::SettlementService;
