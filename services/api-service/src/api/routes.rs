use actix_web::{error, web};
use authz::AuthMiddleware;
use common::AppError;

use super::handlers::*;

pub fn configure_routes(cfg: &mut web::ServiceConfig, jwt_secret: &str) {
    // Malformed bodies and query strings use the same envelope as every other error.
    cfg.app_data(web::JsonConfig::default().error_handler(|err, _| {
        error::Error::from(AppError::invalid(err.to_string()))
    }))
    .app_data(web::QueryConfig::default().error_handler(|err, _| {
        error::Error::from(AppError::invalid(err.to_string()))
    }))
    .app_data(web::PathConfig::default().error_handler(|err, _| {
        error::Error::from(AppError::invalid(err.to_string()))
    }));

    // Health check outside /api scope (no auth required)
    cfg.route("/health", web::get().to(health_check));

    cfg.service(
        web::scope("/api")
            .wrap(AuthMiddleware::new(jwt_secret))
            // Bills
            .route("/bills", web::post().to(create_bill))
            .route("/bills", web::get().to(get_bills))
            .route("/bills", web::delete().to(delete_room_bills))
            .route("/bills/consolidate", web::post().to(consolidate_bills))
            .route("/bills/consolidate/{room_id}", web::get().to(is_consolidated))
            // Transactions
            .route("/transactions", web::get().to(get_transactions))
            .route("/transactions/{id}/settle", web::patch().to(settle_transaction))
            // Rooms
            .route("/rooms", web::get().to(get_rooms))
            .route("/rooms", web::post().to(create_room))
            .route("/rooms/count", web::get().to(count_rooms))
            .route("/rooms/invites", web::get().to(get_pending_invites))
            .route("/rooms/invites/count", web::get().to(count_pending_invites))
            .route("/rooms/{room_id}", web::get().to(get_room))
            .route("/rooms/{room_id}/members", web::get().to(get_room_members))
            .route("/rooms/{room_id}/members/{user_id}", web::delete().to(remove_member))
            .route("/rooms/{room_id}/invites", web::post().to(invite_users))
            .route("/rooms/{room_id}/invites", web::patch().to(respond_to_invite))
            .route("/rooms/{room_id}/join", web::patch().to(join_room))
            .route("/rooms/{room_id}/leave", web::patch().to(leave_room))
            .route("/rooms/{room_id}/close", web::patch().to(close_room))
            // Messages
            .route("/rooms/{room_id}/messages", web::post().to(send_message))
            .route("/rooms/{room_id}/messages", web::get().to(get_messages))
            .route("/rooms/{room_id}/messages/{message_id}", web::get().to(get_message))
            // Notifications
            .route("/notifications", web::get().to(get_notifications))
            .route("/notifications/{id}/read", web::patch().to(mark_notification_read))
            .route("/subscriptions", web::post().to(create_subscription))
            .route("/subscriptions/{id}", web::delete().to(delete_subscription)),
    );
}
