use actix_web::web;

use super::handlers::*;

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    // Health check (no auth required)
    cfg.route("/health", web::get().to(health_check));

    // The upgrade authenticates itself from the header or the query string.
    cfg.route("/ws", web::get().to(ws_handler));
}
