use std::sync::Arc;

use actix_web::{web, HttpRequest, HttpResponse, Result};
use actix_web_actors::ws;
use authz::{bearer_token, token_from_query, JwtValidator};
use common::ApiResponse;
use messaging::{MessageBroker, Topics};
use serde::Serialize;
use tracing::{debug, info};

use crate::session::{Hub, WsSession};

#[derive(Clone)]
pub struct AppState {
    pub hub: Arc<Hub>,
    pub broker: Arc<dyn MessageBroker>,
    pub topics: Topics,
    pub validator: JwtValidator,
}

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    service: &'static str,
    version: &'static str,
    users: usize,
    sessions: usize,
}

// Health check endpoint (no auth required)
pub async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    ApiResponse::ok(
        "ok",
        HealthResponse {
            status: "healthy",
            service: "ws-service",
            version: env!("CARGO_PKG_VERSION"),
            users: state.hub.user_count(),
            sessions: state.hub.session_count(),
        },
    )
}

fn unauthorized(message: &str) -> HttpResponse {
    HttpResponse::Unauthorized().json(serde_json::json!({
        "status": 401,
        "message": message,
        "data": null,
    }))
}

/// Browsers cannot set headers on a WebSocket upgrade, so the token may
/// also come as `?token=`.
fn request_token(req: &HttpRequest) -> Option<&str> {
    req.headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(bearer_token)
        .or_else(|| token_from_query(req.query_string()))
}

pub async fn ws_handler(
    req: HttpRequest,
    stream: web::Payload,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let Some(token) = request_token(&req) else {
        return Ok(unauthorized("Missing token"));
    };
    let claims = match state.validator.verify_token(token) {
        Ok(claims) => claims,
        Err(e) => {
            debug!("Rejected WebSocket token: {}", e);
            return Ok(unauthorized("Invalid token"));
        }
    };

    info!(user_id = claims.user_id, "WebSocket connection request");
    let session = WsSession::new(
        claims.user_id,
        state.hub.clone(),
        state.broker.clone(),
        state.topics.clone(),
    );

    ws::start(session, &req, stream)
}
