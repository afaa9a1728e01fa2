mod handlers;
mod hub;
mod routes;
mod session;

use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use anyhow::{Context, Result};
use authz::JwtValidator;
use common::AppConfig;
use messaging::{RedisBroker, Topics};
use tracing::info;
use tracing_subscriber::EnvFilter;

use handlers::AppState;
use routes::configure_routes;
use session::Hub;

#[actix_web::main]
async fn main() -> Result<()> {
    let config = AppConfig::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(config.log_filter()))
        .init();

    info!("Starting WebSocket Service ({})...", config.env);

    let broker = RedisBroker::connect(&config.redis_url)
        .await
        .context("Failed to connect to Redis")?;
    broker.ping().await.context("Redis did not answer PING")?;
    info!("Redis connection established");

    let state = web::Data::new(AppState {
        hub: Arc::new(Hub::new()),
        broker: Arc::new(broker),
        topics: Topics::new(config.topic_prefix.clone(), config.env),
        validator: JwtValidator::new(config.jwt_secret.clone()),
    });

    let server_address = config.server_address();
    let origins = config.allowed_origins.clone();

    info!("Starting WebSocket server on ws://{}/ws", server_address);

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(Logger::default())
            .wrap(cors(&origins))
            .configure(configure_routes)
    })
    .bind(&server_address)?
    .run()
    .await?;

    info!("WebSocket server stopped");
    Ok(())
}

fn cors(origins: &[String]) -> Cors {
    if origins.is_empty() {
        return Cors::permissive();
    }

    origins
        .iter()
        .fold(Cors::default(), |cors, origin| cors.allowed_origin(origin))
        .allowed_methods(vec!["GET"])
        .allow_any_header()
        .max_age(3600)
}
