mod api;
mod domain;
mod repo;
mod service;
mod worker;

use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use anyhow::{Context, Result};
use common::{errors::expose_error_details, AppConfig};
use messaging::{RedisBroker, Topics};
use tracing::info;
use tracing_subscriber::EnvFilter;

use api::{configure_routes, AppState};
use repo::MySqlStore;
use worker::{PushWorkerPool, WebPushGateway};

#[actix_web::main]
async fn main() -> Result<()> {
    let config = AppConfig::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(config.log_filter()))
        .init();
    expose_error_details(config.env.exposes_error_details());

    info!("Starting API Service ({})...", config.env);

    // Initialize database pool
    let pool = db::create_pool(config.require_database_url()?).await?;
    db::migrate(&pool).await?;

    // Initialize Redis pub/sub
    let broker = RedisBroker::connect(&config.redis_url)
        .await
        .context("Failed to connect to Redis")?;
    info!("Redis connection established");

    // Start push workers
    let gateway = WebPushGateway::new(config.require_vapid()?.clone())?;
    let push_pool = PushWorkerPool::start(
        Arc::new(gateway),
        config.push_workers,
        config.push_queue_capacity,
    );

    let state = web::Data::new(AppState::new(
        Arc::new(MySqlStore::new(pool)),
        Arc::new(broker),
        Topics::new(config.topic_prefix.clone(), config.env),
        push_pool.queue(),
    ));

    let server_address = config.server_address();
    let jwt_secret = config.jwt_secret.clone();
    let origins = config.allowed_origins.clone();

    info!("Starting HTTP server on http://{}", server_address);

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(Logger::default())
            .wrap(cors(&origins))
            .configure(|cfg| configure_routes(cfg, &jwt_secret))
    })
    .bind(&server_address)?
    .run()
    .await?;

    info!("HTTP server stopped, draining push queue");
    push_pool.shutdown().await;

    Ok(())
}

fn cors(origins: &[String]) -> Cors {
    if origins.is_empty() {
        return Cors::permissive();
    }

    origins
        .iter()
        .fold(Cors::default(), |cors, origin| cors.allowed_origin(origin))
        .allowed_methods(vec!["GET", "POST", "PATCH", "DELETE", "OPTIONS"])
        .allow_any_header()
        .supports_credentials()
        .max_age(3600)
}
