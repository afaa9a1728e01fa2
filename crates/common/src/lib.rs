// Shared plumbing for every service
pub mod config;
pub mod errors;

pub use config::{AppConfig, ConfigError, Env, VapidConfig};
pub use errors::{ApiResponse, AppError, AppResult, Conflict, Forbidden};
