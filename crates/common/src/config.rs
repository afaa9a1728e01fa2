use std::env;
use std::fmt;
use std::str::FromStr;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{name} is invalid: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Deployment tag. Selects topic prefixing, default log level and whether
/// error details reach clients.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Env {
    Dev,
    Staging,
    Prod,
}

impl Env {
    pub fn as_str(&self) -> &'static str {
        match self {
            Env::Dev => "dev",
            Env::Staging => "staging",
            Env::Prod => "prod",
        }
    }

    pub fn default_log_level(&self) -> &'static str {
        match self {
            Env::Dev => "debug",
            Env::Staging | Env::Prod => "info",
        }
    }

    pub fn exposes_error_details(&self) -> bool {
        !matches!(self, Env::Prod)
    }
}

impl fmt::Display for Env {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Env {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dev" | "development" => Ok(Env::Dev),
            "staging" => Ok(Env::Staging),
            "prod" | "production" => Ok(Env::Prod),
            other => Err(ConfigError::Invalid {
                name: "APP_ENV",
                reason: format!("unknown environment '{}'", other),
            }),
        }
    }
}

#[derive(Clone, Debug)]
pub struct VapidConfig {
    pub email: String,
    pub public_key: String,
    pub private_key: String,
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub env: Env,
    pub service_name: String,
    pub server_host: String,
    pub server_port: u16,
    pub database_url: Option<String>,
    pub redis_url: String,
    pub topic_prefix: String,
    pub jwt_secret: String,
    pub vapid: Option<VapidConfig>,
    pub allowed_origins: Vec<String>,
    pub push_workers: usize,
    pub push_queue_capacity: usize,
}

impl AppConfig {
    /// Loads `.env` if present, then reads the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(get: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = match get("APP_ENV") {
            Some(raw) => raw.parse()?,
            None => Env::Dev,
        };

        let vapid = match (
            get("VAPID_EMAIL"),
            get("VAPID_PUBLIC_KEY"),
            get("VAPID_PRIVATE_KEY"),
        ) {
            (Some(email), Some(public_key), Some(private_key)) => Some(VapidConfig {
                email,
                public_key,
                private_key,
            }),
            _ => None,
        };

        Ok(Self {
            env,
            service_name: get("SERVICE_NAME").unwrap_or_else(|| "service".to_string()),
            server_host: get("SERVER_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            server_port: parse_or(&get, "SERVER_PORT", 8080)?,
            database_url: get("DATABASE_URL"),
            redis_url: get("REDIS_URL").unwrap_or_else(|| "redis://127.0.0.1:6379".to_string()),
            topic_prefix: get("TOPIC_PREFIX").unwrap_or_else(|| "justjio".to_string()),
            jwt_secret: get("JWT_SECRET").ok_or(ConfigError::Missing("JWT_SECRET"))?,
            vapid,
            allowed_origins: get("ALLOWED_ORIGINS")
                .map(|raw| {
                    raw.split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(String::from)
                        .collect()
                })
                .unwrap_or_default(),
            push_workers: parse_or(&get, "PUSH_WORKERS", 3)?,
            push_queue_capacity: parse_or(&get, "PUSH_QUEUE_CAPACITY", 100)?,
        })
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }

    pub fn require_database_url(&self) -> Result<&str, ConfigError> {
        self.database_url
            .as_deref()
            .ok_or(ConfigError::Missing("DATABASE_URL"))
    }

    pub fn require_vapid(&self) -> Result<&VapidConfig, ConfigError> {
        self.vapid
            .as_ref()
            .ok_or(ConfigError::Missing("VAPID_EMAIL, VAPID_PUBLIC_KEY and VAPID_PRIVATE_KEY"))
    }

    /// `RUST_LOG` wins; otherwise the environment's default level.
    pub fn log_filter(&self) -> String {
        env::var("RUST_LOG").unwrap_or_else(|_| self.env.default_log_level().to_string())
    }
}

fn parse_or<F, T>(get: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: fmt::Display,
{
    match get(name) {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            name,
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::from_lookup(lookup(&[("JWT_SECRET", "s")])).unwrap();
        assert_eq!(cfg.env, Env::Dev);
        assert_eq!(cfg.server_port, 8080);
        assert_eq!(cfg.push_workers, 3);
        assert_eq!(cfg.push_queue_capacity, 100);
        assert!(cfg.vapid.is_none());
        assert!(cfg.allowed_origins.is_empty());
    }

    #[test]
    fn test_missing_secret_is_an_error() {
        let err = AppConfig::from_lookup(lookup(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("JWT_SECRET")));
    }

    #[test]
    fn test_parses_env_and_origins() {
        let cfg = AppConfig::from_lookup(lookup(&[
            ("JWT_SECRET", "s"),
            ("APP_ENV", "production"),
            ("ALLOWED_ORIGINS", "https://a.example, https://b.example,"),
            ("SERVER_PORT", "9000"),
        ]))
        .unwrap();

        assert_eq!(cfg.env, Env::Prod);
        assert!(!cfg.env.exposes_error_details());
        assert_eq!(cfg.allowed_origins.len(), 2);
        assert_eq!(cfg.server_address(), "0.0.0.0:9000");
    }

    #[test]
    fn test_bad_port_is_rejected() {
        let err = AppConfig::from_lookup(lookup(&[("JWT_SECRET", "s"), ("SERVER_PORT", "abc")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "SERVER_PORT", .. }));
    }
}
