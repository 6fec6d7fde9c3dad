use crate::error::AppError;
use dotenvy::dotenv;
use std::env;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceBackend {
    Memory,
    Redis,
}

impl FromStr for PresenceBackend {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" | "" => Ok(PresenceBackend::Memory),
            "redis" => Ok(PresenceBackend::Redis),
            other => Err(AppError::Config(format!(
                "CHAT_PRESENCE_BACKEND must be memory or redis, got {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    /// In-memory store and profile directory when unset.
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub presence_backend: PresenceBackend,
    pub redis_url: String,
    pub jwt_secret: String,
    pub file_base_url: String,
    /// Notifications are only logged when unset.
    pub notification_service_url: Option<String>,
    pub notification_timeout: Duration,
    pub heartbeat_interval: Duration,
    pub client_timeout: Duration,
    /// Lifetime of a redis presence entry; heartbeats re-arm it.
    pub presence_ttl: Duration,
    pub enforce_bound_identity: bool,
    pub surface_read_errors: bool,
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let number = |key: &str, default: u64| {
            non_empty(key)
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(default)
        };
        let flag = |key: &str| non_empty(key).and_then(|v| parse_bool(&v)).unwrap_or(false);

        let jwt_secret = non_empty("JWT_SECRET")
            .ok_or_else(|| AppError::Config("JWT_SECRET is required".into()))?;

        let presence_backend = non_empty("CHAT_PRESENCE_BACKEND")
            .map(|v| v.parse::<PresenceBackend>())
            .transpose()?
            .unwrap_or(PresenceBackend::Memory);

        let heartbeat_interval = Duration::from_secs(number("CHAT_WS_HEARTBEAT_SECS", 5));
        let presence_ttl = Duration::from_secs(number("CHAT_PRESENCE_TTL_SECS", 60))
            .max(heartbeat_interval * 2);

        Ok(Self {
            port: non_empty("PORT")
                .and_then(|v| v.parse().ok())
                .unwrap_or(3000),
            database_url: non_empty("DATABASE_URL"),
            database_max_connections: non_empty("DATABASE_MAX_CONNECTIONS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(10),
            presence_backend,
            redis_url: non_empty("REDIS_URL")
                .unwrap_or_else(|| "redis://127.0.0.1:6379".to_string()),
            jwt_secret,
            file_base_url: lookup("FILE_BASE_URL").unwrap_or_default(),
            notification_service_url: non_empty("NOTIFICATION_SERVICE_URL"),
            notification_timeout: Duration::from_millis(number(
                "CHAT_NOTIFICATION_TIMEOUT_MS",
                3000,
            )),
            heartbeat_interval,
            client_timeout: Duration::from_secs(number("CHAT_WS_CLIENT_TIMEOUT_SECS", 30)),
            presence_ttl,
            enforce_bound_identity: flag("CHAT_ENFORCE_BOUND_IDENTITY"),
            surface_read_errors: flag("CHAT_SURFACE_READ_ERRORS"),
        })
    }

    pub fn test_defaults() -> Self {
        Self {
            port: 0,
            database_url: None,
            database_max_connections: 1,
            presence_backend: PresenceBackend::Memory,
            redis_url: "redis://127.0.0.1:6379".to_string(),
            jwt_secret: "test-secret".to_string(),
            file_base_url: "https://files.test/".to_string(),
            notification_service_url: None,
            notification_timeout: Duration::from_millis(200),
            heartbeat_interval: Duration::from_secs(5),
            client_timeout: Duration::from_secs(30),
            presence_ttl: Duration::from_secs(60),
            enforce_bound_identity: false,
            surface_read_errors: false,
        }
    }
}
