use std::{env, fmt::Display, fs::read_to_string, path::PathBuf, str::FromStr};

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{info, warn};

use crate::target::Scheme;

#[derive(Error, Debug)]
#[error("Invalid {key} value: {message}")]
pub struct ConfigError {
    pub key: String,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreBackend {
    #[default]
    Redis,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "redis" => Ok(StoreBackend::Redis),
            "memory" => Ok(StoreBackend::Memory),
            other => Err(format!("unknown store backend '{other}'")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub redis_url: String,
    pub store_backend: StoreBackend,
    /// Catalog file the memory backend starts from.
    pub catalog_path: Option<PathBuf>,
    pub scheme: Scheme,
    /// Votes at or after this instant are rejected.
    pub deadline: Option<DateTime<Utc>>,
    /// Take the voter address from `X-Forwarded-For`, only safe behind our own proxy.
    pub trust_forwarded_for: bool,
    pub cors_max_age: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 1111,
            redis_url: "redis://redis:6379".to_string(),
            store_backend: StoreBackend::default(),
            catalog_path: None,
            scheme: Scheme::default(),
            deadline: None,
            trust_forwarded_for: false,
            cors_max_age: 86400,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        let redis_url = match read_secret("REDIS_URL") {
            Some(url) => url,
            None => try_load("REDIS_URL", "redis://redis:6379")?,
        };

        Ok(Self {
            port: try_load("RUST_PORT", "1111")?,
            redis_url,
            store_backend: try_load("STORE_BACKEND", "redis")?,
            catalog_path: try_load_optional("CATALOG_PATH")?,
            scheme: try_load("VOTE_SCHEME", "candidate")?,
            deadline: try_load_optional::<DateTime<Utc>>("VOTE_DEADLINE")?,
            trust_forwarded_for: try_load("TRUST_FORWARDED_FOR", "false")?,
            cors_max_age: try_load("CORS_MAX_AGE_SECS", "86400")?,
        })
    }
}

fn var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T::Err: Display,
{
    value.trim().parse().map_err(|e: T::Err| {
        warn!("Invalid {key} value: {e}");

        ConfigError {
            key: key.to_string(),
            message: e.to_string(),
        }
    })
}

fn try_load<T: FromStr>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T::Err: Display,
{
    let value = var(key).unwrap_or_else(|| {
        info!("{key} not set, using default: {default}");
        default.to_string()
    });

    parse(key, &value)
}

fn try_load_optional<T: FromStr>(key: &str) -> Result<Option<T>, ConfigError>
where
    T::Err: Display,
{
    match var(key) {
        Some(value) => parse(key, &value).map(Some),
        None => {
            info!("{key} not set");
            Ok(None)
        }
    }
}

fn read_secret(secret_name: &str) -> Option<String> {
    let path = format!("/run/secrets/{secret_name}");

    read_to_string(&path)
        .map(|s| s.trim().to_string())
        .map_err(|e| {
            info!("No {secret_name} secret, falling back to environment: {e}");
        })
        .ok()
}
