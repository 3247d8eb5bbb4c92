//! Configuration management

use std::env;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
    #[error("Invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}

/// Which persistence backend serves the reconciler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    /// Non-persistent, for local smoke runs
    Memory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_address: String,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub store_backend: StoreBackend,
    /// Shared secret gateways must present. `None` runs the webhook open.
    pub webhook_access_token: Option<String>,
    /// Header carrying the shared secret
    pub webhook_token_header: String,
    pub log_format: LogFormat,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup; `from_env` passes the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let store_backend = match non_empty("STORE_BACKEND").as_deref() {
            None | Some("postgres") => StoreBackend::Postgres,
            Some("memory") => StoreBackend::Memory,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    key: "STORE_BACKEND",
                    value: other.to_string(),
                })
            }
        };

        let database_url = non_empty("DATABASE_URL");
        if store_backend == StoreBackend::Postgres && database_url.is_none() {
            return Err(ConfigError::Missing("DATABASE_URL"));
        }

        let database_max_connections = match non_empty("DATABASE_MAX_CONNECTIONS") {
            None => subdesk_shared::DEFAULT_MAX_CONNECTIONS,
            Some(raw) => match raw.parse::<u32>() {
                Ok(n) if n > 0 => n,
                _ => {
                    return Err(ConfigError::Invalid {
                        key: "DATABASE_MAX_CONNECTIONS",
                        value: raw,
                    })
                }
            },
        };

        let log_format = match non_empty("LOG_FORMAT").as_deref() {
            None | Some("pretty") => LogFormat::Pretty,
            Some("json") => LogFormat::Json,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    key: "LOG_FORMAT",
                    value: other.to_string(),
                })
            }
        };

        Ok(Self {
            bind_address: non_empty("BIND_ADDRESS").unwrap_or_else(|| "0.0.0.0:8080".to_string()),
            database_url,
            database_max_connections,
            store_backend,
            webhook_access_token: non_empty("WEBHOOK_ACCESS_TOKEN"),
            webhook_token_header: non_empty("WEBHOOK_TOKEN_HEADER")
                .map(|h| h.to_ascii_lowercase())
                .unwrap_or_else(|| "access-token".to_string()),
            log_format,
        })
    }
}
