//! Callback server configuration.
//!
//! Configuration is loaded from environment variables with fallback to
//! defaults.
//!
//! | Variable             | Default    |
//! |----------------------|------------|
//! | `CALLBACK_PORT`      | `8080`     |
//! | `CALLBACK_BIND_ADDR` | `0.0.0.0`  |
//! | `DATABASE_PATH`      | `duka.db`  |
//! | `LEDGER_MAX_RETRIES` | `5`        |
//! | `MAX_BODY_BYTES`     | `65536`    |

use std::env;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;

/// Callback server configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// HTTP listen port
    pub port: u16,

    /// Listen address
    pub bind_addr: IpAddr,

    /// SQLite database file
    pub database_path: PathBuf,

    /// Compare-and-swap attempts per sale before giving up
    pub ledger_max_retries: u32,

    /// Largest accepted callback body
    pub max_body_bytes: usize,
}

impl Default for ApiConfig {
    fn default() -> Self {
        ApiConfig {
            port: 8080,
            bind_addr: IpAddr::from([0, 0, 0, 0]),
            database_path: PathBuf::from("duka.db"),
            ledger_max_retries: 5,
            max_body_bytes: 64 * 1024,
        }
    }
}

impl ApiConfig {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = ApiConfig::default();

        let config = ApiConfig {
            port: parse_or(&lookup, "CALLBACK_PORT", defaults.port)?,
            bind_addr: parse_or(&lookup, "CALLBACK_BIND_ADDR", defaults.bind_addr)?,
            database_path: lookup("DATABASE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.database_path),
            ledger_max_retries: parse_or(&lookup, "LEDGER_MAX_RETRIES", defaults.ledger_max_retries)?,
            max_body_bytes: parse_or(&lookup, "MAX_BODY_BYTES", defaults.max_body_bytes)?,
        };

        if config.ledger_max_retries == 0 {
            return Err(ConfigError::InvalidValue("LEDGER_MAX_RETRIES".to_string()));
        }

        Ok(config)
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_addr, self.port)
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(key.to_string())),
        None => Ok(default),
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}")]
    InvalidValue(String),
}
