//! Configuration
//!
//! Read from the environment at startup.

use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

use crate::game::state::validate_username;
use crate::game::GameError;

/// Default publish confirmation timeout.
pub const DEFAULT_CONFIRM_TIMEOUT: Duration = Duration::from_millis(5000);

/// Default bus server port.
pub const DEFAULT_BUS_PORT: u16 = 7878;

/// Client configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientConfig {
    /// Username to play as. If None, the operator is asked.
    pub username: Option<String>,
    /// Bus server URL.
    pub bus_url: String,
    /// How long a publish waits for its confirmation.
    pub confirm_timeout: Duration,
    /// Whether to draw the `> ` prompt.
    pub prompt_enabled: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            username: None,
            bus_url: format!("ws://127.0.0.1:{}", DEFAULT_BUS_PORT),
            confirm_timeout: DEFAULT_CONFIRM_TIMEOUT,
            prompt_enabled: true,
        }
    }
}

impl ClientConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create config from any key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let username = match lookup("PERIL_USERNAME") {
            Some(raw) => Some(validate_username(&raw)?.to_string()),
            None => None,
        };

        let bus_url = match lookup("PERIL_BUS_URL") {
            Some(raw) if raw.starts_with("ws://") || raw.starts_with("wss://") => raw,
            Some(raw) => return Err(ConfigError::InvalidBusUrl(raw)),
            None => ClientConfig::default().bus_url,
        };

        let confirm_timeout = confirm_timeout(&lookup)?;

        let prompt_enabled = lookup("PERIL_PROMPT")
            .map(|v| !(v == "0" || v.eq_ignore_ascii_case("false")))
            .unwrap_or(true);

        Ok(Self {
            username,
            bus_url,
            confirm_timeout,
            prompt_enabled,
        })
    }
}

/// Bus server configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerConfig {
    /// Address the WebSocket listener binds.
    pub bind_addr: SocketAddr,
    /// How long a publish waits for its confirmation.
    pub confirm_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], DEFAULT_BUS_PORT)),
            confirm_timeout: DEFAULT_CONFIRM_TIMEOUT,
        }
    }
}

impl ServerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create config from any key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let bind_addr = match lookup("PERIL_BUS_ADDR") {
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidAddress(raw.clone()))?,
            None => ServerConfig::default().bind_addr,
        };

        Ok(Self {
            bind_addr,
            confirm_timeout: confirm_timeout(&lookup)?,
        })
    }
}

fn confirm_timeout<F>(lookup: &F) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup("PERIL_CONFIRM_TIMEOUT_MS") else {
        return Ok(DEFAULT_CONFIRM_TIMEOUT);
    };
    match raw.trim().parse::<u64>() {
        Ok(millis) if millis > 0 => Ok(Duration::from_millis(millis)),
        _ => Err(ConfigError::InvalidTimeout(raw)),
    }
}

/// Configuration errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// PERIL_USERNAME is not a valid username.
    #[error("PERIL_USERNAME: {0}")]
    InvalidUsername(#[from] GameError),

    /// PERIL_CONFIRM_TIMEOUT_MS is not a positive number of milliseconds.
    #[error("PERIL_CONFIRM_TIMEOUT_MS: expected positive milliseconds, got '{0}'")]
    InvalidTimeout(String),

    /// PERIL_BUS_URL is not a WebSocket URL.
    #[error("PERIL_BUS_URL: expected ws:// or wss:// URL, got '{0}'")]
    InvalidBusUrl(String),

    /// PERIL_BUS_ADDR is not a socket address.
    #[error("PERIL_BUS_ADDR: expected host:port, got '{0}'")]
    InvalidAddress(String),
}
