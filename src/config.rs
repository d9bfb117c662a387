//! Client configuration.
//!
//! Everything except the target URL is fixed once the client is spawned;
//! the URL can be swapped later with `SocketClient::set_url`.

use std::time::Duration;

pub const DEFAULT_MAX_RECONNECTS: u32 = 5;
pub const DEFAULT_RECONNECT_INTERVAL_MS: u64 = 1000;
pub const DEFAULT_CALL_TIMEOUT_MS: u64 = 30_000;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable `{0}`")]
    MissingVar(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Websocket address, e.g. `ws://127.0.0.1:7125/websocket`.
    pub url: String,
    /// Unclean closes tolerated in a row before giving up.
    pub max_reconnects: u32,
    /// Fixed wait before each reconnect attempt.
    pub reconnect_interval: Duration,
    /// How long a call may wait for its response.
    pub call_timeout: Duration,
}

impl ClientConfig {
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_reconnects: DEFAULT_MAX_RECONNECTS,
            reconnect_interval: Duration::from_millis(DEFAULT_RECONNECT_INTERVAL_MS),
            call_timeout: Duration::from_millis(DEFAULT_CALL_TIMEOUT_MS),
        }
    }

    #[must_use]
    pub fn with_max_reconnects(mut self, max_reconnects: u32) -> Self {
        self.max_reconnects = max_reconnects;
        self
    }

    #[must_use]
    pub fn with_reconnect_interval(mut self, interval: Duration) -> Self {
        self.reconnect_interval = interval;
        self
    }

    #[must_use]
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Build config from environment variables.
    ///
    /// Required:
    /// - `SOCKRPC_URL`
    ///
    /// Optional (malformed values fall back to the default):
    /// - `SOCKRPC_MAX_RECONNECTS`: default 5
    /// - `SOCKRPC_RECONNECT_INTERVAL_MS`: default 1000
    /// - `SOCKRPC_CALL_TIMEOUT_MS`: default 30000
    pub fn from_env() -> Result<Self, ConfigError> {
        let url = std::env::var("SOCKRPC_URL")
            .ok()
            .filter(|s| !s.is_empty())
            .ok_or(ConfigError::MissingVar("SOCKRPC_URL"))?;

        Ok(Self {
            url,
            max_reconnects: env_parse("SOCKRPC_MAX_RECONNECTS", DEFAULT_MAX_RECONNECTS),
            reconnect_interval: Duration::from_millis(env_parse(
                "SOCKRPC_RECONNECT_INTERVAL_MS",
                DEFAULT_RECONNECT_INTERVAL_MS,
            )),
            call_timeout: Duration::from_millis(env_parse("SOCKRPC_CALL_TIMEOUT_MS", DEFAULT_CALL_TIMEOUT_MS)),
        })
    }
}

fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
