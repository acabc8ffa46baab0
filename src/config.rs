//! Client configuration parsed from environment variables.

#[cfg(test)]
#[path = "config_test.rs"]
mod config_test;

use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8080";
pub const DEFAULT_RECONNECT_DELAY_MS: u64 = 5_000;
pub const DEFAULT_TYPING_IDLE_MS: u64 = 1_000;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// HTTP base URL of the forum server, without a trailing slash.
    pub base_url: String,
    /// Session credential presented to the API and the push channel.
    pub session_token: Option<String>,
    /// Fixed delay before reconnecting after an unexpected closure.
    pub reconnect_delay: Duration,
    /// Idle time after the last keystroke before `typing=false` is sent.
    pub typing_idle: Duration,
    /// Overall timeout applied to each REST request.
    pub request_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_owned(),
            session_token: None,
            reconnect_delay: Duration::from_millis(DEFAULT_RECONNECT_DELAY_MS),
            typing_idle: Duration::from_millis(DEFAULT_TYPING_IDLE_MS),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }
}

impl ClientConfig {
    /// Build typed client config from environment variables.
    ///
    /// Optional:
    /// - `FORUM_BASE_URL`: default `http://127.0.0.1:8080`
    /// - `FORUM_SESSION_TOKEN`: empty is treated as absent
    /// - `FORUM_RECONNECT_DELAY_MS`: default 5000
    /// - `FORUM_TYPING_IDLE_MS`: default 1000
    /// - `FORUM_REQUEST_TIMEOUT_SECS`: default 30
    #[must_use]
    pub fn from_env() -> Self {
        let base_url = std::env::var("FORUM_BASE_URL")
            .unwrap_or_else(|_| DEFAULT_BASE_URL.to_owned())
            .trim_end_matches('/')
            .to_owned();
        let session_token = std::env::var("FORUM_SESSION_TOKEN")
            .ok()
            .filter(|t| !t.trim().is_empty());

        Self {
            base_url,
            session_token,
            reconnect_delay: Duration::from_millis(env_parse_u64("FORUM_RECONNECT_DELAY_MS", DEFAULT_RECONNECT_DELAY_MS)),
            typing_idle: Duration::from_millis(env_parse_u64("FORUM_TYPING_IDLE_MS", DEFAULT_TYPING_IDLE_MS)),
            request_timeout: Duration::from_secs(env_parse_u64(
                "FORUM_REQUEST_TIMEOUT_SECS",
                DEFAULT_REQUEST_TIMEOUT_SECS,
            )),
        }
    }

    /// Replace the base URL, trimming any trailing slash.
    #[must_use]
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_owned();
        self
    }

    /// Replace the session token; blank tokens are stored as absent.
    #[must_use]
    pub fn with_session_token(mut self, token: Option<String>) -> Self {
        self.session_token = token.filter(|t| !t.trim().is_empty());
        self
    }
}

fn env_parse_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(default)
}
