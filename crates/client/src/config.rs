//! Client configuration

use std::env;
use std::time::Duration;

use reqwest::Url;

/// Client configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    // Backend
    pub api_url: String,
    pub socket_url: String,
    pub request_timeout_ms: u64,

    // Notifications
    pub notifications_stale_ms: u64,
    pub notifications_poll_ms: u64,
    pub notifications_retries: usize,
}

impl Config {
    /// Configuration with defaults for everything but the backend URL
    pub fn new(api_url: &str) -> Result<Self, ConfigError> {
        let api_url = normalize_http_url(api_url)?;
        let socket_url = default_socket_url(&api_url)?;
        Ok(Self {
            api_url,
            socket_url,
            request_timeout_ms: 10_000,
            notifications_stale_ms: 30_000,
            notifications_poll_ms: 60_000,
            notifications_retries: 3,
        })
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_url = env::var("SINCRONICA_API_URL")
            .map_err(|_| ConfigError::Missing("SINCRONICA_API_URL"))?;
        let mut config = Self::new(&api_url)?;

        if let Ok(socket_url) = env::var("SINCRONICA_SOCKET_URL") {
            config.socket_url = normalize_socket_url(&socket_url)?;
        }

        config.request_timeout_ms = env::var("SINCRONICA_REQUEST_TIMEOUT_MS")
            .unwrap_or_else(|_| "10000".to_string())
            .parse()
            .unwrap_or(10_000);
        config.notifications_stale_ms = env::var("SINCRONICA_NOTIFICATIONS_STALE_MS")
            .unwrap_or_else(|_| "30000".to_string())
            .parse()
            .unwrap_or(30_000);
        config.notifications_poll_ms = env::var("SINCRONICA_NOTIFICATIONS_POLL_MS")
            .unwrap_or_else(|_| "60000".to_string())
            .parse()
            .unwrap_or(60_000);
        if config.notifications_poll_ms == 0 {
            tracing::warn!(
                "SINCRONICA_NOTIFICATIONS_POLL_MS must be positive, using default of 60000"
            );
            config.notifications_poll_ms = 60_000;
        }
        config.notifications_retries = env::var("SINCRONICA_NOTIFICATIONS_RETRIES")
            .unwrap_or_else(|_| "3".to_string())
            .parse()
            .unwrap_or(3);

        Ok(config)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn notifications_stale_time(&self) -> Duration {
        Duration::from_millis(self.notifications_stale_ms)
    }

    pub fn notifications_poll_interval(&self) -> Duration {
        Duration::from_millis(self.notifications_poll_ms)
    }
}

fn normalize_http_url(raw: &str) -> Result<String, ConfigError> {
    let url = Url::parse(raw.trim()).map_err(|_| ConfigError::InvalidUrl(raw.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidUrl(raw.to_string()));
    }
    Ok(url.as_str().trim_end_matches('/').to_string())
}

fn normalize_socket_url(raw: &str) -> Result<String, ConfigError> {
    let url = Url::parse(raw.trim()).map_err(|_| ConfigError::InvalidUrl(raw.to_string()))?;
    if !matches!(url.scheme(), "ws" | "wss") {
        return Err(ConfigError::InvalidUrl(raw.to_string()));
    }
    Ok(url.as_str().trim_end_matches('/').to_string())
}

/// The socket endpoint lives next to the REST API: `http(s)://host` -> `ws(s)://host/ws`
fn default_socket_url(api_url: &str) -> Result<String, ConfigError> {
    let socket = if let Some(rest) = api_url.strip_prefix("https://") {
        format!("wss://{rest}/ws")
    } else if let Some(rest) = api_url.strip_prefix("http://") {
        format!("ws://{rest}/ws")
    } else {
        return Err(ConfigError::InvalidUrl(api_url.to_string()));
    };
    normalize_socket_url(&socket)
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}
