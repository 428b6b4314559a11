//! Connection configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use chainaccount_core::types::Commitment;

/// Environment variable naming the cluster RPC endpoint.
pub const PROVIDER_URL_ENV: &str = "ANCHOR_PROVIDER_URL";

/// Local validator default endpoint.
pub const LOCAL_URL: &str = "http://127.0.0.1:8899";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} is not defined")]
    MissingEnv(&'static str),

    #[error("Invalid RPC URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
}

/// Settings for an [`RpcConnection`](crate::RpcConnection).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// HTTP JSON-RPC endpoint.
    #[serde(default = "default_url")]
    pub url: String,
    /// WebSocket pubsub endpoint; derived from `url` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ws_url: Option<String>,
    /// Default commitment for calls that do not specify one.
    #[serde(default = "default_commitment")]
    pub commitment: Option<Commitment>,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Initial WebSocket reconnect backoff.
    #[serde(default = "default_reconnect_initial_ms")]
    pub reconnect_initial_ms: u64,
    /// Cap on WebSocket reconnect backoff.
    #[serde(default = "default_reconnect_max_ms")]
    pub reconnect_max_ms: u64,
}

fn default_url() -> String {
    LOCAL_URL.to_string()
}

fn default_commitment() -> Option<Commitment> {
    Some(Commitment::Processed)
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

fn default_reconnect_initial_ms() -> u64 {
    500
}

fn default_reconnect_max_ms() -> u64 {
    60_000
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            ws_url: None,
            commitment: default_commitment(),
            request_timeout_ms: default_request_timeout_ms(),
            reconnect_initial_ms: default_reconnect_initial_ms(),
            reconnect_max_ms: default_reconnect_max_ms(),
        }
    }
}

impl ConnectionConfig {
    /// Default settings against `url`.
    pub fn for_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Read the endpoint from `ANCHOR_PROVIDER_URL`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let url = std::env::var(PROVIDER_URL_ENV).map_err(|_| ConfigError::MissingEnv(PROVIDER_URL_ENV))?;
        Ok(Self::for_url(url))
    }

    pub fn with_commitment(mut self, commitment: Commitment) -> Self {
        self.commitment = Some(commitment);
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn reconnect_initial(&self) -> Duration {
        Duration::from_millis(self.reconnect_initial_ms)
    }

    pub fn reconnect_max(&self) -> Duration {
        Duration::from_millis(self.reconnect_max_ms)
    }

    /// The pubsub endpoint: `ws_url` if set, otherwise `url` with the
    /// scheme switched to `ws`/`wss` and an explicit port bumped by one
    /// (the validator serves pubsub on RPC port + 1).
    pub fn websocket_url(&self) -> Result<String, ConfigError> {
        if let Some(ws) = &self.ws_url {
            return Ok(ws.clone());
        }
        let invalid = |reason: String| ConfigError::InvalidUrl {
            url: self.url.clone(),
            reason,
        };
        let mut url = reqwest::Url::parse(&self.url).map_err(|e| invalid(e.to_string()))?;
        let scheme = match url.scheme() {
            "http" => "ws",
            "https" => "wss",
            "ws" | "wss" => return Ok(self.url.clone()),
            other => return Err(invalid(format!("unsupported scheme '{other}'"))),
        };
        url.set_scheme(scheme)
            .map_err(|_| invalid(format!("cannot switch scheme to {scheme}")))?;
        if let Some(port) = url.port() {
            url.set_port(Some(port.saturating_add(1)))
                .map_err(|_| invalid("cannot set port".into()))?;
        }
        Ok(url.to_string())
    }
}
