//! WebSocket transport configuration

use peercall_core::{Error, Result};
use serde::{Deserialize, Serialize};

/// Configuration for [`WebSocketTransport`](crate::WebSocketTransport)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebSocketConfig {
    /// Relay endpoint, `ws://` or `wss://`
    #[serde(default = "default_url")]
    pub url: String,

    /// Handshake deadline in milliseconds
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

fn default_url() -> String {
    "ws://localhost:8765".to_string()
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

impl WebSocketConfig {
    /// Validate the configuration before use
    pub fn validate(&self) -> Result<()> {
        let parsed = url::Url::parse(&self.url)
            .map_err(|e| Error::Transport(format!("invalid relay url {}: {}", self.url, e)))?;
        match parsed.scheme() {
            "ws" | "wss" => {}
            other => {
                return Err(Error::Transport(format!(
                    "unsupported relay scheme {}: expected ws or wss",
                    other
                )));
            }
        }
        if self.connect_timeout_ms == 0 {
            return Err(Error::Transport(
                "connect_timeout_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
