//! Peer connection configuration

use peercall_core::{Error, Result};
use serde::{Deserialize, Serialize};

/// ICE configuration for [`WebRtcEngine`](crate::WebRtcEngine) peer connections
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RtcConfig {
    /// STUN/TURN server URLs handed to the ICE agent
    #[serde(default = "default_ice_servers")]
    pub ice_servers: Vec<String>,

    /// Label for the negotiated data channel
    #[serde(default = "default_data_channel_label")]
    pub data_channel_label: String,
}

fn default_ice_servers() -> Vec<String> {
    vec!["stun:stun.l.google.com:19302".to_string()]
}

fn default_data_channel_label() -> String {
    "peercall-data".to_string()
}

impl Default for RtcConfig {
    fn default() -> Self {
        Self {
            ice_servers: default_ice_servers(),
            data_channel_label: default_data_channel_label(),
        }
    }
}

impl RtcConfig {
    /// Validate the configuration before use
    pub fn validate(&self) -> Result<()> {
        for server in &self.ice_servers {
            let scheme = server.split(':').next().unwrap_or("");
            match scheme {
                "stun" | "stuns" | "turn" | "turns" => {}
                other => {
                    return Err(Error::Engine(format!(
                        "unsupported ice server scheme {}: expected stun or turn",
                        other
                    )));
                }
            }
        }
        if self.data_channel_label.is_empty() {
            return Err(Error::Engine(
                "data_channel_label must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
