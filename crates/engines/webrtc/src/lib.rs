//! webrtc-rs media engine
//!
//! Implements [`MediaEngine`] on top of an `RTCPeerConnection`. The engine
//! owns the peer connection and the data channel; the negotiation core owns
//! every ordering decision, so nothing here inspects session state. Locally
//! discovered ICE candidates are forwarded to a single subscriber in
//! discovery order.

pub mod config;

pub use config::RtcConfig;

use async_trait::async_trait;
use peercall_core::{CandidateInit, EngineFactory, Error, MediaEngine, Result, SdpKind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;

/// Media path for one session, backed by an `RTCPeerConnection`
pub struct WebRtcEngine {
    peer_id: String,
    connection: Arc<RTCPeerConnection>,
    data_channel_label: String,
    candidates_rx: Mutex<Option<mpsc::UnboundedReceiver<CandidateInit>>>,
    closed: AtomicBool,
}

impl WebRtcEngine {
    /// Build a peer connection for `peer_id` and start candidate discovery
    pub async fn new(peer_id: &str, config: &RtcConfig) -> Result<Self> {
        config.validate()?;

        let api = APIBuilder::new().build();
        let rtc_config = RTCConfiguration {
            ice_servers: vec![RTCIceServer {
                urls: config.ice_servers.clone(),
                ..Default::default()
            }],
            ..Default::default()
        };
        let connection = Arc::new(
            api.new_peer_connection(rtc_config)
                .await
                .map_err(|e| Error::Engine(format!("failed to create peer connection: {}", e)))?,
        );

        let (candidates_tx, candidates_rx) = mpsc::unbounded_channel();
        let candidate_peer = peer_id.to_string();
        connection.on_ice_candidate(Box::new(move |candidate| {
            let candidates_tx = candidates_tx.clone();
            let peer_id = candidate_peer.clone();
            Box::pin(async move {
                let Some(candidate) = candidate else {
                    debug!(peer_id = %peer_id, "candidate gathering complete");
                    return;
                };
                match candidate.to_json() {
                    Ok(init) => {
                        let _ = candidates_tx.send(CandidateInit {
                            candidate: init.candidate,
                            sdp_mid: init.sdp_mid,
                            sdp_mline_index: init.sdp_mline_index,
                        });
                    }
                    Err(e) => {
                        warn!(peer_id = %peer_id, error = %e, "failed to serialize local candidate");
                    }
                }
            })
        }));

        let state_peer = peer_id.to_string();
        connection.on_peer_connection_state_change(Box::new(move |state| {
            let peer_id = state_peer.clone();
            Box::pin(async move {
                info!(peer_id = %peer_id, state = %state, "peer connection state changed");
            })
        }));

        Ok(Self {
            peer_id: peer_id.to_string(),
            connection,
            data_channel_label: config.data_channel_label.clone(),
            candidates_rx: Mutex::new(Some(candidates_rx)),
            closed: AtomicBool::new(false),
        })
    }

    /// Record the bound local description and return its SDP
    async fn local_sdp(&self) -> Result<String> {
        self.connection
            .local_description()
            .await
            .map(|desc| desc.sdp)
            .ok_or_else(|| Error::Engine("no local description bound".to_string()))
    }
}

#[async_trait]
impl MediaEngine for WebRtcEngine {
    async fn create_offer(&self) -> Result<String> {
        // The data channel puts a media section in the offer; without one
        // the ICE agent never starts gathering.
        self.connection
            .create_data_channel(&self.data_channel_label, None)
            .await
            .map_err(|e| Error::Engine(format!("failed to create data channel: {}", e)))?;

        let offer = self
            .connection
            .create_offer(None)
            .await
            .map_err(|e| Error::Engine(format!("failed to create offer: {}", e)))?;
        self.connection
            .set_local_description(offer)
            .await
            .map_err(|e| Error::Engine(format!("failed to bind local offer: {}", e)))?;
        self.local_sdp().await
    }

    async fn create_answer(&self) -> Result<String> {
        let answer = self
            .connection
            .create_answer(None)
            .await
            .map_err(|e| Error::Engine(format!("failed to create answer: {}", e)))?;
        self.connection
            .set_local_description(answer)
            .await
            .map_err(|e| Error::Engine(format!("failed to bind local answer: {}", e)))?;
        self.local_sdp().await
    }

    async fn set_remote_description(&self, kind: SdpKind, sdp: &str) -> Result<()> {
        let description = match kind {
            SdpKind::Offer => RTCSessionDescription::offer(sdp.to_string()),
            SdpKind::Answer => RTCSessionDescription::answer(sdp.to_string()),
        }
        .map_err(|e| Error::Engine(format!("invalid remote description: {}", e)))?;
        self.connection
            .set_remote_description(description)
            .await
            .map_err(|e| Error::Engine(format!("failed to apply remote description: {}", e)))
    }

    async fn add_remote_candidate(&self, candidate: &CandidateInit) -> Result<()> {
        let init = RTCIceCandidateInit {
            candidate: candidate.candidate.clone(),
            sdp_mid: candidate.sdp_mid.clone(),
            sdp_mline_index: candidate.sdp_mline_index,
            username_fragment: None,
        };
        self.connection
            .add_ice_candidate(init)
            .await
            .map_err(|e| Error::Engine(format!("failed to apply remote candidate: {}", e)))
    }

    fn take_local_candidates(&self) -> Option<mpsc::UnboundedReceiver<CandidateInit>> {
        self.candidates_rx.lock().unwrap().take()
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Err(e) = self.connection.close().await {
            warn!(peer_id = %self.peer_id, error = %e, "error closing peer connection");
        }
        debug!(peer_id = %self.peer_id, "peer connection released");
    }
}

/// Creates a [`WebRtcEngine`] per session from a shared [`RtcConfig`]
pub struct WebRtcEngineFactory {
    config: RtcConfig,
}

impl WebRtcEngineFactory {
    pub fn new(config: RtcConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }
}

#[async_trait]
impl EngineFactory for WebRtcEngineFactory {
    async fn create(&self, peer_id: &str) -> Result<Arc<dyn MediaEngine>> {
        let engine = WebRtcEngine::new(peer_id, &self.config).await?;
        Ok(Arc::new(engine))
    }
}
