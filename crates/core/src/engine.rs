//! Media engine contract
//!
//! The media path (capture, rendering, the actual peer connection) is an
//! external collaborator. The negotiation state machine drives it through
//! this trait and never touches media directly, so the core stays testable
//! against scripted engines.

use crate::protocol::CandidateInit;
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Which side of a negotiation round a description belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SdpKind {
    /// Description proposed by the initiator
    Offer,
    /// Description accepted by the responder
    Answer,
}

/// The underlying media path for one session
///
/// Implementations are expected to bind the local description internally
/// when creating an offer or answer; the state machine records the returned
/// description and owns all ordering decisions.
#[async_trait]
pub trait MediaEngine: Send + Sync + 'static {
    /// Create the local offer description and bind it to the media path
    async fn create_offer(&self) -> Result<String>;

    /// Create the local answer description and bind it to the media path
    ///
    /// Valid only after a remote offer has been applied.
    async fn create_answer(&self) -> Result<String>;

    /// Apply the peer's description to the media path
    async fn set_remote_description(&self, kind: SdpKind, sdp: &str) -> Result<()>;

    /// Apply one of the peer's connectivity candidates
    ///
    /// The state machine guarantees a remote description has been applied
    /// first.
    async fn add_remote_candidate(&self, candidate: &CandidateInit) -> Result<()>;

    /// Take the stream of locally discovered candidates, in discovery order
    ///
    /// Single subscriber; returns `None` once taken.
    fn take_local_candidates(&self) -> Option<mpsc::UnboundedReceiver<CandidateInit>>;

    /// Release the media path; idempotent
    async fn close(&self);
}

/// Acquires a media engine for a new session
///
/// Acquisition is the first suspension point of `start`; a failure here must
/// leave nothing behind, which the factory guarantees by only handing out
/// fully constructed engines.
#[async_trait]
pub trait EngineFactory: Send + Sync + 'static {
    /// Create the media path for a session with `peer_id`
    async fn create(&self, peer_id: &str) -> Result<Arc<dyn MediaEngine>>;
}
