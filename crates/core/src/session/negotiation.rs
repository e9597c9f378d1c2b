//! Negotiation state machine
//!
//! Turns inbound descriptions and candidates into correctly-ordered calls on
//! the media engine. The ordering rule that makes this component interesting:
//! no remote candidate may reach the media path before the remote description
//! has been applied, so candidates that arrive early are buffered and drained
//! in arrival order the moment the description lands.
//!
//! Every method re-checks `state` after each suspension point: a session that
//! entered `Closing`/`Closed` while an engine call was outstanding discards
//! the stale continuation's effect instead of applying it.

use crate::engine::{MediaEngine, SdpKind};
use crate::protocol::{CandidateInit, SignalMessage};
use crate::{Error, Result};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Which endpoint produces the offer for this session; fixed at creation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// This endpoint starts the call and sends the offer
    Initiator,
    /// This endpoint received the offer and answers it
    Responder,
}

/// Negotiation state, monotonic within a round
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No descriptions exchanged yet
    Idle,
    /// Local offer created, waiting for the peer's answer
    OfferPending,
    /// Remote offer applied, local answer being produced
    AnswerPending,
    /// Both descriptions in place; media path establishing or established
    Connected,
    /// Teardown in progress
    Closing,
    /// Terminal: resources released
    Closed,
    /// Terminal: protocol violation; session must be recreated
    Failed,
}

impl SessionState {
    /// True once the session accepts no further negotiation
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Closed | SessionState::Failed)
    }
}

/// The unit of negotiation between exactly two endpoints
///
/// Owns all session state; other components are stateless relative to a
/// session. Methods return the outbound [`SignalMessage`]s the caller must
/// relay — the session never touches the transport itself.
pub struct Session {
    peer_id: String,
    role: Role,
    state: SessionState,
    local_description: Option<String>,
    remote_description: Option<String>,
    pending_remote_candidates: Vec<CandidateInit>,
    engine: Arc<dyn MediaEngine>,
}

impl Session {
    /// Create a session for `peer_id` in the given role
    pub fn new(peer_id: impl Into<String>, role: Role, engine: Arc<dyn MediaEngine>) -> Self {
        let peer_id = peer_id.into();
        debug!(peer_id = %peer_id, ?role, "session created");
        Self {
            peer_id,
            role,
            state: SessionState::Idle,
            local_description: None,
            remote_description: None,
            pending_remote_candidates: Vec::new(),
            engine,
        }
    }

    /// Peer this session negotiates with
    pub fn peer_id(&self) -> &str {
        &self.peer_id
    }

    /// Role fixed at creation
    pub fn role(&self) -> Role {
        self.role
    }

    /// Current negotiation state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Local description, once created
    pub fn local_description(&self) -> Option<&str> {
        self.local_description.as_deref()
    }

    /// Remote description, once applied
    pub fn remote_description(&self) -> Option<&str> {
        self.remote_description.as_deref()
    }

    /// Candidates received before the remote description, in arrival order
    pub fn pending_remote_candidates(&self) -> &[CandidateInit] {
        &self.pending_remote_candidates
    }

    /// Drive the initiator's first offer: `Idle -> OfferPending`
    ///
    /// Returns the offer message to relay to the peer.
    pub async fn start_offer(&mut self) -> Result<SignalMessage> {
        self.check_open()?;
        if self.role != Role::Initiator {
            return Err(self.fail("start_offer on a responder session"));
        }
        if self.state != SessionState::Idle {
            return Err(self.fail("offer already in flight"));
        }

        self.state = SessionState::OfferPending;
        let sdp = match self.engine.create_offer().await {
            Ok(sdp) => sdp,
            Err(e) => {
                self.state = SessionState::Failed;
                return Err(e);
            }
        };
        // stop() may have raced the engine call
        if self.state != SessionState::OfferPending {
            debug!(peer_id = %self.peer_id, state = ?self.state, "discarding stale offer");
            return Err(Error::SessionClosed(self.peer_id.clone()));
        }

        self.local_description = Some(sdp.clone());
        info!(peer_id = %self.peer_id, "local offer created");
        Ok(SignalMessage::Offer {
            peer_id: self.peer_id.clone(),
            sdp,
        })
    }

    /// Apply the peer's offer and produce the answer:
    /// `Idle -> AnswerPending -> Connected`
    ///
    /// Returns the answer message to relay to the peer.
    pub async fn handle_offer(&mut self, sdp: String) -> Result<SignalMessage> {
        self.check_open()?;
        if self.role != Role::Responder {
            return Err(self.fail("offer received on an initiator session"));
        }
        if self.state != SessionState::Idle || self.remote_description.is_some() {
            return Err(self.fail("offer received outside Idle"));
        }

        self.apply_remote(SdpKind::Offer, sdp).await?;
        if self.state.is_terminal() {
            return Err(Error::SessionClosed(self.peer_id.clone()));
        }
        self.state = SessionState::AnswerPending;
        self.drain_pending_candidates().await;

        let answer = match self.engine.create_answer().await {
            Ok(sdp) => sdp,
            Err(e) => {
                self.state = SessionState::Failed;
                return Err(e);
            }
        };
        if self.state != SessionState::AnswerPending {
            debug!(peer_id = %self.peer_id, state = ?self.state, "discarding stale answer");
            return Err(Error::SessionClosed(self.peer_id.clone()));
        }

        self.local_description = Some(answer.clone());
        self.state = SessionState::Connected;
        info!(peer_id = %self.peer_id, "responder negotiation complete");
        Ok(SignalMessage::Answer {
            peer_id: self.peer_id.clone(),
            sdp: answer,
        })
    }

    /// Apply the peer's answer: `OfferPending -> Connected`
    pub async fn handle_answer(&mut self, sdp: String) -> Result<()> {
        self.check_open()?;
        if self.state != SessionState::OfferPending || self.remote_description.is_some() {
            return Err(self.fail("answer received without a pending offer"));
        }

        self.apply_remote(SdpKind::Answer, sdp).await?;
        if self.state.is_terminal() {
            return Err(Error::SessionClosed(self.peer_id.clone()));
        }
        self.drain_pending_candidates().await;
        self.state = SessionState::Connected;
        info!(peer_id = %self.peer_id, "initiator negotiation complete");
        Ok(())
    }

    /// Handle one of the peer's connectivity candidates
    ///
    /// Buffered while the remote description is unset, applied immediately
    /// afterwards. Candidates the media path rejects are logged and skipped;
    /// a bad candidate never fails the session.
    pub async fn handle_candidate(&mut self, candidate: CandidateInit) -> Result<()> {
        self.check_open()?;
        if self.remote_description.is_none() {
            debug!(
                peer_id = %self.peer_id,
                buffered = self.pending_remote_candidates.len() + 1,
                "buffering candidate until remote description"
            );
            self.pending_remote_candidates.push(candidate);
            return Ok(());
        }

        if let Err(e) = self.engine.add_remote_candidate(&candidate).await {
            warn!(peer_id = %self.peer_id, error = %e, "candidate rejected by media path");
        }
        Ok(())
    }

    /// Tear the session down: `-> Closing -> Closed`
    ///
    /// Idempotent: closing an already-closed session is a no-op. Also valid
    /// on a `Failed` session to release its engine.
    pub async fn close(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        let was_failed = self.state == SessionState::Failed;
        if !was_failed {
            self.state = SessionState::Closing;
        }
        self.engine.close().await;
        self.pending_remote_candidates.clear();
        if !was_failed {
            self.state = SessionState::Closed;
        }
        info!(peer_id = %self.peer_id, "session closed");
    }

    fn check_open(&self) -> Result<()> {
        if self.state.is_terminal() || self.state == SessionState::Closing {
            Err(Error::SessionClosed(self.peer_id.clone()))
        } else {
            Ok(())
        }
    }

    /// Move to `Failed` and build the violation error; descriptions are left
    /// untouched so nothing is overwritten on the failure path.
    fn fail(&mut self, message: &str) -> Error {
        warn!(peer_id = %self.peer_id, state = ?self.state, message, "protocol violation");
        self.state = SessionState::Failed;
        Error::ProtocolViolation {
            peer_id: self.peer_id.clone(),
            message: message.to_string(),
        }
    }

    async fn apply_remote(&mut self, kind: SdpKind, sdp: String) -> Result<()> {
        if let Err(e) = self.engine.set_remote_description(kind, &sdp).await {
            self.state = SessionState::Failed;
            return Err(e);
        }
        if self.state.is_terminal() || self.state == SessionState::Closing {
            // stop() raced the engine call; do not record the description
            return Ok(());
        }
        self.remote_description = Some(sdp);
        Ok(())
    }

    /// Apply everything buffered, in arrival order, then clear the buffer
    async fn drain_pending_candidates(&mut self) {
        if self.pending_remote_candidates.is_empty() {
            return;
        }
        let drained = std::mem::take(&mut self.pending_remote_candidates);
        debug!(peer_id = %self.peer_id, count = drained.len(), "draining buffered candidates");
        for candidate in &drained {
            if self.state.is_terminal() || self.state == SessionState::Closing {
                return;
            }
            if let Err(e) = self.engine.add_remote_candidate(candidate).await {
                warn!(peer_id = %self.peer_id, error = %e, "buffered candidate rejected");
            }
        }
    }
}
