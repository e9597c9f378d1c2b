//! Error types for the peercall negotiation core

use thiserror::Error;

/// Result type alias for peercall core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur while driving a peer session
#[derive(Debug, Error)]
pub enum Error {
    /// Signaling transport connect or send failure.
    ///
    /// Recoverable by caller-initiated retry or reconnect; never corrupts
    /// session state.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Inbound envelope could not be decoded or is missing a required field.
    ///
    /// Local diagnostic only: the message is dropped and no session state
    /// changes.
    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    /// Message kind inconsistent with the current negotiation state.
    ///
    /// Terminal for the session: it moves to `Failed` and must be explicitly
    /// recreated.
    #[error("Protocol violation for peer {peer_id}: {message}")]
    ProtocolViolation {
        /// Peer whose session failed
        peer_id: String,
        /// What was inconsistent
        message: String,
    },

    /// Operation attempted on a terminated session
    #[error("Session for peer {0} is closed")]
    SessionClosed(String),

    /// Media engine failure (description creation/application, candidate
    /// application)
    #[error("Media engine error: {0}")]
    Engine(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// True when the error means the session no longer accepts operations
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Error::ProtocolViolation { .. } | Error::SessionClosed(_)
        )
    }
}

/// Composite error for `ConnectionManager::start`
///
/// Whatever was acquired before the failure point has been released by the
/// time this surfaces: a failed start leaves no orphaned engine or session.
#[derive(Debug, Error)]
pub enum StartError {
    /// Signaling transport could not be connected or the offer could not be
    /// sent
    #[error("Transport unavailable: {0}")]
    Transport(String),

    /// Media engine acquisition failed
    #[error("Media engine acquisition failed: {0}")]
    Engine(String),

    /// Local offer creation failed after the engine was acquired
    #[error("Offer creation failed: {0}")]
    Offer(String),

    /// A live session for this peer already exists
    #[error("A session for peer {0} already exists")]
    SessionExists(String),

    /// The connection manager has shut down
    #[error("Connection manager is shut down")]
    ManagerClosed,
}
