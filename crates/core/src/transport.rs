//! Signaling transport contract
//!
//! The transport owns the single duplex connection to the relay. It delivers
//! inbound frames in the order received and surfaces unexpected disconnects
//! as an event; reconnection is the lifecycle manager's decision, never
//! automatic.

use crate::protocol::SignalMessage;
use crate::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Event delivered by a transport subscription
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// A raw inbound frame, in arrival order
    Message(String),
    /// The connection dropped unexpectedly; no further messages will arrive
    Disconnected,
}

/// A message-oriented, full-duplex channel to the relay
///
/// Guarantees: `send` before a successful `connect` is rejected with
/// [`Error::Transport`](crate::Error::Transport), never silently dropped.
/// Send order is preserved on the wire but delivery is best effort — loss is
/// tolerated by the negotiation state machine through idempotent state
/// checks, not retried here.
#[async_trait]
pub trait SignalingTransport: Send + Sync + 'static {
    /// Establish the connection to the relay
    ///
    /// Calling `connect` on an already-connected transport is a no-op.
    async fn connect(&self) -> Result<()>;

    /// Send one negotiation message to the relay
    async fn send(&self, message: &SignalMessage) -> Result<()>;

    /// Take the inbound event stream
    ///
    /// There is exactly one subscriber; returns `None` after the stream has
    /// been taken.
    fn take_events(&self) -> Option<mpsc::UnboundedReceiver<TransportEvent>>;

    /// Close the connection and release transport resources
    async fn close(&self);
}
