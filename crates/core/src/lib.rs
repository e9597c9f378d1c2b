//! Signaling-driven negotiation core for peercall
//!
//! peercall establishes real-time media sessions between two endpoints that
//! cannot reach each other directly, using a relay to exchange session
//! descriptions and connectivity candidates. This crate is the core: the
//! negotiation state machine and the components around it, with the media
//! path and the wire transport kept behind traits.
//!
//! ## Components
//!
//! - [`transport::SignalingTransport`] — contract for the duplex relay
//!   channel (implemented by `peercall-websocket`)
//! - [`router::Router`] — decodes inbound envelopes and dispatches by kind;
//!   unknown kinds are dropped for forward compatibility
//! - [`session::Session`] — the negotiation state machine; sole owner of
//!   per-peer session state
//! - [`lifecycle::ConnectionManager`] — orchestrates session start/stop with
//!   rollback and idempotent shutdown
//! - [`engine::MediaEngine`] — contract for the media path (implemented by
//!   `peercall-webrtc`)

pub mod engine;
pub mod error;
pub mod lifecycle;
pub mod protocol;
pub mod router;
pub mod session;
pub mod transport;

pub use engine::{EngineFactory, MediaEngine, SdpKind};
pub use error::{Error, Result, StartError};
pub use lifecycle::{ConnectionManager, ManagerEvent, SessionHandle};
pub use protocol::{CandidateInit, SignalMessage};
pub use router::{PassthroughFrame, Router};
pub use session::{Role, Session, SessionState};
pub use transport::{SignalingTransport, TransportEvent};
