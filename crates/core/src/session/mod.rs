//! Session state and negotiation
//!
//! One [`Session`] exists per active peer id and is the sole owner of that
//! peer's negotiation state.

pub mod negotiation;

pub use negotiation::{Role, Session, SessionState};
