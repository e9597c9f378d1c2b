//! Inbound message router
//!
//! Decodes raw relay frames, validates their shape, and hands negotiation
//! messages to the caller. Malformed input and unrecognized kinds are
//! diagnostics, never failures: forward compatibility with future message
//! kinds is a design requirement. Passthrough kinds are forwarded untouched
//! to an optional sink for external collaborators (media rendering, response
//! generation) and never inspected here.

use crate::protocol::{SignalMessage, PASSTHROUGH_KINDS};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// A frame of a kind the core does not interpret, forwarded as-is
#[derive(Debug, Clone)]
pub struct PassthroughFrame {
    /// Wire `type` of the frame
    pub kind: String,
    /// The complete, untouched envelope
    pub raw: Value,
}

/// Routes decoded frames by message kind
pub struct Router {
    passthrough: Option<mpsc::UnboundedSender<PassthroughFrame>>,
}

impl Router {
    /// Router that drops passthrough kinds with a debug log
    pub fn new() -> Self {
        Self { passthrough: None }
    }

    /// Router forwarding passthrough kinds to `sink`
    pub fn with_passthrough(sink: mpsc::UnboundedSender<PassthroughFrame>) -> Self {
        Self {
            passthrough: Some(sink),
        }
    }

    /// Decode one raw frame and return the negotiation message it carries,
    /// if any
    ///
    /// Never propagates an error: malformed frames emit a warn diagnostic and
    /// are dropped; unknown kinds emit a debug diagnostic and are dropped;
    /// passthrough kinds are forwarded to the sink. The caller only ever sees
    /// well-formed negotiation messages.
    pub fn dispatch(&self, raw: &str) -> Option<SignalMessage> {
        let value: Value = match serde_json::from_str(raw) {
            Ok(value) => value,
            Err(e) => {
                warn!(error = %e, "malformed message: invalid JSON");
                return None;
            }
        };

        let kind = match value.get("type").and_then(Value::as_str) {
            Some(kind) => kind.to_string(),
            None => {
                warn!("malformed message: missing `type` field");
                return None;
            }
        };

        if SignalMessage::is_negotiation_kind(&kind) {
            return match serde_json::from_value::<SignalMessage>(value) {
                Ok(message) => Some(message),
                Err(e) => {
                    warn!(kind = %kind, error = %e, "malformed message: missing required field");
                    None
                }
            };
        }

        if PASSTHROUGH_KINDS.contains(&kind.as_str()) {
            match &self.passthrough {
                Some(sink) => {
                    if sink.send(PassthroughFrame { kind, raw: value }).is_err() {
                        debug!("passthrough sink dropped; frame discarded");
                    }
                }
                None => debug!(kind = %kind, "no passthrough sink registered; frame dropped"),
            }
            return None;
        }

        debug!(kind = %kind, "unrecognized message kind ignored");
        None
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_offer() {
        let router = Router::new();
        let msg = router
            .dispatch(r#"{"type":"offer","peer_id":"peerA","sdp":"v=0"}"#)
            .unwrap();
        assert_eq!(msg.kind(), "offer");
        assert_eq!(msg.peer_id(), "peerA");
    }

    #[test]
    fn test_malformed_json_dropped() {
        let router = Router::new();
        assert!(router.dispatch("{not json").is_none());
    }

    #[test]
    fn test_missing_required_field_dropped() {
        let router = Router::new();
        // offer without sdp
        assert!(router
            .dispatch(r#"{"type":"offer","peer_id":"peerA"}"#)
            .is_none());
        // candidate without candidate body
        assert!(router
            .dispatch(r#"{"type":"ice-candidate","peer_id":"peerA"}"#)
            .is_none());
    }

    #[test]
    fn test_unknown_kind_ignored() {
        let router = Router::new();
        assert!(router
            .dispatch(r#"{"type":"hologram","peer_id":"peerA"}"#)
            .is_none());
    }

    #[test]
    fn test_missing_type_dropped() {
        let router = Router::new();
        assert!(router.dispatch(r#"{"peer_id":"peerA"}"#).is_none());
    }

    #[test]
    fn test_passthrough_forwarded_untouched() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let router = Router::with_passthrough(tx);

        let raw = r#"{"type":"llm_response","text":"hello","extra":[1,2]}"#;
        assert!(router.dispatch(raw).is_none());

        let frame = rx.try_recv().unwrap();
        assert_eq!(frame.kind, "llm_response");
        assert_eq!(frame.raw["text"], "hello");
        assert_eq!(frame.raw["extra"][1], 2);
    }

    #[test]
    fn test_passthrough_without_sink_dropped_quietly() {
        let router = Router::new();
        assert!(router.dispatch(r#"{"type":"text","text":"hi"}"#).is_none());
    }

    #[test]
    fn test_extra_fields_accepted_on_negotiation_kinds() {
        let router = Router::new();
        let msg = router
            .dispatch(r#"{"type":"close","peer_id":"p","reason":"done"}"#)
            .unwrap();
        assert_eq!(msg.kind(), "close");
    }
}
