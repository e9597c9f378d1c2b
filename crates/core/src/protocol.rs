//! Wire envelope for relay signaling
//!
//! Every frame exchanged through the relay is a JSON object with a `type`
//! discriminator and a `peer_id`. Negotiation kinds (`offer`, `answer`,
//! `ice-candidate`, `close`) are modeled here; passthrough kinds (`text`,
//! `audio`, `video`, `llm_response`) are carried untouched by the router and
//! never deserialized into typed payloads.

use serde::{Deserialize, Serialize};

/// Message kinds the router forwards untouched to external collaborators
pub const PASSTHROUGH_KINDS: &[&str] = &["text", "audio", "video", "llm_response"];

/// A connectivity candidate as it appears on the wire
///
/// Field names follow the browser `RTCIceCandidateInit` shape so the relay
/// can carry candidates between heterogeneous endpoints unmodified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateInit {
    /// The candidate attribute line
    pub candidate: String,

    /// Media stream identification tag
    #[serde(rename = "sdpMid", default, skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,

    /// Index of the media description the candidate belongs to
    #[serde(
        rename = "sdpMLineIndex",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub sdp_mline_index: Option<u16>,
}

/// A negotiation message exchanged through the relay
///
/// Unknown additional fields on inbound frames are accepted and ignored;
/// a frame missing a required field for its declared `type` fails to decode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SignalMessage {
    /// Session description proposed by the initiator
    #[serde(rename = "offer")]
    Offer {
        /// Target/source endpoint identifier
        peer_id: String,
        /// Session description payload
        sdp: String,
    },

    /// Session description accepted by the responder
    #[serde(rename = "answer")]
    Answer {
        /// Target/source endpoint identifier
        peer_id: String,
        /// Session description payload
        sdp: String,
    },

    /// Connectivity candidate discovered during negotiation
    #[serde(rename = "ice-candidate")]
    IceCandidate {
        /// Target/source endpoint identifier
        peer_id: String,
        /// The discovered candidate
        candidate: CandidateInit,
    },

    /// Session teardown notification
    #[serde(rename = "close")]
    Close {
        /// Target/source endpoint identifier
        peer_id: String,
    },
}

impl SignalMessage {
    /// Endpoint identifier this message targets or originates from
    pub fn peer_id(&self) -> &str {
        match self {
            SignalMessage::Offer { peer_id, .. }
            | SignalMessage::Answer { peer_id, .. }
            | SignalMessage::IceCandidate { peer_id, .. }
            | SignalMessage::Close { peer_id } => peer_id,
        }
    }

    /// Wire name of this message kind
    pub fn kind(&self) -> &'static str {
        match self {
            SignalMessage::Offer { .. } => "offer",
            SignalMessage::Answer { .. } => "answer",
            SignalMessage::IceCandidate { .. } => "ice-candidate",
            SignalMessage::Close { .. } => "close",
        }
    }

    /// True for the kinds this module models
    pub fn is_negotiation_kind(kind: &str) -> bool {
        matches!(kind, "offer" | "answer" | "ice-candidate" | "close")
    }

    /// Serialize to the wire representation
    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
