//! Reference signaling-relay wire format.
//!
//! The relay itself is an external collaborator; these types pin its JSON
//! envelope so an embedder's signaling adapter interoperates with the
//! reference implementation without re-deriving the format. One envelope per
//! websocket message, camelCase field names on the wire.

use serde::{Deserialize, Serialize};

use crate::types::PlayerId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelayKind {
    /// An SDP session description, forwarded to `to` when present.
    Desc,
    /// An ICE candidate, forwarded to `to` when present.
    Ice,
    /// Roster registration; sent with `announce: true`.
    Register,
}

/// Client-to-relay envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayEnvelope {
    pub room_id: String,
    pub from: PlayerId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<PlayerId>,
    pub kind: RelayKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub announce: Option<bool>,
}

/// Relay-to-client roster broadcast, re-sent to the whole room whenever its
/// membership changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterBroadcast {
    pub sys: String,
    pub room_id: String,
    pub roster: Vec<PlayerId>,
}

impl RosterBroadcast {
    pub const SYS: &'static str = "roster";

    pub fn new(room_id: impl Into<String>, roster: Vec<PlayerId>) -> Self {
        Self {
            sys: Self::SYS.to_string(),
            room_id: room_id.into(),
            roster,
        }
    }
}
