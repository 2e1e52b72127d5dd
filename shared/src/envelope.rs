use serde::{Deserialize, Serialize};

use crate::state::{GlobalGameState, InventoryItem, StateDelta};
use crate::types::{PlayerId, Seq, Vec3};

/// Every on-wire message: sender identity and timing, an optional per-sender
/// sequence number, and a type-specific body keyed by `t`.
///
/// `ttl` is reserved: it is carried verbatim but no relay logic interprets it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub from: PlayerId,
    pub ts: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seq: Option<Seq>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<u32>,
    #[serde(flatten)]
    pub body: Body,
}

/// Type-specific message payloads. `ping`/`pong` carry no fields of their
/// own; the envelope `ts` doubles as the echoed probe timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t", rename_all = "snake_case")]
pub enum Body {
    Move {
        position: Vec3,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        velocity: Option<Vec3>,
    },
    Inventory {
        items: Vec<InventoryItem>,
    },
    Transfer {
        to: PlayerId,
        item: InventoryItem,
    },
    StateFull {
        state: GlobalGameState,
    },
    StateDelta {
        delta: StateDelta,
    },
    Payload {
        payload: serde_json::Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        channel: Option<String>,
    },
    Ping,
    Pong,
}

/// Discriminant of [`Body`], used for channel routing and backpressure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Move,
    Inventory,
    Transfer,
    StateFull,
    StateDelta,
    Payload,
    Ping,
    Pong,
}

impl Body {
    pub fn kind(&self) -> MessageKind {
        match self {
            Body::Move { .. } => MessageKind::Move,
            Body::Inventory { .. } => MessageKind::Inventory,
            Body::Transfer { .. } => MessageKind::Transfer,
            Body::StateFull { .. } => MessageKind::StateFull,
            Body::StateDelta { .. } => MessageKind::StateDelta,
            Body::Payload { .. } => MessageKind::Payload,
            Body::Ping => MessageKind::Ping,
            Body::Pong => MessageKind::Pong,
        }
    }
}

impl Envelope {
    pub fn kind(&self) -> MessageKind {
        self.body.kind()
    }
}

impl MessageKind {
    /// Whether messages of this kind default to the unreliable channel.
    pub fn is_unreliable(&self) -> bool {
        matches!(
            self,
            MessageKind::Move | MessageKind::Ping | MessageKind::Pong
        )
    }
}
