//! # Meshsync Shared
//! Common functionality shared between the meshsync session crate and its
//! test harness: wire envelopes, the replicated world model, serialization,
//! structural validation, peer ordering, and the in-process event bus.

#![deny(trivial_numeric_casts, unstable_features, unused_import_braces)]

mod envelope;
mod events;
mod peer_order;
mod relay;
mod serializer;
mod state;
mod types;
mod validator;

pub use envelope::{Body, Envelope, MessageKind};
pub use events::{Event, EventBus, EventKind, ListenerId};
pub use peer_order::{elect_host, peer_id_cmp};
pub use relay::{RelayEnvelope, RelayKind, RosterBroadcast};
pub use serializer::{CodecError, Scheme, SchemeParseError, Serializer, WirePayload};
pub use state::{
    DeltaChange, GameObject, GlobalGameState, InventoryItem, PlayerState, StateDelta,
};
pub use types::{PlayerId, Seq, Vec3};
pub use validator::validate;
