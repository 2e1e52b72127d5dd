//! The peer fabric: roster-driven mesh formation, dual-channel routing,
//! backpressure, host election, and the internal ping loop.

mod info;
mod manager;

pub use info::{PeerInfo, CHANNEL_RELIABLE, CHANNEL_UNRELIABLE, RELIABLE_OUTBOX_LIMIT};
pub use manager::{PeerManager, SendOptions, PENDING_OFFER_TIMEOUT_MS, PING_INTERVAL_MS};
