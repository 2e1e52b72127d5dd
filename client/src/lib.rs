//! # Meshsync Client
//! Forms a full-mesh WebRTC data-plane over a signaling relay and keeps a
//! replicated game-world state synchronized across the mesh without a
//! trusted server.
//!
//! The crate is sans-I/O: the embedding host supplies the WebRTC stack and
//! the signaling transport behind the [`transport`] and [`signaling`] trait
//! seams, and drives the [`Session`] by pumping `update(now)` / `tick(now)`.

#![deny(trivial_numeric_casts, unstable_features, unused_import_braces)]

mod config;
mod error;
mod movement;
mod overlay;
mod peer;
mod resolver;
mod session;
pub mod signaling;
mod state_manager;
pub mod transport;

pub use config::{
    BackpressureConfig, BackpressureStrategy, ConflictMode, DebugConfig, MovementConfig,
    SessionConfig, WorldBounds, DEFAULT_STUN_SERVER,
};
pub use error::SessionError;
pub use movement::MovementIntegrator;
pub use overlay::PingOverlay;
pub use peer::{PeerManager, SendOptions, PENDING_OFFER_TIMEOUT_MS, PING_INTERVAL_MS};
pub use resolver::ConflictResolver;
pub use session::Session;
pub use signaling::{SignalingAdapter, SignalingError, SignalingEvent};
pub use state_manager::StateManager;
