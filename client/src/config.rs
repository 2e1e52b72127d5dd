use meshsync_shared::{PlayerId, Scheme};

use crate::transport::IceServerConfig;

/// Public STUN endpoint used when the embedder configures no ICE servers.
pub const DEFAULT_STUN_SERVER: &str = "stun:stun.l.google.com:19302";

/// How incoming mutations are arbitrated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConflictMode {
    /// Last writer wins per sender; every peer's mutations are accepted.
    #[default]
    Timestamp,
    /// Only the authority's mutations are accepted. The authority follows
    /// the elected host unless pinned via `authoritative_client_id`.
    Authoritative,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackpressureStrategy {
    /// No congestion-motivated queueing or dropping.
    Off,
    /// Above the threshold, move frames are dropped outright.
    DropMoves,
    /// Enqueued moves replace a trailing queued move instead of appending.
    #[default]
    CoalesceMoves,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackpressureConfig {
    pub strategy: BackpressureStrategy,
    /// `buffered_amount` limit on the unreliable channel above which the
    /// strategy activates.
    pub threshold_bytes: usize,
}

impl Default for BackpressureConfig {
    fn default() -> Self {
        Self {
            strategy: BackpressureStrategy::default(),
            threshold_bytes: 262_144,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorldBounds {
    pub width: f64,
    pub height: f64,
    /// A depth of 0 leaves the Z axis unclamped.
    pub depth: f64,
}

impl Default for WorldBounds {
    fn default() -> Self {
        Self {
            width: 2000.0,
            height: 2000.0,
            depth: 0.0,
        }
    }
}

/// Tuning knobs for the movement integrator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MovementConfig {
    /// Per-axis velocity clamp, units per second.
    pub max_speed: f64,
    /// Fraction of the allowed displacement applied per frame, in `[0, 1]`.
    pub smoothing: f64,
    /// How long a stale velocity keeps extrapolating after the last
    /// accepted move, in milliseconds.
    pub extrapolation_ms: f64,
    pub world_bounds: WorldBounds,
    pub ignore_world_bounds: bool,
    pub player_radius: f64,
}

impl Default for MovementConfig {
    fn default() -> Self {
        Self {
            max_speed: 400.0,
            smoothing: 0.2,
            extrapolation_ms: 120.0,
            world_bounds: WorldBounds::default(),
            ignore_world_bounds: false,
            player_radius: 16.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DebugConfig {
    /// Gates per-message drop traces on the receive path.
    pub enabled: bool,
}

/// Session construction options. Every field has the documented default.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub max_players: usize,
    pub conflict_resolution: ConflictMode,
    /// Pins the authority in authoritative mode. When unset, the authority
    /// follows host election.
    pub authoritative_client_id: Option<PlayerId>,
    pub serialization: Scheme,
    pub ice_servers: Vec<IceServerConfig>,
    /// When set and this node is host, a departing peer's state entries are
    /// deleted and the removal is broadcast as a delta.
    pub cleanup_on_peer_leave: bool,
    pub debug: DebugConfig,
    pub backpressure: BackpressureConfig,
    pub movement: MovementConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_players: 4,
            conflict_resolution: ConflictMode::default(),
            authoritative_client_id: None,
            serialization: Scheme::default(),
            ice_servers: vec![IceServerConfig::stun(DEFAULT_STUN_SERVER)],
            cleanup_on_peer_leave: false,
            debug: DebugConfig::default(),
            backpressure: BackpressureConfig::default(),
            movement: MovementConfig::default(),
        }
    }
}
