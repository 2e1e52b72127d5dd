use std::collections::HashMap;

use meshsync_shared::{GlobalGameState, PlayerId};

use crate::config::MovementConfig;

/// Distance below which two players are considered co-located and separated
/// along a deterministic fallback axis.
const EPSILON: f64 = 1e-6;

/// Advances replicated players between network updates: bounded velocity
/// extrapolation each frame, then pairwise sphere separation.
///
/// The integrator owns only timing bookkeeping; positions live in the
/// replicated state passed into each call.
pub struct MovementIntegrator {
    config: MovementConfig,
    last_move_ts: HashMap<PlayerId, f64>,
    last_frame_ts: HashMap<PlayerId, f64>,
}

impl MovementIntegrator {
    pub fn new(config: MovementConfig) -> Self {
        Self {
            config,
            last_move_ts: HashMap::new(),
            last_frame_ts: HashMap::new(),
        }
    }

    /// Records an accepted move for `id`, resetting its extrapolation budget.
    pub fn note_move(&mut self, id: &str, now: f64) {
        self.last_move_ts.insert(id.to_string(), now);
        self.last_frame_ts.insert(id.to_string(), now);
    }

    /// Drops timing state for a departed player.
    pub fn forget(&mut self, id: &str) {
        self.last_move_ts.remove(id);
        self.last_frame_ts.remove(id);
    }

    /// Advances every player with a known velocity, spending at most the
    /// remaining extrapolation budget since its last accepted move.
    pub fn interpolate(&mut self, state: &mut GlobalGameState, now: f64) {
        for (id, player) in state.players.iter_mut() {
            let Some(velocity) = player.velocity else {
                continue;
            };
            let Some(&last_move) = self.last_move_ts.get(id) else {
                continue;
            };
            let last_frame = self.last_frame_ts.get(id).copied().unwrap_or(last_move);

            let frame_dt = ((now - last_frame) / 1000.0).max(0.0);
            let remaining =
                (self.config.extrapolation_ms - (last_frame - last_move)).max(0.0) / 1000.0;
            let allowed_dt = frame_dt.min(remaining);
            let step = allowed_dt * self.config.smoothing;

            let max = self.config.max_speed;
            player.position.x += velocity.x.clamp(-max, max) * step;
            player.position.y += velocity.y.clamp(-max, max) * step;
            if let Some(vz) = velocity.z {
                let z = player.position.z_or_zero() + vz.clamp(-max, max) * step;
                player.position.z = Some(z);
            }

            if !self.config.ignore_world_bounds {
                let bounds = self.config.world_bounds;
                player.position.x = player.position.x.clamp(0.0, bounds.width);
                player.position.y = player.position.y.clamp(0.0, bounds.height);
                if bounds.depth > 0.0 {
                    if let Some(z) = player.position.z {
                        player.position.z = Some(z.clamp(0.0, bounds.depth));
                    }
                }
            }

            self.last_frame_ts.insert(id.clone(), now);
        }
    }

    /// Separates every overlapping pair by half the overlap each, along the
    /// line between their centers. Co-located pairs separate along X.
    pub fn resolve_collisions(&self, state: &mut GlobalGameState) {
        let min_distance = 2.0 * self.config.player_radius;
        let mut ids: Vec<PlayerId> = state.players.keys().cloned().collect();
        ids.sort();

        for i in 0..ids.len() {
            for j in (i + 1)..ids.len() {
                let a = &state.players[&ids[i]].position;
                let b = &state.players[&ids[j]].position;

                let dx = b.x - a.x;
                let dy = b.y - a.y;
                let dz = b.z_or_zero() - a.z_or_zero();
                let distance = (dx * dx + dy * dy + dz * dz).sqrt();
                if distance >= min_distance {
                    continue;
                }

                let (nx, ny, nz) = if distance < EPSILON {
                    (1.0, 0.0, 0.0)
                } else {
                    (dx / distance, dy / distance, dz / distance)
                };
                let push = (min_distance - distance) / 2.0;

                let a = state.players.get_mut(&ids[i]).expect("id came from the map");
                a.position.x -= nx * push;
                a.position.y -= ny * push;
                if nz != 0.0 {
                    a.position.z = Some(a.position.z_or_zero() - nz * push);
                }

                let b = state.players.get_mut(&ids[j]).expect("id came from the map");
                b.position.x += nx * push;
                b.position.y += ny * push;
                if nz != 0.0 {
                    b.position.z = Some(b.position.z_or_zero() + nz * push);
                }
            }
        }
    }
}
