use std::collections::HashMap;

use log::debug;
use serde_json::Value;

use meshsync_shared::{
    validate, Body, DeltaChange, Envelope, Event, GlobalGameState, PlayerId, Seq, StateDelta,
};

use crate::resolver::ConflictResolver;

/// Owns the replicated [`GlobalGameState`] and the per-sender dedup window.
///
/// `handle` is the single entry point for every envelope that reaches the
/// replication layer; it returns the domain events the acceptance produced
/// (an empty batch means the envelope was dropped).
pub struct StateManager {
    local_id: PlayerId,
    state: GlobalGameState,
    last_applied_seq: HashMap<PlayerId, Seq>,
    resolver: ConflictResolver,
    debug: bool,
}

impl StateManager {
    pub fn new(local_id: PlayerId, resolver: ConflictResolver, debug: bool) -> Self {
        Self {
            local_id,
            state: GlobalGameState::default(),
            last_applied_seq: HashMap::new(),
            resolver,
            debug,
        }
    }

    pub fn state(&self) -> &GlobalGameState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut GlobalGameState {
        &mut self.state
    }

    /// Deep copy for external consumers.
    pub fn state_copy(&self) -> GlobalGameState {
        self.state.clone()
    }

    /// Replaces the whole state. Used by `set_state_and_broadcast`.
    pub fn set_state(&mut self, state: GlobalGameState) {
        self.state = state;
    }

    pub fn set_authority(&mut self, authority: Option<PlayerId>) {
        self.resolver.set_authority(authority);
    }

    pub fn authority(&self) -> Option<&str> {
        self.resolver.authority()
    }

    pub fn last_seq(&self, id: &str) -> Option<Seq> {
        self.last_applied_seq.get(id).copied()
    }

    pub fn handle(&mut self, envelope: &Envelope) -> Vec<Event> {
        if !validate(envelope) {
            if self.debug {
                debug!("dropping structurally invalid envelope from {}", envelope.from);
            }
            return Vec::new();
        }

        if let Some(seq) = envelope.seq {
            let stale = self
                .last_applied_seq
                .get(&envelope.from)
                .is_some_and(|last| seq <= *last);
            if stale {
                if self.debug {
                    debug!("dropping stale seq {seq} from {}", envelope.from);
                }
                return Vec::new();
            }
            self.last_applied_seq.insert(envelope.from.clone(), seq);
        }

        let from = envelope.from.clone();
        match &envelope.body {
            Body::Move { position, velocity } => {
                if self
                    .resolver
                    .apply_move(&mut self.state, &from, position, velocity.as_ref())
                {
                    vec![Event::PlayerMove {
                        player: from,
                        position: *position,
                        velocity: *velocity,
                    }]
                } else {
                    self.trace_policy_drop(&envelope.from);
                    Vec::new()
                }
            }
            Body::Inventory { items } => {
                if self.resolver.apply_inventory(&mut self.state, &from, items) {
                    vec![Event::InventoryUpdate {
                        player: from,
                        items: items.clone(),
                    }]
                } else {
                    self.trace_policy_drop(&envelope.from);
                    Vec::new()
                }
            }
            Body::Transfer { to, item } => {
                if self
                    .resolver
                    .apply_transfer(&mut self.state, &from, to, item)
                {
                    vec![Event::ObjectTransfer {
                        from,
                        to: to.clone(),
                        item: item.clone(),
                    }]
                } else {
                    self.trace_policy_drop(&envelope.from);
                    Vec::new()
                }
            }
            Body::StateFull { state } => {
                self.merge_snapshot(state);
                vec![Event::StateSync {
                    from,
                    state: self.state.clone(),
                }]
            }
            Body::StateDelta { delta } => {
                self.resolver.apply_delta(&mut self.state, delta);
                vec![Event::StateDelta {
                    from,
                    delta: delta.clone(),
                }]
            }
            Body::Payload { payload, channel } => vec![Event::SharedPayload {
                from,
                payload: payload.clone(),
                channel: channel.clone(),
            }],
            // ping/pong are transport-internal and never reach this layer
            Body::Ping | Body::Pong => Vec::new(),
        }
    }

    /// Merges an inbound full snapshot.
    ///
    /// Remote entries are overwritten wholesale. The local player's entries
    /// are only taken from the snapshot on initial join/rejoin, detected by
    /// the absence of a local dedup entry; afterwards a newly elected host's
    /// snapshot must not roll back the local live view.
    fn merge_snapshot(&mut self, incoming: &GlobalGameState) {
        let initial_join = !self.last_applied_seq.contains_key(&self.local_id);

        let local_player = self.state.players.get(&self.local_id).cloned();
        let local_inventory = self.state.inventories.get(&self.local_id).cloned();

        self.state.players = incoming.players.clone();
        self.state.inventories = incoming.inventories.clone();

        if !initial_join {
            restore_local(&mut self.state.players, &self.local_id, local_player);
            restore_local(&mut self.state.inventories, &self.local_id, local_inventory);
        }

        self.state.objects = incoming.objects.clone();
        self.state.tick = self.state.tick.max(incoming.tick);
    }

    /// Atomically advances `tick` and snapshots the current value at each
    /// path. Missing paths yield `null`, which removes the addressed entry
    /// on the receiving side.
    pub fn build_delta_from_paths(&mut self, paths: &[String]) -> StateDelta {
        self.state.tick += 1;
        let image = serde_json::to_value(&self.state).unwrap_or(Value::Null);
        let changes = paths
            .iter()
            .map(|path| DeltaChange {
                path: path.clone(),
                value: value_at_path(&image, path),
            })
            .collect();
        StateDelta {
            tick: self.state.tick,
            changes,
        }
    }

    /// Deletes a departed player's entries. The caller broadcasts the
    /// removal delta.
    pub fn cleanup_player(&mut self, id: &str) {
        self.state.players.remove(id);
        self.state.inventories.remove(id);
    }

    fn trace_policy_drop(&self, from: &str) {
        if self.debug {
            debug!("mutation from {from} rejected by conflict policy");
        }
    }
}

fn restore_local<T>(map: &mut HashMap<PlayerId, T>, local_id: &str, preserved: Option<T>) {
    match preserved {
        Some(entry) => {
            map.insert(local_id.to_string(), entry);
        }
        None => {
            map.remove(local_id);
        }
    }
}

fn value_at_path(image: &Value, path: &str) -> Value {
    let mut cursor = image;
    for segment in path.split('.') {
        match cursor.get(segment) {
            Some(next) => cursor = next,
            None => return Value::Null,
        }
    }
    cursor.clone()
}
