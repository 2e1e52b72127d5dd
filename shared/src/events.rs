use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};

use log::warn;

use crate::envelope::Envelope;
use crate::state::{GlobalGameState, InventoryItem, StateDelta};
use crate::types::{PlayerId, Vec3};

/// Everything the session can notify subscribers about. The set is closed;
/// dispatch sites cover it exhaustively.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    PeerJoin {
        peer: PlayerId,
    },
    PeerLeave {
        peer: PlayerId,
    },
    HostChange {
        host: PlayerId,
    },
    PlayerMove {
        player: PlayerId,
        position: Vec3,
        velocity: Option<Vec3>,
    },
    InventoryUpdate {
        player: PlayerId,
        items: Vec<InventoryItem>,
    },
    ObjectTransfer {
        from: PlayerId,
        to: PlayerId,
        item: InventoryItem,
    },
    /// A full snapshot was merged into the replicated state.
    StateSync {
        from: PlayerId,
        state: GlobalGameState,
    },
    StateDelta {
        from: PlayerId,
        delta: StateDelta,
    },
    SharedPayload {
        from: PlayerId,
        payload: serde_json::Value,
        channel: Option<String>,
    },
    /// A decoded envelope from the data plane, `from` already rewritten to
    /// the transport peer id.
    NetMessage {
        envelope: Envelope,
    },
    /// Measured round-trip time to a peer, in milliseconds.
    Ping {
        peer: PlayerId,
        rtt_ms: f64,
    },
    MaxCapacityReached {
        max_players: usize,
    },
}

/// Discriminant of [`Event`], the subscription key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    PeerJoin,
    PeerLeave,
    HostChange,
    PlayerMove,
    InventoryUpdate,
    ObjectTransfer,
    StateSync,
    StateDelta,
    SharedPayload,
    NetMessage,
    Ping,
    MaxCapacityReached,
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::PeerJoin { .. } => EventKind::PeerJoin,
            Event::PeerLeave { .. } => EventKind::PeerLeave,
            Event::HostChange { .. } => EventKind::HostChange,
            Event::PlayerMove { .. } => EventKind::PlayerMove,
            Event::InventoryUpdate { .. } => EventKind::InventoryUpdate,
            Event::ObjectTransfer { .. } => EventKind::ObjectTransfer,
            Event::StateSync { .. } => EventKind::StateSync,
            Event::StateDelta { .. } => EventKind::StateDelta,
            Event::SharedPayload { .. } => EventKind::SharedPayload,
            Event::NetMessage { .. } => EventKind::NetMessage,
            Event::Ping { .. } => EventKind::Ping,
            Event::MaxCapacityReached { .. } => EventKind::MaxCapacityReached,
        }
    }
}

/// Handle returned by [`EventBus::subscribe`]; pass it back to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Box<dyn FnMut(&Event)>;

/// Keyed multicast registry. Delivery is synchronous, in subscription order;
/// a panicking listener is isolated so its siblings still run.
#[derive(Default)]
pub struct EventBus {
    listeners: HashMap<EventKind, Vec<(ListenerId, Listener)>>,
    next_id: u64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&mut self, kind: EventKind, listener: F) -> ListenerId
    where
        F: FnMut(&Event) + 'static,
    {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.listeners
            .entry(kind)
            .or_default()
            .push((id, Box::new(listener)));
        id
    }

    /// Removes a subscription. Unknown ids are a no-op.
    pub fn unsubscribe(&mut self, id: ListenerId) {
        for listeners in self.listeners.values_mut() {
            listeners.retain(|(listener_id, _)| *listener_id != id);
        }
    }

    pub fn emit(&mut self, event: &Event) {
        let Some(listeners) = self.listeners.get_mut(&event.kind()) else {
            return;
        };
        for (id, listener) in listeners.iter_mut() {
            if catch_unwind(AssertUnwindSafe(|| listener(event))).is_err() {
                warn!("event listener {:?} panicked on {:?}", id, event.kind());
            }
        }
    }

    /// Drops every subscriber. Called on session disposal.
    pub fn clear(&mut self) {
        self.listeners.clear();
    }
}
