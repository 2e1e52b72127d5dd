use log::debug;
use serde_json::Value;

use meshsync_shared::{
    Body, Envelope, Event, EventBus, EventKind, GlobalGameState, InventoryItem, ListenerId,
    PlayerId, PlayerState, Seq, Serializer, Vec3,
};

use crate::config::{ConflictMode, SessionConfig};
use crate::error::SessionError;
use crate::movement::MovementIntegrator;
use crate::overlay::PingOverlay;
use crate::peer::{PeerManager, SendOptions};
use crate::resolver::ConflictResolver;
use crate::signaling::{SignalingAdapter, SignalingEvent};
use crate::state_manager::StateManager;
use crate::transport::RtcConnector;

/// The public face of a mesh session: lifecycle, outbound operations,
/// sequence counters, host hydration, and the event bus.
///
/// The embedder drives the session cooperatively: `update(now)` pumps
/// signaling and transport events to completion, `tick(now)` advances the
/// movement integrator. Timestamps are caller-supplied milliseconds; the
/// session never reads a clock of its own.
pub struct Session {
    config: SessionConfig,
    local_id: PlayerId,
    bus: EventBus,
    signaling: Box<dyn SignalingAdapter>,
    peers: PeerManager,
    state: StateManager,
    movement: MovementIntegrator,
    overlay: Option<Box<dyn PingOverlay>>,
    next_seq: Seq,
    clock_ms: f64,
    started: bool,
    disposed: bool,
    /// Joiners owed a targeted snapshot on the next scheduling turn.
    pending_snapshot_targets: Vec<PlayerId>,
}

impl Session {
    pub fn new(
        config: SessionConfig,
        signaling: Box<dyn SignalingAdapter>,
        connector: Box<dyn RtcConnector>,
    ) -> Self {
        let local_id = signaling.local_id().to_string();
        let serializer = Serializer::new(config.serialization);
        let resolver = ConflictResolver::new(
            config.conflict_resolution,
            config.authoritative_client_id.clone(),
        );
        let state = StateManager::new(local_id.clone(), resolver, config.debug.enabled);
        let peers = PeerManager::new(
            local_id.clone(),
            serializer,
            connector,
            config.ice_servers.clone(),
            config.max_players,
            config.backpressure,
        );
        let movement = MovementIntegrator::new(config.movement);

        Self {
            config,
            local_id,
            bus: EventBus::new(),
            signaling,
            peers,
            state,
            movement,
            overlay: None,
            next_seq: 0,
            clock_ms: 0.0,
            started: false,
            disposed: false,
            pending_snapshot_targets: Vec::new(),
        }
    }

    pub fn local_id(&self) -> &str {
        &self.local_id
    }

    /// Establishes signaling and begins mesh formation.
    pub fn start(&mut self) -> Result<(), SessionError> {
        self.ensure_alive()?;
        if self.started {
            return Ok(());
        }
        self.signaling.register()?;
        self.started = true;
        Ok(())
    }

    /// Idempotent disposal. After the first call every other public method
    /// fails with [`SessionError::Disposed`].
    pub fn stop(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        self.peers.dispose();
        self.signaling.close();
        self.bus.clear();
        self.pending_snapshot_targets.clear();
    }

    pub fn on<F>(&mut self, kind: EventKind, listener: F) -> Result<ListenerId, SessionError>
    where
        F: FnMut(&Event) + 'static,
    {
        self.ensure_alive()?;
        Ok(self.bus.subscribe(kind, listener))
    }

    pub fn off(&mut self, id: ListenerId) -> Result<(), SessionError> {
        self.ensure_alive()?;
        self.bus.unsubscribe(id);
        Ok(())
    }

    /// One cooperative pump: drains signaling, services every transport,
    /// performs deferred host hydration, and publishes the resulting events.
    pub fn update(&mut self, now: f64) -> Result<(), SessionError> {
        self.ensure_alive()?;
        self.clock_ms = now;

        // snapshots owed from the previous turn's joins
        let targets = std::mem::take(&mut self.pending_snapshot_targets);
        if self.is_host_local() {
            for target in targets {
                self.send_snapshot_to(&target);
            }
        }

        let mut events = Vec::new();
        while let Some(event) = self.signaling.poll_event() {
            match event {
                SignalingEvent::Roster(roster) => {
                    events.extend(self.peers.handle_roster(
                        &roster,
                        self.signaling.as_mut(),
                        now,
                    ));
                }
                SignalingEvent::RemoteDescription { desc, from } => {
                    events.extend(self.peers.handle_remote_description(
                        desc,
                        &from,
                        self.signaling.as_mut(),
                    ));
                }
                SignalingEvent::IceCandidate { candidate, from } => {
                    self.peers.handle_remote_ice(candidate, &from);
                }
            }
        }
        events.extend(self.peers.service(now, self.signaling.as_mut()));

        self.process_events(events, now);
        Ok(())
    }

    /// Runs one movement step: integrate, then resolve collisions.
    pub fn tick(&mut self, now: f64) -> Result<(), SessionError> {
        self.ensure_alive()?;
        self.clock_ms = now;
        self.movement.interpolate(self.state.state_mut(), now);
        self.movement.resolve_collisions(self.state.state_mut());
        Ok(())
    }

    /// Deep copy of the replicated state.
    pub fn get_state(&self) -> Result<GlobalGameState, SessionError> {
        self.ensure_alive()?;
        Ok(self.state.state_copy())
    }

    pub fn get_host_id(&self) -> Result<Option<PlayerId>, SessionError> {
        self.ensure_alive()?;
        Ok(self.peers.host_id().map(str::to_string))
    }

    pub fn ping_ms(&self, peer: &str) -> Result<Option<f64>, SessionError> {
        self.ensure_alive()?;
        Ok(self.peers.ping_ms(peer))
    }

    /// Connected peer ids in the mesh total order.
    pub fn peer_ids(&self) -> Result<Vec<PlayerId>, SessionError> {
        self.ensure_alive()?;
        Ok(self.peers.peer_ids())
    }

    /// Broadcasts a sequenced move and applies it to the local view.
    pub fn broadcast_move(
        &mut self,
        id: &str,
        position: Vec3,
        velocity: Option<Vec3>,
    ) -> Result<(), SessionError> {
        self.ensure_alive()?;
        let envelope = Envelope {
            from: id.to_string(),
            ts: self.clock_ms,
            seq: Some(self.take_seq()),
            ttl: None,
            body: Body::Move { position, velocity },
        };
        self.apply_local(&envelope);
        self.peers.broadcast(&envelope, SendOptions::default());
        Ok(())
    }

    /// Inserts the local player entry and broadcasts a move without a
    /// sequence number, so the host's first snapshot can still place the
    /// joiner during initial-join handling.
    pub fn announce_presence(
        &mut self,
        id: &str,
        position: Option<Vec3>,
    ) -> Result<(), SessionError> {
        self.ensure_alive()?;
        let position = position.unwrap_or_default();
        self.state.state_mut().players.insert(
            id.to_string(),
            PlayerState {
                id: id.to_string(),
                position,
                velocity: None,
            },
        );
        let envelope = Envelope {
            from: id.to_string(),
            ts: self.clock_ms,
            seq: None,
            ttl: None,
            body: Body::Move {
                position,
                velocity: None,
            },
        };
        self.peers.broadcast(&envelope, SendOptions::default());
        Ok(())
    }

    pub fn update_inventory(&mut self, items: Vec<InventoryItem>) -> Result<(), SessionError> {
        self.ensure_alive()?;
        let envelope = Envelope {
            from: self.local_id.clone(),
            ts: self.clock_ms,
            seq: Some(self.take_seq()),
            ttl: None,
            body: Body::Inventory { items },
        };
        self.apply_local(&envelope);
        self.peers.broadcast(&envelope, SendOptions::default());
        Ok(())
    }

    pub fn transfer_item(&mut self, to: &str, item: InventoryItem) -> Result<(), SessionError> {
        self.ensure_alive()?;
        let envelope = Envelope {
            from: self.local_id.clone(),
            ts: self.clock_ms,
            seq: Some(self.take_seq()),
            ttl: None,
            body: Body::Transfer {
                to: to.to_string(),
                item,
            },
        };
        self.apply_local(&envelope);
        self.peers.broadcast(&envelope, SendOptions::default());
        Ok(())
    }

    pub fn broadcast_payload(
        &mut self,
        payload: Value,
        channel: Option<String>,
        opts: SendOptions,
    ) -> Result<(), SessionError> {
        self.ensure_alive()?;
        let envelope = self.payload_envelope(payload, channel);
        self.peers.broadcast(&envelope, opts);
        Ok(())
    }

    pub fn send_payload(
        &mut self,
        to: &str,
        payload: Value,
        channel: Option<String>,
        opts: SendOptions,
    ) -> Result<(), SessionError> {
        self.ensure_alive()?;
        let envelope = self.payload_envelope(payload, channel);
        self.peers.send(to, &envelope, opts);
        Ok(())
    }

    pub fn broadcast_full_state(&mut self) -> Result<(), SessionError> {
        self.ensure_alive()?;
        let envelope = self.snapshot_envelope();
        self.peers.broadcast(&envelope, SendOptions::default());
        Ok(())
    }

    /// Builds a delta for the given paths (bumping `tick`) and broadcasts it.
    pub fn broadcast_delta(&mut self, paths: &[String]) -> Result<(), SessionError> {
        self.ensure_alive()?;
        let delta = self.state.build_delta_from_paths(paths);
        let envelope = Envelope {
            from: self.local_id.clone(),
            ts: self.clock_ms,
            seq: Some(self.take_seq()),
            ttl: None,
            body: Body::StateDelta { delta },
        };
        self.peers.broadcast(&envelope, SendOptions::default());
        Ok(())
    }

    /// Replaces the local replicated state wholesale and rebroadcasts it.
    pub fn set_state_and_broadcast(
        &mut self,
        state: GlobalGameState,
    ) -> Result<(), SessionError> {
        self.ensure_alive()?;
        self.state.set_state(state);
        self.broadcast_full_state()
    }

    pub fn set_ping_overlay(&mut self, overlay: Box<dyn PingOverlay>) {
        self.overlay = Some(overlay);
    }

    /// Forwards to the overlay collaborator, when one is attached.
    pub fn set_ping_overlay_enabled(&mut self, enabled: bool) -> Result<(), SessionError> {
        self.ensure_alive()?;
        if let Some(overlay) = self.overlay.as_mut() {
            overlay.set_enabled(enabled);
        }
        Ok(())
    }

    // Internals

    fn ensure_alive(&self) -> Result<(), SessionError> {
        if self.disposed {
            return Err(SessionError::Disposed);
        }
        Ok(())
    }

    fn take_seq(&mut self) -> Seq {
        self.next_seq += 1;
        self.next_seq
    }

    fn is_host_local(&self) -> bool {
        self.peers.host_id() == Some(self.local_id.as_str())
    }

    fn payload_envelope(&mut self, payload: Value, channel: Option<String>) -> Envelope {
        Envelope {
            from: self.local_id.clone(),
            ts: self.clock_ms,
            seq: Some(self.take_seq()),
            ttl: None,
            body: Body::Payload { payload, channel },
        }
    }

    fn snapshot_envelope(&mut self) -> Envelope {
        Envelope {
            from: self.local_id.clone(),
            ts: self.clock_ms,
            seq: Some(self.take_seq()),
            ttl: None,
            body: Body::StateFull {
                state: self.state.state_copy(),
            },
        }
    }

    fn send_snapshot_to(&mut self, target: &str) {
        let envelope = self.snapshot_envelope();
        self.peers.send(target, &envelope, SendOptions::default());
    }

    /// Applies a locally produced mutation through the same path inbound
    /// envelopes take, so the local view and dedup window stay consistent.
    fn apply_local(&mut self, envelope: &Envelope) {
        let events = self.state.handle(envelope);
        let now = self.clock_ms;
        self.process_events(events, now);
    }

    /// Reacts to one batch of component events, then publishes every one of
    /// them on the bus in order.
    fn process_events(&mut self, events: Vec<Event>, now: f64) {
        for event in events {
            match &event {
                Event::HostChange { host } => {
                    if self.config.conflict_resolution == ConflictMode::Authoritative
                        && self.config.authoritative_client_id.is_none()
                    {
                        self.state.set_authority(Some(host.clone()));
                    }
                    self.bus.emit(&event);
                    if *host == self.local_id {
                        // a freshly elected local host resynchronizes the
                        // mesh; stabilizes late joiners and migrations
                        let envelope = self.snapshot_envelope();
                        self.peers.broadcast(&envelope, SendOptions::default());
                    }
                    continue;
                }
                Event::PeerJoin { peer } => {
                    if self.is_host_local() {
                        self.pending_snapshot_targets.push(peer.clone());
                    }
                }
                Event::PeerLeave { peer } => {
                    if self.is_host_local() && self.config.cleanup_on_peer_leave {
                        self.cleanup_departed(peer.clone());
                    }
                }
                Event::PlayerMove { player, .. } => {
                    self.movement.note_move(player, now);
                }
                Event::Ping { peer, rtt_ms } => {
                    if let Some(overlay) = self.overlay.as_mut() {
                        overlay.record_ping(peer, *rtt_ms);
                    }
                }
                Event::NetMessage { envelope } => {
                    self.bus.emit(&event);
                    let domain = self.state.handle(envelope);
                    self.process_events(domain, now);
                    continue;
                }
                _ => {}
            }
            self.bus.emit(&event);
        }
    }

    fn cleanup_departed(&mut self, peer: PlayerId) {
        debug!("cleaning up state for departed peer {peer}");
        self.state.cleanup_player(&peer);
        self.movement.forget(&peer);
        let paths = [format!("players.{peer}"), format!("inventories.{peer}")];
        let delta = self.state.build_delta_from_paths(&paths);
        let envelope = Envelope {
            from: self.local_id.clone(),
            ts: self.clock_ms,
            seq: Some(self.take_seq()),
            ttl: None,
            body: Body::StateDelta { delta },
        };
        self.peers.broadcast(&envelope, SendOptions::default());
    }
}
