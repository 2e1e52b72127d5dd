use std::collections::{HashMap, HashSet};

use log::{debug, warn};

use meshsync_shared::{
    elect_host, Body, Envelope, Event, MessageKind, PlayerId, Serializer, WirePayload,
};

use crate::config::{BackpressureConfig, BackpressureStrategy};
use crate::peer::info::{PeerInfo, CHANNEL_RELIABLE, CHANNEL_UNRELIABLE};
use crate::signaling::SignalingAdapter;
use crate::transport::{
    ChannelState, DataChannelInit, IceCandidate, IceServerConfig, RtcConnector, RtcEvent,
    RtcSignalingState, SdpType, SessionDescription,
};

/// How long an unanswered offer is kept before its connection is abandoned.
pub const PENDING_OFFER_TIMEOUT_MS: f64 = 30_000.0;
/// Interval of the internal latency probe.
pub const PING_INTERVAL_MS: f64 = 2_000.0;

/// Per-call routing override. `unreliable: true` flips a reliable-by-default
/// message onto the unreliable channel for this send only.
#[derive(Debug, Clone, Copy, Default)]
pub struct SendOptions {
    pub unreliable: bool,
}

struct PendingOffer {
    peer: PeerInfo,
    sent_at: f64,
}

/// Forms and maintains the full mesh: one RTC connection with two data
/// channels per remote peer, driven by roster updates and inbound SDP/ICE
/// from the signaling adapter.
///
/// Handlers return the events the topology change produced; the session
/// facade publishes them. Within one batch a host change always precedes
/// the peer join that caused it.
pub struct PeerManager {
    local_id: PlayerId,
    serializer: Serializer,
    connector: Box<dyn RtcConnector>,
    ice_servers: Vec<IceServerConfig>,
    max_players: usize,
    backpressure: BackpressureConfig,
    peers: HashMap<PlayerId, PeerInfo>,
    pending_initiators: HashMap<PlayerId, PendingOffer>,
    buffered_remote_ice: HashMap<PlayerId, Vec<IceCandidate>>,
    host_id: Option<PlayerId>,
    last_ping_at: Option<f64>,
    disposed: bool,
}

impl PeerManager {
    pub fn new(
        local_id: PlayerId,
        serializer: Serializer,
        connector: Box<dyn RtcConnector>,
        ice_servers: Vec<IceServerConfig>,
        max_players: usize,
        backpressure: BackpressureConfig,
    ) -> Self {
        Self {
            local_id,
            serializer,
            connector,
            ice_servers,
            max_players,
            backpressure,
            peers: HashMap::new(),
            pending_initiators: HashMap::new(),
            buffered_remote_ice: HashMap::new(),
            host_id: None,
            last_ping_at: None,
            disposed: false,
        }
    }

    pub fn host_id(&self) -> Option<&str> {
        self.host_id.as_deref()
    }

    /// Connected peer ids in the mesh total order.
    pub fn peer_ids(&self) -> Vec<PlayerId> {
        let mut ids: Vec<PlayerId> = self.peers.keys().cloned().collect();
        ids.sort_by(|a, b| meshsync_shared::peer_id_cmp(a, b));
        ids
    }

    pub fn ping_ms(&self, peer: &str) -> Option<f64> {
        self.peers.get(peer).and_then(|info| info.ping_ms)
    }

    /// Applies a roster update: evicts unlisted peers, then initiates toward
    /// every listed peer this node precedes in the total order.
    pub fn handle_roster(
        &mut self,
        roster: &[PlayerId],
        signaling: &mut dyn SignalingAdapter,
        now: f64,
    ) -> Vec<Event> {
        if self.disposed {
            return Vec::new();
        }
        let mut events = Vec::new();
        let listed: HashSet<&str> = roster.iter().map(String::as_str).collect();

        let evicted: Vec<PlayerId> = self
            .peers
            .keys()
            .filter(|id| !listed.contains(id.as_str()))
            .cloned()
            .collect();
        for id in evicted {
            if let Some(mut info) = self.peers.remove(&id) {
                info.rtc.close();
            }
            self.buffered_remote_ice.remove(&id);
            events.push(Event::PeerLeave { peer: id });
        }

        let abandoned: Vec<PlayerId> = self
            .pending_initiators
            .keys()
            .filter(|id| !listed.contains(id.as_str()))
            .cloned()
            .collect();
        for id in abandoned {
            if let Some(mut pending) = self.pending_initiators.remove(&id) {
                pending.peer.rtc.close();
            }
            self.buffered_remote_ice.remove(&id);
            events.push(Event::PeerLeave { peer: id });
        }

        for id in roster {
            if *id == self.local_id
                || self.peers.contains_key(id)
                || self.pending_initiators.contains_key(id)
            {
                continue;
            }
            if self.at_capacity() {
                events.push(Event::MaxCapacityReached {
                    max_players: self.max_players,
                });
                continue;
            }
            if meshsync_shared::peer_id_cmp(&self.local_id, id) == std::cmp::Ordering::Less {
                self.initiate(id, signaling, now);
            }
            // otherwise await their offer
        }

        events.extend(self.reelect());
        events
    }

    /// Inbound SDP. Offers run the responder flow; answers promote the
    /// matching pending initiator.
    pub fn handle_remote_description(
        &mut self,
        desc: SessionDescription,
        from: &str,
        signaling: &mut dyn SignalingAdapter,
    ) -> Vec<Event> {
        if self.disposed {
            return Vec::new();
        }
        match desc.sdp_type {
            SdpType::Offer => self.accept_offer(desc, from, signaling),
            SdpType::Answer => self.accept_answer(desc, from),
        }
    }

    /// Inbound ICE: applied immediately when the remote description is
    /// installed, buffered otherwise.
    pub fn handle_remote_ice(&mut self, candidate: IceCandidate, from: &str) {
        if self.disposed {
            return;
        }
        if let Some(info) = self.peers.get_mut(from) {
            if info.rtc.add_ice_candidate(candidate).is_err() {
                debug!("ice candidate from {from} rejected");
            }
            return;
        }
        self.buffered_remote_ice
            .entry(from.to_string())
            .or_default()
            .push(candidate);
    }

    /// The per-pump maintenance pass: drains RTC events, expires pending
    /// offers, evicts dead transports, and runs the ping loop.
    pub fn service(&mut self, now: f64, signaling: &mut dyn SignalingAdapter) -> Vec<Event> {
        if self.disposed {
            return Vec::new();
        }
        let mut events = Vec::new();

        self.expire_pending_offers(now);
        self.pump_pending(signaling);
        self.pump_peers(now, signaling, &mut events);
        self.ping_peers(now);

        events
    }

    /// Routes one envelope to a single peer.
    pub fn send(&mut self, to: &str, envelope: &Envelope, opts: SendOptions) {
        let kind = envelope.kind();
        let payload = match self.serializer.encode(envelope) {
            Ok(payload) => payload,
            Err(err) => {
                warn!("encode failed for {kind:?} to {to}: {err}");
                return;
            }
        };
        let unreliable = kind.is_unreliable() || opts.unreliable;
        if let Some(info) = self.peers.get_mut(to) {
            deliver(info, kind, payload, unreliable, &self.backpressure);
        }
    }

    /// Routes one envelope to every connected peer.
    pub fn broadcast(&mut self, envelope: &Envelope, opts: SendOptions) {
        let kind = envelope.kind();
        let payload = match self.serializer.encode(envelope) {
            Ok(payload) => payload,
            Err(err) => {
                warn!("encode failed for broadcast {kind:?}: {err}");
                return;
            }
        };
        let unreliable = kind.is_unreliable() || opts.unreliable;
        for info in self.peers.values_mut() {
            deliver(info, kind, payload.clone(), unreliable, &self.backpressure);
        }
    }

    /// Idempotent teardown: every connection closed, every map emptied.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        for (_, mut info) in self.peers.drain() {
            info.rtc.close();
        }
        for (_, mut pending) in self.pending_initiators.drain() {
            pending.peer.rtc.close();
        }
        self.buffered_remote_ice.clear();
        self.last_ping_at = None;
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    // Mesh formation

    fn at_capacity(&self) -> bool {
        self.peers.len() + self.pending_initiators.len() >= self.max_players.saturating_sub(1)
    }

    fn initiate(&mut self, to: &str, signaling: &mut dyn SignalingAdapter, now: f64) {
        let mut rtc = self.connector.connect(&self.ice_servers);
        let dc_unreliable =
            rtc.create_data_channel(CHANNEL_UNRELIABLE, &DataChannelInit::unreliable());
        let dc_reliable = rtc.create_data_channel(CHANNEL_RELIABLE, &DataChannelInit::reliable());

        let offer = match rtc.create_offer() {
            Ok(offer) => offer,
            Err(err) => {
                warn!("offer creation for {to} failed: {err}");
                rtc.close();
                return;
            }
        };
        if let Err(err) = rtc.set_local_description(offer.clone()) {
            warn!("local description for {to} rejected: {err}");
            rtc.close();
            return;
        }
        if let Err(err) = signaling.announce(&offer, Some(to)) {
            warn!("offer relay to {to} failed: {err}");
            rtc.close();
            return;
        }

        let mut peer = PeerInfo::new(to.to_string(), rtc);
        peer.dc_unreliable = Some(dc_unreliable);
        peer.dc_reliable = Some(dc_reliable);
        self.pending_initiators
            .insert(to.to_string(), PendingOffer { peer, sent_at: now });
    }

    fn accept_offer(
        &mut self,
        desc: SessionDescription,
        from: &str,
        signaling: &mut dyn SignalingAdapter,
    ) -> Vec<Event> {
        if self.peers.contains_key(from) || self.pending_initiators.contains_key(from) {
            debug!("ignoring offer from already-tracked peer {from}");
            return Vec::new();
        }
        if self.at_capacity() {
            return vec![Event::MaxCapacityReached {
                max_players: self.max_players,
            }];
        }

        let mut rtc = self.connector.connect(&self.ice_servers);
        if let Err(err) = rtc.set_remote_description(desc) {
            warn!("remote offer from {from} rejected: {err}");
            rtc.close();
            return Vec::new();
        }
        if let Some(buffered) = self.buffered_remote_ice.remove(from) {
            for candidate in buffered {
                if rtc.add_ice_candidate(candidate).is_err() {
                    debug!("buffered ice candidate from {from} rejected");
                }
            }
        }
        let answer = match rtc.create_answer() {
            Ok(answer) => answer,
            Err(err) => {
                warn!("answer creation for {from} failed: {err}");
                rtc.close();
                return Vec::new();
            }
        };
        if let Err(err) = rtc.set_local_description(answer.clone()) {
            warn!("local answer for {from} rejected: {err}");
            rtc.close();
            return Vec::new();
        }
        if let Err(err) = signaling.announce(&answer, Some(from)) {
            warn!("answer relay to {from} failed: {err}");
            rtc.close();
            return Vec::new();
        }

        // map update precedes event emission: host change first, then join
        self.peers
            .insert(from.to_string(), PeerInfo::new(from.to_string(), rtc));
        let mut events: Vec<Event> = self.reelect().into_iter().collect();
        events.push(Event::PeerJoin {
            peer: from.to_string(),
        });
        events
    }

    fn accept_answer(&mut self, desc: SessionDescription, from: &str) -> Vec<Event> {
        let Some(mut pending) = self.pending_initiators.remove(from) else {
            debug!("ignoring answer from {from} with no pending offer");
            return Vec::new();
        };
        if pending.peer.rtc.signaling_state() != RtcSignalingState::HaveLocalOffer {
            debug!("answer from {from} in unexpected signaling state");
            pending.peer.rtc.close();
            return Vec::new();
        }
        if let Err(err) = pending.peer.rtc.set_remote_description(desc) {
            warn!("remote answer from {from} rejected: {err}");
            pending.peer.rtc.close();
            return Vec::new();
        }
        if let Some(buffered) = self.buffered_remote_ice.remove(from) {
            for candidate in buffered {
                if pending.peer.rtc.add_ice_candidate(candidate).is_err() {
                    debug!("buffered ice candidate from {from} rejected");
                }
            }
        }

        self.peers.insert(from.to_string(), pending.peer);
        let mut events: Vec<Event> = self.reelect().into_iter().collect();
        events.push(Event::PeerJoin {
            peer: from.to_string(),
        });
        events
    }

    // Service passes

    fn expire_pending_offers(&mut self, now: f64) {
        let expired: Vec<PlayerId> = self
            .pending_initiators
            .iter()
            .filter(|(_, pending)| now - pending.sent_at >= PENDING_OFFER_TIMEOUT_MS)
            .map(|(id, _)| id.clone())
            .collect();
        for id in expired {
            if let Some(mut pending) = self.pending_initiators.remove(&id) {
                pending.peer.rtc.close();
            }
            self.buffered_remote_ice.remove(&id);
            debug!("pending offer to {id} timed out");
        }
    }

    fn pump_pending(&mut self, signaling: &mut dyn SignalingAdapter) {
        for (id, pending) in self.pending_initiators.iter_mut() {
            while let Some(event) = pending.peer.rtc.poll_event() {
                if let RtcEvent::LocalIceCandidate(candidate) = event {
                    if signaling.send_ice_candidate(&candidate, Some(id.as_str())).is_err() {
                        debug!("ice relay to {id} failed");
                    }
                }
            }
        }
    }

    fn pump_peers(
        &mut self,
        now: f64,
        signaling: &mut dyn SignalingAdapter,
        events: &mut Vec<Event>,
    ) {
        let serializer = self.serializer;
        let backpressure = self.backpressure;
        let local_id = self.local_id.clone();
        let ids: Vec<PlayerId> = self.peers.keys().cloned().collect();
        let mut dead: Vec<PlayerId> = Vec::new();

        for id in ids {
            let Some(info) = self.peers.get_mut(&id) else {
                continue;
            };
            while let Some(event) = info.rtc.poll_event() {
                match event {
                    RtcEvent::LocalIceCandidate(candidate) => {
                        if signaling.send_ice_candidate(&candidate, Some(id.as_str())).is_err() {
                            debug!("ice relay to {id} failed");
                        }
                    }
                    RtcEvent::DataChannel(channel) => info.attach_channel(channel),
                    RtcEvent::ChannelOpen { label } => info.flush_outbox(&label),
                    RtcEvent::ChannelClosed { .. } => {}
                    RtcEvent::Message { data, .. } => {
                        match serializer.decode(&data) {
                            Ok(mut envelope) => {
                                // identity discipline: the transport peer id
                                // always wins over wire content
                                envelope.from = id.clone();
                                match envelope.body {
                                    Body::Ping => {
                                        let pong = Envelope {
                                            from: local_id.clone(),
                                            ts: envelope.ts,
                                            seq: None,
                                            ttl: None,
                                            body: Body::Pong,
                                        };
                                        send_internal(info, &serializer, &backpressure, &pong);
                                    }
                                    Body::Pong => {
                                        let rtt = now - envelope.ts;
                                        info.ping_ms = Some(rtt);
                                        info.last_pong_ts = Some(now);
                                        events.push(Event::Ping {
                                            peer: id.clone(),
                                            rtt_ms: rtt,
                                        });
                                    }
                                    _ => events.push(Event::NetMessage { envelope }),
                                }
                            }
                            Err(err) => debug!("undecodable frame from {id} dropped: {err}"),
                        }
                    }
                    RtcEvent::ConnectionStateChange(state) if state.is_terminal() => {
                        dead.push(id.clone());
                    }
                    RtcEvent::ConnectionStateChange(_) => {}
                }
            }
        }

        for id in dead {
            if let Some(mut info) = self.peers.remove(&id) {
                info.rtc.close();
                self.buffered_remote_ice.remove(&id);
                events.push(Event::PeerLeave { peer: id });
            }
        }
        events.extend(self.reelect());
    }

    fn ping_peers(&mut self, now: f64) {
        let due = self
            .last_ping_at
            .map_or(true, |last| now - last >= PING_INTERVAL_MS);
        if !due {
            return;
        }
        self.last_ping_at = Some(now);

        let ping = Envelope {
            from: self.local_id.clone(),
            ts: now,
            seq: None,
            ttl: None,
            body: Body::Ping,
        };
        let serializer = self.serializer;
        let backpressure = self.backpressure;
        for info in self.peers.values_mut() {
            if info.unreliable_open() {
                send_internal(info, &serializer, &backpressure, &ping);
            }
        }
    }

    /// Re-derives the host as the minimum id over `{local} ∪ peers` and
    /// reports a change, if any.
    fn reelect(&mut self) -> Option<Event> {
        let candidates = self
            .peers
            .keys()
            .map(String::as_str)
            .chain(std::iter::once(self.local_id.as_str()));
        let new_host = elect_host(candidates).map(str::to_string);
        if new_host == self.host_id {
            return None;
        }
        self.host_id = new_host.clone();
        new_host.map(|host| Event::HostChange { host })
    }
}

fn send_internal(
    info: &mut PeerInfo,
    serializer: &Serializer,
    backpressure: &BackpressureConfig,
    envelope: &Envelope,
) {
    match serializer.encode(envelope) {
        Ok(payload) => deliver(info, envelope.kind(), payload, true, backpressure),
        Err(err) => warn!("encode failed for internal {:?}: {err}", envelope.kind()),
    }
}

/// Routes one encoded frame to the right channel of one peer, applying the
/// backpressure policy on the unreliable path.
fn deliver(
    info: &mut PeerInfo,
    kind: MessageKind,
    payload: WirePayload,
    unreliable: bool,
    backpressure: &BackpressureConfig,
) {
    if !unreliable {
        let open = info
            .dc_reliable
            .as_ref()
            .is_some_and(|dc| dc.ready_state() == ChannelState::Open);
        if open {
            let dc = info.dc_reliable.as_mut().expect("checked open above");
            if dc.send(&payload).is_err() {
                info.enqueue_reliable(payload);
            }
        } else {
            info.enqueue_reliable(payload);
        }
        return;
    }

    if info.unreliable_open() {
        let congested = info
            .dc_unreliable
            .as_ref()
            .is_some_and(|dc| dc.buffered_amount() > backpressure.threshold_bytes);
        if congested && kind == MessageKind::Move {
            match backpressure.strategy {
                BackpressureStrategy::DropMoves => return,
                BackpressureStrategy::CoalesceMoves => {
                    enqueue_unreliable(info, kind, payload, backpressure.strategy);
                    return;
                }
                BackpressureStrategy::Off => {}
            }
        }
        let dc = info.dc_unreliable.as_mut().expect("checked open above");
        if dc.send(&payload).is_err() {
            enqueue_unreliable(info, kind, payload, backpressure.strategy);
        }
    } else {
        enqueue_unreliable(info, kind, payload, backpressure.strategy);
    }
}

fn enqueue_unreliable(
    info: &mut PeerInfo,
    kind: MessageKind,
    payload: WirePayload,
    strategy: BackpressureStrategy,
) {
    if strategy == BackpressureStrategy::CoalesceMoves && kind == MessageKind::Move {
        if let Some((last_kind, last_payload)) = info.outbox_unreliable.back_mut() {
            if *last_kind == MessageKind::Move {
                *last_payload = payload;
                return;
            }
        }
    }
    info.outbox_unreliable.push_back((kind, payload));
}
