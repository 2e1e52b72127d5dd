use std::collections::VecDeque;

use log::warn;

use meshsync_shared::{MessageKind, PlayerId, WirePayload};

use crate::transport::{ChannelState, DataChannel, RtcConnection};

/// Label of the unordered, zero-retransmit channel carrying moves and pings.
pub const CHANNEL_UNRELIABLE: &str = "game-unreliable";
/// Label of the ordered channel carrying everything else.
pub const CHANNEL_RELIABLE: &str = "game-reliable";

/// Defensive ceiling on frames queued for a closed reliable channel.
pub const RELIABLE_OUTBOX_LIMIT: usize = 1024;

/// Everything the manager owns for one remote peer. Never handed outward;
/// external components hold only `PlayerId`s and query through the manager.
pub struct PeerInfo {
    pub id: PlayerId,
    pub rtc: Box<dyn RtcConnection>,
    pub dc_unreliable: Option<Box<dyn DataChannel>>,
    pub dc_reliable: Option<Box<dyn DataChannel>>,
    /// Frames awaiting an open unreliable channel, tagged with their message
    /// kind so the coalescing policy can recognize trailing moves.
    pub outbox_unreliable: VecDeque<(MessageKind, WirePayload)>,
    pub outbox_reliable: VecDeque<WirePayload>,
    pub ping_ms: Option<f64>,
    pub last_pong_ts: Option<f64>,
}

impl PeerInfo {
    pub fn new(id: PlayerId, rtc: Box<dyn RtcConnection>) -> Self {
        Self {
            id,
            rtc,
            dc_unreliable: None,
            dc_reliable: None,
            outbox_unreliable: VecDeque::new(),
            outbox_reliable: VecDeque::new(),
            ping_ms: None,
            last_pong_ts: None,
        }
    }

    /// Queues a reliable frame, evicting the oldest when the defensive
    /// bound is hit.
    pub fn enqueue_reliable(&mut self, payload: WirePayload) {
        if self.outbox_reliable.len() >= RELIABLE_OUTBOX_LIMIT {
            self.outbox_reliable.pop_front();
            warn!("reliable outbox for {} overflowed, oldest frame dropped", self.id);
        }
        self.outbox_reliable.push_back(payload);
    }

    /// Drains the outbox matching `label` into its (now open) channel, in
    /// FIFO order.
    pub fn flush_outbox(&mut self, label: &str) {
        match label {
            CHANNEL_UNRELIABLE => {
                if let Some(dc) = self.dc_unreliable.as_mut() {
                    while let Some((_, payload)) = self.outbox_unreliable.pop_front() {
                        if dc.send(&payload).is_err() {
                            break;
                        }
                    }
                }
            }
            CHANNEL_RELIABLE => {
                if let Some(dc) = self.dc_reliable.as_mut() {
                    while let Some(payload) = self.outbox_reliable.pop_front() {
                        if dc.send(&payload).is_err() {
                            break;
                        }
                    }
                }
            }
            _ => {}
        }
    }

    /// Stores a channel surfaced by the remote side, dispatching on its
    /// label. Unknown labels are ignored silently.
    pub fn attach_channel(&mut self, channel: Box<dyn DataChannel>) {
        match channel.label() {
            CHANNEL_UNRELIABLE => self.dc_unreliable = Some(channel),
            CHANNEL_RELIABLE => self.dc_reliable = Some(channel),
            _ => {}
        }
    }

    pub fn unreliable_open(&self) -> bool {
        self.dc_unreliable
            .as_ref()
            .is_some_and(|dc| dc.ready_state() == ChannelState::Open)
    }
}
