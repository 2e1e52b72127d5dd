//! Trait seam for the underlying WebRTC stack.
//!
//! The real ICE agent and SCTP data channels live outside this crate; an
//! embedder implements these traits over its platform bindings (or over the
//! in-memory fabric in the test harness). The peer manager only ever drives
//! connections through `Box<dyn RtcConnection>` and drains their events via
//! [`RtcConnection::poll_event`].

use thiserror::Error;

use meshsync_shared::WirePayload;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("data channel is not open")]
    ChannelClosed,
    #[error("peer connection is closed")]
    ConnectionClosed,
    #[error("invalid session description: {0}")]
    InvalidDescription(String),
    #[error("invalid ice candidate: {0}")]
    InvalidCandidate(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SdpType {
    Offer,
    Answer,
}

/// An SDP blob plus its role in the offer/answer exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionDescription {
    pub sdp_type: SdpType,
    pub sdp: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IceCandidate {
    pub candidate: String,
    pub sdp_mid: Option<String>,
    pub sdp_m_line_index: Option<u16>,
}

/// One ICE server entry for connection setup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IceServerConfig {
    pub urls: Vec<String>,
    pub username: Option<String>,
    pub credential: Option<String>,
}

impl IceServerConfig {
    pub fn stun(url: impl Into<String>) -> Self {
        Self {
            urls: vec![url.into()],
            username: None,
            credential: None,
        }
    }
}

/// Mirrors the signaling-state machine of an RTC peer connection. Async
/// handlers re-check this after every suspension point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RtcSignalingState {
    Stable,
    HaveLocalOffer,
    HaveRemoteOffer,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RtcConnectionState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl RtcConnectionState {
    /// Whether the transport is gone for good and the peer must be evicted.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RtcConnectionState::Disconnected
                | RtcConnectionState::Failed
                | RtcConnectionState::Closed
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Connecting,
    Open,
    Closing,
    Closed,
}

/// Creation parameters for a data channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataChannelInit {
    pub ordered: bool,
    /// `Some(0)` yields a fire-and-forget channel; `None` keeps the default
    /// retransmission behavior.
    pub max_retransmits: Option<u16>,
}

impl DataChannelInit {
    pub fn unreliable() -> Self {
        Self {
            ordered: false,
            max_retransmits: Some(0),
        }
    }

    pub fn reliable() -> Self {
        Self {
            ordered: true,
            max_retransmits: None,
        }
    }
}

/// Events drained from a connection each pump.
pub enum RtcEvent {
    /// A locally gathered ICE candidate to relay to the remote peer.
    LocalIceCandidate(IceCandidate),
    /// The remote side created a data channel on this connection.
    DataChannel(Box<dyn DataChannel>),
    ChannelOpen { label: String },
    ChannelClosed { label: String },
    Message { label: String, data: WirePayload },
    ConnectionStateChange(RtcConnectionState),
}

pub trait DataChannel {
    fn label(&self) -> &str;
    fn ready_state(&self) -> ChannelState;
    /// Bytes queued in the transport but not yet handed to the network.
    fn buffered_amount(&self) -> usize;
    fn send(&mut self, payload: &WirePayload) -> Result<(), TransportError>;
}

pub trait RtcConnection {
    fn create_data_channel(
        &mut self,
        label: &str,
        init: &DataChannelInit,
    ) -> Box<dyn DataChannel>;

    fn create_offer(&mut self) -> Result<SessionDescription, TransportError>;
    fn create_answer(&mut self) -> Result<SessionDescription, TransportError>;
    fn set_local_description(&mut self, desc: SessionDescription) -> Result<(), TransportError>;
    fn set_remote_description(&mut self, desc: SessionDescription) -> Result<(), TransportError>;
    fn add_ice_candidate(&mut self, candidate: IceCandidate) -> Result<(), TransportError>;

    fn signaling_state(&self) -> RtcSignalingState;
    fn connection_state(&self) -> RtcConnectionState;

    /// Drains the next pending event, if any.
    fn poll_event(&mut self) -> Option<RtcEvent>;

    fn close(&mut self);
}

/// Factory for peer connections, owned by the peer manager.
pub trait RtcConnector {
    fn connect(&mut self, ice_servers: &[IceServerConfig]) -> Box<dyn RtcConnection>;
}
