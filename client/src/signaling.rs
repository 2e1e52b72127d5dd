//! Signaling-adapter contract.
//!
//! The relay transport is an external collaborator; the session only needs a
//! registered identity, targeted SDP/ICE delivery, and a polled stream of
//! roster updates and inbound descriptions/candidates.

use thiserror::Error;

use meshsync_shared::PlayerId;

use crate::transport::{IceCandidate, SessionDescription};

#[derive(Debug, Error)]
pub enum SignalingError {
    #[error("signaling transport is closed")]
    Closed,
    #[error("signaling rejected the request: {0}")]
    Rejected(String),
    #[error("signaling transport failed: {0}")]
    Io(String),
}

/// Inbound signaling traffic, drained by the session pump.
#[derive(Debug, Clone, PartialEq)]
pub enum SignalingEvent {
    RemoteDescription {
        desc: SignalingDescription,
        from: PlayerId,
    },
    IceCandidate {
        candidate: IceCandidate,
        from: PlayerId,
    },
    /// The authoritative room membership, re-published on every change.
    Roster(Vec<PlayerId>),
}

/// A remote description as relayed by signaling.
pub type SignalingDescription = SessionDescription;

pub trait SignalingAdapter {
    /// The identity this endpoint is registered under.
    fn local_id(&self) -> &str;

    /// Joins the room; the relay answers with a roster update.
    fn register(&mut self) -> Result<(), SignalingError>;

    /// Sends an SDP description, targeted at `to` when present.
    fn announce(
        &mut self,
        desc: &SessionDescription,
        to: Option<&str>,
    ) -> Result<(), SignalingError>;

    /// Sends an ICE candidate, targeted at `to` when present.
    fn send_ice_candidate(
        &mut self,
        candidate: &IceCandidate,
        to: Option<&str>,
    ) -> Result<(), SignalingError>;

    /// Drains the next pending inbound event, if any.
    fn poll_event(&mut self) -> Option<SignalingEvent>;

    /// Invoked once on session disposal.
    fn close(&mut self);
}
