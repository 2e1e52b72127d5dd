use thiserror::Error;

use crate::signaling::SignalingError;
use crate::transport::TransportError;

/// Errors surfaced by the public session API.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Every public operation fails with this after `stop()`.
    #[error("session is disposed")]
    Disposed,

    #[error("signaling failed: {0}")]
    Signaling(#[from] SignalingError),

    #[error("transport failed: {0}")]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Codec(#[from] meshsync_shared::CodecError),
}
