//! Unified error type for the Depthcast stream manager.

use depthcast_protocol::{ProtocolError, SessionId, StreamType};
use depthcast_transport::TransportError;

/// Top-level error returned by [`StreamManager`](crate::StreamManager)
/// operations and the signaling surface.
///
/// Transport and protocol errors convert automatically with `?`. Device
/// and session errors are mapped explicitly at the call site, because the
/// same underlying failure means different things in different operations.
#[derive(Debug, thiserror::Error)]
pub enum DepthcastError {
    /// Malformed input: empty or unknown stream types, wrong switch length.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("session {0} not found")]
    NotFound(SessionId),

    /// The connected-session cap has been reached.
    #[error("maximum concurrent sessions ({limit}) reached")]
    CapacityExceeded { limit: usize },

    /// The device never reported the requested streams as active.
    #[error("streams {stream_types:?} not active on device {device_id}")]
    StreamNotActive {
        device_id: String,
        stream_types: Vec<StreamType>,
    },

    #[error("failed to configure device {device_id}: {reason}")]
    DeviceConfigurationFailed { device_id: String, reason: String },

    #[error("remote description rejected: {0}")]
    AnswerRejected(String),

    #[error("failed to add ICE candidate: {0}")]
    AddCandidateFailed(String),

    #[error("operation timed out after {0:?}")]
    OperationTimedOut(std::time::Duration),

    #[error("stream switch failed: {0}")]
    SwitchFailed(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

impl DepthcastError {
    /// HTTP-style status code reported to signaling clients.
    pub fn code(&self) -> u16 {
        match self {
            Self::InvalidArgument(_)
            | Self::AnswerRejected(_)
            | Self::AddCandidateFailed(_)
            | Self::Protocol(_) => 400,
            Self::NotFound(_) => 404,
            Self::SwitchFailed(_) => 409,
            Self::CapacityExceeded { .. } => 429,
            Self::StreamNotActive { .. } | Self::DeviceConfigurationFailed { .. } => 503,
            Self::OperationTimedOut(_) => 504,
            Self::Internal(_) | Self::Transport(_) => 500,
        }
    }
}
