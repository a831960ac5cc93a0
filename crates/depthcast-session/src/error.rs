//! Error types for the session layer.

use depthcast_protocol::SessionId;

/// Errors raised by session bookkeeping.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// No session with this id is registered.
    #[error("session {0} not found")]
    NotFound(SessionId),

    /// A session with this id is already registered.
    #[error("session {0} already exists")]
    AlreadyExists(SessionId),

    /// Another stream switch on this session has not finished yet.
    #[error("stream switch already in progress for session {0}")]
    SwitchInProgress(SessionId),

    /// A switch must name exactly one stream type per existing track.
    #[error("expected {expected} stream types, got {got}")]
    TrackCountMismatch { expected: usize, got: usize },
}
