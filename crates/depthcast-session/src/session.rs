//! Session types: the server's record of one viewer.
//!
//! A session tracks:
//! - WHICH device and stream types the viewer asked for
//! - HOW media reaches them (connection, tracks, data channel)
//! - WHERE it is in negotiation (`SessionPhase`, `ConnectionState`)
//! - WHEN it was created and last used, so the reaper can evict it

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use depthcast_device::DeviceTrack;
use depthcast_protocol::{SessionId, SessionStatus, StreamType};
use depthcast_transport::{ConnectionState, ConnectionStats, PeerConnection};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::SessionError;

// ---------------------------------------------------------------------------
// SessionConfig
// ---------------------------------------------------------------------------

/// Timeouts that decide when a session is stale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Maximum age of a session, however active. Default: 1 hour.
    pub session_timeout: Duration,

    /// Maximum time without offer/answer/ICE activity. Default: 30 minutes.
    pub idle_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            session_timeout: Duration::from_secs(3600),
            idle_timeout: Duration::from_secs(1800),
        }
    }
}

// ---------------------------------------------------------------------------
// SessionPhase
// ---------------------------------------------------------------------------

/// Where a session is in its negotiation lifecycle.
///
/// ```text
///   Offered ──(answer)──→ Answered ──(close)──→ Closed
///      │  ↑                 │  ↑
///      └──┴─(switch)────────┴──┘   Switching is transient and always
///                                  returns to the phase it started from
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionPhase {
    /// Local offer created, waiting for the viewer's answer.
    Offered,
    /// Answer applied; media is flowing or about to.
    Answered,
    /// A stream switch is in flight.
    Switching,
    /// Torn down; the record is about to be dropped.
    Closed,
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Offered => write!(f, "offered"),
            Self::Answered => write!(f, "answered"),
            Self::Switching => write!(f, "switching"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

// ---------------------------------------------------------------------------
// EvictReason
// ---------------------------------------------------------------------------

/// Why the reaper is removing a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictReason {
    /// The transport reported the connection closed.
    CleanupRequested,
    /// Older than `session_timeout`.
    SessionTimeout,
    /// No activity for `idle_timeout`.
    IdleTimeout,
}

impl fmt::Display for EvictReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CleanupRequested => write!(f, "connection closed"),
            Self::SessionTimeout => write!(f, "session timeout"),
            Self::IdleTimeout => write!(f, "idle timeout"),
        }
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// A single viewer's session.
///
/// Invariant: `tracks[i]` carries `stream_types[i]`, so both always have
/// the same length.
pub struct Session<C: PeerConnection> {
    pub id: SessionId,
    pub device_id: String,
    pub stream_types: Vec<StreamType>,

    pub connection: Arc<C>,
    pub tracks: Vec<Arc<DeviceTrack>>,
    pub data_channel: Option<Arc<C::DataChannel>>,

    /// Set once the viewer's answer has been applied.
    pub connected: bool,
    pub connection_state: ConnectionState,
    pub phase: SessionPhase,

    pub created_at: Instant,
    pub last_activity: Instant,

    /// Set by the connection-state callback when the transport closes.
    pub should_cleanup: bool,
}

impl<C: PeerConnection> Session<C> {
    /// A freshly offered session.
    pub fn new(
        id: SessionId,
        device_id: impl Into<String>,
        stream_types: Vec<StreamType>,
        connection: Arc<C>,
        tracks: Vec<Arc<DeviceTrack>>,
        data_channel: Option<Arc<C::DataChannel>>,
    ) -> Self {
        let now = Instant::now();
        Self {
            id,
            device_id: device_id.into(),
            stream_types,
            connection,
            tracks,
            data_channel,
            connected: false,
            connection_state: ConnectionState::New,
            phase: SessionPhase::Offered,
            created_at: now,
            last_activity: now,
            should_cleanup: false,
        }
    }

    /// Record viewer activity.
    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    /// The viewer's answer was applied.
    pub fn mark_answered(&mut self) {
        self.connected = true;
        if self.phase == SessionPhase::Offered {
            self.phase = SessionPhase::Answered;
        }
        self.touch();
    }

    /// Record a transport state change. A closed transport flags the
    /// session for the reaper.
    pub fn record_connection_state(&mut self, state: ConnectionState) {
        self.connection_state = state;
        if state == ConnectionState::Closed {
            self.should_cleanup = true;
        }
    }

    /// Enter `Switching`, returning the phase to restore afterwards.
    ///
    /// # Errors
    /// [`SessionError::SwitchInProgress`] if a switch is already running.
    pub fn begin_switch(&mut self) -> Result<SessionPhase, SessionError> {
        match self.phase {
            SessionPhase::Switching => Err(SessionError::SwitchInProgress(self.id.clone())),
            SessionPhase::Closed => Err(SessionError::NotFound(self.id.clone())),
            previous => {
                self.phase = SessionPhase::Switching;
                Ok(previous)
            }
        }
    }

    /// Leave `Switching` and go back to `previous`, or to `Answered` if
    /// the answer arrived while switching.
    pub fn end_switch(&mut self, previous: SessionPhase) {
        if self.phase == SessionPhase::Switching {
            self.phase = match previous {
                SessionPhase::Offered if self.connected => SessionPhase::Answered,
                previous => previous,
            };
        }
    }

    /// Check that `new_types` can be rebound onto the existing tracks.
    pub fn check_rebind(&self, new_types: &[StreamType]) -> Result<(), SessionError> {
        if new_types.len() != self.tracks.len() {
            return Err(SessionError::TrackCountMismatch {
                expected: self.tracks.len(),
                got: new_types.len(),
            });
        }
        Ok(())
    }

    /// Point track `i` at `new_types[i]` and record the new types.
    /// Returns the types the session held before.
    pub fn rebind(&mut self, new_types: Vec<StreamType>) -> Result<Vec<StreamType>, SessionError> {
        self.check_rebind(&new_types)?;
        for (track, &t) in self.tracks.iter().zip(&new_types) {
            track.rebind(t);
        }
        self.touch();
        Ok(std::mem::replace(&mut self.stream_types, new_types))
    }

    /// Why the reaper should evict this session at `now`, if at all.
    pub fn eviction_reason(&self, config: &SessionConfig, now: Instant) -> Option<EvictReason> {
        if self.should_cleanup {
            Some(EvictReason::CleanupRequested)
        } else if now.saturating_duration_since(self.created_at) > config.session_timeout {
            Some(EvictReason::SessionTimeout)
        } else if now.saturating_duration_since(self.last_activity) > config.idle_timeout {
            Some(EvictReason::IdleTimeout)
        } else {
            None
        }
    }

    /// Read-only view with the given statistics attached.
    pub fn status(&self, stats: Option<ConnectionStats>) -> SessionStatus {
        SessionStatus {
            session_id: self.id.clone(),
            device_id: self.device_id.clone(),
            connected: self.connected,
            streaming: self.connected,
            stream_types: self.stream_types.clone(),
            stats,
        }
    }
}
