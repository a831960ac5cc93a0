//! The session registry: every live viewer session, keyed by id.
//!
//! # Concurrency note
//!
//! `SessionRegistry` is NOT thread-safe by itself. It is a plain
//! `HashMap` owned by the stream manager, which guards it together with
//! the device bookkeeping behind one lock so that session membership and
//! reference counts always change together.

use std::collections::HashMap;

use depthcast_protocol::SessionId;
use depthcast_transport::PeerConnection;
use tokio::time::Instant;

use crate::{EvictReason, Session, SessionConfig, SessionError};

/// All live sessions.
///
/// ## Lifecycle
///
/// ```text
/// insert() ──→ [Offered] ──answer──→ [Answered]
///                  │                     │
///                  └───── stale() ───────┘
///                            │
///                            ▼
///                        remove()
/// ```
pub struct SessionRegistry<C: PeerConnection> {
    sessions: HashMap<SessionId, Session<C>>,
    config: SessionConfig,
}

impl<C: PeerConnection> SessionRegistry<C> {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            sessions: HashMap::new(),
            config,
        }
    }

    /// Register a new session.
    ///
    /// # Errors
    /// [`SessionError::AlreadyExists`] if the id is taken. The existing
    /// session is left untouched.
    pub fn insert(&mut self, session: Session<C>) -> Result<&mut Session<C>, SessionError> {
        use std::collections::hash_map::Entry;

        match self.sessions.entry(session.id.clone()) {
            Entry::Occupied(_) => Err(SessionError::AlreadyExists(session.id)),
            Entry::Vacant(slot) => {
                tracing::debug!(
                    session_id = %session.id,
                    device_id = %session.device_id,
                    "session registered"
                );
                Ok(slot.insert(session))
            }
        }
    }

    pub fn get(&self, id: &SessionId) -> Option<&Session<C>> {
        self.sessions.get(id)
    }

    pub fn get_mut(&mut self, id: &SessionId) -> Option<&mut Session<C>> {
        self.sessions.get_mut(id)
    }

    /// Remove a session, handing it back for teardown.
    pub fn remove(&mut self, id: &SessionId) -> Option<Session<C>> {
        let session = self.sessions.remove(id)?;
        tracing::debug!(session_id = %id, device_id = %session.device_id, "session removed");
        Some(session)
    }

    /// Ids of all sessions, sorted for stable output.
    pub fn ids(&self) -> Vec<SessionId> {
        let mut ids: Vec<SessionId> = self.sessions.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn iter(&self) -> impl Iterator<Item = &Session<C>> {
        self.sessions.values()
    }

    /// Sessions whose viewer answer has been applied.
    pub fn connected_count(&self) -> usize {
        self.sessions.values().filter(|s| s.connected).count()
    }

    /// Sessions the reaper should evict at `now`, with the reason.
    ///
    /// Does not remove anything: the caller tears each one down and then
    /// calls [`remove`](Self::remove).
    pub fn stale(&self, now: Instant) -> Vec<(SessionId, EvictReason)> {
        let mut stale: Vec<(SessionId, EvictReason)> = self
            .sessions
            .values()
            .filter_map(|s| s.eviction_reason(&self.config, now).map(|r| (s.id.clone(), r)))
            .collect();
        stale.sort_by(|a, b| a.0.cmp(&b.0));
        stale
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

// =========================================================================
// Tests
// =========================================================================
