//! The stream manager: session lifecycle on top of shared device streams.
//!
//! Three pieces of state change together and live behind one lock in
//! `ManagerState`:
//! - the session registry
//! - per-device, per-stream-type reference counts
//! - the physical configuration recorded for each device
//!
//! Every operation follows the same shape: decide and book under the lock,
//! release it, do the slow I/O (device restarts, engine negotiation,
//! polling), then re-lock to commit or roll back. Bookings that never
//! commit are released again, so counts always equal the number of live
//! holders.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::SystemTime;

use depthcast_device::{
    DeviceConfigStore, DeviceDriver, DeviceStreamCoordinator, DeviceTrack, FrameSource,
    RemovalPlan, StreamReferenceCounter,
};
use depthcast_protocol::{
    PointCloudSnapshot, SessionId, SessionStatus, StreamConfig, StreamReferenceInfo, StreamType,
};
use depthcast_session::{Session, SessionPhase, SessionRegistry};
use depthcast_transport::{
    IceCandidate, PeerConnection, RtcEngine, SessionDescription, VideoSource,
};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::streamer::PointCloudStreamer;
use crate::{reaper, DepthcastError, ManagerConfig, RetryPolicy};

type Connection<E> = <E as RtcEngine>::Connection;
type Channel<E> = <Connection<E> as PeerConnection>::DataChannel;

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// A device restart decided under the lock and carried out after it.
struct Reconfig {
    previous: Option<Vec<StreamConfig>>,
    /// Start time recorded for `previous`.
    started_at: Option<SystemTime>,
    configs: Vec<StreamConfig>,
}

impl Reconfig {
    /// The store entry to fall back to if this reconfiguration is undone
    /// without touching the device.
    fn prior(&self) -> Option<(Vec<StreamConfig>, SystemTime)> {
        self.previous.clone().zip(self.started_at)
    }
}

struct ManagerState<C: PeerConnection> {
    sessions: SessionRegistry<C>,
    references: StreamReferenceCounter,
    devices: DeviceConfigStore,
    /// Cancels the point-cloud streamer of each session that has one.
    streamers: HashMap<SessionId, CancellationToken>,
}

impl<C: PeerConnection> ManagerState<C> {
    /// Count one more holder of `stream_types` and, if that adds types
    /// the device is not configured for, record the merged configuration.
    fn book(&mut self, device_id: &str, stream_types: &[StreamType]) -> Option<Reconfig> {
        let outcome = self.references.ensure(device_id, stream_types);
        if !outcome.needs_reconfig {
            return None;
        }
        let previous = self.devices.configs(device_id).map(<[StreamConfig]>::to_vec);
        let started_at = self.devices.started_at(device_id);
        let configs = self.devices.merged_with(device_id, &outcome.new_configs);
        self.devices.commit(device_id, configs.clone());
        Some(Reconfig {
            previous,
            started_at,
            configs,
        })
    }

    /// Drop one holder of `stream_types`. Returns the device change to
    /// carry out, if any type lost its last holder.
    fn release(&mut self, device_id: &str, stream_types: &[StreamType]) -> Option<RemovalPlan> {
        let removed = self.references.release(device_id, stream_types);
        if removed.is_empty() {
            return None;
        }
        let plan = self.devices.removal_plan(device_id, &removed)?;
        self.devices.commit(device_id, plan.remaining.clone());
        Some(plan)
    }

    /// Undo a booking on the counter and in the store, leaving the device
    /// itself alone. When the store is back at `prior`, its start time is
    /// put back as well.
    fn withdraw(
        &mut self,
        device_id: &str,
        stream_types: &[StreamType],
        prior: Option<&(Vec<StreamConfig>, SystemTime)>,
    ) {
        let Some(plan) = self.release(device_id, stream_types) else {
            return;
        };
        if let Some((configs, started_at)) = prior {
            if self.devices.configs(device_id) == Some(configs.as_slice()) {
                self.devices.restore_started_at(device_id, *started_at);
            }
        }
        debug!(
            device_id,
            remaining = plan.remaining.len(),
            "booking withdrawn without device restart"
        );
    }

    /// Roll back a switch that will not commit.
    fn abandon_switch(
        &mut self,
        session_id: &SessionId,
        device_id: &str,
        new_types: &[StreamType],
        previous_phase: SessionPhase,
        prior: Option<&(Vec<StreamConfig>, SystemTime)>,
    ) {
        self.withdraw(device_id, new_types, prior);
        if let Some(session) = self.sessions.get_mut(session_id) {
            session.end_switch(previous_phase);
        }
    }
}

struct Inner<D: DeviceDriver, E: RtcEngine> {
    config: ManagerConfig,
    coordinator: DeviceStreamCoordinator<D>,
    engine: E,
    state: Mutex<ManagerState<Connection<E>>>,
    shutdown: CancellationToken,
    reaper: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

// ---------------------------------------------------------------------------
// Booking guard
// ---------------------------------------------------------------------------

/// Releases a reference booking unless it is committed.
///
/// Dropping an uncommitted booking (for example when the caller's future
/// is cancelled) spawns the release, since `Drop` cannot await.
struct Booking<D: DeviceDriver, E: RtcEngine> {
    manager: StreamManager<D, E>,
    device_id: String,
    stream_types: Vec<StreamType>,
    armed: bool,
}

impl<D: DeviceDriver, E: RtcEngine> Booking<D, E> {
    fn new(manager: &StreamManager<D, E>, device_id: &str, stream_types: &[StreamType]) -> Self {
        Self {
            manager: manager.clone(),
            device_id: device_id.to_string(),
            stream_types: stream_types.to_vec(),
            armed: true,
        }
    }

    async fn release(mut self) {
        self.armed = false;
        self.manager
            .release_references(&self.device_id, &self.stream_types)
            .await;
    }

    fn commit(mut self) {
        self.armed = false;
    }
}

impl<D: DeviceDriver, E: RtcEngine> Drop for Booking<D, E> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let manager = self.manager.clone();
        let device_id = std::mem::take(&mut self.device_id);
        let stream_types = std::mem::take(&mut self.stream_types);
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    manager.release_references(&device_id, &stream_types).await;
                });
            }
            Err(_) => warn!(%device_id, "no runtime to release abandoned booking"),
        }
    }
}

// ---------------------------------------------------------------------------
// StreamManager
// ---------------------------------------------------------------------------

/// Orchestrates viewer sessions against shared camera streams.
///
/// Cheap to clone: all clones share one state. Call [`start`](Self::start)
/// once a runtime is available and [`shutdown`](Self::shutdown) before
/// dropping the last clone.
pub struct StreamManager<D: DeviceDriver, E: RtcEngine> {
    inner: Arc<Inner<D, E>>,
}

impl<D: DeviceDriver, E: RtcEngine> Clone for StreamManager<D, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// A non-owning handle held by background tasks.
pub(crate) struct WeakStreamManager<D: DeviceDriver, E: RtcEngine>(Weak<Inner<D, E>>);

impl<D: DeviceDriver, E: RtcEngine> WeakStreamManager<D, E> {
    pub(crate) fn upgrade(&self) -> Option<StreamManager<D, E>> {
        self.0.upgrade().map(|inner| StreamManager { inner })
    }
}

impl<D: DeviceDriver, E: RtcEngine> StreamManager<D, E> {
    pub fn new(driver: Arc<D>, engine: E, config: ManagerConfig) -> Self {
        let config = config.validated();
        let state = ManagerState {
            sessions: SessionRegistry::new(config.session_config()),
            references: StreamReferenceCounter::new(),
            devices: DeviceConfigStore::new(),
            streamers: HashMap::new(),
        };
        Self {
            inner: Arc::new(Inner {
                config,
                coordinator: DeviceStreamCoordinator::new(driver),
                engine,
                state: Mutex::new(state),
                shutdown: CancellationToken::new(),
                reaper: parking_lot::Mutex::new(None),
            }),
        }
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.inner.config
    }

    pub fn driver(&self) -> &Arc<D> {
        self.inner.coordinator.driver()
    }

    // -- Lifecycle ---------------------------------------------------------

    /// Start background work. Must be called from within a tokio runtime.
    pub fn start(&self) {
        self.ensure_reaper();
    }

    /// Cancel background tasks and close every session.
    ///
    /// Returns the number of sessions closed.
    pub async fn shutdown(&self) -> usize {
        info!("stream manager shutting down");
        self.inner.shutdown.cancel();
        let reaper = self.inner.reaper.lock().take();
        if let Some(handle) = reaper {
            if let Err(e) = handle.await {
                warn!(error = %e, "reaper task ended abnormally");
            }
        }
        self.close_all_sessions().await
    }

    fn ensure_reaper(&self) {
        if self.inner.shutdown.is_cancelled() {
            return;
        }
        let mut reaper = self.inner.reaper.lock();
        if reaper.as_ref().is_some_and(|h| !h.is_finished()) {
            return;
        }
        let task = reaper::run(
            WeakStreamManager(Arc::downgrade(&self.inner)),
            self.inner.config.reaper_interval,
            self.inner.shutdown.child_token(),
        );
        *reaper = Some(tokio::spawn(task));
        debug!(interval_s = self.inner.config.reaper_interval.as_secs(), "reaper started");
    }

    // -- Session creation --------------------------------------------------

    /// Open a session for `stream_types` on `device_id`.
    ///
    /// Returns the new session id and the local offer to hand to the
    /// viewer.
    pub async fn create_offer(
        &self,
        device_id: &str,
        stream_types: &[StreamType],
    ) -> Result<(SessionId, SessionDescription), DepthcastError> {
        if stream_types.is_empty() {
            return Err(DepthcastError::InvalidArgument(
                "at least one stream type is required".into(),
            ));
        }
        if self.inner.shutdown.is_cancelled() {
            return Err(DepthcastError::Internal("stream manager is shut down".into()));
        }

        let reconfig = {
            let mut guard = self.inner.state.lock().await;
            let limit = self.inner.config.max_concurrent_sessions;
            if guard.sessions.connected_count() >= limit {
                warn!(device_id, limit, "session capacity reached");
                return Err(DepthcastError::CapacityExceeded { limit });
            }
            guard.book(device_id, stream_types)
        };
        let booking = Booking::new(self, device_id, stream_types);

        if let Err(e) = self
            .activate(device_id, reconfig, stream_types, self.inner.config.activation_retry)
            .await
        {
            warn!(device_id, stream_types = ?stream_types, error = %e, "device activation failed, releasing references");
            booking.release().await;
            return Err(e);
        }

        let session_id = SessionId::generate();
        match self.open_session(&session_id, device_id, stream_types).await {
            Ok(offer) => {
                booking.commit();
                self.ensure_reaper();
                info!(%session_id, device_id, stream_types = ?stream_types, "session created");
                Ok((session_id, offer))
            }
            Err(e) => {
                warn!(%session_id, device_id, error = %e, "session setup failed, releasing references");
                booking.release().await;
                Err(e)
            }
        }
    }

    /// Restart the device if needed, then wait for `stream_types` to show
    /// up as active.
    async fn activate(
        &self,
        device_id: &str,
        reconfig: Option<Reconfig>,
        stream_types: &[StreamType],
        retry: RetryPolicy,
    ) -> Result<(), DepthcastError> {
        if let Some(reconfig) = reconfig {
            self.inner
                .coordinator
                .apply(device_id, reconfig.previous.as_deref(), &reconfig.configs)
                .await
                .map_err(|e| DepthcastError::DeviceConfigurationFailed {
                    device_id: device_id.to_string(),
                    reason: e.to_string(),
                })?;
        }

        if self.wait_for_streams(device_id, stream_types, retry).await {
            Ok(())
        } else {
            Err(DepthcastError::StreamNotActive {
                device_id: device_id.to_string(),
                stream_types: stream_types.to_vec(),
            })
        }
    }

    async fn wait_for_streams(
        &self,
        device_id: &str,
        stream_types: &[StreamType],
        retry: RetryPolicy,
    ) -> bool {
        let driver = self.inner.coordinator.driver();
        for attempt in 1..=retry.attempts {
            match driver.stream_status(device_id) {
                Ok(status) if status.is_streaming && status.covers(stream_types) => return true,
                Ok(status) => debug!(
                    device_id,
                    attempt,
                    active = ?status.active_streams,
                    "requested streams not active yet"
                ),
                Err(e) => debug!(device_id, attempt, error = %e, "stream status unavailable"),
            }
            if attempt < retry.attempts {
                tokio::time::sleep(retry.delay).await;
            }
        }
        false
    }

    /// Build the connection, register the session and start its streamer.
    async fn open_session(
        &self,
        session_id: &SessionId,
        device_id: &str,
        stream_types: &[StreamType],
    ) -> Result<SessionDescription, DepthcastError> {
        let connection = Arc::new(
            self.inner
                .engine
                .create_connection(&self.inner.config.ice_servers)
                .await?,
        );

        let registered = match self
            .negotiate(session_id, device_id, stream_types, &connection)
            .await
        {
            Ok((tracks, data_channel, offer)) => {
                let session = Session::new(
                    session_id.clone(),
                    device_id,
                    stream_types.to_vec(),
                    Arc::clone(&connection),
                    tracks,
                    data_channel.clone(),
                );
                self.register(session, data_channel).await.map(|()| offer)
            }
            Err(e) => Err(e),
        };

        if registered.is_err() {
            if let Err(e) = connection.close().await {
                warn!(%session_id, error = %e, "failed to close abandoned connection");
            }
        }
        registered
    }

    async fn negotiate(
        &self,
        session_id: &SessionId,
        device_id: &str,
        stream_types: &[StreamType],
        connection: &Arc<Connection<E>>,
    ) -> Result<
        (
            Vec<Arc<DeviceTrack>>,
            Option<Arc<Channel<E>>>,
            SessionDescription,
        ),
        DepthcastError,
    > {
        let frames = self.frames();
        let mut tracks = Vec::with_capacity(stream_types.len());
        for &stream_type in stream_types {
            let track = Arc::new(DeviceTrack::new(device_id, stream_type, Arc::clone(&frames)));
            let source: Arc<dyn VideoSource> = track.clone();
            connection.add_track(source).await?;
            tracks.push(track);
        }

        let data_channel = if stream_types.iter().any(|t| t.source() == StreamType::Depth) {
            let label = &self.inner.config.streamer.channel_label;
            Some(Arc::new(connection.create_data_channel(label).await?))
        } else {
            None
        };

        self.watch_connection_state(session_id, connection.as_ref())?;

        let offer = connection.create_offer().await?;
        connection.set_local_description(offer.clone()).await?;
        let local = connection.local_description().unwrap_or(offer);
        Ok((tracks, data_channel, local))
    }

    /// Record engine state changes on the session. A closed transport
    /// flags the session for the reaper.
    fn watch_connection_state(
        &self,
        session_id: &SessionId,
        connection: &Connection<E>,
    ) -> Result<(), DepthcastError> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| DepthcastError::Internal(e.to_string()))?;
        let inner = Arc::downgrade(&self.inner);
        let session_id = session_id.clone();

        connection.on_connection_state_change(Box::new(move |connection_state| {
            let Some(inner) = inner.upgrade() else {
                return;
            };
            let session_id = session_id.clone();
            runtime.spawn(async move {
                debug!(%session_id, %connection_state, "connection state changed");
                let mut state = inner.state.lock().await;
                if let Some(session) = state.sessions.get_mut(&session_id) {
                    session.record_connection_state(connection_state);
                }
            });
        }));
        Ok(())
    }

    async fn register(
        &self,
        session: Session<Connection<E>>,
        data_channel: Option<Arc<Channel<E>>>,
    ) -> Result<(), DepthcastError> {
        let session_id = session.id.clone();
        let device_id = session.device_id.clone();

        let mut guard = self.inner.state.lock().await;
        let state = &mut *guard;
        state
            .sessions
            .insert(session)
            .map_err(|e| DepthcastError::Internal(e.to_string()))?;

        if let Some(channel) = data_channel {
            self.spawn_streamer(&mut state.streamers, session_id, device_id, channel);
        }
        Ok(())
    }

    fn spawn_streamer(
        &self,
        streamers: &mut HashMap<SessionId, CancellationToken>,
        session_id: SessionId,
        device_id: String,
        channel: Arc<Channel<E>>,
    ) {
        let cancel = self.inner.shutdown.child_token();
        streamers.insert(session_id.clone(), cancel.clone());
        let streamer = PointCloudStreamer::new(
            session_id,
            device_id,
            channel,
            self.frames(),
            self.inner.config.streamer.clone(),
            cancel,
        );
        tokio::spawn(streamer.run());
    }

    fn frames(&self) -> Arc<dyn FrameSource> {
        self.inner.coordinator.driver().clone()
    }

    // -- Negotiation -------------------------------------------------------

    /// The session's connection. Counts as viewer activity.
    async fn connection(&self, session_id: &SessionId) -> Result<Arc<Connection<E>>, DepthcastError> {
        let mut state = self.inner.state.lock().await;
        let session = state
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| DepthcastError::NotFound(session_id.clone()))?;
        session.touch();
        Ok(Arc::clone(&session.connection))
    }

    /// Apply the viewer's answer. The session counts as connected from
    /// here on.
    pub async fn process_answer(
        &self,
        session_id: &SessionId,
        answer: SessionDescription,
    ) -> Result<(), DepthcastError> {
        let connection = self.connection(session_id).await?;
        connection
            .set_remote_description(answer)
            .await
            .map_err(|e| DepthcastError::AnswerRejected(e.to_string()))?;

        let mut state = self.inner.state.lock().await;
        let session = state
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| DepthcastError::NotFound(session_id.clone()))?;
        session.mark_answered();
        info!(%session_id, "answer applied, session connected");
        Ok(())
    }

    pub async fn add_ice_candidate(
        &self,
        session_id: &SessionId,
        candidate: IceCandidate,
    ) -> Result<(), DepthcastError> {
        let connection = self.connection(session_id).await?;
        connection
            .add_ice_candidate(candidate)
            .await
            .map_err(|e| DepthcastError::AddCandidateFailed(e.to_string()))?;
        debug!(%session_id, "remote ICE candidate added");
        Ok(())
    }

    pub async fn local_ice_candidates(
        &self,
        session_id: &SessionId,
    ) -> Result<Vec<IceCandidate>, DepthcastError> {
        Ok(self.connection(session_id).await?.local_candidates())
    }

    // -- Stream switching --------------------------------------------------

    /// Rebind a session's tracks to `new_types`, position by position.
    ///
    /// The new types are booked and activated before the old ones are
    /// released, so the viewer never sees the device drop a stream it is
    /// still watching. `switch_timeout` bounds the whole switch up to the
    /// commit; trimming the old streams afterwards is not bounded.
    pub async fn switch_stream_types(
        &self,
        session_id: &SessionId,
        new_types: &[StreamType],
    ) -> Result<(), DepthcastError> {
        if new_types.is_empty() {
            return Err(DepthcastError::InvalidArgument(
                "at least one stream type is required".into(),
            ));
        }
        let timeout = self.inner.config.switch_timeout;
        let deadline = Instant::now() + timeout;

        let (device_id, previous_phase, reconfig) = {
            let mut guard = tokio::time::timeout_at(deadline, self.inner.state.lock())
                .await
                .map_err(|_| DepthcastError::OperationTimedOut(timeout))?;
            let state = &mut *guard;
            let session = state
                .sessions
                .get_mut(session_id)
                .ok_or_else(|| DepthcastError::NotFound(session_id.clone()))?;
            session
                .check_rebind(new_types)
                .map_err(|e| DepthcastError::InvalidArgument(e.to_string()))?;
            let previous_phase = session
                .begin_switch()
                .map_err(|e| DepthcastError::SwitchFailed(e.to_string()))?;
            let device_id = session.device_id.clone();
            let reconfig = state.book(&device_id, new_types);
            (device_id, previous_phase, reconfig)
        };
        let prior = reconfig.as_ref().and_then(Reconfig::prior);
        info!(%session_id, %device_id, stream_types = ?new_types, "switching stream types");

        let activation = tokio::time::timeout_at(
            deadline,
            self.activate(&device_id, reconfig, new_types, self.inner.config.switch_retry),
        )
        .await;
        let failure = match activation {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(DepthcastError::SwitchFailed(e.to_string())),
            Err(_) => Some(DepthcastError::OperationTimedOut(timeout)),
        };
        if let Some(err) = failure {
            let mut guard = self.inner.state.lock().await;
            guard.abandon_switch(session_id, &device_id, new_types, previous_phase, prior.as_ref());
            warn!(%session_id, error = %err, "stream switch failed, booking withdrawn");
            return Err(err);
        }

        let mut guard = match tokio::time::timeout_at(deadline, self.inner.state.lock()).await {
            Ok(guard) => guard,
            Err(_) => {
                let mut guard = self.inner.state.lock().await;
                guard.abandon_switch(session_id, &device_id, new_types, previous_phase, prior.as_ref());
                warn!(%session_id, "stream switch timed out before commit, booking withdrawn");
                return Err(DepthcastError::OperationTimedOut(timeout));
            }
        };
        let state = &mut *guard;
        let Some(session) = state.sessions.get_mut(session_id) else {
            state.withdraw(&device_id, new_types, prior.as_ref());
            return Err(DepthcastError::SwitchFailed(format!(
                "session {session_id} closed during switch"
            )));
        };
        let old_types = match session.rebind(new_types.to_vec()) {
            Ok(old_types) => old_types,
            Err(e) => {
                session.end_switch(previous_phase);
                state.withdraw(&device_id, new_types, prior.as_ref());
                return Err(DepthcastError::InvalidArgument(e.to_string()));
            }
        };
        session.end_switch(previous_phase);

        let wants_depth = new_types.iter().any(|t| t.source() == StreamType::Depth);
        if !wants_depth {
            if let Some(cancel) = state.streamers.remove(session_id) {
                cancel.cancel();
                debug!(%session_id, "no depth source left, point-cloud streamer stopped");
            }
        } else if !state.streamers.contains_key(session_id) {
            if let Some(channel) = session.data_channel.clone() {
                self.spawn_streamer(&mut state.streamers, session_id.clone(), device_id.clone(), channel);
                debug!(%session_id, "depth source added, point-cloud streamer started");
            }
        }

        let plan = state.release(&device_id, &old_types);
        drop(guard);

        if let Some(plan) = plan {
            if let Err(e) = self.inner.coordinator.remove_types(&device_id, &plan).await {
                warn!(%session_id, %device_id, error = %e, "failed to trim old streams after switch");
            }
        }
        info!(%session_id, %device_id, stream_types = ?new_types, "stream types switched");
        Ok(())
    }

    // -- Teardown ----------------------------------------------------------

    /// Close a session. Returns `false` if it does not exist.
    pub async fn close_session(&self, session_id: &SessionId) -> bool {
        self.teardown(session_id, "closed").await
    }

    /// Close every session. Returns how many were closed.
    pub async fn close_all_sessions(&self) -> usize {
        let ids = self.inner.state.lock().await.sessions.ids();
        let mut closed = 0;
        for id in &ids {
            if self.close_session(id).await {
                closed += 1;
            }
        }
        info!(closed, "closed all sessions");
        closed
    }

    /// Evict every stale session now. Returns the evicted ids.
    pub async fn reap_now(&self) -> Vec<SessionId> {
        let stale = self.inner.state.lock().await.sessions.stale(Instant::now());
        let mut evicted = Vec::with_capacity(stale.len());
        for (session_id, reason) in stale {
            if self.teardown(&session_id, reason).await {
                evicted.push(session_id);
            }
        }
        evicted
    }

    async fn teardown(&self, session_id: &SessionId, reason: impl fmt::Display) -> bool {
        let (session, plan) = {
            let mut guard = self.inner.state.lock().await;
            let state = &mut *guard;
            let Some(mut session) = state.sessions.remove(session_id) else {
                return false;
            };
            session.phase = SessionPhase::Closed;
            if let Some(cancel) = state.streamers.remove(session_id) {
                cancel.cancel();
            }
            let plan = state.release(&session.device_id, &session.stream_types);
            (session, plan)
        };

        if let Err(e) = session.connection.close().await {
            warn!(%session_id, error = %e, "failed to close connection");
        }
        if let Some(plan) = plan {
            if let Err(e) = self
                .inner
                .coordinator
                .remove_types(&session.device_id, &plan)
                .await
            {
                warn!(%session_id, device_id = %session.device_id, error = %e, "failed to release device streams");
            }
        }
        info!(%session_id, device_id = %session.device_id, %reason, "session closed");
        true
    }

    /// Release one holder of `stream_types` and trim the device.
    async fn release_references(&self, device_id: &str, stream_types: &[StreamType]) {
        let plan = self.inner.state.lock().await.release(device_id, stream_types);
        if let Some(plan) = plan {
            if let Err(e) = self.inner.coordinator.remove_types(device_id, &plan).await {
                warn!(device_id, error = %e, "failed to trim device streams");
            }
        }
    }

    // -- Introspection -----------------------------------------------------

    /// Status of one session, with statistics when the engine has them.
    pub async fn get_session(&self, session_id: &SessionId) -> Result<SessionStatus, DepthcastError> {
        let (status, connection) = {
            let state = self.inner.state.lock().await;
            let session = state
                .sessions
                .get(session_id)
                .ok_or_else(|| DepthcastError::NotFound(session_id.clone()))?;
            (session.status(None), Arc::clone(&session.connection))
        };
        let stats = match connection.stats().await {
            Ok(stats) => Some(stats),
            Err(e) => {
                debug!(%session_id, error = %e, "statistics unavailable");
                None
            }
        };
        Ok(SessionStatus { stats, ..status })
    }

    /// Status of every session whose statistics are available.
    pub async fn get_all_sessions(&self) -> Vec<SessionStatus> {
        let entries: Vec<(SessionStatus, Arc<Connection<E>>)> = {
            let state = self.inner.state.lock().await;
            state
                .sessions
                .iter()
                .map(|s| (s.status(None), Arc::clone(&s.connection)))
                .collect()
        };

        let mut statuses = Vec::with_capacity(entries.len());
        for (status, connection) in entries {
            match connection.stats().await {
                Ok(stats) => statuses.push(SessionStatus {
                    stats: Some(stats),
                    ..status
                }),
                Err(e) => {
                    debug!(session_id = %status.session_id, error = %e, "omitting session, statistics unavailable");
                }
            }
        }
        statuses.sort_by(|a, b| a.session_id.cmp(&b.session_id));
        statuses
    }

    /// Reference counts and device configurations.
    pub async fn stream_references(&self) -> StreamReferenceInfo {
        let state = self.inner.state.lock().await;
        StreamReferenceInfo {
            stream_references: state.references.snapshot(),
            device_stream_configs: state.devices.snapshot(),
        }
    }

    /// Newest point-cloud vertices for `device_id`, if the driver has any.
    pub fn point_cloud_snapshot(&self, device_id: &str) -> Option<PointCloudSnapshot> {
        let metadata = self
            .driver()
            .latest_metadata(device_id, StreamType::PointCloud)
            .ok()?;
        Some(PointCloudSnapshot {
            success: true,
            vertex_count: metadata.vertices.len(),
            timestamp: metadata.timestamp,
            frame_number: metadata.frame_number,
            vertices: metadata.vertices,
        })
    }

    /// Number of registered sessions, connected or not.
    pub async fn session_count(&self) -> usize {
        self.inner.state.lock().await.sessions.len()
    }
}
