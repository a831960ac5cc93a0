//! In-memory device driver and RTC engine shared by the integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use depthcast::prelude::*;
use parking_lot::Mutex;

// =========================================================================
// MockDriver
// =========================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Start(String, Vec<StreamType>),
    Stop(String),
    PointCloud(String, bool),
}

#[derive(Default)]
struct DriverState {
    calls: Vec<Call>,
    active: HashMap<String, Vec<StreamType>>,
    /// Number of upcoming `start_stream` calls that fail.
    failing_starts: usize,
    /// Report every device as not streaming.
    stalled: bool,
    metadata: HashMap<String, PointCloudMetadata>,
}

#[derive(Default)]
pub struct MockDriver {
    state: Mutex<DriverState>,
}

impl MockDriver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().calls.clone()
    }

    pub fn start_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::Start(..)))
            .count()
    }

    pub fn fail_next_starts(&self, n: usize) {
        self.state.lock().failing_starts = n;
    }

    pub fn set_stalled(&self, stalled: bool) {
        self.state.lock().stalled = stalled;
    }

    pub fn active(&self, device_id: &str) -> Vec<StreamType> {
        self.state
            .lock()
            .active
            .get(device_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn put_metadata(&self, device_id: &str, metadata: PointCloudMetadata) {
        self.state
            .lock()
            .metadata
            .insert(device_id.to_string(), metadata);
    }
}

impl FrameSource for MockDriver {
    fn latest_frame(&self, device_id: &str, stream_type: StreamType) -> Result<VideoFrame, DeviceError> {
        if self.active(device_id).contains(&stream_type) {
            Ok(VideoFrame::black(2, 2))
        } else {
            Err(DeviceError::NoFrame {
                device_id: device_id.to_string(),
                stream_type,
            })
        }
    }

    fn latest_metadata(&self, device_id: &str, _: StreamType) -> Result<PointCloudMetadata, DeviceError> {
        self.state
            .lock()
            .metadata
            .get(device_id)
            .cloned()
            .ok_or_else(|| DeviceError::NotStreaming(device_id.to_string()))
    }
}

impl DeviceDriver for MockDriver {
    async fn start_stream(&self, device_id: &str, configs: &[StreamConfig]) -> Result<(), DeviceError> {
        let mut state = self.state.lock();
        let types: Vec<StreamType> = configs.iter().map(|c| c.stream_type).collect();
        state.calls.push(Call::Start(device_id.to_string(), types.clone()));
        if state.failing_starts > 0 {
            state.failing_starts -= 1;
            return Err(DeviceError::Driver("usb reset".into()));
        }
        state.active.insert(device_id.to_string(), types);
        Ok(())
    }

    async fn stop_stream(&self, device_id: &str) -> Result<(), DeviceError> {
        let mut state = self.state.lock();
        state.calls.push(Call::Stop(device_id.to_string()));
        state.active.remove(device_id);
        Ok(())
    }

    fn stream_status(&self, device_id: &str) -> Result<StreamStatus, DeviceError> {
        let state = self.state.lock();
        if state.stalled {
            return Ok(StreamStatus::default());
        }
        let active = state.active.get(device_id).cloned().unwrap_or_default();
        Ok(StreamStatus {
            is_streaming: !active.is_empty(),
            active_streams: active,
        })
    }

    fn activate_point_cloud(&self, device_id: &str, enabled: bool) -> Result<(), DeviceError> {
        self.state
            .lock()
            .calls
            .push(Call::PointCloud(device_id.to_string(), enabled));
        Ok(())
    }
}

// =========================================================================
// MockChannel
// =========================================================================

#[derive(Debug, Clone, Copy)]
pub enum SendFailure {
    /// Congestion: worth retrying.
    Transient,
    /// The channel is gone.
    Fatal,
}

struct ChannelState {
    label: String,
    open: AtomicBool,
    sent: Mutex<Vec<String>>,
    failures: Mutex<VecDeque<SendFailure>>,
}

#[derive(Clone)]
pub struct MockChannel {
    inner: Arc<ChannelState>,
}

impl MockChannel {
    pub fn new(label: &str) -> Self {
        Self {
            inner: Arc::new(ChannelState {
                label: label.to_string(),
                open: AtomicBool::new(true),
                sent: Mutex::new(Vec::new()),
                failures: Mutex::new(VecDeque::new()),
            }),
        }
    }

    pub fn set_open(&self, open: bool) {
        self.inner.open.store(open, Ordering::SeqCst);
    }

    /// Fail the next sends, in order.
    pub fn fail_sends(&self, failures: &[SendFailure]) {
        self.inner.failures.lock().extend(failures.iter().copied());
    }

    pub fn sent(&self) -> Vec<serde_json::Value> {
        self.inner
            .sent
            .lock()
            .iter()
            .map(|text| serde_json::from_str(text).expect("sent text is JSON"))
            .collect()
    }

    pub fn sent_of_type(&self, kind: &str) -> Vec<serde_json::Value> {
        self.sent()
            .into_iter()
            .filter(|m| m["type"] == kind)
            .collect()
    }
}

impl DataChannel for MockChannel {
    fn label(&self) -> &str {
        &self.inner.label
    }

    fn is_open(&self) -> bool {
        self.inner.open.load(Ordering::SeqCst)
    }

    async fn send_text(&self, text: &str) -> Result<(), TransportError> {
        match self.inner.failures.lock().pop_front() {
            Some(SendFailure::Transient) => Err(TransportError::SendFailed(std::io::Error::other(
                "buffer full",
            ))),
            Some(SendFailure::Fatal) => Err(TransportError::ChannelNotOpen(self.inner.label.clone())),
            None => {
                self.inner.sent.lock().push(text.to_string());
                Ok(())
            }
        }
    }
}

// =========================================================================
// MockConnection / MockEngine
// =========================================================================

#[derive(Default)]
struct ConnectionInner {
    tracks: Vec<Arc<dyn VideoSource>>,
    channel: Option<MockChannel>,
    local: Option<SessionDescription>,
    remote: Option<SessionDescription>,
    remote_candidates: Vec<IceCandidate>,
    callback: Option<StateChangeCallback>,
    ice_servers: Vec<IceServer>,
}

#[derive(Default)]
struct ConnectionShared {
    state: Mutex<ConnectionInner>,
    closed: AtomicBool,
    reject_answers: AtomicBool,
    stats_unavailable: AtomicBool,
}

#[derive(Clone, Default)]
pub struct MockConnection {
    inner: Arc<ConnectionShared>,
}

impl MockConnection {
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    pub fn track_labels(&self) -> Vec<String> {
        self.inner.state.lock().tracks.iter().map(|t| t.label()).collect()
    }

    pub fn channel(&self) -> Option<MockChannel> {
        self.inner.state.lock().channel.clone()
    }

    pub fn remote_description(&self) -> Option<SessionDescription> {
        self.inner.state.lock().remote.clone()
    }

    pub fn remote_candidates(&self) -> Vec<IceCandidate> {
        self.inner.state.lock().remote_candidates.clone()
    }

    pub fn ice_servers(&self) -> Vec<IceServer> {
        self.inner.state.lock().ice_servers.clone()
    }

    pub fn reject_answers(&self) {
        self.inner.reject_answers.store(true, Ordering::SeqCst);
    }

    pub fn make_stats_unavailable(&self) {
        self.inner.stats_unavailable.store(true, Ordering::SeqCst);
    }

    /// Invoke the registered state-change callback, as the engine would.
    pub fn fire_state(&self, state: ConnectionState) {
        if let Some(callback) = self.inner.state.lock().callback.as_ref() {
            callback(state);
        }
    }
}

impl PeerConnection for MockConnection {
    type DataChannel = MockChannel;

    async fn add_track(&self, source: Arc<dyn VideoSource>) -> Result<(), TransportError> {
        self.inner.state.lock().tracks.push(source);
        Ok(())
    }

    async fn create_data_channel(&self, label: &str) -> Result<MockChannel, TransportError> {
        let channel = MockChannel::new(label);
        self.inner.state.lock().channel = Some(channel.clone());
        Ok(channel)
    }

    async fn create_offer(&self) -> Result<SessionDescription, TransportError> {
        Ok(SessionDescription::offer("v=0\r\ns=mock-offer\r\n"))
    }

    async fn set_local_description(&self, description: SessionDescription) -> Result<(), TransportError> {
        self.inner.state.lock().local = Some(description);
        Ok(())
    }

    fn local_description(&self) -> Option<SessionDescription> {
        self.inner.state.lock().local.clone()
    }

    async fn set_remote_description(&self, description: SessionDescription) -> Result<(), TransportError> {
        if self.inner.reject_answers.load(Ordering::SeqCst) {
            return Err(TransportError::Negotiation("malformed sdp".into()));
        }
        self.inner.state.lock().remote = Some(description);
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), TransportError> {
        self.inner.state.lock().remote_candidates.push(candidate);
        Ok(())
    }

    fn on_connection_state_change(&self, callback: StateChangeCallback) {
        self.inner.state.lock().callback = Some(callback);
    }

    async fn stats(&self) -> Result<ConnectionStats, TransportError> {
        if self.inner.stats_unavailable.load(Ordering::SeqCst) {
            return Err(TransportError::Engine("stats unavailable".into()));
        }
        Ok(ConnectionStats {
            bytes_sent: 1024,
            ..ConnectionStats::default()
        })
    }

    fn local_candidates(&self) -> Vec<IceCandidate> {
        vec![IceCandidate {
            candidate: "candidate:1 1 udp 2130706431 127.0.0.1 50000 typ host".into(),
            sdp_mid: Some("0".into()),
            sdp_mline_index: Some(0),
        }]
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.inner.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
struct EngineShared {
    connections: Mutex<Vec<MockConnection>>,
    fail_next: AtomicBool,
}

#[derive(Clone, Default)]
pub struct MockEngine {
    inner: Arc<EngineShared>,
}

impl MockEngine {
    /// Every connection created so far, oldest first.
    pub fn connections(&self) -> Vec<MockConnection> {
        self.inner.connections.lock().clone()
    }

    pub fn last_connection(&self) -> MockConnection {
        self.connections().pop().expect("a connection was created")
    }

    pub fn fail_next_connection(&self) {
        self.inner.fail_next.store(true, Ordering::SeqCst);
    }
}

impl RtcEngine for MockEngine {
    type Connection = MockConnection;

    async fn create_connection(&self, ice_servers: &[IceServer]) -> Result<MockConnection, TransportError> {
        if self.inner.fail_next.swap(false, Ordering::SeqCst) {
            return Err(TransportError::Engine("no ICE agent".into()));
        }
        let connection = MockConnection::default();
        connection.inner.state.lock().ice_servers = ice_servers.to_vec();
        self.inner.connections.lock().push(connection.clone());
        Ok(connection)
    }
}

// =========================================================================
// Helpers
// =========================================================================

/// A config with fast polling, so tests spend little (virtual) time.
pub fn fast_config() -> ManagerConfig {
    ManagerConfig {
        activation_retry: RetryPolicy::new(5, std::time::Duration::from_millis(10)),
        switch_retry: RetryPolicy::new(5, std::time::Duration::from_millis(10)),
        ..ManagerConfig::default()
    }
}

pub type TestManager = StreamManager<MockDriver, MockEngine>;

pub fn manager_with(config: ManagerConfig) -> (TestManager, Arc<MockDriver>, MockEngine) {
    depthcast::logging::init_tracing();
    let driver = MockDriver::new();
    let engine = MockEngine::default();
    let manager = StreamManager::new(Arc::clone(&driver), engine.clone(), config);
    (manager, driver, engine)
}

pub fn manager() -> (TestManager, Arc<MockDriver>, MockEngine) {
    manager_with(fast_config())
}

pub fn vertices(n: usize) -> Vec<[f32; 3]> {
    (0..n).map(|i| [i as f32 * 0.001, 0.0, 1.0]).collect()
}
