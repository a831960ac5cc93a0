//! Integration tests for the coordinator and device tracks against a
//! mock driver.

use std::collections::HashMap;
use std::sync::Arc;

use depthcast_device::{
    DeviceConfigStore, DeviceDriver, DeviceError, DeviceStreamCoordinator, DeviceTrack,
    FrameSource, PointCloudMetadata, StreamReferenceCounter, StreamStatus,
};
use depthcast_protocol::{StreamConfig, StreamType};
use depthcast_transport::{VideoFrame, VideoSource};
use parking_lot::Mutex;

// =========================================================================
// Mock driver
// =========================================================================

#[derive(Debug, Clone, PartialEq)]
enum Call {
    Start(String, Vec<StreamType>),
    Stop(String),
    PointCloud(String, bool),
}

#[derive(Default)]
struct MockState {
    calls: Vec<Call>,
    active: HashMap<String, Vec<StreamType>>,
    /// Number of upcoming `start_stream` calls that fail.
    failing_starts: usize,
    frames: HashMap<(String, StreamType), VideoFrame>,
}

#[derive(Default)]
struct MockDriver {
    state: Mutex<MockState>,
}

impl MockDriver {
    fn calls(&self) -> Vec<Call> {
        self.state.lock().calls.clone()
    }

    fn fail_next_starts(&self, n: usize) {
        self.state.lock().failing_starts = n;
    }

    fn put_frame(&self, device: &str, stream_type: StreamType, frame: VideoFrame) {
        self.state
            .lock()
            .frames
            .insert((device.to_string(), stream_type), frame);
    }
}

impl FrameSource for MockDriver {
    fn latest_frame(&self, device_id: &str, stream_type: StreamType) -> Result<VideoFrame, DeviceError> {
        self.state
            .lock()
            .frames
            .get(&(device_id.to_string(), stream_type))
            .cloned()
            .ok_or(DeviceError::NoFrame {
                device_id: device_id.to_string(),
                stream_type,
            })
    }

    fn latest_metadata(&self, device_id: &str, _: StreamType) -> Result<PointCloudMetadata, DeviceError> {
        Err(DeviceError::NotStreaming(device_id.to_string()))
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
// Helpers
// =========================================================================

fn setup() -> (Arc<MockDriver>, DeviceStreamCoordinator<MockDriver>) {
    let driver = Arc::new(MockDriver::default());
    let coordinator = DeviceStreamCoordinator::new(Arc::clone(&driver));
    (driver, coordinator)
}

fn configs(types: &[StreamType]) -> Vec<StreamConfig> {
    types.iter().map(|&t| StreamConfig::for_type("cam", t)).collect()
}

fn start(types: &[StreamType]) -> Call {
    Call::Start("cam".into(), types.to_vec())
}

// =========================================================================
// apply
// =========================================================================

#[tokio::test]
async fn test_apply_first_configuration_starts_without_stop() {
    let (driver, coordinator) = setup();

    coordinator
        .apply("cam", None, &configs(&[StreamType::Color]))
        .await
        .unwrap();

    assert_eq!(driver.calls(), vec![start(&[StreamType::Color])]);
    assert!(driver.stream_status("cam").unwrap().covers(&[StreamType::Color]));
}

#[tokio::test]
async fn test_apply_reconfigure_stops_then_starts() {
    let (driver, coordinator) = setup();
    let previous = configs(&[StreamType::Color]);

    coordinator
        .apply("cam", Some(&previous), &configs(&[StreamType::Color, StreamType::Depth]))
        .await
        .unwrap();

    assert_eq!(
        driver.calls(),
        vec![
            Call::Stop("cam".into()),
            start(&[StreamType::Color, StreamType::Depth]),
        ]
    );
}

#[tokio::test]
async fn test_apply_point_cloud_is_not_physical_and_enables_computation() {
    let (driver, coordinator) = setup();

    coordinator
        .apply("cam", None, &configs(&[StreamType::PointCloud, StreamType::Depth]))
        .await
        .unwrap();

    assert_eq!(
        driver.calls(),
        vec![
            start(&[StreamType::Depth]),
            Call::PointCloud("cam".into(), true),
        ]
    );
}

#[tokio::test]
async fn test_apply_point_cloud_unchanged_does_not_toggle() {
    let (driver, coordinator) = setup();
    let previous = configs(&[StreamType::PointCloud, StreamType::Depth]);

    coordinator
        .apply(
            "cam",
            Some(&previous),
            &configs(&[StreamType::PointCloud, StreamType::Depth, StreamType::Color]),
        )
        .await
        .unwrap();

    assert!(!driver
        .calls()
        .iter()
        .any(|c| matches!(c, Call::PointCloud(..))));
}

#[tokio::test]
async fn test_apply_point_cloud_join_on_running_depth_skips_restart() {
    let (driver, coordinator) = setup();
    let previous = configs(&[StreamType::Depth]);

    coordinator
        .apply(
            "cam",
            Some(&previous),
            &configs(&[StreamType::Depth, StreamType::PointCloud]),
        )
        .await
        .unwrap();

    assert_eq!(driver.calls(), vec![Call::PointCloud("cam".into(), true)]);
}

#[tokio::test]
async fn test_apply_start_failure_is_start_failed() {
    let (driver, coordinator) = setup();
    driver.fail_next_starts(1);

    let err = coordinator
        .apply("cam", None, &configs(&[StreamType::Color]))
        .await
        .unwrap_err();

    assert!(matches!(err, DeviceError::StartFailed { ref device_id, .. } if device_id == "cam"));
    assert!(err.to_string().contains("usb reset"));
}

// =========================================================================
// remove_types
// =========================================================================

#[tokio::test]
async fn test_remove_types_partial_restarts_with_remaining() {
    let (driver, coordinator) = setup();
    let mut store = DeviceConfigStore::new();
    store.commit("cam", configs(&[StreamType::Color, StreamType::Depth]));

    let plan = store.removal_plan("cam", &[StreamType::Color]).unwrap();
    coordinator.remove_types("cam", &plan).await.unwrap();

    assert_eq!(
        driver.calls(),
        vec![Call::Stop("cam".into()), start(&[StreamType::Depth])]
    );
}

#[tokio::test]
async fn test_remove_types_everything_stops_and_disables_point_cloud() {
    let (driver, coordinator) = setup();
    let mut store = DeviceConfigStore::new();
    store.commit("cam", configs(&[StreamType::PointCloud, StreamType::Depth]));

    let plan = store
        .removal_plan("cam", &[StreamType::PointCloud, StreamType::Depth])
        .unwrap();
    coordinator.remove_types("cam", &plan).await.unwrap();

    assert_eq!(
        driver.calls(),
        vec![Call::PointCloud("cam".into(), false), Call::Stop("cam".into())]
    );
}

#[tokio::test]
async fn test_remove_types_point_cloud_leave_skips_restart() {
    let (driver, coordinator) = setup();
    let mut store = DeviceConfigStore::new();
    store.commit("cam", configs(&[StreamType::PointCloud, StreamType::Depth]));

    let plan = store.removal_plan("cam", &[StreamType::PointCloud]).unwrap();
    coordinator.remove_types("cam", &plan).await.unwrap();

    assert_eq!(driver.calls(), vec![Call::PointCloud("cam".into(), false)]);
}

#[tokio::test]
async fn test_remove_types_restart_failure_restores_previous_once() {
    let (driver, coordinator) = setup();
    let mut store = DeviceConfigStore::new();
    store.commit("cam", configs(&[StreamType::Color, StreamType::Depth]));
    driver.fail_next_starts(1);

    let plan = store.removal_plan("cam", &[StreamType::Color]).unwrap();
    let result = coordinator.remove_types("cam", &plan).await;

    assert!(result.is_err());
    let starts: Vec<Call> = driver
        .calls()
        .into_iter()
        .filter(|c| matches!(c, Call::Start(..)))
        .collect();
    assert_eq!(
        starts,
        vec![
            start(&[StreamType::Depth]),
            start(&[StreamType::Color, StreamType::Depth]),
        ]
    );
    assert!(driver
        .stream_status("cam")
        .unwrap()
        .covers(&[StreamType::Color, StreamType::Depth]));
}

// =========================================================================
// Counter + store + coordinator together
// =========================================================================

#[tokio::test]
async fn test_two_viewers_share_then_release_device() {
    let (driver, coordinator) = setup();
    let mut refs = StreamReferenceCounter::new();
    let mut store = DeviceConfigStore::new();

    // Viewer A: color.
    let outcome = refs.ensure("cam", &[StreamType::Color]);
    assert!(outcome.needs_reconfig);
    let merged = store.merged_with("cam", &outcome.new_configs);
    coordinator.apply("cam", None, &merged).await.unwrap();
    store.commit("cam", merged);

    // Viewer B: pointcloud (books depth too).
    let outcome = refs.ensure("cam", &[StreamType::PointCloud]);
    let previous = store.configs("cam").map(<[StreamConfig]>::to_vec);
    let merged = store.merged_with("cam", &outcome.new_configs);
    coordinator
        .apply("cam", previous.as_deref(), &merged)
        .await
        .unwrap();
    store.commit("cam", merged);
    assert!(driver
        .stream_status("cam")
        .unwrap()
        .covers(&[StreamType::Color, StreamType::PointCloud]));

    // A leaves: color is trimmed, depth keeps streaming.
    let removed = refs.release("cam", &[StreamType::Color]);
    let plan = store.removal_plan("cam", &removed).unwrap();
    coordinator.remove_types("cam", &plan).await.unwrap();
    store.commit("cam", plan.remaining);
    assert_eq!(
        driver.stream_status("cam").unwrap().active_streams,
        vec![StreamType::Depth]
    );

    // B leaves: device stops.
    let removed = refs.release("cam", &[StreamType::PointCloud]);
    let plan = store.removal_plan("cam", &removed).unwrap();
    assert!(plan.stops_device());
    coordinator.remove_types("cam", &plan).await.unwrap();
    store.commit("cam", plan.remaining);
    assert!(store.configs("cam").is_none());
    assert!(!driver.stream_status("cam").unwrap().is_streaming);
    assert!(refs.snapshot().is_empty());
}

// =========================================================================
// DeviceTrack
// =========================================================================

#[test]
fn test_device_track_serves_driver_frame() {
    let driver = Arc::new(MockDriver::default());
    let frame = VideoFrame {
        width: 2,
        height: 1,
        data: vec![255; 6],
    };
    driver.put_frame("cam", StreamType::Color, frame.clone());

    let track = DeviceTrack::new("cam", StreamType::Color, driver);
    assert_eq!(track.next_frame(), frame);
    assert_eq!(track.frames_served(), 1);
}

#[test]
fn test_device_track_missing_frame_is_black_placeholder() {
    let driver = Arc::new(MockDriver::default());
    let track = DeviceTrack::new("cam", StreamType::Infrared1, driver);

    let frame = track.next_frame();
    assert_eq!((frame.width, frame.height), (640, 480));
    assert!(frame.data.iter().all(|&b| b == 0));
}

#[test]
fn test_device_track_point_cloud_previews_depth() {
    let driver = Arc::new(MockDriver::default());
    let depth = VideoFrame {
        width: 1,
        height: 1,
        data: vec![7, 7, 7],
    };
    driver.put_frame("cam", StreamType::Depth, depth.clone());

    let track = DeviceTrack::new("cam", StreamType::PointCloud, driver);
    assert_eq!(track.label(), "pointcloud");
    assert_eq!(track.next_frame(), depth);
}

#[test]
fn test_device_track_rebind_changes_source_and_label() {
    let driver = Arc::new(MockDriver::default());
    let depth = VideoFrame::black(1, 1);
    driver.put_frame("cam", StreamType::Depth, depth.clone());

    let track = DeviceTrack::new("cam", StreamType::Color, driver);
    track.rebind(StreamType::Depth);

    assert_eq!(track.stream_type(), StreamType::Depth);
    assert_eq!(track.label(), "depth");
    assert_eq!(track.next_frame(), depth);
}
