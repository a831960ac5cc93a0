//! The camera driver interface depthcast consumes.
//!
//! depthcast never talks to hardware directly. Frame capture and
//! point-cloud computation live behind [`DeviceDriver`]; the split into
//! [`FrameSource`] lets media tracks hold the read side as a trait object.

use std::future::Future;

use depthcast_protocol::{StreamConfig, StreamType, Vertex};
use depthcast_transport::VideoFrame;

use crate::DeviceError;

/// What the driver reports about a device's stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamStatus {
    pub is_streaming: bool,
    pub active_streams: Vec<StreamType>,
}

impl StreamStatus {
    /// `true` when the device is streaming every requested type.
    /// `pointcloud` is satisfied by an active `depth` stream.
    pub fn covers(&self, requested: &[StreamType]) -> bool {
        self.is_streaming
            && requested
                .iter()
                .all(|t| self.active_streams.contains(&t.source()))
    }
}

/// Newest point-cloud data computed by the driver.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PointCloudMetadata {
    pub vertices: Vec<Vertex>,
    /// Capture time, seconds since the Unix epoch.
    pub timestamp: f64,
    pub frame_number: u64,
}

/// Read access to the newest captured data.
pub trait FrameSource: Send + Sync + 'static {
    /// Newest frame of `stream_type`, converted to RGB24.
    fn latest_frame(&self, device_id: &str, stream_type: StreamType)
    -> Result<VideoFrame, DeviceError>;

    /// Newest metadata for `stream_type` (vertices for `pointcloud`).
    fn latest_metadata(
        &self,
        device_id: &str,
        stream_type: StreamType,
    ) -> Result<PointCloudMetadata, DeviceError>;
}

/// Full control over camera devices.
pub trait DeviceDriver: FrameSource {
    /// Start streaming the given physical configurations.
    fn start_stream(
        &self,
        device_id: &str,
        configs: &[StreamConfig],
    ) -> impl Future<Output = Result<(), DeviceError>> + Send;

    fn stop_stream(&self, device_id: &str) -> impl Future<Output = Result<(), DeviceError>> + Send;

    fn stream_status(&self, device_id: &str) -> Result<StreamStatus, DeviceError>;

    /// Turn point-cloud computation on or off.
    fn activate_point_cloud(&self, device_id: &str, enabled: bool) -> Result<(), DeviceError>;
}
