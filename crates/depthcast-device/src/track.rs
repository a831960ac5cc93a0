//! Media tracks backed by a device's newest frames.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use depthcast_protocol::{Resolution, StreamType};
use depthcast_transport::{VideoFrame, VideoSource};
use parking_lot::RwLock;
use tracing::debug;

use crate::FrameSource;

/// A [`VideoSource`] that pulls one device stream.
///
/// The bound stream type can be changed in place with [`rebind`], which is
/// how a session switches streams without renegotiating its tracks. A
/// `pointcloud` track previews the depth stream.
///
/// [`rebind`]: DeviceTrack::rebind
pub struct DeviceTrack {
    device_id: String,
    stream_type: RwLock<StreamType>,
    frames: Arc<dyn FrameSource>,
    frames_served: AtomicU64,
}

impl DeviceTrack {
    pub fn new(device_id: impl Into<String>, stream_type: StreamType, frames: Arc<dyn FrameSource>) -> Self {
        Self {
            device_id: device_id.into(),
            stream_type: RwLock::new(stream_type),
            frames,
            frames_served: AtomicU64::new(0),
        }
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn stream_type(&self) -> StreamType {
        *self.stream_type.read()
    }

    /// Point this track at a different stream type.
    pub fn rebind(&self, stream_type: StreamType) {
        *self.stream_type.write() = stream_type;
    }

    /// Frames handed to the engine so far, placeholders included.
    pub fn frames_served(&self) -> u64 {
        self.frames_served.load(Ordering::Relaxed)
    }
}

impl VideoSource for DeviceTrack {
    fn label(&self) -> String {
        self.stream_type().to_string()
    }

    fn next_frame(&self) -> VideoFrame {
        let stream_type = self.stream_type();
        self.frames_served.fetch_add(1, Ordering::Relaxed);
        match self.frames.latest_frame(&self.device_id, stream_type.source()) {
            Ok(frame) => frame,
            Err(e) => {
                debug!(device_id = %self.device_id, %stream_type, error = %e, "no frame, sending black frame");
                let Resolution { width, height } = Resolution::default();
                VideoFrame::black(width, height)
            }
        }
    }
}
