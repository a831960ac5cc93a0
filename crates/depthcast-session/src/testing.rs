//! Inert connection and frame stand-ins for unit tests.

use std::sync::Arc;

use depthcast_device::{DeviceError, DeviceTrack, FrameSource, PointCloudMetadata};
use depthcast_protocol::{SessionId, StreamType};
use depthcast_transport::{
    ConnectionStats, DataChannel, IceCandidate, PeerConnection, SessionDescription,
    StateChangeCallback, TransportError, VideoFrame, VideoSource,
};

use crate::Session;

pub struct NullChannel;

impl DataChannel for NullChannel {
    fn label(&self) -> &str {
        "pointcloud"
    }

    fn is_open(&self) -> bool {
        false
    }

    async fn send_text(&self, _: &str) -> Result<(), TransportError> {
        Ok(())
    }
}

pub struct NullConnection;

impl PeerConnection for NullConnection {
    type DataChannel = NullChannel;

    async fn add_track(&self, _: Arc<dyn VideoSource>) -> Result<(), TransportError> {
        Ok(())
    }

    async fn create_data_channel(&self, _: &str) -> Result<NullChannel, TransportError> {
        Ok(NullChannel)
    }

    async fn create_offer(&self) -> Result<SessionDescription, TransportError> {
        Ok(SessionDescription::offer("v=0"))
    }

    async fn set_local_description(&self, _: SessionDescription) -> Result<(), TransportError> {
        Ok(())
    }

    fn local_description(&self) -> Option<SessionDescription> {
        None
    }

    async fn set_remote_description(&self, _: SessionDescription) -> Result<(), TransportError> {
        Ok(())
    }

    async fn add_ice_candidate(&self, _: IceCandidate) -> Result<(), TransportError> {
        Ok(())
    }

    fn on_connection_state_change(&self, _: StateChangeCallback) {}

    async fn stats(&self) -> Result<ConnectionStats, TransportError> {
        Ok(ConnectionStats::default())
    }

    fn local_candidates(&self) -> Vec<IceCandidate> {
        Vec::new()
    }

    async fn close(&self) -> Result<(), TransportError> {
        Ok(())
    }
}

pub struct NullFrames;

impl FrameSource for NullFrames {
    fn latest_frame(&self, device_id: &str, stream_type: StreamType) -> Result<VideoFrame, DeviceError> {
        Err(DeviceError::NoFrame {
            device_id: device_id.to_string(),
            stream_type,
        })
    }

    fn latest_metadata(&self, device_id: &str, _: StreamType) -> Result<PointCloudMetadata, DeviceError> {
        Err(DeviceError::NotStreaming(device_id.to_string()))
    }
}

/// A session on device `cam` with one track per stream type.
pub fn session(id: &str, types: &[StreamType]) -> Session<NullConnection> {
    let frames: Arc<dyn FrameSource> = Arc::new(NullFrames);
    let tracks = types
        .iter()
        .map(|&t| Arc::new(DeviceTrack::new("cam", t, Arc::clone(&frames))))
        .collect();
    Session::new(
        SessionId::from(id),
        "cam",
        types.to_vec(),
        Arc::new(NullConnection),
        tracks,
        None,
    )
}
