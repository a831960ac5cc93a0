//! # Depthcast
//!
//! Multi-viewer WebRTC streaming for depth cameras.
//!
//! Any number of viewers open sessions against a handful of camera
//! devices, each asking for its own subset of stream types. Depthcast
//! keeps the device configured for the union of all demands, restarts it
//! safely as viewers come and go, and tears sessions down when viewers
//! leave or go quiet.
//!
//! Hosts provide two collaborators: a [`DeviceDriver`] for the camera and
//! an [`RtcEngine`] for the media transport. Everything else lives here.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use depthcast::prelude::*;
//!
//! // Implement DeviceDriver and RtcEngine, then:
//! // let server = SignalingServerBuilder::new()
//! //     .bind("0.0.0.0:8080")
//! //     .build(Arc::new(my_driver), my_engine)
//! //     .await?;
//! // server.run().await
//! ```

mod config;
mod error;
mod handler;
pub mod logging;
mod manager;
mod reaper;
mod server;
pub mod streamer;

pub use config::{ManagerConfig, RetryPolicy, StreamerConfig};
pub use error::DepthcastError;
pub use manager::StreamManager;
pub use server::{SignalingServer, SignalingServerBuilder};
pub use streamer::{PointCloudStreamer, StreamerExit};

pub use depthcast_device::{DeviceDriver, FrameSource};
pub use depthcast_tick::TickPolicy;
pub use depthcast_transport::RtcEngine;

/// Everything a host needs to wire up a server.
pub mod prelude {
    pub use crate::{
        DepthcastError, ManagerConfig, RetryPolicy, SignalingServer, SignalingServerBuilder,
        StreamManager, StreamerConfig,
    };

    pub use depthcast_device::{
        DeviceDriver, DeviceError, FrameSource, PointCloudMetadata, StreamStatus,
    };
    pub use depthcast_protocol::{
        PointCloudSnapshot, SessionId, SessionStatus, SignalMessage, StreamConfig,
        StreamReferenceInfo, StreamType,
    };
    pub use depthcast_transport::{
        ConnectionState, ConnectionStats, DataChannel, IceCandidate, IceServer, PeerConnection,
        RtcEngine, SdpType, SessionDescription, StateChangeCallback, TransportError, VideoFrame,
        VideoSource,
    };
}
