//! Error types for the device layer.

use depthcast_protocol::StreamType;

/// Errors reported by a [`crate::DeviceDriver`] or while reconfiguring a
/// device through the coordinator.
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    /// The driver does not know this device.
    #[error("device {0} not found")]
    NotFound(String),

    /// The device is not streaming.
    #[error("device {0} is not streaming")]
    NotStreaming(String),

    /// No frame of the requested type has been captured yet.
    #[error("no {stream_type} frame available from device {device_id}")]
    NoFrame {
        device_id: String,
        stream_type: StreamType,
    },

    /// Starting or restarting the device stream failed.
    #[error("failed to start device stream for {device_id}: {reason}")]
    StartFailed { device_id: String, reason: String },

    /// Stopping the device stream failed.
    #[error("failed to stop device stream for {device_id}: {reason}")]
    StopFailed { device_id: String, reason: String },

    /// Any other driver-specific failure.
    #[error("driver error: {0}")]
    Driver(String),
}
