//! Core data types shared by every depthcast layer.
//!
//! Everything here is a plain serde type: stream types and their physical
//! configurations, session identifiers, and the read-only status views the
//! session manager hands out.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use depthcast_transport::ConnectionStats;
use serde::{Deserialize, Serialize};

use crate::ProtocolError;

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// A unique identifier for a viewer session.
///
/// A UUID v4 string generated at creation. Serializes as the bare string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Generates a fresh random session id.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// StreamType
// ---------------------------------------------------------------------------

/// One stream a camera device can produce.
///
/// `PointCloud` is synthetic: it is computed from depth frames, so holding
/// it also holds `Depth` (see [`StreamType::source`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum StreamType {
    #[serde(rename = "color")]
    Color,
    #[serde(rename = "depth")]
    Depth,
    #[serde(rename = "infrared-1")]
    Infrared1,
    #[serde(rename = "infrared-2")]
    Infrared2,
    #[serde(rename = "pointcloud")]
    PointCloud,
}

impl StreamType {
    /// Every supported stream type, in canonical order.
    pub const ALL: [StreamType; 5] = [
        Self::Color,
        Self::Depth,
        Self::Infrared1,
        Self::Infrared2,
        Self::PointCloud,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Color => "color",
            Self::Depth => "depth",
            Self::Infrared1 => "infrared-1",
            Self::Infrared2 => "infrared-2",
            Self::PointCloud => "pointcloud",
        }
    }

    pub fn is_point_cloud(self) -> bool {
        self == Self::PointCloud
    }

    /// The physical stream that feeds this type: `Depth` for `PointCloud`,
    /// itself for everything else.
    pub fn source(self) -> StreamType {
        match self {
            Self::PointCloud => Self::Depth,
            other => other,
        }
    }

    /// Pixel format the device is configured with for this type.
    pub fn format(self) -> StreamFormat {
        match self {
            Self::Depth | Self::PointCloud => StreamFormat::Z16,
            Self::Infrared1 | Self::Infrared2 => StreamFormat::Y8,
            Self::Color => StreamFormat::Rgb8,
        }
    }
}

impl fmt::Display for StreamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StreamType {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| ProtocolError::UnknownStreamType(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// StreamConfig
// ---------------------------------------------------------------------------

/// Wire format of a physical stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamFormat {
    Z16,
    Y8,
    Rgb8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Default for Resolution {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
        }
    }
}

/// Physical configuration for one stream on one device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamConfig {
    pub sensor_id: String,
    pub stream_type: StreamType,
    pub format: StreamFormat,
    pub resolution: Resolution,
    pub framerate: u32,
}

impl StreamConfig {
    /// Frame rate every stream is configured with.
    pub const DEFAULT_FRAMERATE: u32 = 30;

    /// The deterministic configuration for `stream_type` on `device_id`.
    pub fn for_type(device_id: &str, stream_type: StreamType) -> Self {
        Self {
            sensor_id: format!("{device_id}-sensor-0"),
            stream_type,
            format: stream_type.format(),
            resolution: Resolution::default(),
            framerate: Self::DEFAULT_FRAMERATE,
        }
    }

    /// `false` for configs that exist only in bookkeeping (`pointcloud`).
    pub fn is_physical(&self) -> bool {
        !self.stream_type.is_point_cloud()
    }
}

// ---------------------------------------------------------------------------
// Status views
// ---------------------------------------------------------------------------

/// Read-only view of one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionStatus {
    pub session_id: SessionId,
    pub device_id: String,
    pub connected: bool,
    /// Mirrors `connected`: an answered session is streaming.
    pub streaming: bool,
    pub stream_types: Vec<StreamType>,
    pub stats: Option<ConnectionStats>,
}

/// The physical configuration currently applied to one device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceStreamConfig {
    pub configs: Vec<StreamConfig>,
    /// Seconds since the Unix epoch when the configuration was applied.
    pub started_at: f64,
}

/// Debug snapshot of reference counts and applied device configurations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamReferenceInfo {
    pub stream_references: BTreeMap<String, BTreeMap<StreamType, usize>>,
    pub device_stream_configs: BTreeMap<String, DeviceStreamConfig>,
}
