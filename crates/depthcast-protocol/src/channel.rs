//! Messages published to viewers over the point-cloud data channel.
//!
//! Small frames go out as a single [`ChannelMessage::Pointcloud`]. Frames
//! above the chunk size are split into [`ChannelMessage::PointcloudChunk`]
//! messages sharing one `message_id`; the viewer reassembles them by
//! `chunk_index` until it sees `is_last_chunk`.

use serde::{Deserialize, Serialize};

/// One point-cloud vertex: `[x, y, z]` in meters.
pub type Vertex = [f32; 3];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChannelMessage {
    /// A complete frame.
    Pointcloud {
        timestamp: f64,
        frame_number: u64,
        vertex_count: usize,
        vertices: Vec<Vertex>,
    },

    /// One slice of a frame too large for a single message.
    PointcloudChunk {
        message_id: String,
        chunk_index: usize,
        total_chunks: usize,
        is_last_chunk: bool,
        timestamp: f64,
        frame_number: u64,
        /// Vertices in the whole frame, not in this chunk.
        total_vertices: usize,
        vertices: Vec<Vertex>,
    },

    /// Keep-alive so viewers can tell an idle channel from a dead one.
    Heartbeat { timestamp: f64 },
}

/// Latest point-cloud data for a device, as served to debug clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointCloudSnapshot {
    pub success: bool,
    pub vertex_count: usize,
    pub timestamp: f64,
    pub frame_number: u64,
    pub vertices: Vec<Vertex>,
}
