//! Per-session point-cloud publisher.
//!
//! Each session with an open data channel gets one [`PointCloudStreamer`]
//! task. On every tick it pulls the device's newest vertex buffer, splits
//! it into channel-sized messages and sends them. A heartbeat goes out
//! whenever the heartbeat interval has passed, whatever the frame cadence.
//!
//! The task exits when its cancellation token fires (the session was
//! closed or reaped, or the manager is shutting down), when the channel is
//! no longer open, or when a send fails for good.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use depthcast_device::{FrameSource, PointCloudMetadata};
use depthcast_protocol::{ChannelMessage, Codec, JsonCodec, SessionId, StreamType, Vertex};
use depthcast_tick::{TickConfig, TickScheduler};
use depthcast_transport::{DataChannel, TransportError};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::StreamerConfig;

// ---------------------------------------------------------------------------
// Chunking
// ---------------------------------------------------------------------------

/// `true` if the buffer is non-empty and its first vertex is finite.
pub fn has_valid_vertices(vertices: &[Vertex]) -> bool {
    vertices
        .first()
        .is_some_and(|v| v.iter().all(|c| c.is_finite()))
}

/// Split one frame into data-channel messages.
///
/// Up to `chunk_size` vertices fit in a single `pointcloud` message.
/// Larger frames become `ceil(n / chunk_size)` `pointcloud_chunk`
/// messages that share `message_id`.
pub fn chunk_vertices(
    vertices: &[Vertex],
    chunk_size: usize,
    message_id: &str,
    timestamp: f64,
    frame_number: u64,
) -> Vec<ChannelMessage> {
    let chunk_size = chunk_size.max(1);
    if vertices.len() <= chunk_size {
        return vec![ChannelMessage::Pointcloud {
            timestamp,
            frame_number,
            vertex_count: vertices.len(),
            vertices: vertices.to_vec(),
        }];
    }

    let total_chunks = vertices.len().div_ceil(chunk_size);
    vertices
        .chunks(chunk_size)
        .enumerate()
        .map(|(chunk_index, chunk)| ChannelMessage::PointcloudChunk {
            message_id: message_id.to_string(),
            chunk_index,
            total_chunks,
            is_last_chunk: chunk_index + 1 == total_chunks,
            timestamp,
            frame_number,
            total_vertices: vertices.len(),
            vertices: chunk.to_vec(),
        })
        .collect()
}

/// [`chunk_vertices`] with a fresh message id.
pub fn frame_messages(metadata: &PointCloudMetadata, chunk_size: usize) -> Vec<ChannelMessage> {
    let message_id = uuid::Uuid::new_v4().to_string();
    chunk_vertices(
        &metadata.vertices,
        chunk_size,
        &message_id,
        metadata.timestamp,
        metadata.frame_number,
    )
}

fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Streamer task
// ---------------------------------------------------------------------------

/// Why a streamer task finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamerExit {
    Cancelled,
    ChannelClosed,
    SendFailed,
}

/// Outcome of one send with its retry.
enum Delivery {
    Sent,
    /// Still failing transiently after the retry; the frame is dropped.
    Dropped,
}

/// Publishes one device's point cloud over one session's data channel.
///
/// Messages are encoded with `K`, JSON unless swapped with
/// [`with_codec`](Self::with_codec).
pub struct PointCloudStreamer<C: DataChannel, K: Codec = JsonCodec> {
    session_id: SessionId,
    device_id: String,
    channel: Arc<C>,
    frames: Arc<dyn FrameSource>,
    config: StreamerConfig,
    codec: K,
    cancel: CancellationToken,
}

impl<C: DataChannel> PointCloudStreamer<C> {
    pub fn new(
        session_id: SessionId,
        device_id: impl Into<String>,
        channel: Arc<C>,
        frames: Arc<dyn FrameSource>,
        config: StreamerConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            session_id,
            device_id: device_id.into(),
            channel,
            frames,
            config,
            codec: JsonCodec,
            cancel,
        }
    }
}

impl<C: DataChannel, K: Codec> PointCloudStreamer<C, K> {
    pub fn with_codec<K2: Codec>(self, codec: K2) -> PointCloudStreamer<C, K2> {
        PointCloudStreamer {
            session_id: self.session_id,
            device_id: self.device_id,
            channel: self.channel,
            frames: self.frames,
            config: self.config,
            codec,
            cancel: self.cancel,
        }
    }

    /// Publish until cancelled or the channel goes away.
    pub async fn run(self) -> StreamerExit {
        let mut tick_config = TickConfig::with_rate(self.config.tick_rate_hz);
        tick_config.policy = self.config.tick_policy;
        tick_config.initial_jitter_us = tick_config.period.as_micros() as u64;
        let mut ticks = TickScheduler::new(tick_config);
        let mut last_heartbeat = Instant::now();

        debug!(session_id = %self.session_id, device_id = %self.device_id, "point cloud streamer started");

        let exit = loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break StreamerExit::Cancelled,
                _ = ticks.wait_for_tick() => {}
            }

            if !self.channel.is_open() {
                break StreamerExit::ChannelClosed;
            }

            if last_heartbeat.elapsed() >= self.config.heartbeat_interval {
                if let Err(e) = self.send_heartbeat().await {
                    warn!(session_id = %self.session_id, error = %e, "heartbeat failed, stopping streamer");
                    break StreamerExit::SendFailed;
                }
                last_heartbeat = Instant::now();
            }

            if let Err(e) = self.publish_frame().await {
                if self.cancel.is_cancelled() {
                    break StreamerExit::Cancelled;
                }
                warn!(session_id = %self.session_id, error = %e, "point cloud send failed, stopping streamer");
                break StreamerExit::SendFailed;
            }

            ticks.record_tick_end();
        };

        info!(session_id = %self.session_id, ?exit, "point cloud streamer stopped");
        exit
    }

    async fn send_heartbeat(&self) -> Result<(), TransportError> {
        let text = self
            .codec
            .encode_text(&ChannelMessage::Heartbeat { timestamp: unix_now() })
            .map_err(|e| TransportError::Engine(e.to_string()))?;
        self.channel.send_text(&text).await
    }

    /// Send the newest frame, if there is a usable one.
    async fn publish_frame(&self) -> Result<(), TransportError> {
        let metadata = match self
            .frames
            .latest_metadata(&self.device_id, StreamType::PointCloud)
        {
            Ok(metadata) => metadata,
            Err(e) => {
                trace!(session_id = %self.session_id, error = %e, "no point cloud data");
                return Ok(());
            }
        };
        if !has_valid_vertices(&metadata.vertices) {
            trace!(session_id = %self.session_id, "skipping empty or invalid point cloud");
            return Ok(());
        }

        let messages = frame_messages(&metadata, self.config.chunk_size);
        let total = messages.len();
        for (i, message) in messages.iter().enumerate() {
            let text = match self.codec.encode_text(message) {
                Ok(text) => text,
                Err(e) => {
                    warn!(session_id = %self.session_id, error = %e, "point cloud serialization failed, sending truncated frame");
                    return self.send_truncated(&metadata).await;
                }
            };
            if let Delivery::Dropped = self.send_with_retry(&text).await? {
                return Ok(());
            }
            if i + 1 < total {
                tokio::task::yield_now().await;
            }
        }

        trace!(
            session_id = %self.session_id,
            frame_number = metadata.frame_number,
            vertex_count = metadata.vertices.len(),
            messages = total,
            "point cloud frame sent"
        );
        Ok(())
    }

    async fn send_truncated(&self, metadata: &PointCloudMetadata) -> Result<(), TransportError> {
        let limit = self.config.fallback_vertex_limit.min(metadata.vertices.len());
        let message = ChannelMessage::Pointcloud {
            timestamp: metadata.timestamp,
            frame_number: metadata.frame_number,
            vertex_count: limit,
            vertices: metadata.vertices[..limit].to_vec(),
        };
        match self.codec.encode_text(&message) {
            Ok(text) => self.send_with_retry(&text).await.map(|_| ()),
            Err(e) => {
                warn!(session_id = %self.session_id, error = %e, "truncated frame also failed to serialize, skipping");
                Ok(())
            }
        }
    }

    /// Send once; on a transient error wait out the backoff and try again.
    async fn send_with_retry(&self, text: &str) -> Result<Delivery, TransportError> {
        let err = match self.channel.send_text(text).await {
            Ok(()) => return Ok(Delivery::Sent),
            Err(e) if e.is_transient() => e,
            Err(e) => return Err(e),
        };

        debug!(session_id = %self.session_id, error = %err, "transient send failure, backing off");
        tokio::select! {
            _ = self.cancel.cancelled() => return Err(TransportError::Shutdown),
            _ = tokio::time::sleep(self.config.retry_backoff) => {}
        }

        match self.channel.send_text(text).await {
            Ok(()) => Ok(Delivery::Sent),
            Err(e) if e.is_transient() => {
                warn!(session_id = %self.session_id, error = %e, "send still failing after backoff, dropping frame");
                Ok(Delivery::Dropped)
            }
            Err(e) => Err(e),
        }
    }
}
