//! Abstractions over the real-time media engine.
//!
//! depthcast does not implement ICE, DTLS, SRTP or SDP itself. It drives an
//! external engine through the traits in this module:
//!
//! - [`RtcEngine`] creates [`PeerConnection`]s configured with ICE servers.
//! - [`PeerConnection`] is one viewer's negotiated connection. Media tracks
//!   are attached as [`VideoSource`]s; point-cloud data travels over a
//!   [`DataChannel`].
//!
//! The data types ([`SessionDescription`], [`IceCandidate`], ...) are plain
//! serde structs so the signaling and HTTP layers can put them on the wire
//! unchanged.
//!
//! Trait methods return `impl Future + Send` so that generic callers can
//! move the futures into spawned tasks.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::TransportError;

// ---------------------------------------------------------------------------
// Negotiation data
// ---------------------------------------------------------------------------

/// The role of an SDP blob in offer/answer negotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    Offer,
    Answer,
    Pranswer,
    Rollback,
}

impl fmt::Display for SdpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Offer => "offer",
            Self::Answer => "answer",
            Self::Pranswer => "pranswer",
            Self::Rollback => "rollback",
        };
        f.write_str(s)
    }
}

/// An SDP session description. Serializes as `{"sdp": "...", "type": "offer"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    pub sdp: String,
    #[serde(rename = "type")]
    pub sdp_type: SdpType,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            sdp: sdp.into(),
            sdp_type: SdpType::Offer,
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            sdp: sdp.into(),
            sdp_type: SdpType::Answer,
        }
    }
}

/// A trickled ICE candidate.
///
/// Field names follow the browser's `RTCIceCandidateInit`
/// (`candidate`, `sdpMid`, `sdpMLineIndex`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(default)]
    pub sdp_mid: Option<String>,
    #[serde(default, rename = "sdpMLineIndex")]
    pub sdp_mline_index: Option<u16>,
}

/// A STUN or TURN server handed to the engine when a connection is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceServer {
    pub urls: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

impl IceServer {
    /// A credential-less STUN server.
    pub fn stun(url: impl Into<String>) -> Self {
        Self {
            urls: vec![url.into()],
            username: None,
            credential: None,
        }
    }

    /// A TURN server with long-term credentials.
    pub fn turn(
        url: impl Into<String>,
        username: impl Into<String>,
        credential: impl Into<String>,
    ) -> Self {
        Self {
            urls: vec![url.into()],
            username: Some(username.into()),
            credential: Some(credential.into()),
        }
    }
}

// ---------------------------------------------------------------------------
// Connection state and statistics
// ---------------------------------------------------------------------------

/// Peer connection state as reported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    #[default]
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl ConnectionState {
    /// `true` for states the connection never leaves.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Failed | Self::Closed)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::New => "new",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Failed => "failed",
            Self::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// Snapshot of transport statistics for one connection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectionStats {
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub packets_sent: u64,
    pub packets_received: u64,
    /// Seconds, if the engine has measured it yet.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub round_trip_time: Option<f64>,
}

// ---------------------------------------------------------------------------
// Media
// ---------------------------------------------------------------------------

/// One raw RGB24 video frame handed to the engine for encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoFrame {
    pub width: u32,
    pub height: u32,
    /// Tightly packed RGB24 pixels, `width * height * 3` bytes.
    pub data: Vec<u8>,
}

impl VideoFrame {
    /// An all-black frame of the given size.
    pub fn black(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0; width as usize * height as usize * 3],
        }
    }
}

/// A pull-based video source attached to a connection as a media track.
///
/// The engine calls [`VideoSource::next_frame`] at its own pace.
pub trait VideoSource: Send + Sync + 'static {
    /// Track label, e.g. `"color"`.
    fn label(&self) -> String;

    /// Produce the next frame. Must not fail; sources substitute a
    /// placeholder frame when nothing is available.
    fn next_frame(&self) -> VideoFrame;
}

// ---------------------------------------------------------------------------
// Engine traits
// ---------------------------------------------------------------------------

/// Callback invoked by the engine on every connection state change.
pub type StateChangeCallback = Box<dyn Fn(ConnectionState) + Send + Sync + 'static>;

/// Factory for peer connections.
pub trait RtcEngine: Send + Sync + 'static {
    type Connection: PeerConnection;

    /// Create a fresh connection using the given ICE servers.
    fn create_connection(
        &self,
        ice_servers: &[IceServer],
    ) -> impl Future<Output = Result<Self::Connection, TransportError>> + Send;
}

/// A single negotiated connection to one viewer.
pub trait PeerConnection: Send + Sync + 'static {
    type DataChannel: DataChannel;

    /// Attach an outgoing video track.
    fn add_track(
        &self,
        source: Arc<dyn VideoSource>,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Open an outgoing data channel with the given label.
    fn create_data_channel(
        &self,
        label: &str,
    ) -> impl Future<Output = Result<Self::DataChannel, TransportError>> + Send;

    fn create_offer(
        &self,
    ) -> impl Future<Output = Result<SessionDescription, TransportError>> + Send;

    fn set_local_description(
        &self,
        description: SessionDescription,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// The local description after ICE gathering, if one has been set.
    fn local_description(&self) -> Option<SessionDescription>;

    fn set_remote_description(
        &self,
        description: SessionDescription,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    fn add_ice_candidate(
        &self,
        candidate: IceCandidate,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Register the state-change callback. Replaces any earlier one.
    fn on_connection_state_change(&self, callback: StateChangeCallback);

    fn stats(&self) -> impl Future<Output = Result<ConnectionStats, TransportError>> + Send;

    /// Candidates gathered locally so far.
    fn local_candidates(&self) -> Vec<IceCandidate>;

    fn close(&self) -> impl Future<Output = Result<(), TransportError>> + Send;
}

/// An outgoing message channel on a [`PeerConnection`].
pub trait DataChannel: Send + Sync + 'static {
    fn label(&self) -> &str;

    fn is_open(&self) -> bool;

    /// Send one text message.
    fn send_text(&self, text: &str) -> impl Future<Output = Result<(), TransportError>> + Send;
}
