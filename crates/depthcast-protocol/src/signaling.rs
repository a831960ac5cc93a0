//! Signaling events exchanged with a relay over WebSocket.
//!
//! A relay forwards viewer requests to depthcast and viewer-bound replies
//! back. Every frame is one JSON object tagged by `type`:
//!
//! ```text
//! relay → depthcast  create-session, webrtc-answer, ice-candidate,
//!                    switch-stream-type, session-closed, list-sessions,
//!                    stream-references
//! depthcast → relay  webrtc-offer, stream-type-switched,
//!                    stream-type-switch-error, session-list,
//!                    stream-reference-info, session-error
//! ```
//!
//! `sessionId` in these messages is the relay's own identifier for the
//! viewer, not the depthcast session id.

use std::collections::BTreeMap;

use depthcast_transport::{IceCandidate, SessionDescription};
use serde::{Deserialize, Serialize};

use crate::types::{DeviceStreamConfig, SessionStatus, StreamType};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum SignalMessage {
    // -- Relay → depthcast --
    /// Open a session for `device_id` streaming `stream_types`.
    #[serde(rename_all = "camelCase")]
    CreateSession {
        session_id: String,
        device_id: String,
        stream_types: Vec<StreamType>,
    },

    /// The viewer's SDP answer.
    #[serde(rename_all = "camelCase")]
    WebrtcAnswer {
        session_id: String,
        answer: SessionDescription,
    },

    /// A trickled ICE candidate from the viewer.
    #[serde(rename_all = "camelCase")]
    IceCandidate {
        session_id: String,
        candidate: IceCandidate,
    },

    /// Change which streams an existing session's tracks carry.
    #[serde(rename_all = "camelCase")]
    SwitchStreamType {
        session_id: String,
        stream_types: Vec<StreamType>,
    },

    /// The viewer went away.
    #[serde(rename_all = "camelCase")]
    SessionClosed { session_id: String },

    ListSessions,

    StreamReferences,

    // -- depthcast → relay --
    #[serde(rename_all = "camelCase")]
    WebrtcOffer {
        session_id: String,
        offer: SessionDescription,
    },

    #[serde(rename_all = "camelCase")]
    StreamTypeSwitched {
        session_id: String,
        stream_types: Vec<StreamType>,
    },

    #[serde(rename_all = "camelCase")]
    StreamTypeSwitchError {
        session_id: String,
        code: u16,
        error: String,
    },

    SessionList { sessions: Vec<SessionStatus> },

    StreamReferenceInfo {
        stream_references: BTreeMap<String, BTreeMap<StreamType, usize>>,
        device_stream_configs: BTreeMap<String, DeviceStreamConfig>,
    },

    /// Any request that failed. `code` uses HTTP status conventions.
    #[serde(rename_all = "camelCase")]
    SessionError {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_id: Option<String>,
        code: u16,
        error: String,
    },
}

impl SignalMessage {
    /// The relay session id carried by this message, if any.
    pub fn session_id(&self) -> Option<&str> {
        match self {
            Self::CreateSession { session_id, .. }
            | Self::WebrtcAnswer { session_id, .. }
            | Self::IceCandidate { session_id, .. }
            | Self::SwitchStreamType { session_id, .. }
            | Self::SessionClosed { session_id }
            | Self::WebrtcOffer { session_id, .. }
            | Self::StreamTypeSwitched { session_id, .. }
            | Self::StreamTypeSwitchError { session_id, .. } => Some(session_id),
            Self::SessionError { session_id, .. } => session_id.as_deref(),
            Self::ListSessions
            | Self::StreamReferences
            | Self::SessionList { .. }
            | Self::StreamReferenceInfo { .. } => None,
        }
    }
}
