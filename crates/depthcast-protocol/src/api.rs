//! Request and response bodies for an HTTP front end.
//!
//! depthcast does not ship an HTTP server; these types pin down the JSON
//! contract so any front end can call the session manager and answer in
//! the shape browser clients expect.

use depthcast_transport::{IceCandidate, SdpType, SessionDescription};
use serde::{Deserialize, Serialize};

use crate::types::{SessionId, StreamType};

/// `POST /offer`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfferRequest {
    pub device_id: String,
    pub stream_types: Vec<StreamType>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfferResponse {
    pub session_id: SessionId,
    pub sdp: String,
    #[serde(rename = "type")]
    pub sdp_type: SdpType,
}

impl OfferResponse {
    pub fn new(session_id: SessionId, offer: SessionDescription) -> Self {
        Self {
            session_id,
            sdp: offer.sdp,
            sdp_type: offer.sdp_type,
        }
    }
}

/// `POST /answer`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerRequest {
    pub session_id: SessionId,
    pub sdp: String,
    #[serde(rename = "type")]
    pub sdp_type: SdpType,
}

impl AnswerRequest {
    pub fn description(&self) -> SessionDescription {
        SessionDescription {
            sdp: self.sdp.clone(),
            sdp_type: self.sdp_type,
        }
    }
}

/// `POST /ice-candidates`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceCandidateRequest {
    pub session_id: SessionId,
    pub candidate: String,
    #[serde(rename = "sdpMid", default)]
    pub sdp_mid: Option<String>,
    #[serde(rename = "sdpMLineIndex", default)]
    pub sdp_mline_index: Option<u16>,
}

impl IceCandidateRequest {
    pub fn to_candidate(&self) -> IceCandidate {
        IceCandidate {
            candidate: self.candidate.clone(),
            sdp_mid: self.sdp_mid.clone(),
            sdp_mline_index: self.sdp_mline_index,
        }
    }
}

/// `{"success": bool}`, returned by answer, ICE and delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuccessResponse {
    pub success: bool,
}

/// `DELETE /sessions`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClosedSessionsResponse {
    pub closed_sessions: usize,
}
