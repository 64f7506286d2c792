//! Host bridge wire protocol.
//!
//! Message shapes are consumed by an existing host application, so field
//! names and tags here are part of the contract.

use serde::{Deserialize, Serialize};

/// Host-invoked entry point delivering an SDP offer.
pub const ENTRY_RECEIVE_OFFER: &str = "receiveOffer";
/// Host-invoked entry point delivering a remote ICE candidate.
pub const ENTRY_RECEIVE_ICE_CANDIDATE: &str = "receiveIceCandidate";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    Offer,
    Answer,
    Pranswer,
    Rollback,
}

/// Session description in the browser's `RTCSessionDescription` JSON shape.
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

/// ICE candidate in the browser's `RTCIceCandidate.toJSON()` shape.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
    #[serde(
        default,
        rename = "sdpMLineIndex",
        skip_serializing_if = "Option::is_none"
    )]
    pub sdp_mline_index: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username_fragment: Option<String>,
}

impl IceCandidate {
    pub fn new(candidate: impl Into<String>) -> Self {
        Self {
            candidate: candidate.into(),
            ..Default::default()
        }
    }
}

/// Signaling message exchanged verbatim across the host bridge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum SignalMessage {
    /// Remote offer to be answered by this surface.
    Offer { sdp: String },

    /// Local answer, carried as a full session description.
    Answer(SessionDescription),

    /// Trickled ICE candidate, in either direction.
    IceCandidate { candidate: IceCandidate },

    /// The surface has registered its entry points and can accept an offer.
    #[serde(rename = "ready")]
    ReadyNotice,
}

/// Payload of the `receiveOffer` entry point.
#[derive(Debug, Clone, Deserialize)]
pub struct OfferPayload {
    pub sdp: SdpField,
}

/// Hosts send either the raw SDP text or a whole session description map.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum SdpField {
    Text(String),
    Description { sdp: String },
}

impl OfferPayload {
    pub fn into_sdp(self) -> String {
        match self.sdp {
            SdpField::Text(sdp) | SdpField::Description { sdp } => sdp,
        }
    }
}

/// Payload of the `receiveIceCandidate` entry point.
#[derive(Debug, Clone, Deserialize)]
pub struct CandidatePayload {
    #[serde(default)]
    pub candidate: Option<CandidateField>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum CandidateField {
    Init(IceCandidate),
    Text(String),
}

impl CandidatePayload {
    /// Returns `None` when the host sent no usable candidate.
    pub fn into_candidate(self) -> Option<IceCandidate> {
        match self.candidate? {
            CandidateField::Init(init) => Some(init),
            CandidateField::Text(text) if text.is_empty() => None,
            CandidateField::Text(text) => Some(IceCandidate::new(text)),
        }
    }
}

/// One blendshape score in the outbound motion message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlendshapeScore {
    pub category_name: String,
    pub score: f32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RotationPayload {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

/// Outbound per-frame motion data. Untagged on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MotionMessage {
    pub blendshapes: Vec<BlendshapeScore>,
    pub rotation: RotationPayload,
}

/// Inbound text envelope naming the entry point the host wants to invoke.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostInvocation {
    pub entry: String,
    #[serde(default)]
    pub data: serde_json::Value,
}
