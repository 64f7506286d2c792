//! Negotiation state and the per-attempt peer session.

use std::fmt;
use std::sync::Arc;

use uuid::Uuid;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::track::track_remote::TrackRemote;

use crate::link::PeerLink;

/// Where the surface is in answering the host's offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalingState {
    /// No offer seen yet
    Idle,
    /// Offer accepted, session being constructed
    OfferReceived,
    /// Transport handlers registered, applying the offer
    Answering,
    /// Answer set locally and sent to the host
    LocalDescriptionSet,
    /// Transport connected with both descriptions in place
    Connected,
    /// Negotiation or transport failed; a new offer retries
    Failed,
    /// Session closed by the transport or by teardown
    Closed,
}

impl SignalingState {
    /// A live session rejects (or is replaced by) a new offer.
    pub fn is_live(self) -> bool {
        matches!(
            self,
            SignalingState::OfferReceived
                | SignalingState::Answering
                | SignalingState::LocalDescriptionSet
                | SignalingState::Connected
        )
    }
}

impl fmt::Display for SignalingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SignalingState::Idle => "idle",
            SignalingState::OfferReceived => "offer-received",
            SignalingState::Answering => "answering",
            SignalingState::LocalDescriptionSet => "local-description-set",
            SignalingState::Connected => "connected",
            SignalingState::Failed => "failed",
            SignalingState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Transport-level connection state as reported by the peer connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl From<RTCPeerConnectionState> for ConnectionState {
    fn from(state: RTCPeerConnectionState) -> Self {
        match state {
            RTCPeerConnectionState::Unspecified | RTCPeerConnectionState::New => {
                ConnectionState::New
            }
            RTCPeerConnectionState::Connecting => ConnectionState::Connecting,
            RTCPeerConnectionState::Connected => ConnectionState::Connected,
            RTCPeerConnectionState::Disconnected => ConnectionState::Disconnected,
            RTCPeerConnectionState::Failed => ConnectionState::Failed,
            RTCPeerConnectionState::Closed => ConnectionState::Closed,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::New => "New",
            ConnectionState::Connecting => "Connecting",
            ConnectionState::Connected => "Connected",
            ConnectionState::Disconnected => "Disconnected",
            ConnectionState::Failed => "Failed",
            ConnectionState::Closed => "Closed",
        };
        f.write_str(name)
    }
}

/// Media stream announced by the remote peer.
#[derive(Clone)]
pub struct RemoteStream {
    pub stream_id: String,
    pub track_id: String,
    /// Underlying RTP track; absent for streams not backed by a real transport.
    pub track: Option<Arc<TrackRemote>>,
}

impl RemoteStream {
    pub fn new(stream_id: impl Into<String>, track_id: impl Into<String>) -> Self {
        Self {
            stream_id: stream_id.into(),
            track_id: track_id.into(),
            track: None,
        }
    }

    pub fn from_track(track: Arc<TrackRemote>) -> Self {
        Self {
            stream_id: track.stream_id(),
            track_id: track.id(),
            track: Some(track),
        }
    }
}

impl fmt::Debug for RemoteStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteStream")
            .field("stream_id", &self.stream_id)
            .field("track_id", &self.track_id)
            .field("has_track", &self.track.is_some())
            .finish()
    }
}

/// One negotiation attempt.
pub struct PeerSession {
    id: Uuid,
    link: Arc<dyn PeerLink>,
    pub(crate) connection: ConnectionState,
    pub(crate) remote_description_set: bool,
    pub(crate) local_description_set: bool,
    pub(crate) remote_stream: Option<RemoteStream>,
    pub(crate) stream_attached: bool,
}

impl PeerSession {
    pub(crate) fn new(id: Uuid, link: Arc<dyn PeerLink>) -> Self {
        Self {
            id,
            link,
            connection: ConnectionState::New,
            remote_description_set: false,
            local_description_set: false,
            remote_stream: None,
            stream_attached: false,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub(crate) fn link(&self) -> Arc<dyn PeerLink> {
        self.link.clone()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection
    }

    pub fn has_remote_description(&self) -> bool {
        self.remote_description_set
    }

    pub fn has_local_description(&self) -> bool {
        self.local_description_set
    }

    pub fn is_negotiated(&self) -> bool {
        self.remote_description_set && self.local_description_set
    }

    /// Transport connected and both descriptions applied.
    pub fn is_connected(&self) -> bool {
        self.connection == ConnectionState::Connected && self.is_negotiated()
    }

    pub fn remote_stream(&self) -> Option<&RemoteStream> {
        self.remote_stream.as_ref()
    }

    pub fn is_stream_attached(&self) -> bool {
        self.stream_attached
    }
}

impl fmt::Debug for PeerSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeerSession")
            .field("id", &self.id)
            .field("connection", &self.connection)
            .field("remote_description_set", &self.remote_description_set)
            .field("local_description_set", &self.local_description_set)
            .field("remote_stream", &self.remote_stream)
            .field("stream_attached", &self.stream_attached)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_state_from_rtc() {
        assert_eq!(
            ConnectionState::from(RTCPeerConnectionState::Unspecified),
            ConnectionState::New
        );
        assert_eq!(
            ConnectionState::from(RTCPeerConnectionState::Failed),
            ConnectionState::Failed
        );
    }

    #[test]
    fn test_live_states() {
        assert!(!SignalingState::Idle.is_live());
        assert!(SignalingState::Answering.is_live());
        assert!(SignalingState::Connected.is_live());
        assert!(!SignalingState::Failed.is_live());
        assert!(!SignalingState::Closed.is_live());
        assert_eq!(
            SignalingState::LocalDescriptionSet.to_string(),
            "local-description-set"
        );
    }
}
