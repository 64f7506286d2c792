//! `webrtc`-crate transport behind [`PeerFactory`] / [`PeerLink`].

use std::sync::Arc;

use async_trait::async_trait;
use mimic_common::{Error, IceCandidate, IceServerConfig, Result, SdpType, SessionDescription, SurfaceConfig};
use tracing::{debug, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::sdp_type::RTCSdpType;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use webrtc::rtp_transceiver::RTCRtpTransceiver;
use webrtc::track::track_remote::TrackRemote;

use crate::link::{PeerEvent, PeerEvents, PeerFactory, PeerLink};
use crate::session::RemoteStream;

pub struct RtcPeerFactory {
    ice_servers: Vec<IceServerConfig>,
}

impl RtcPeerFactory {
    pub fn new(ice_servers: Vec<IceServerConfig>) -> Self {
        Self { ice_servers }
    }

    pub fn from_config(config: &SurfaceConfig) -> Self {
        Self::new(config.ice_servers.clone())
    }

    fn rtc_configuration(&self) -> RTCConfiguration {
        RTCConfiguration {
            ice_servers: self.ice_servers.iter().map(rtc_ice_server).collect(),
            ..Default::default()
        }
    }
}

fn rtc_ice_server(server: &IceServerConfig) -> RTCIceServer {
    RTCIceServer {
        urls: server.urls.clone(),
        username: server.username.clone().unwrap_or_default(),
        credential: server.credential.clone().unwrap_or_default(),
        ..Default::default()
    }
}

#[async_trait]
impl PeerFactory for RtcPeerFactory {
    async fn create(&self, events: PeerEvents) -> Result<Arc<dyn PeerLink>> {
        let mut media = MediaEngine::default();
        media.register_default_codecs().map_err(Error::transport)?;
        let registry =
            register_default_interceptors(Default::default(), &mut media).map_err(Error::transport)?;
        let api = APIBuilder::new()
            .with_media_engine(media)
            .with_interceptor_registry(registry)
            .build();

        let pc = Arc::new(
            api.new_peer_connection(self.rtc_configuration())
                .await
                .map_err(Error::transport)?,
        );
        debug!("Created peer connection for session {}", events.session_id());

        let candidate_events = events.clone();
        pc.on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
            let events = candidate_events.clone();
            Box::pin(async move {
                let Some(candidate) = candidate else {
                    return;
                };
                match candidate.to_json() {
                    Ok(init) => {
                        events.emit(PeerEvent::LocalCandidate(IceCandidate {
                            candidate: init.candidate,
                            sdp_mid: init.sdp_mid,
                            sdp_mline_index: init.sdp_mline_index,
                            username_fragment: init.username_fragment,
                        }));
                    }
                    Err(e) => warn!("Failed to serialize local ICE candidate: {}", e),
                }
            })
        }));

        let state_events = events.clone();
        pc.on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
            let events = state_events.clone();
            Box::pin(async move {
                events.emit(PeerEvent::ConnectionState(state.into()));
            })
        }));

        let track_events = events;
        pc.on_track(Box::new(
            move |track: Arc<TrackRemote>,
                  _receiver: Arc<RTCRtpReceiver>,
                  _transceiver: Arc<RTCRtpTransceiver>| {
                let events = track_events.clone();
                Box::pin(async move {
                    debug!("Remote track added: kind={}", track.kind());
                    events.emit(PeerEvent::Track(RemoteStream::from_track(track)));
                })
            },
        ));

        Ok(Arc::new(RtcPeerLink { pc }))
    }
}

/// [`PeerLink`] over a `webrtc` peer connection.
pub struct RtcPeerLink {
    pc: Arc<RTCPeerConnection>,
}

fn to_rtc(description: SessionDescription) -> Result<RTCSessionDescription> {
    let SessionDescription { sdp, sdp_type } = description;
    let converted = match sdp_type {
        SdpType::Offer => RTCSessionDescription::offer(sdp),
        SdpType::Answer => RTCSessionDescription::answer(sdp),
        SdpType::Pranswer => RTCSessionDescription::pranswer(sdp),
        SdpType::Rollback => {
            return Err(Error::signaling("rollback descriptions are not supported"))
        }
    };
    converted.map_err(Error::signaling)
}

fn from_rtc(description: RTCSessionDescription) -> SessionDescription {
    let sdp_type = match description.sdp_type {
        RTCSdpType::Offer => SdpType::Offer,
        RTCSdpType::Pranswer => SdpType::Pranswer,
        RTCSdpType::Rollback => SdpType::Rollback,
        RTCSdpType::Answer | RTCSdpType::Unspecified => SdpType::Answer,
    };
    SessionDescription {
        sdp: description.sdp,
        sdp_type,
    }
}

#[async_trait]
impl PeerLink for RtcPeerLink {
    async fn set_remote_description(&self, description: SessionDescription) -> Result<()> {
        let description = to_rtc(description)?;
        self.pc
            .set_remote_description(description)
            .await
            .map_err(Error::signaling)
    }

    async fn create_answer(&self) -> Result<SessionDescription> {
        let answer = self.pc.create_answer(None).await.map_err(Error::signaling)?;
        Ok(from_rtc(answer))
    }

    async fn set_local_description(&self, description: SessionDescription) -> Result<()> {
        let description = to_rtc(description)?;
        self.pc
            .set_local_description(description)
            .await
            .map_err(Error::signaling)
    }

    async fn local_description(&self) -> Option<SessionDescription> {
        self.pc.local_description().await.map(from_rtc)
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()> {
        let init = RTCIceCandidateInit {
            candidate: candidate.candidate,
            sdp_mid: candidate.sdp_mid,
            sdp_mline_index: candidate.sdp_mline_index,
            username_fragment: candidate.username_fragment,
        };
        self.pc.add_ice_candidate(init).await.map_err(Error::transport)
    }

    async fn close(&self) -> Result<()> {
        self.pc.close().await.map_err(Error::transport)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mimic_common::config::DEFAULT_STUN_SERVERS;

    #[test]
    fn test_default_config_uses_google_stun() {
        let factory = RtcPeerFactory::from_config(&SurfaceConfig::default());
        let rtc = factory.rtc_configuration();
        assert_eq!(rtc.ice_servers.len(), DEFAULT_STUN_SERVERS.len());
        assert_eq!(rtc.ice_servers[0].urls, vec![DEFAULT_STUN_SERVERS[0].to_string()]);
    }

    #[test]
    fn test_turn_credentials_are_forwarded() {
        let server = IceServerConfig {
            urls: vec!["turn:turn.example.com:3478".into()],
            username: Some("user".into()),
            credential: Some("secret".into()),
        };
        let rtc = rtc_ice_server(&server);
        assert_eq!(rtc.username, "user");
        assert_eq!(rtc.credential, "secret");
    }

    #[test]
    fn test_rollback_is_rejected() {
        let description = SessionDescription {
            sdp: String::new(),
            sdp_type: SdpType::Rollback,
        };
        assert!(to_rtc(description).is_err());
    }

    #[tokio::test]
    async fn test_answers_a_real_offer() {
        use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;

        let mut media = MediaEngine::default();
        media.register_default_codecs().unwrap();
        let api = APIBuilder::new().with_media_engine(media).build();
        let host = api
            .new_peer_connection(RTCConfiguration::default())
            .await
            .unwrap();
        host.add_transceiver_from_kind(RTPCodecType::Video, None)
            .await
            .unwrap();
        let offer = host.create_offer(None).await.unwrap();
        host.set_local_description(offer.clone()).await.unwrap();

        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let events = PeerEvents::new(uuid::Uuid::new_v4(), tx);
        let link = RtcPeerFactory::new(Vec::new()).create(events).await.unwrap();
        link.set_remote_description(SessionDescription::offer(offer.sdp))
            .await
            .unwrap();
        let answer = link.create_answer().await.unwrap();
        assert_eq!(answer.sdp_type, SdpType::Answer);
        link.set_local_description(answer).await.unwrap();
        assert!(link.local_description().await.is_some());

        link.close().await.unwrap();
        host.close().await.unwrap();
    }
}
