//! Offer/answer state machine for the single host peer connection.

use std::collections::VecDeque;
use std::sync::Arc;

use mimic_bridge::HostBridge;
use mimic_common::status::{STATUS_CLOSED, STATUS_CONNECTED, STATUS_NEGOTIATING};
use mimic_common::{Error, IceCandidate, OfferPolicy, SessionDescription, SignalMessage, StatusBoard};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::link::{PeerEvent, PeerEventReceiver, PeerEvents, PeerFactory, PeerLink};
use crate::media::MediaSink;
use crate::session::{ConnectionState, PeerSession, RemoteStream, SignalingState};

pub struct SignalingMachine {
    factory: Arc<dyn PeerFactory>,
    bridge: HostBridge,
    status: StatusBoard,
    policy: OfferPolicy,
    sink: Option<Arc<dyn MediaSink>>,
    events_tx: mpsc::UnboundedSender<(Uuid, PeerEvent)>,
    state: SignalingState,
    session: Option<PeerSession>,
    pending_candidates: VecDeque<IceCandidate>,
}

impl SignalingMachine {
    /// Creates an idle machine and the receiver for its sessions' transport events.
    pub fn new(
        factory: Arc<dyn PeerFactory>,
        bridge: HostBridge,
        status: StatusBoard,
        policy: OfferPolicy,
    ) -> (Self, PeerEventReceiver) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let machine = Self {
            factory,
            bridge,
            status,
            policy,
            sink: None,
            events_tx,
            state: SignalingState::Idle,
            session: None,
            pending_candidates: VecDeque::new(),
        };
        (machine, events_rx)
    }

    pub fn with_media_sink(mut self, sink: Arc<dyn MediaSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn state(&self) -> SignalingState {
        self.state
    }

    pub fn session(&self) -> Option<&PeerSession> {
        self.session.as_ref()
    }

    pub fn pending_candidates(&self) -> usize {
        self.pending_candidates.len()
    }

    pub fn bridge(&self) -> &HostBridge {
        &self.bridge
    }

    pub fn status(&self) -> &StatusBoard {
        &self.status
    }

    pub async fn handle_signal(&mut self, message: SignalMessage) {
        match message {
            SignalMessage::Offer { sdp } => self.handle_offer(sdp).await,
            SignalMessage::IceCandidate { candidate } => {
                self.handle_remote_candidate(candidate).await
            }
            SignalMessage::Answer(_) => {
                warn!("Ignoring answer from host: this side only answers offers");
            }
            SignalMessage::ReadyNotice => debug!("Ignoring ready notice from host"),
        }
    }

    pub async fn handle_offer(&mut self, sdp: String) {
        if self.state.is_live() {
            match self.policy {
                OfferPolicy::RejectWhileLive => {
                    warn!(
                        "Rejecting offer: session already {} (offer policy is reject_while_live)",
                        self.state
                    );
                    return;
                }
                OfferPolicy::Replace => {
                    info!("Replacing {} session with new offer", self.state);
                }
            }
        }
        self.close_session().await;

        self.state = SignalingState::OfferReceived;
        self.status.set(STATUS_NEGOTIATING);
        info!("Received offer ({} bytes of SDP)", sdp.len());

        let id = Uuid::new_v4();
        let events = PeerEvents::new(id, self.events_tx.clone());
        let link = match self.factory.create(events).await {
            Ok(link) => link,
            Err(e) => return self.fail("creating peer connection", &e),
        };
        self.session = Some(PeerSession::new(id, link.clone()));
        self.state = SignalingState::Answering;

        if let Err(e) = link
            .set_remote_description(SessionDescription::offer(sdp))
            .await
        {
            return self.fail("applying remote description", &e);
        }
        if let Some(session) = self.session.as_mut() {
            session.remote_description_set = true;
        }
        self.flush_pending_candidates(link.as_ref()).await;

        let answer = match link.create_answer().await {
            Ok(answer) => answer,
            Err(e) => return self.fail("creating answer", &e),
        };
        if let Err(e) = link.set_local_description(answer.clone()).await {
            return self.fail("applying local description", &e);
        }
        let local = link.local_description().await.unwrap_or(answer);
        if let Some(session) = self.session.as_mut() {
            session.local_description_set = true;
        }
        self.state = SignalingState::LocalDescriptionSet;

        if let Err(e) = self.bridge.send(&SignalMessage::Answer(local)) {
            warn!("Failed to send answer to host: {}", e);
        }
        info!("Answer sent, waiting for transport");

        let transport_up = self
            .session
            .as_ref()
            .is_some_and(|session| session.connection == ConnectionState::Connected);
        if transport_up {
            self.enter_connected();
        }
    }

    /// Applies a host candidate to the open session, or queues it until a
    /// session has a remote description.
    ///
    /// A disconnected session keeps receiving candidates so ICE can recover.
    pub async fn handle_remote_candidate(&mut self, candidate: IceCandidate) {
        let link = match &self.session {
            Some(session) if session.remote_description_set => session.link(),
            _ => {
                debug!("Queueing ICE candidate until remote description is set");
                self.pending_candidates.push_back(candidate);
                return;
            }
        };
        if let Err(e) = link.add_ice_candidate(candidate).await {
            warn!("Failed to add ICE candidate: {}", e);
        }
    }

    pub async fn handle_peer_event(&mut self, session_id: Uuid, event: PeerEvent) {
        if self.session.as_ref().map(PeerSession::id) != Some(session_id) {
            debug!("Discarding event from stale session {}", session_id);
            return;
        }

        match event {
            PeerEvent::LocalCandidate(candidate) => {
                if let Err(e) = self.bridge.send(&SignalMessage::IceCandidate { candidate }) {
                    warn!("Failed to send ICE candidate to host: {}", e);
                }
            }
            PeerEvent::ConnectionState(state) => self.on_connection_state(state),
            PeerEvent::Track(stream) => self.on_track(stream),
        }
    }

    /// Marks the current attempt failed after an unexpected panic in a handler.
    pub fn abort_attempt(&mut self, reason: &str) {
        self.fail("handling host message", &Error::internal(reason));
    }

    /// Closes the open session and returns to a terminal `closed` state.
    pub async fn teardown(&mut self) {
        self.close_session().await;
        self.pending_candidates.clear();
        self.state = SignalingState::Closed;
        self.status.set(STATUS_CLOSED);
        info!("Signaling torn down");
    }

    fn on_connection_state(&mut self, state: ConnectionState) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        session.connection = state;
        info!("Peer connection state: {}", state);

        match state {
            ConnectionState::Connected => {
                if session.is_negotiated() {
                    self.enter_connected();
                } else {
                    debug!("Transport connected before negotiation finished, deferring");
                }
            }
            ConnectionState::Disconnected | ConnectionState::Failed => {
                self.state = SignalingState::Failed;
                self.status.set(format!("WebRTC Status: {state}"));
            }
            ConnectionState::Closed => {
                self.state = SignalingState::Closed;
                self.status.set(STATUS_CLOSED);
                self.detach_stream();
            }
            ConnectionState::New | ConnectionState::Connecting => {}
        }
    }

    fn on_track(&mut self, stream: RemoteStream) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.remote_stream.is_some() {
            debug!("Ignoring additional remote track {}", stream.track_id);
            return;
        }
        info!("Remote stream {} announced", stream.stream_id);
        session.remote_stream = Some(stream);
        if self.state == SignalingState::Connected {
            self.attach_stream();
        }
    }

    fn enter_connected(&mut self) {
        self.state = SignalingState::Connected;
        self.status.set(STATUS_CONNECTED);
        info!("Peer connection established");
        self.attach_stream();
    }

    fn attach_stream(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.stream_attached {
            return;
        }
        let (Some(stream), Some(sink)) = (session.remote_stream.as_ref(), self.sink.as_ref()) else {
            return;
        };
        sink.attach(stream);
        session.stream_attached = true;
    }

    fn detach_stream(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if !session.stream_attached {
            return;
        }
        if let Some(sink) = &self.sink {
            sink.detach();
        }
        session.stream_attached = false;
    }

    async fn flush_pending_candidates(&mut self, link: &dyn PeerLink) {
        if self.pending_candidates.is_empty() {
            return;
        }
        debug!("Applying {} queued ICE candidate(s)", self.pending_candidates.len());
        while let Some(candidate) = self.pending_candidates.pop_front() {
            if let Err(e) = link.add_ice_candidate(candidate).await {
                warn!("Failed to add queued ICE candidate: {}", e);
            }
        }
    }

    async fn close_session(&mut self) {
        self.detach_stream();
        let Some(session) = self.session.take() else {
            return;
        };
        if let Err(e) = session.link().close().await {
            debug!("Closing session {}: {}", session.id(), e);
        }
    }

    fn fail(&mut self, stage: &str, err: &Error) {
        error!("WebRTC negotiation failed while {}: {}", stage, err);
        self.state = SignalingState::Failed;
        self.status.set(format!("WebRTC Status: Error while {stage}: {err}"));
    }
}

impl std::fmt::Debug for SignalingMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalingMachine")
            .field("state", &self.state)
            .field("policy", &self.policy)
            .field("session", &self.session)
            .field("pending_candidates", &self.pending_candidates.len())
            .finish()
    }
}
