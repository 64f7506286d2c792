//! Seam between the state machine and the WebRTC transport.

use std::sync::Arc;

use async_trait::async_trait;
use mimic_common::{IceCandidate, Result, SessionDescription};
use tokio::sync::mpsc;
use tracing::trace;
use uuid::Uuid;

use crate::session::{ConnectionState, RemoteStream};

/// Application-level operations on one peer connection.
#[async_trait]
pub trait PeerLink: Send + Sync {
    async fn set_remote_description(&self, description: SessionDescription) -> Result<()>;

    async fn create_answer(&self) -> Result<SessionDescription>;

    async fn set_local_description(&self, description: SessionDescription) -> Result<()>;

    /// Local description as finally applied, if any.
    async fn local_description(&self) -> Option<SessionDescription>;

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()>;

    async fn close(&self) -> Result<()>;
}

/// Transport callbacks, delivered to the state machine.
#[derive(Debug, Clone)]
pub enum PeerEvent {
    LocalCandidate(IceCandidate),
    ConnectionState(ConnectionState),
    Track(RemoteStream),
}

pub type PeerEventReceiver = mpsc::UnboundedReceiver<(Uuid, PeerEvent)>;

/// Event sender handed to a new peer connection, tagged with its session id.
#[derive(Debug, Clone)]
pub struct PeerEvents {
    session: Uuid,
    tx: mpsc::UnboundedSender<(Uuid, PeerEvent)>,
}

impl PeerEvents {
    pub(crate) fn new(session: Uuid, tx: mpsc::UnboundedSender<(Uuid, PeerEvent)>) -> Self {
        Self { session, tx }
    }

    pub fn session_id(&self) -> Uuid {
        self.session
    }

    /// Returns `false` once the state machine is gone.
    pub fn emit(&self, event: PeerEvent) -> bool {
        trace!("Peer event for session {}: {:?}", self.session, event);
        self.tx.send((self.session, event)).is_ok()
    }
}

/// Builds peer connections with their event handlers already registered.
#[async_trait]
pub trait PeerFactory: Send + Sync {
    async fn create(&self, events: PeerEvents) -> Result<Arc<dyn PeerLink>>;
}
