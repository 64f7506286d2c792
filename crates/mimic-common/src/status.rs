//! Human-readable status line shown to whoever embeds the surface.

use std::sync::Arc;

use tokio::sync::watch;

pub const STATUS_WAITING: &str = "WebRTC Status: Waiting for connection...";
pub const STATUS_NEGOTIATING: &str = "WebRTC Status: Negotiating...";
pub const STATUS_CONNECTED: &str = "WebRTC Status: Connected";
pub const STATUS_CLOSED: &str = "WebRTC Status: Closed";

/// Latest-value status cell shared by the pipeline and the signaling machine.
#[derive(Clone)]
pub struct StatusBoard {
    tx: Arc<watch::Sender<String>>,
}

impl StatusBoard {
    pub fn new(initial: impl Into<String>) -> Self {
        let (tx, _rx) = watch::channel(initial.into());
        Self { tx: Arc::new(tx) }
    }

    pub fn set(&self, status: impl Into<String>) {
        self.tx.send_replace(status.into());
    }

    pub fn current(&self) -> String {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<String> {
        self.tx.subscribe()
    }
}

impl Default for StatusBoard {
    fn default() -> Self {
        Self::new(STATUS_WAITING)
    }
}

impl std::fmt::Debug for StatusBoard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("StatusBoard").field(&self.current()).finish()
    }
}
