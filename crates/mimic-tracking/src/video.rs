//! Video element abstraction: whatever currently feeds frames to the pipeline.

use std::fmt;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use tokio::sync::watch;
use tracing::debug;

/// One decoded (or raw) video frame.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoFrame {
    /// Playback position in seconds. Equal positions mean the same frame.
    pub position: f64,
    pub width: u32,
    pub height: u32,
    pub data: Bytes,
}

impl VideoFrame {
    pub fn new(position: f64, width: u32, height: u32, data: impl Into<Bytes>) -> Self {
        Self {
            position,
            width,
            height,
            data: data.into(),
        }
    }
}

/// Something that can be sampled for its most recent frame.
pub trait VideoSource: Send + Sync {
    fn current_frame(&self) -> Option<VideoFrame>;
}

/// Latest-frame cell: producers overwrite, the pipeline samples.
#[derive(Debug, Default)]
pub struct FrameSlot {
    latest: Mutex<Option<VideoFrame>>,
}

impl FrameSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, frame: VideoFrame) {
        let mut latest = match self.latest.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *latest = Some(frame);
    }
}

impl VideoSource for FrameSlot {
    fn current_frame(&self) -> Option<VideoFrame> {
        match self.latest.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

/// Stand-in for the page's `<video>` element.
///
/// A source may be attached at any time (typically once the negotiated remote
/// stream shows up); until then the element has no data.
#[derive(Clone)]
pub struct VideoElement {
    source: Arc<watch::Sender<Option<Arc<dyn VideoSource>>>>,
}

impl VideoElement {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self {
            source: Arc::new(tx),
        }
    }

    pub fn attach(&self, source: Arc<dyn VideoSource>) {
        debug!("Video source attached");
        self.source.send_replace(Some(source));
    }

    pub fn detach(&self) {
        if self.source.send_replace(None).is_some() {
            debug!("Video source detached");
        }
    }

    pub fn has_source(&self) -> bool {
        self.source.borrow().is_some()
    }

    pub fn current_frame(&self) -> Option<VideoFrame> {
        let source = self.source.borrow().clone()?;
        source.current_frame()
    }

    /// Resolves once a source is attached.
    pub async fn wait_for_data(&self) {
        let mut rx = self.source.subscribe();
        // The sender lives as long as `self`, so this cannot observe a closed channel.
        let _ = rx.wait_for(|source| source.is_some()).await;
    }
}

impl Default for VideoElement {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for VideoElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VideoElement")
            .field("has_source", &self.has_source())
            .finish()
    }
}
