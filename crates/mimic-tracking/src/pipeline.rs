//! Per-frame retargeting: one video frame in, at most one [`FaceFrame`] out.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use mimic_rig::{Blendshape, FaceFrame, RigAdapter, Rotation};
use tracing::{debug, warn};

use crate::detector::FaceDetector;
use crate::video::VideoFrame;

/// Receives every published face frame, in publication order.
pub trait FrameSubscriber: Send + Sync {
    fn on_face_frame(&self, frame: &FaceFrame);
}

pub type SharedSubscriber = Arc<dyn FrameSubscriber>;

impl FrameSubscriber for RigAdapter {
    fn on_face_frame(&self, frame: &FaceFrame) {
        self.apply_frame(frame);
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub processed: u64,
    pub duplicates: u64,
    pub not_ready: u64,
    pub no_face: u64,
    pub failures: u64,
}

pub struct MotionPipeline<D> {
    detector: D,
    subscribers: Vec<SharedSubscriber>,
    last_position: Option<f64>,
    last_timestamp_ms: Option<i64>,
    last_rotation: Rotation,
    latest: Option<FaceFrame>,
    stats: PipelineStats,
}

impl<D: FaceDetector> MotionPipeline<D> {
    pub fn new(detector: D) -> Self {
        Self {
            detector,
            subscribers: Vec::new(),
            last_position: None,
            last_timestamp_ms: None,
            last_rotation: Rotation::ZERO,
            latest: None,
            stats: PipelineStats::default(),
        }
    }

    pub fn subscribe(&mut self, subscriber: SharedSubscriber) {
        self.subscribers.push(subscriber);
    }

    pub fn with_subscriber(mut self, subscriber: SharedSubscriber) -> Self {
        self.subscribe(subscriber);
        self
    }

    /// Most recently published frame.
    pub fn latest(&self) -> Option<&FaceFrame> {
        self.latest.as_ref()
    }

    pub fn stats(&self) -> PipelineStats {
        self.stats
    }

    pub fn detector(&self) -> &D {
        &self.detector
    }

    /// Runs inference on `frame` and publishes the result.
    ///
    /// Returns `None` when the frame was skipped: detector not ready, same
    /// playback position as the previous frame, inference failure, or no face.
    pub async fn process_frame(&mut self, frame: &VideoFrame, timestamp_ms: i64) -> Option<FaceFrame> {
        if !self.detector.is_ready() {
            self.stats.not_ready += 1;
            return None;
        }
        if self.last_position == Some(frame.position) {
            self.stats.duplicates += 1;
            return None;
        }
        self.last_position = Some(frame.position);

        let timestamp_ms = self.next_timestamp(timestamp_ms);
        let detection = AssertUnwindSafe(self.detector.detect(frame, timestamp_ms))
            .catch_unwind()
            .await;
        let output = match detection {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                self.stats.failures += 1;
                debug!("Face detection failed at {:.3}s: {}", frame.position, e);
                return None;
            }
            Err(_) => {
                self.stats.failures += 1;
                warn!("Face detector panicked at {:.3}s", frame.position);
                return None;
            }
        };

        let Some(categories) = output.first_face_blendshapes() else {
            self.stats.no_face += 1;
            return None;
        };
        let blendshapes = categories
            .iter()
            .map(|category| Blendshape::new(category.category_name.clone(), category.score))
            .collect();

        let rotation = output
            .first_transform()
            .map(|matrix| matrix.euler_xyz())
            .filter(Rotation::is_finite)
            .unwrap_or(self.last_rotation);
        self.last_rotation = rotation;

        let face = FaceFrame::new(timestamp_ms, blendshapes, rotation);
        for subscriber in &self.subscribers {
            subscriber.on_face_frame(&face);
        }
        self.stats.processed += 1;
        self.latest = Some(face.clone());
        Some(face)
    }

    fn next_timestamp(&mut self, requested: i64) -> i64 {
        let timestamp = match self.last_timestamp_ms {
            Some(last) if requested <= last => last + 1,
            _ => requested,
        };
        self.last_timestamp_ms = Some(timestamp);
        timestamp
    }
}
