//! Drives the pipeline at the display refresh rate.

use std::future::Future;
use std::time::Duration;

use mimic_common::{Result, StatusBoard};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

use crate::detector::FaceDetector;
use crate::pipeline::{MotionPipeline, SharedSubscriber};
use crate::video::VideoElement;

pub fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// Owns the tracking task. Dropping it stops the loop.
#[derive(Debug)]
pub struct TrackingHandle {
    task: JoinHandle<()>,
}

impl TrackingHandle {
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub fn stop(self) {
        drop(self);
    }
}

impl Drop for TrackingHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Initializes the detector, waits for video, then processes one frame per tick.
///
/// A failed initialization is reported on `status` and the loop never starts.
pub fn spawn_tracking<D, F>(
    init: F,
    video: VideoElement,
    subscribers: Vec<SharedSubscriber>,
    status: StatusBoard,
    frame_interval: Duration,
) -> TrackingHandle
where
    D: FaceDetector + 'static,
    F: Future<Output = Result<D>> + Send + 'static,
{
    let task = tokio::spawn(async move {
        let detector = match init.await {
            Ok(detector) => detector,
            Err(e) => {
                error!("Face landmarker setup failed: {}", e);
                status.set(format!("Face tracking unavailable: {e}"));
                return;
            }
        };

        let mut pipeline = MotionPipeline::new(detector);
        for subscriber in subscribers {
            pipeline.subscribe(subscriber);
        }

        info!("Face landmarker ready, waiting for video data");
        video.wait_for_data().await;
        info!("Video data available, tracking at {:?} per frame", frame_interval);

        let mut ticker = tokio::time::interval(frame_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            let Some(frame) = video.current_frame() else {
                continue;
            };
            pipeline.process_frame(&frame, now_ms()).await;
        }
    });

    TrackingHandle { task }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::{DetectorOptions, ReplayDetector};
    use crate::pipeline::{FrameSubscriber, SharedSubscriber};
    use crate::video::{FrameSlot, VideoFrame};
    use mimic_common::Error;
    use mimic_rig::FaceFrame;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Default)]
    struct Counter(AtomicUsize);

    impl FrameSubscriber for Counter {
        fn on_face_frame(&self, _frame: &FaceFrame) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_setup_failure_sets_status_and_stops() {
        let status = StatusBoard::default();
        let handle = spawn_tracking(
            async { Err::<ReplayDetector, _>(Error::inference("no GPU")) },
            VideoElement::new(),
            Vec::new(),
            status.clone(),
            Duration::from_millis(5),
        );

        tokio::time::timeout(Duration::from_secs(1), async {
            while !handle.is_finished() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        assert!(status.current().contains("no GPU"));
    }

    #[tokio::test]
    async fn test_loop_waits_for_video_source() {
        let detector = ReplayDetector::from_jsonl(
            r#"{"faceBlendshapes":[{"categories":[{"categoryName":"jawOpen","score":0.5}]}]}"#,
            DetectorOptions::default(),
        )
        .unwrap();
        let video = VideoElement::new();
        let counter = Arc::new(Counter::default());
        let handle = spawn_tracking(
            async move { Ok(detector) },
            video.clone(),
            vec![counter.clone() as SharedSubscriber],
            StatusBoard::default(),
            Duration::from_millis(5),
        );

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!handle.is_finished());
        assert_eq!(counter.0.load(Ordering::SeqCst), 0);

        let slot = Arc::new(FrameSlot::new());
        slot.publish(VideoFrame::new(0.0, 1, 1, vec![0u8]));
        video.attach(slot);
        tokio::time::timeout(Duration::from_secs(1), async {
            while counter.0.load(Ordering::SeqCst) == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("no frame processed after the source attached");

        // Same playback position on every tick: published once.
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);
        assert!(!handle.is_finished());
    }

    #[test]
    fn test_now_ms_is_positive() {
        assert!(now_ms() > 0);
    }
}
