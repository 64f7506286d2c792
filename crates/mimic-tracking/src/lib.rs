//! Motion retargeting: video frame → face landmarker → [`FaceFrame`] → subscribers.
//!
//! The landmarker itself is an external collaborator reached through
//! [`FaceDetector`]. [`MotionPipeline`] handles one frame at a time and
//! [`spawn_tracking`] drives it at the display refresh rate.
//!
//! [`FaceFrame`]: mimic_rig::FaceFrame

#![forbid(unsafe_code)]

pub mod detector;
pub mod pipeline;
pub mod runner;
pub mod video;

pub use detector::{
    Category, Classifications, Delegate, DetectorOptions, FaceDetector, InferenceOutput,
    ReplayDetector, RunningMode, TransformMatrix,
};
pub use pipeline::{FrameSubscriber, MotionPipeline, PipelineStats, SharedSubscriber};
pub use runner::{now_ms, spawn_tracking, TrackingHandle};
pub use video::{FrameSlot, VideoElement, VideoFrame, VideoSource};
