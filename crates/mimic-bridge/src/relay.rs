//! Forwards tracked face frames to the host as motion messages.

use mimic_common::{BlendshapeScore, MotionMessage, RotationPayload};
use mimic_rig::FaceFrame;
use mimic_tracking::FrameSubscriber;
use tracing::debug;

use crate::bridge::HostBridge;

pub fn motion_message(frame: &FaceFrame) -> MotionMessage {
    let rotation = frame.rotation();
    MotionMessage {
        blendshapes: frame
            .blendshapes()
            .iter()
            .map(|shape| BlendshapeScore {
                category_name: shape.name.clone(),
                score: shape.score,
            })
            .collect(),
        rotation: RotationPayload {
            x: rotation.x,
            y: rotation.y,
            z: rotation.z,
        },
    }
}

#[derive(Debug, Clone)]
pub struct MotionRelay {
    bridge: HostBridge,
}

impl MotionRelay {
    pub fn new(bridge: HostBridge) -> Self {
        Self { bridge }
    }
}

impl FrameSubscriber for MotionRelay {
    fn on_face_frame(&self, frame: &FaceFrame) {
        if let Err(e) = self.bridge.send(&motion_message(frame)) {
            debug!("Motion message not delivered: {}", e);
        }
    }
}
