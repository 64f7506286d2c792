//! Retargets published face frames onto the bound avatar rig.

use std::sync::Mutex;

use tracing::debug;

use crate::avatar::{AvatarScene, HEAD_MESH_NAMES};
use crate::frame::{FaceFrame, Rotation};
use crate::target::{lock, RigTarget, SharedSkeleton, SharedTarget, Skeleton};

pub const HEAD_BONE: &str = "Head";
pub const NECK_BONE: &str = "Neck";
pub const SPINE_BONE: &str = "Spine2";

/// Divisor applied to head rotation before it reaches the neck.
pub const NECK_ATTENUATION: f32 = 5.0;
/// Constant forward tilt added to the neck's x rotation, in radians.
pub const NECK_FORWARD_TILT: f32 = 0.3;
/// Divisor applied to head rotation before it reaches the upper spine.
pub const SPINE_ATTENUATION: f32 = 10.0;

pub fn neck_rotation(head: Rotation) -> Rotation {
    Rotation::new(
        head.x / NECK_ATTENUATION + NECK_FORWARD_TILT,
        head.y / NECK_ATTENUATION,
        head.z / NECK_ATTENUATION,
    )
}

pub fn spine_rotation(head: Rotation) -> Rotation {
    Rotation::new(
        head.x / SPINE_ATTENUATION,
        head.y / SPINE_ATTENUATION,
        head.z / SPINE_ATTENUATION,
    )
}

/// Writes every blendshape score into each target's matching morph slot.
///
/// Targets lacking a morph for a given blendshape are skipped.
pub fn apply_blendshapes(frame: &FaceFrame, target: &mut dyn RigTarget) {
    for shape in frame.blendshapes() {
        if let Some(index) = target.morph_index(&shape.name) {
            target.set_morph_influence(index, shape.score);
        }
    }
}

/// Drives head, neck and upper spine from one head rotation.
///
/// Neck and spine only follow when the avatar has a head bone.
pub fn apply_rotation(rotation: Rotation, skeleton: &mut dyn Skeleton) {
    if !skeleton.has_bone(HEAD_BONE) {
        return;
    }
    skeleton.set_bone_rotation(HEAD_BONE, rotation);
    skeleton.set_bone_rotation(NECK_BONE, neck_rotation(rotation));
    skeleton.set_bone_rotation(SPINE_BONE, spine_rotation(rotation));
}

pub fn apply_frame(
    frame: &FaceFrame,
    targets: &mut [&mut dyn RigTarget],
    skeleton: Option<&mut dyn Skeleton>,
) {
    for target in targets.iter_mut() {
        apply_blendshapes(frame, &mut **target);
    }
    if let Some(skeleton) = skeleton {
        apply_rotation(frame.rotation(), skeleton);
    }
}

#[derive(Default)]
struct RigBinding {
    targets: Vec<SharedTarget>,
    skeleton: Option<SharedSkeleton>,
}

/// Holds the head-mesh handles of the currently loaded avatar.
#[derive(Default)]
pub struct RigAdapter {
    binding: Mutex<RigBinding>,
}

impl RigAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds the target list from a freshly loaded avatar.
    pub fn bind(&self, scene: &dyn AvatarScene) {
        let targets: Vec<SharedTarget> = HEAD_MESH_NAMES
            .iter()
            .filter_map(|name| scene.mesh(name))
            .collect();
        let skeleton = scene.skeleton();
        debug!(
            "Bound avatar rig: {} head mesh(es), skeleton={}",
            targets.len(),
            skeleton.is_some()
        );

        let mut binding = lock(&self.binding);
        binding.targets = targets;
        binding.skeleton = skeleton;
    }

    pub fn bind_targets(&self, targets: Vec<SharedTarget>, skeleton: Option<SharedSkeleton>) {
        let mut binding = lock(&self.binding);
        binding.targets = targets;
        binding.skeleton = skeleton;
    }

    pub fn clear(&self) {
        let mut binding = lock(&self.binding);
        binding.targets.clear();
        binding.skeleton = None;
    }

    pub fn target_count(&self) -> usize {
        lock(&self.binding).targets.len()
    }

    pub fn apply_frame(&self, frame: &FaceFrame) {
        let binding = lock(&self.binding);
        for target in &binding.targets {
            apply_blendshapes(frame, &mut *lock(target));
        }
        if let Some(skeleton) = &binding.skeleton {
            apply_rotation(frame.rotation(), &mut *lock(skeleton));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Blendshape;
    use crate::target::{BoneSet, MorphMesh};

    #[test]
    fn test_neck_and_spine_attenuation_is_exact() {
        let head = Rotation::new(0.5, -0.25, 1.5);
        assert_eq!(
            neck_rotation(head),
            Rotation::new(0.5 / 5.0 + 0.3, -0.25 / 5.0, 1.5 / 5.0)
        );
        assert_eq!(
            spine_rotation(head),
            Rotation::new(0.5 / 10.0, -0.25 / 10.0, 1.5 / 10.0)
        );
    }

    #[test]
    fn test_rotation_chain() {
        let mut bones = BoneSet::with_bones([HEAD_BONE, NECK_BONE, SPINE_BONE]);
        let head = Rotation::new(0.2, 0.4, -0.1);
        apply_rotation(head, &mut bones);
        assert_eq!(bones.rotation(HEAD_BONE), Some(head));
        assert_eq!(bones.rotation(NECK_BONE), Some(neck_rotation(head)));
        assert_eq!(bones.rotation(SPINE_BONE), Some(spine_rotation(head)));
    }

    #[test]
    fn test_missing_neck_still_drives_spine() {
        let mut bones = BoneSet::with_bones([HEAD_BONE, SPINE_BONE]);
        let head = Rotation::new(1.0, 0.0, 0.0);
        apply_rotation(head, &mut bones);
        assert_eq!(bones.rotation(SPINE_BONE), Some(Rotation::new(0.1, 0.0, 0.0)));
    }

    #[test]
    fn test_no_head_bone_leaves_skeleton_untouched() {
        let mut bones = BoneSet::with_bones([NECK_BONE, SPINE_BONE]);
        apply_rotation(Rotation::new(1.0, 1.0, 1.0), &mut bones);
        assert_eq!(bones.rotation(NECK_BONE), Some(Rotation::ZERO));
        assert_eq!(bones.rotation(SPINE_BONE), Some(Rotation::ZERO));
    }

    #[test]
    fn test_missing_morphs_are_skipped_per_mesh() {
        let mut head = MorphMesh::new("Wolf3D_Head", ["jawOpen", "eyeBlinkLeft"]);
        let mut teeth = MorphMesh::new("Wolf3D_Teeth", ["jawOpen"]);
        let frame = FaceFrame::new(
            1,
            vec![
                Blendshape::new("eyeBlinkLeft", 0.6),
                Blendshape::new("jawOpen", 0.3),
                Blendshape::new("tongueOut", 0.9),
            ],
            Rotation::ZERO,
        );

        let mut targets: [&mut dyn RigTarget; 2] = [&mut head, &mut teeth];
        apply_frame(&frame, &mut targets, None);

        assert_eq!(head.influence("eyeBlinkLeft"), Some(0.6));
        assert_eq!(head.influence("jawOpen"), Some(0.3));
        assert_eq!(teeth.influence("jawOpen"), Some(0.3));
        assert_eq!(teeth.influence("eyeBlinkLeft"), None);
    }

    #[test]
    fn test_bind_targets_replaces_previous_binding() {
        use std::sync::{Arc, Mutex};

        let adapter = RigAdapter::new();
        let first: SharedTarget = Arc::new(Mutex::new(MorphMesh::new("a", ["jawOpen"])));
        adapter.bind_targets(vec![first.clone(), first], None);
        assert_eq!(adapter.target_count(), 2);

        let second: SharedTarget = Arc::new(Mutex::new(MorphMesh::new("b", ["jawOpen"])));
        adapter.bind_targets(vec![second], None);
        assert_eq!(adapter.target_count(), 1);

        adapter.clear();
        assert_eq!(adapter.target_count(), 0);
    }
}
