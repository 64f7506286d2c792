//! Avatar asset selection and head-mesh discovery.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::adapter::{HEAD_BONE, NECK_BONE, SPINE_BONE};
use crate::target::{BoneSet, MorphMesh, RigTarget, SharedSkeleton, SharedTarget};

pub const DEFAULT_AVATAR_URL: &str = "https://models.readyplayer.me/6460d95f9ae10f45bffb2864.glb";
/// Page query parameter naming a custom avatar.
pub const AVATAR_URL_PARAM: &str = "avatarUrl";
/// Requests ARKit-compatible morph targets and a 1024 px texture atlas.
pub const AVATAR_MODEL_QUERY: &str = "morphTargets=ARKit&textureAtlas=1024";

/// Sub-meshes of a ReadyPlayerMe avatar that carry facial morph targets.
pub const HEAD_MESH_NAMES: [&str; 5] = [
    "Wolf3D_Head",
    "Wolf3D_Teeth",
    "Wolf3D_Beard",
    "Wolf3D_Avatar",
    "Wolf3D_Head_Custom",
];

/// The 52 ARKit blendshape names emitted by the face landmarker.
pub const ARKIT_BLENDSHAPES: [&str; 52] = [
    "browDownLeft",
    "browDownRight",
    "browInnerUp",
    "browOuterUpLeft",
    "browOuterUpRight",
    "cheekPuff",
    "cheekSquintLeft",
    "cheekSquintRight",
    "eyeBlinkLeft",
    "eyeBlinkRight",
    "eyeLookDownLeft",
    "eyeLookDownRight",
    "eyeLookInLeft",
    "eyeLookInRight",
    "eyeLookOutLeft",
    "eyeLookOutRight",
    "eyeLookUpLeft",
    "eyeLookUpRight",
    "eyeSquintLeft",
    "eyeSquintRight",
    "eyeWideLeft",
    "eyeWideRight",
    "jawForward",
    "jawLeft",
    "jawOpen",
    "jawRight",
    "mouthClose",
    "mouthDimpleLeft",
    "mouthDimpleRight",
    "mouthFrownLeft",
    "mouthFrownRight",
    "mouthFunnel",
    "mouthLeft",
    "mouthLowerDownLeft",
    "mouthLowerDownRight",
    "mouthPressLeft",
    "mouthPressRight",
    "mouthPucker",
    "mouthRight",
    "mouthRollLower",
    "mouthRollUpper",
    "mouthShrugLower",
    "mouthShrugUpper",
    "mouthSmileLeft",
    "mouthSmileRight",
    "mouthStretchLeft",
    "mouthStretchRight",
    "mouthUpperUpLeft",
    "mouthUpperUpRight",
    "noseSneerLeft",
    "noseSneerRight",
    "tongueOut",
];

/// Full asset URL for an avatar, with the morph-target query appended.
///
/// Falls back to the default hosted avatar when no URL is given.
pub fn avatar_asset_url(avatar_url: Option<&str>) -> String {
    let base = avatar_url
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .unwrap_or(DEFAULT_AVATAR_URL);
    let separator = if base.contains('?') { '&' } else { '?' };
    format!("{base}{separator}{AVATAR_MODEL_QUERY}")
}

/// The `avatarUrl` parameter of a page query string, if present.
pub fn requested_avatar_url(query: &str) -> Option<String> {
    let query = query.trim_start_matches('?');
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == AVATAR_URL_PARAM)
        .map(|(_, value)| value.into_owned())
}

/// Renderer-side node graph of a loaded avatar.
pub trait AvatarScene {
    fn mesh(&self, name: &str) -> Option<SharedTarget>;
    fn skeleton(&self) -> Option<SharedSkeleton>;
}

/// In-memory avatar with no rendering attached.
pub struct HeadlessAvatar {
    meshes: HashMap<String, Arc<Mutex<MorphMesh>>>,
    skeleton: Option<Arc<Mutex<BoneSet>>>,
}

impl HeadlessAvatar {
    pub fn new() -> Self {
        Self {
            meshes: HashMap::new(),
            skeleton: None,
        }
    }

    /// Mirrors the node layout of a ReadyPlayerMe half-body avatar.
    pub fn ready_player_me() -> Self {
        let head_morphs = ARKIT_BLENDSHAPES
            .iter()
            .copied()
            .chain(["mouthOpen", "mouthSmile"]);
        Self::new()
            .with_mesh(MorphMesh::new("Wolf3D_Head", head_morphs))
            .with_mesh(MorphMesh::new(
                "Wolf3D_Teeth",
                ["jawOpen", "mouthOpen", "tongueOut"],
            ))
            .with_bones(BoneSet::with_bones([HEAD_BONE, NECK_BONE, SPINE_BONE]))
    }

    pub fn with_mesh(mut self, mesh: MorphMesh) -> Self {
        self.meshes
            .insert(mesh.name().to_string(), Arc::new(Mutex::new(mesh)));
        self
    }

    pub fn with_bones(mut self, bones: BoneSet) -> Self {
        self.skeleton = Some(Arc::new(Mutex::new(bones)));
        self
    }

    /// Concrete handle for inspecting a mesh after frames were applied.
    pub fn mesh_handle(&self, name: &str) -> Option<Arc<Mutex<MorphMesh>>> {
        self.meshes.get(name).cloned()
    }

    pub fn skeleton_handle(&self) -> Option<Arc<Mutex<BoneSet>>> {
        self.skeleton.clone()
    }
}

impl Default for HeadlessAvatar {
    fn default() -> Self {
        Self::new()
    }
}

impl AvatarScene for HeadlessAvatar {
    fn mesh(&self, name: &str) -> Option<SharedTarget> {
        let mesh: SharedTarget = self.meshes.get(name)?.clone();
        Some(mesh)
    }

    fn skeleton(&self) -> Option<SharedSkeleton> {
        let bones: SharedSkeleton = self.skeleton.clone()?;
        Some(bones)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::RigAdapter;
    use crate::frame::{Blendshape, FaceFrame, Rotation};

    #[test]
    fn test_default_avatar_url() {
        assert_eq!(
            avatar_asset_url(None),
            "https://models.readyplayer.me/6460d95f9ae10f45bffb2864.glb?morphTargets=ARKit&textureAtlas=1024"
        );
        assert_eq!(avatar_asset_url(Some("  ")), avatar_asset_url(None));
    }

    #[test]
    fn test_avatar_url_from_page_query() {
        let requested =
            requested_avatar_url("?avatarUrl=https%3A%2F%2Fcdn.example%2Fme.glb&lang=en");
        assert_eq!(requested.as_deref(), Some("https://cdn.example/me.glb"));
        assert_eq!(
            avatar_asset_url(requested.as_deref()),
            "https://cdn.example/me.glb?morphTargets=ARKit&textureAtlas=1024"
        );
        assert_eq!(requested_avatar_url(""), None);
        assert_eq!(requested_avatar_url("?lang=en"), None);
    }

    #[test]
    fn test_existing_query_is_extended() {
        assert_eq!(
            avatar_asset_url(Some("https://cdn.example/me.glb?v=2")),
            "https://cdn.example/me.glb?v=2&morphTargets=ARKit&textureAtlas=1024"
        );
    }

    #[test]
    fn test_ready_player_me_binding() {
        let avatar = HeadlessAvatar::ready_player_me();
        let adapter = RigAdapter::new();
        adapter.bind(&avatar);
        assert_eq!(adapter.target_count(), 2);

        let frame = FaceFrame::new(
            5,
            vec![Blendshape::new("jawOpen", 0.4)],
            Rotation::new(0.1, 0.2, 0.3),
        );
        adapter.apply_frame(&frame);

        let head = avatar.mesh_handle("Wolf3D_Head").unwrap();
        let teeth = avatar.mesh_handle("Wolf3D_Teeth").unwrap();
        assert_eq!(head.lock().unwrap().influence("jawOpen"), Some(0.4));
        assert_eq!(teeth.lock().unwrap().influence("jawOpen"), Some(0.4));
        let bones = avatar.skeleton_handle().unwrap();
        assert_eq!(
            bones.lock().unwrap().rotation(HEAD_BONE),
            Some(Rotation::new(0.1, 0.2, 0.3))
        );
    }

    #[test]
    fn test_rebinding_drops_old_avatar() {
        let adapter = RigAdapter::new();
        adapter.bind(&HeadlessAvatar::ready_player_me());
        adapter.bind(&HeadlessAvatar::new().with_mesh(MorphMesh::new("Wolf3D_Avatar", ["jawOpen"])));
        assert_eq!(adapter.target_count(), 1);
    }
}
