#![forbid(unsafe_code)]

pub mod adapter;
pub mod avatar;
pub mod frame;
pub mod target;

pub use adapter::{apply_frame, neck_rotation, spine_rotation, RigAdapter};
pub use avatar::{
    avatar_asset_url, requested_avatar_url, AvatarScene, HeadlessAvatar,
};
pub use frame::{Blendshape, FaceFrame, Matrix4, Rotation};
pub use target::{BoneSet, MorphMesh, RigTarget, SharedSkeleton, SharedTarget, Skeleton};
