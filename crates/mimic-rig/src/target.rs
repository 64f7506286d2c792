//! Renderer-facing rig handles.
//!
//! Meshes and skeletons belong to the renderer; the adapter only keeps shared
//! handles to them and mutates morph influences and bone rotations.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::frame::Rotation;

/// An avatar sub-mesh carrying morph targets.
pub trait RigTarget: Send {
    fn name(&self) -> &str;

    /// Morph-target index for a blendshape name, if the mesh has one.
    fn morph_index(&self, blendshape: &str) -> Option<usize>;

    fn set_morph_influence(&mut self, index: usize, influence: f32);
}

/// Named bones with settable rotation.
pub trait Skeleton: Send {
    fn has_bone(&self, bone: &str) -> bool;

    /// Returns `false` when the avatar has no bone with this name.
    fn set_bone_rotation(&mut self, bone: &str, rotation: Rotation) -> bool;
}

pub type SharedTarget = Arc<Mutex<dyn RigTarget>>;
pub type SharedSkeleton = Arc<Mutex<dyn Skeleton>>;

/// Lock a renderer handle, recovering the data if a previous holder panicked.
pub(crate) fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Plain morph-target mesh: a name → index dictionary plus an influence array.
#[derive(Debug, Clone)]
pub struct MorphMesh {
    name: String,
    dictionary: HashMap<String, usize>,
    influences: Vec<f32>,
}

impl MorphMesh {
    pub fn new<I, S>(name: impl Into<String>, morph_names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut dictionary = HashMap::new();
        for morph in morph_names {
            let next = dictionary.len();
            dictionary.entry(morph.into()).or_insert(next);
        }
        let influences = vec![0.0; dictionary.len()];
        Self {
            name: name.into(),
            dictionary,
            influences,
        }
    }

    pub fn influence(&self, morph: &str) -> Option<f32> {
        self.dictionary
            .get(morph)
            .and_then(|index| self.influences.get(*index))
            .copied()
    }

    pub fn influences(&self) -> &[f32] {
        &self.influences
    }
}

impl RigTarget for MorphMesh {
    fn name(&self) -> &str {
        &self.name
    }

    fn morph_index(&self, blendshape: &str) -> Option<usize> {
        self.dictionary.get(blendshape).copied()
    }

    fn set_morph_influence(&mut self, index: usize, influence: f32) {
        if let Some(slot) = self.influences.get_mut(index) {
            *slot = influence;
        }
    }
}

/// Skeleton made of independently rotatable named bones.
#[derive(Debug, Clone, Default)]
pub struct BoneSet {
    rotations: HashMap<String, Rotation>,
}

impl BoneSet {
    pub fn with_bones<I, S>(bones: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            rotations: bones
                .into_iter()
                .map(|bone| (bone.into(), Rotation::ZERO))
                .collect(),
        }
    }

    pub fn rotation(&self, bone: &str) -> Option<Rotation> {
        self.rotations.get(bone).copied()
    }
}

impl Skeleton for BoneSet {
    fn has_bone(&self, bone: &str) -> bool {
        self.rotations.contains_key(bone)
    }

    fn set_bone_rotation(&mut self, bone: &str, rotation: Rotation) -> bool {
        match self.rotations.get_mut(bone) {
            Some(slot) => {
                *slot = rotation;
                true
            }
            None => false,
        }
    }
}
