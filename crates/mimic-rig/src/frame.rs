//! Per-frame face motion as published by the retargeting pipeline.

use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq)]
pub struct Blendshape {
    pub name: String,
    /// Raw collaborator score, nominally in [0, 1] but never clamped.
    pub score: f32,
}

impl Blendshape {
    pub fn new(name: impl Into<String>, score: f32) -> Self {
        Self {
            name: name.into(),
            score,
        }
    }
}

/// Euler rotation in radians, X-Y-Z order.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Rotation {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Rotation {
    pub const ZERO: Rotation = Rotation {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

/// One processed video frame worth of face motion.
///
/// Immutable once built; the next frame supersedes it entirely.
#[derive(Debug, Clone, PartialEq)]
pub struct FaceFrame {
    timestamp_ms: i64,
    blendshapes: Vec<Blendshape>,
    rotation: Rotation,
}

impl FaceFrame {
    /// Builds a frame, keeping the first occurrence of any repeated blendshape name.
    pub fn new(timestamp_ms: i64, blendshapes: Vec<Blendshape>, rotation: Rotation) -> Self {
        let mut seen = HashSet::with_capacity(blendshapes.len());
        let blendshapes = blendshapes
            .into_iter()
            .filter(|shape| seen.insert(shape.name.clone()))
            .collect();
        Self {
            timestamp_ms,
            blendshapes,
            rotation,
        }
    }

    pub fn timestamp_ms(&self) -> i64 {
        self.timestamp_ms
    }

    pub fn blendshapes(&self) -> &[Blendshape] {
        &self.blendshapes
    }

    pub fn rotation(&self) -> Rotation {
        self.rotation
    }

    pub fn score(&self, name: &str) -> Option<f32> {
        self.blendshapes
            .iter()
            .find(|shape| shape.name == name)
            .map(|shape| shape.score)
    }
}

/// 4x4 transform stored column-major, as produced by the face landmarker.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Matrix4 {
    elements: [f32; 16],
}

impl Matrix4 {
    pub const IDENTITY: Matrix4 = Matrix4 {
        elements: [
            1.0, 0.0, 0.0, 0.0, //
            0.0, 1.0, 0.0, 0.0, //
            0.0, 0.0, 1.0, 0.0, //
            0.0, 0.0, 0.0, 1.0,
        ],
    };

    pub fn from_column_major(elements: [f32; 16]) -> Self {
        Self { elements }
    }

    /// Returns `None` unless exactly 16 values are given.
    pub fn from_slice(data: &[f32]) -> Option<Self> {
        let elements: [f32; 16] = data.try_into().ok()?;
        Some(Self { elements })
    }

    pub fn elements(&self) -> &[f32; 16] {
        &self.elements
    }

    /// Decomposes the upper 3x3 (assumed unscaled) into X-Y-Z Euler angles.
    pub fn euler_xyz(&self) -> Rotation {
        let e = &self.elements;
        let (m11, m12, m13) = (e[0], e[4], e[8]);
        let (m22, m23) = (e[5], e[9]);
        let (m32, m33) = (e[6], e[10]);

        let y = m13.clamp(-1.0, 1.0).asin();
        if m13.abs() < 0.999_999_9 {
            Rotation::new((-m23).atan2(m33), y, (-m12).atan2(m11))
        } else {
            // Gimbal lock: fold all roll into x.
            Rotation::new(m32.atan2(m22), y, 0.0)
        }
    }
}
