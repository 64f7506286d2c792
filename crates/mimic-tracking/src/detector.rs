//! Face landmarker collaborator: its output shape, options and a replay implementation.

use std::path::Path;

use async_trait::async_trait;
use mimic_common::{Error, Result};
use mimic_rig::Matrix4;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::video::VideoFrame;

pub const DEFAULT_MODEL_ASSET_PATH: &str = "https://storage.googleapis.com/mediapipe-models/face_landmarker/face_landmarker/float16/1/face_landmarker.task";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub category_name: String,
    pub score: f32,
}

/// Blendshape classification for one detected face.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Classifications {
    #[serde(default)]
    pub categories: Vec<Category>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformMatrix {
    pub rows: usize,
    pub columns: usize,
    pub data: Vec<f32>,
}

impl TransformMatrix {
    /// Interprets the payload as a column-major 4×4 matrix.
    pub fn to_matrix(&self) -> Option<Matrix4> {
        if self.rows != 4 || self.columns != 4 {
            return None;
        }
        Matrix4::from_slice(&self.data)
    }
}

/// Raw result of one landmarker call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InferenceOutput {
    #[serde(default)]
    pub face_blendshapes: Vec<Classifications>,
    #[serde(default)]
    pub facial_transformation_matrixes: Vec<TransformMatrix>,
}

impl InferenceOutput {
    /// Blendshape categories of the first face, or `None` when no face was found.
    pub fn first_face_blendshapes(&self) -> Option<&[Category]> {
        self.face_blendshapes
            .first()
            .map(|face| face.categories.as_slice())
            .filter(|categories| !categories.is_empty())
    }

    pub fn first_transform(&self) -> Option<Matrix4> {
        self.facial_transformation_matrixes
            .first()
            .and_then(TransformMatrix::to_matrix)
    }

    /// Applies the output switches and face limit of `options`.
    pub fn restrict(mut self, options: &DetectorOptions) -> Self {
        let faces = options.num_faces as usize;
        if options.output_face_blendshapes {
            self.face_blendshapes.truncate(faces);
        } else {
            self.face_blendshapes.clear();
        }
        if options.output_facial_transformation_matrixes {
            self.facial_transformation_matrixes.truncate(faces);
        } else {
            self.facial_transformation_matrixes.clear();
        }
        self
    }
}

/// The face landmarker as seen by the pipeline.
#[async_trait]
pub trait FaceDetector: Send {
    /// Runs inference on one frame. `timestamp_ms` must increase between calls.
    async fn detect(&mut self, frame: &VideoFrame, timestamp_ms: i64) -> Result<InferenceOutput>;

    fn is_ready(&self) -> bool {
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Delegate {
    Cpu,
    Gpu,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RunningMode {
    Image,
    Video,
}

/// Landmarker construction options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectorOptions {
    pub model_asset_path: String,
    pub delegate: Delegate,
    pub num_faces: u32,
    pub running_mode: RunningMode,
    pub output_face_blendshapes: bool,
    pub output_facial_transformation_matrixes: bool,
}

impl Default for DetectorOptions {
    fn default() -> Self {
        Self {
            model_asset_path: DEFAULT_MODEL_ASSET_PATH.to_string(),
            delegate: Delegate::Gpu,
            num_faces: 1,
            running_mode: RunningMode::Video,
            output_face_blendshapes: true,
            output_facial_transformation_matrixes: true,
        }
    }
}

/// Plays back recorded landmarker output, one JSON object per line.
///
/// Each call to `detect` yields the next recording; playback wraps around.
#[derive(Debug, Clone)]
pub struct ReplayDetector {
    options: DetectorOptions,
    outputs: Vec<InferenceOutput>,
    cursor: usize,
}

impl ReplayDetector {
    pub fn new(outputs: Vec<InferenceOutput>, options: DetectorOptions) -> Self {
        Self {
            options,
            outputs,
            cursor: 0,
        }
    }

    pub fn from_jsonl(text: &str, options: DetectorOptions) -> Result<Self> {
        let mut outputs = Vec::new();
        for (index, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let output: InferenceOutput = serde_json::from_str(line).map_err(|e| {
                Error::inference(format!("recording line {}: {}", index + 1, e))
            })?;
            outputs.push(output);
        }
        Ok(Self::new(outputs, options))
    }

    pub async fn load(path: impl AsRef<Path>, options: DetectorOptions) -> Result<Self> {
        let path = path.as_ref();
        let text = tokio::fs::read_to_string(path).await?;
        let detector = Self::from_jsonl(&text, options)?;
        info!(
            "Loaded {} recorded landmarker result(s) from {}",
            detector.len(),
            path.display()
        );
        Ok(detector)
    }

    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }

    pub fn options(&self) -> &DetectorOptions {
        &self.options
    }
}

#[async_trait]
impl FaceDetector for ReplayDetector {
    async fn detect(&mut self, frame: &VideoFrame, timestamp_ms: i64) -> Result<InferenceOutput> {
        if self.outputs.is_empty() {
            return Ok(InferenceOutput::default());
        }
        let output = self.outputs[self.cursor % self.outputs.len()].clone();
        self.cursor = (self.cursor + 1) % self.outputs.len();
        debug!(
            "Replaying landmarker result for frame at {:.3}s (ts={})",
            frame.position, timestamp_ms
        );
        Ok(output.restrict(&self.options))
    }

    fn is_ready(&self) -> bool {
        !self.outputs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RECORDING: &str = r#"
{"faceBlendshapes":[{"categories":[{"categoryName":"jawOpen","score":0.25,"index":24}]}],"facialTransformationMatrixes":[{"rows":4,"columns":4,"data":[1,0,0,0,0,1,0,0,0,0,1,0,0,0,-40,1]}]}

{"faceBlendshapes":[]}
"#;

    #[test]
    fn test_output_parses_landmarker_json() {
        let detector = ReplayDetector::from_jsonl(RECORDING, DetectorOptions::default()).unwrap();
        assert_eq!(detector.len(), 2);
        let first = &detector.outputs[0];
        let shapes = first.first_face_blendshapes().unwrap();
        assert_eq!(shapes[0].category_name, "jawOpen");
        assert_eq!(first.first_transform(), Some(Matrix4::from_column_major([
            1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, -40.0, 1.0,
        ])));
        assert!(detector.outputs[1].first_face_blendshapes().is_none());
    }

    #[test]
    fn test_empty_categories_mean_no_face() {
        let output = InferenceOutput {
            face_blendshapes: vec![Classifications::default()],
            facial_transformation_matrixes: Vec::new(),
        };
        assert!(output.first_face_blendshapes().is_none());
        assert!(output.first_transform().is_none());
    }

    #[test]
    fn test_non_square_matrix_is_rejected() {
        let matrix = TransformMatrix {
            rows: 3,
            columns: 3,
            data: vec![0.0; 9],
        };
        assert!(matrix.to_matrix().is_none());
    }

    #[test]
    fn test_bad_recording_line_is_reported() {
        let err = ReplayDetector::from_jsonl("{}\nnot json", DetectorOptions::default()).unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn test_default_options() {
        let options = DetectorOptions::default();
        let json = serde_json::to_value(&options).unwrap();
        assert_eq!(json["delegate"], "GPU");
        assert_eq!(json["runningMode"], "VIDEO");
        assert_eq!(json["numFaces"], 1);
        assert_eq!(json["outputFaceBlendshapes"], true);
        assert_eq!(json["outputFacialTransformationMatrixes"], true);
    }

    #[tokio::test]
    async fn test_replay_wraps_and_respects_options() {
        let options = DetectorOptions {
            output_facial_transformation_matrixes: false,
            ..DetectorOptions::default()
        };
        let mut detector = ReplayDetector::from_jsonl(RECORDING, options).unwrap();
        let frame = VideoFrame::new(0.0, 1, 1, vec![0u8]);

        let first = detector.detect(&frame, 1).await.unwrap();
        assert!(first.first_face_blendshapes().is_some());
        assert!(first.first_transform().is_none());

        let second = detector.detect(&frame, 2).await.unwrap();
        assert!(second.first_face_blendshapes().is_none());

        let third = detector.detect(&frame, 3).await.unwrap();
        assert!(third.first_face_blendshapes().is_some());
    }

    #[test]
    fn test_empty_replay_is_not_ready() {
        let detector = ReplayDetector::new(Vec::new(), DetectorOptions::default());
        assert!(!detector.is_ready());
    }
}
