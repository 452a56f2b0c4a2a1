//! Pose model boundary: pose estimation + classification traits and their errors.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::capture::Frame;
use crate::prediction::Prediction;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Keypoint {
    pub part: String,
    pub x: f32,
    pub y: f32,
    pub score: f32,
}

/// Output of the pose stage: keypoints for the overlay, features for the classifier.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PoseEstimate {
    pub frame_seq: u64,
    pub keypoints: Vec<Keypoint>,
    pub features: Vec<f32>,
}

impl PoseEstimate {
    /// Copy with keypoints below `min_part_confidence` removed.
    pub fn with_confident_keypoints(&self, min_part_confidence: f32) -> PoseEstimate {
        PoseEstimate {
            frame_seq: self.frame_seq,
            keypoints: self
                .keypoints
                .iter()
                .filter(|k| k.score >= min_part_confidence)
                .cloned()
                .collect(),
            features: self.features.clone(),
        }
    }
}

/// Pose estimator + classifier adapter.
pub trait PoseModel: Send + Sync {
    /// Run pose estimation. `Ok(None)` means no usable pose in this frame.
    fn estimate_pose(&self, frame: &Frame) -> Result<Option<PoseEstimate>, InferenceError>;

    /// Classify a pose into per-class probabilities, in model class order.
    fn classify(&self, pose: &PoseEstimate) -> Result<Vec<Prediction>, InferenceError>;
}

/// Loads a model at session start.
pub trait ModelLoader {
    fn load(&self) -> Result<Arc<dyn PoseModel>, ModelLoadError>;
}

#[derive(Debug)]
pub enum ModelLoadError {
    NotFound(String),
    Invalid(String),
}

impl std::fmt::Display for ModelLoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelLoadError::NotFound(what) => write!(f, "model not found: {what}"),
            ModelLoadError::Invalid(msg) => write!(f, "invalid model: {msg}"),
        }
    }
}

impl std::error::Error for ModelLoadError {}

#[derive(Debug)]
pub enum InferenceError {
    Failed(String),
}

impl std::fmt::Display for InferenceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InferenceError::Failed(msg) => write!(f, "inference failed: {msg}"),
        }
    }
}

impl std::error::Error for InferenceError {}
