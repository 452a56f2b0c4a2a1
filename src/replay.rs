//! Replay source: a JSON-lines file of recorded classifier output stands in
//! for the webcam + pose model pair.
//!
//! Each non-blank line is one frame, either a bare prediction list
//! (`[{"label":"Zoom","probability":0.9}]`) or an object with optional
//! `predictions`, `keypoints`, `pose` (false = no pose found) and `error`.
//! Lines starting with `#` are comments.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Deserialize;
use tracing::info;

use crate::capture::{Camera, CaptureError, Frame};
use crate::model::{InferenceError, Keypoint, ModelLoadError, ModelLoader, PoseEstimate, PoseModel};
use crate::prediction::Prediction;

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum ReplayLine {
    Predictions(Vec<Prediction>),
    Frame(ReplayFrame),
}

/// One recorded frame.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReplayFrame {
    #[serde(default)]
    pub predictions: Vec<Prediction>,
    #[serde(default)]
    pub keypoints: Vec<Keypoint>,
    #[serde(default = "default_pose")]
    pub pose: bool,
    #[serde(default)]
    pub error: Option<String>,
}

fn default_pose() -> bool {
    true
}

/// Parsed replay file.
#[derive(Debug, Clone, Default)]
pub struct ReplayScript {
    frames: Vec<ReplayFrame>,
}

impl ReplayScript {
    pub fn from_frames(frames: Vec<ReplayFrame>) -> Self {
        Self { frames }
    }

    pub fn parse(content: &str) -> Result<Self, ModelLoadError> {
        let mut frames = Vec::new();
        for (idx, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let parsed: ReplayLine = serde_json::from_str(line)
                .map_err(|e| ModelLoadError::Invalid(format!("replay line {}: {e}", idx + 1)))?;
            frames.push(match parsed {
                ReplayLine::Predictions(predictions) => ReplayFrame {
                    predictions,
                    pose: true,
                    ..ReplayFrame::default()
                },
                ReplayLine::Frame(frame) => frame,
            });
        }
        Ok(Self { frames })
    }

    pub fn load_from_file(path: &Path) -> Result<Self, ModelLoadError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ModelLoadError::NotFound(format!("{}: {e}", path.display())))?;
        let script = Self::parse(&content)?;
        info!(path = %path.display(), frames = script.len(), "replay_loaded");
        Ok(script)
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    fn frame(&self, seq: u64) -> Option<&ReplayFrame> {
        self.frames.get(seq as usize)
    }
}

/// Camera that yields one empty frame per recorded line, then ends.
pub struct ReplayCamera {
    script: Arc<ReplayScript>,
    next_seq: AtomicU64,
}

impl ReplayCamera {
    pub fn new(script: Arc<ReplayScript>) -> Self {
        Self {
            script,
            next_seq: AtomicU64::new(0),
        }
    }
}

impl Camera for ReplayCamera {
    fn start(&self) -> Result<(), CaptureError> {
        if self.script.is_empty() {
            return Err(CaptureError::DeviceUnavailable("replay has no frames".into()));
        }
        Ok(())
    }

    fn capture_frame(&self) -> Result<Frame, CaptureError> {
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        if seq as usize >= self.script.len() {
            return Err(CaptureError::StreamEnded);
        }
        Ok(Frame::empty(seq))
    }
}

/// Model that answers each frame with its recorded output.
pub struct ReplayModel {
    script: Arc<ReplayScript>,
}

impl ReplayModel {
    pub fn new(script: Arc<ReplayScript>) -> Self {
        Self { script }
    }

    fn lookup(&self, seq: u64) -> Result<&ReplayFrame, InferenceError> {
        self.script
            .frame(seq)
            .ok_or_else(|| InferenceError::Failed(format!("no recorded frame {seq}")))
    }
}

impl PoseModel for ReplayModel {
    fn estimate_pose(&self, frame: &Frame) -> Result<Option<PoseEstimate>, InferenceError> {
        let recorded = self.lookup(frame.seq)?;
        if let Some(msg) = &recorded.error {
            return Err(InferenceError::Failed(msg.clone()));
        }
        if !recorded.pose {
            return Ok(None);
        }
        Ok(Some(PoseEstimate {
            frame_seq: frame.seq,
            keypoints: recorded.keypoints.clone(),
            features: Vec::new(),
        }))
    }

    fn classify(&self, pose: &PoseEstimate) -> Result<Vec<Prediction>, InferenceError> {
        Ok(self.lookup(pose.frame_seq)?.predictions.clone())
    }
}

impl ModelLoader for Arc<ReplayScript> {
    fn load(&self) -> Result<Arc<dyn PoseModel>, ModelLoadError> {
        Ok(Arc::new(ReplayModel::new(Arc::clone(self))))
    }
}
