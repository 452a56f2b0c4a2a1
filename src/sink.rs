//! Side-effect boundary: the commands the detection core emits and the sink
//! that carries them to audio/display/status collaborators.

use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::model::PoseEstimate;
use crate::prediction::{ClassLabel, Prediction};

/// A side-effecting instruction produced by one detection pass.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Play(ClassLabel),
    ShowImage(ClassLabel),
    UpdateStatus(String),
}

impl Command {
    pub fn apply(&self, sink: &dyn ActionSink) {
        match self {
            Command::Play(label) => sink.play(label),
            Command::ShowImage(label) => sink.show_image(label),
            Command::UpdateStatus(text) => sink.update_status_text(text),
        }
    }
}

/// Receiver for audio, display and status output. Called from the frame loop
/// and from display timer tasks, so implementations must be thread-safe.
pub trait ActionSink: Send + Sync {
    fn play(&self, label: &ClassLabel);

    fn show_image(&self, label: &ClassLabel);

    fn update_status_text(&self, text: &str);

    /// Full per-frame class scores, for label readouts.
    fn show_predictions(&self, _predictions: &[Prediction]) {}

    /// Pose overlay pass-through; keypoints are already confidence-filtered.
    fn draw_overlay(&self, _pose: &PoseEstimate) {}
}

/// Sound and image assets keyed by class label. An empty map disables gating
/// for that asset kind.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetCatalog {
    pub sounds: HashMap<String, PathBuf>,
    pub images: HashMap<String, PathBuf>,
}

impl AssetCatalog {
    pub fn has_sound(&self, label: &ClassLabel) -> bool {
        self.sounds.is_empty() || self.sounds.contains_key(label.as_str())
    }

    pub fn has_image(&self, label: &ClassLabel) -> bool {
        self.images.is_empty() || self.images.contains_key(label.as_str())
    }

    pub fn sound_path(&self, label: &ClassLabel) -> Option<&PathBuf> {
        self.sounds.get(label.as_str())
    }

    pub fn image_path(&self, label: &ClassLabel) -> Option<&PathBuf> {
        self.images.get(label.as_str())
    }
}

/// Sink that only logs what would be played/shown.
pub struct TracingSink {
    assets: AssetCatalog,
}

impl TracingSink {
    pub fn new(assets: AssetCatalog) -> Self {
        Self { assets }
    }
}

impl ActionSink for TracingSink {
    fn play(&self, label: &ClassLabel) {
        match self.assets.sound_path(label) {
            Some(path) => info!(label = %label, path = %path.display(), "play_sound"),
            None => info!(label = %label, "play_sound"),
        }
    }

    fn show_image(&self, label: &ClassLabel) {
        match self.assets.image_path(label) {
            Some(path) => info!(label = %label, path = %path.display(), "show_image"),
            None => info!(label = %label, "show_image"),
        }
    }

    fn update_status_text(&self, text: &str) {
        debug!(text, "status_text");
    }

    fn show_predictions(&self, predictions: &[Prediction]) {
        debug!(scores = ?format_predictions(predictions), "class_scores");
    }

    fn draw_overlay(&self, pose: &PoseEstimate) {
        debug!(frame = pose.frame_seq, keypoints = pose.keypoints.len(), "pose_overlay");
    }
}

/// Sink that writes one JSON object per event to a writer (stdout in the CLI).
pub struct JsonEventSink<W: Write + Send> {
    out: Mutex<W>,
    assets: AssetCatalog,
}

impl<W: Write + Send> JsonEventSink<W> {
    pub fn new(out: W, assets: AssetCatalog) -> Self {
        Self {
            out: Mutex::new(out),
            assets,
        }
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner()
    }

    fn emit(&self, event: serde_json::Value) {
        let mut out = self.out.lock();
        if let Err(e) = writeln!(out, "{event}") {
            warn!(error = %e, "event write failed");
        }
    }
}

impl<W: Write + Send> ActionSink for JsonEventSink<W> {
    fn play(&self, label: &ClassLabel) {
        self.emit(serde_json::json!({
            "event": "play",
            "label": label,
            "asset": self.assets.sound_path(label),
        }));
    }

    fn show_image(&self, label: &ClassLabel) {
        self.emit(serde_json::json!({
            "event": "show_image",
            "label": label,
            "asset": self.assets.image_path(label),
        }));
    }

    fn update_status_text(&self, text: &str) {
        self.emit(serde_json::json!({ "event": "status", "text": text }));
    }

    fn show_predictions(&self, predictions: &[Prediction]) {
        self.emit(serde_json::json!({
            "event": "scores",
            "lines": format_predictions(predictions),
        }));
    }

    fn draw_overlay(&self, pose: &PoseEstimate) {
        let parts: Vec<&str> = pose.keypoints.iter().map(|k| k.part.as_str()).collect();
        self.emit(serde_json::json!({
            "event": "overlay",
            "frame": pose.frame_seq,
            "keypoints": pose.keypoints.len(),
            "parts": parts,
        }));
    }
}

/// `"{label}: {p:.2}"` lines for a per-class score readout.
pub fn format_predictions(predictions: &[Prediction]) -> Vec<String> {
    predictions
        .iter()
        .map(|p| format!("{}: {:.2}", p.label, p.probability))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Keypoint;

    #[test]
    fn empty_catalog_does_not_gate() {
        let catalog = AssetCatalog::default();
        assert!(catalog.has_sound(&"Zoom".into()));
        assert!(catalog.has_image(&"Completed".into()));
    }

    #[test]
    fn populated_catalog_gates_unknown_labels() {
        let mut catalog = AssetCatalog::default();
        catalog.sounds.insert("Zoom".into(), "sounds/zoom.mp3".into());
        catalog.images.insert("Neutral".into(), "img/neutral.png".into());

        assert!(catalog.has_sound(&"Zoom".into()));
        assert!(!catalog.has_sound(&"Speaking".into()));
        assert!(!catalog.has_image(&"Completed".into()));
    }

    #[test]
    fn json_sink_writes_one_line_per_event() {
        let sink = JsonEventSink::new(Vec::new(), AssetCatalog::default());
        Command::Play("Zoom".into()).apply(&sink);
        Command::UpdateStatus("No detection".into()).apply(&sink);

        let out = String::from_utf8(sink.into_inner()).unwrap();
        let lines: Vec<serde_json::Value> = out
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["event"], "play");
        assert_eq!(lines[0]["label"], "Zoom");
        assert_eq!(lines[1]["text"], "No detection");
    }

    #[test]
    fn json_sink_writes_scores_and_overlay() {
        let sink = JsonEventSink::new(Vec::new(), AssetCatalog::default());
        sink.show_predictions(&[Prediction::new("Zoom", 0.9), Prediction::new("Default", 0.1)]);
        let pose = PoseEstimate {
            frame_seq: 7,
            keypoints: vec![
                Keypoint { part: "nose".into(), x: 1.0, y: 2.0, score: 0.9 },
                Keypoint { part: "leftWrist".into(), x: 3.0, y: 4.0, score: 0.2 },
            ],
            features: Vec::new(),
        };
        sink.draw_overlay(&pose.with_confident_keypoints(0.5));

        let out = String::from_utf8(sink.into_inner()).unwrap();
        let lines: Vec<serde_json::Value> = out
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["event"], "scores");
        assert_eq!(lines[0]["lines"], serde_json::json!(["Zoom: 0.90", "Default: 0.10"]));
        assert_eq!(lines[1]["event"], "overlay");
        assert_eq!(lines[1]["frame"], 7);
        assert_eq!(lines[1]["keypoints"], 1);
        assert_eq!(lines[1]["parts"], serde_json::json!(["nose"]));
    }

    #[test]
    fn tracing_sink_accepts_scores_and_overlay() {
        let sink: &dyn ActionSink = &TracingSink::new(AssetCatalog::default());
        sink.show_predictions(&[Prediction::new("Zoom", 0.9)]);
        sink.draw_overlay(&PoseEstimate::default());
        sink.update_status_text("No detection");
    }

    #[test]
    fn prediction_readout_uses_two_decimals() {
        let lines = format_predictions(&[Prediction::new("Zoom", 0.876), Prediction::new("Default", 0.1)]);
        assert_eq!(lines, vec!["Zoom: 0.88".to_string(), "Default: 0.10".to_string()]);
    }
}
