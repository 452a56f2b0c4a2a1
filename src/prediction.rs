//! Classifier output types and per-frame winner selection.

use serde::{Deserialize, Serialize};

/// Identifier of a detectable class. Trimmed, case-sensitive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClassLabel(String);

impl ClassLabel {
    pub fn new(raw: impl AsRef<str>) -> Self {
        Self(raw.as_ref().trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ClassLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ClassLabel {
    fn from(s: &str) -> Self {
        ClassLabel::new(s)
    }
}

/// Sentinel image shown while nothing is confirmed.
pub const NEUTRAL_IMAGE: &str = "Neutral";
/// Sentinel image shown shortly after a confirmation.
pub const COMPLETED_IMAGE: &str = "Completed";

/// One class score for one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    #[serde(alias = "className")]
    pub label: String,
    pub probability: f32,
}

impl Prediction {
    pub fn new(label: impl Into<String>, probability: f32) -> Self {
        Self {
            label: label.into(),
            probability,
        }
    }
}

/// Pick the frame's winning class: highest probability, ties broken by the
/// lexicographically smallest trimmed label. Returns None for an empty set.
pub fn select_winner(predictions: &[Prediction]) -> Option<(ClassLabel, f32)> {
    predictions
        .iter()
        .map(|p| (ClassLabel::new(&p.label), p.probability))
        .reduce(|best, next| {
            if next.1 > best.1 || (next.1 == best.1 && next.0 < best.0) {
                next
            } else {
                best
            }
        })
}
