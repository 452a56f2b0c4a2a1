//! Recording sink shared by unit tests.

use parking_lot::Mutex;

use crate::model::PoseEstimate;
use crate::prediction::{ClassLabel, Prediction};
use crate::sink::ActionSink;

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Play(String),
    Image(String),
    Status(String),
    Predictions(usize),
    Overlay(usize),
}

#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<Event>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    pub fn plays(&self) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                Event::Play(l) => Some(l.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn statuses(&self) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                Event::Status(s) => Some(s.clone()),
                _ => None,
            })
            .collect()
    }
}

impl ActionSink for RecordingSink {
    fn play(&self, label: &ClassLabel) {
        self.events.lock().push(Event::Play(label.to_string()));
    }

    fn show_image(&self, label: &ClassLabel) {
        self.events.lock().push(Event::Image(label.to_string()));
    }

    fn update_status_text(&self, text: &str) {
        self.events.lock().push(Event::Status(text.to_string()));
    }

    fn show_predictions(&self, predictions: &[Prediction]) {
        self.events.lock().push(Event::Predictions(predictions.len()));
    }

    fn draw_overlay(&self, pose: &PoseEstimate) {
        self.events.lock().push(Event::Overlay(pose.keypoints.len()));
    }
}
