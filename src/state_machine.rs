//! Detection confirmation: Idle → Candidate → Confirmed → Cooling → Idle.
//! Phases are not stored; they follow from two per-class timestamps
//! (hold start and last fire) plus the shared display slot.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::config::DetectionConfig;
use crate::display::DisplaySlot;
use crate::prediction::{ClassLabel, NEUTRAL_IMAGE};
use crate::sink::Command;
use crate::smoothing::SmoothingWindow;

/// Conceptual per-class phase, derived from the class record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DetectionPhase {
    Idle,
    Candidate,
    Cooling,
}

impl std::fmt::Display for DetectionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DetectionPhase::Idle => write!(f, "Idle"),
            DetectionPhase::Candidate => write!(f, "Candidate"),
            DetectionPhase::Cooling => write!(f, "Cooling"),
        }
    }
}

/// What one evaluation decided for the winning class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Decision {
    /// Smoothed confidence under threshold; hold cleared.
    BelowThreshold,
    /// Hold period just started.
    HoldStarted,
    /// Still inside the hold period.
    Holding,
    /// Hold reached and cooldown elapsed: action fired.
    Confirmed,
    /// Hold reached but the class is still cooling down; hold consumed.
    Suppressed,
}

/// Result of one frame's detection pass.
#[derive(Debug, Clone)]
pub struct FrameOutcome {
    pub label: ClassLabel,
    pub average: f32,
    pub decision: Decision,
    pub commands: Vec<Command>,
}

impl FrameOutcome {
    pub fn is_confirmation(&self) -> bool {
        self.decision == Decision::Confirmed
    }
}

/// Smoothing window + hold timer + cooldown timer for one class.
#[derive(Debug, Clone)]
struct ClassRecord {
    window: SmoothingWindow,
    hold_start: Option<Instant>,
    last_fired: Option<Instant>,
}

impl ClassRecord {
    fn new(buffer_size: usize) -> Self {
        Self {
            window: SmoothingWindow::new(buffer_size),
            hold_start: None,
            last_fired: None,
        }
    }
}

/// Read-only view of a class record.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassSnapshot {
    pub hold_start: Option<Instant>,
    pub last_fired: Option<Instant>,
    pub buffered: usize,
    pub average: f32,
}

/// Per-class detection state, created lazily on first sighting of a label.
pub struct DetectionStateMachine {
    config: DetectionConfig,
    classes: HashMap<ClassLabel, ClassRecord>,
    display: Arc<DisplaySlot>,
}

impl DetectionStateMachine {
    pub fn new(config: DetectionConfig, display: Arc<DisplaySlot>) -> Self {
        Self {
            config,
            classes: HashMap::new(),
            display,
        }
    }

    pub fn config(&self) -> &DetectionConfig {
        &self.config
    }

    pub fn display(&self) -> &Arc<DisplaySlot> {
        &self.display
    }

    fn record_mut(&mut self, label: &ClassLabel) -> &mut ClassRecord {
        let buffer_size = self.config.buffer_size;
        self.classes
            .entry(label.clone())
            .or_insert_with(|| ClassRecord::new(buffer_size))
    }

    /// Smoothing contract: append `probability` to the class window and
    /// return the window mean.
    pub fn push(&mut self, label: &ClassLabel, probability: f32) -> f32 {
        self.record_mut(label).window.push(probability)
    }

    /// Smooth the winning prediction and evaluate it in one step.
    pub fn observe(&mut self, label: &ClassLabel, probability: f32, now: Instant) -> FrameOutcome {
        let average = self.push(label, probability);
        self.evaluate(label, average, now)
    }

    /// Apply the transition rules to the frame's winning class only.
    pub fn evaluate(&mut self, label: &ClassLabel, average: f32, now: Instant) -> FrameOutcome {
        let threshold = self.config.confidence_threshold;
        let hold_time = self.config.hold_time();
        let cooldown = self.config.cooldown();
        let display_active = self.display.is_active();

        let mut commands = Vec::with_capacity(4);
        let record = self.record_mut(label);

        let decision = if average >= threshold {
            match record.hold_start {
                None => {
                    record.hold_start = Some(now);
                    debug!(label = %label, average, "hold_started");
                    Decision::HoldStarted
                }
                Some(start) if now.duration_since(start) >= hold_time => {
                    // A completed hold is consumed whether or not it fires.
                    record.hold_start = None;
                    let cooled = record
                        .last_fired
                        .map_or(true, |last| now.duration_since(last) > cooldown);
                    if cooled {
                        record.last_fired = Some(now);
                        commands.push(Command::Play(label.clone()));
                        commands.push(Command::ShowImage(label.clone()));
                        Decision::Confirmed
                    } else {
                        debug!(label = %label, "confirmation_suppressed_by_cooldown");
                        Decision::Suppressed
                    }
                }
                Some(_) => Decision::Holding,
            }
        } else {
            record.hold_start = None;
            if !display_active {
                commands.push(Command::ShowImage(ClassLabel::new(NEUTRAL_IMAGE)));
            }
            Decision::BelowThreshold
        };

        if decision == Decision::Confirmed {
            self.display.set(label.clone());
            info!(label = %label, average, "detection_confirmed");
        }

        commands.push(Command::UpdateStatus(status_text(label, average, threshold)));

        FrameOutcome {
            label: label.clone(),
            average,
            decision,
            commands,
        }
    }

    /// Derived phase of `label` at `now`.
    pub fn phase(&self, label: &ClassLabel, now: Instant) -> DetectionPhase {
        let Some(record) = self.classes.get(label) else {
            return DetectionPhase::Idle;
        };
        if let Some(last) = record.last_fired {
            if now.duration_since(last) <= self.config.cooldown() {
                return DetectionPhase::Cooling;
            }
        }
        if record.hold_start.is_some() {
            DetectionPhase::Candidate
        } else {
            DetectionPhase::Idle
        }
    }

    pub fn snapshot(&self, label: &ClassLabel) -> Option<ClassSnapshot> {
        self.classes.get(label).map(|r| ClassSnapshot {
            hold_start: r.hold_start,
            last_fired: r.last_fired,
            buffered: r.window.len(),
            average: r.window.average(),
        })
    }

    /// Labels seen so far, sorted.
    pub fn known_labels(&self) -> Vec<ClassLabel> {
        let mut labels: Vec<ClassLabel> = self.classes.keys().cloned().collect();
        labels.sort();
        labels
    }
}

/// Status line for one frame.
pub fn status_text(label: &ClassLabel, average: f32, threshold: f32) -> String {
    if average >= threshold {
        format!("Detected: {} ({:.2}%)", label, average * 100.0)
    } else {
        "No detection".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn machine() -> DetectionStateMachine {
        DetectionStateMachine::new(DetectionConfig::default(), Arc::new(DisplaySlot::new()))
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    /// Feed `label` at `p` every 100ms over `[from, to]` (ms offsets), returning
    /// the offsets at which confirmations fired.
    fn feed(
        sm: &mut DetectionStateMachine,
        t0: Instant,
        label: &str,
        p: f32,
        from: u64,
        to: u64,
    ) -> Vec<u64> {
        let label = ClassLabel::new(label);
        let mut fired = Vec::new();
        let mut t = from;
        while t <= to {
            let out = sm.observe(&label, p, t0 + ms(t));
            if out.is_confirmation() {
                fired.push(t);
            }
            t += 100;
        }
        fired
    }

    #[test]
    fn pinned_confidence_fires_once_at_hold_time() {
        let mut sm = machine();
        let t0 = Instant::now();
        // 25 frames, 0..=2400ms.
        let fired = feed(&mut sm, t0, "Zoom", 0.9, 0, 2400);
        assert_eq!(fired, vec![2000]);
    }

    #[test]
    fn confirmation_emits_play_show_and_status() {
        let mut sm = machine();
        let t0 = Instant::now();
        let zoom = ClassLabel::new("Zoom");
        feed(&mut sm, t0, "Zoom", 0.9, 0, 1900);

        let out = sm.observe(&zoom, 0.9, t0 + ms(2000));
        assert_eq!(out.decision, Decision::Confirmed);
        assert_eq!(
            out.commands,
            vec![
                Command::Play(zoom.clone()),
                Command::ShowImage(zoom.clone()),
                Command::UpdateStatus("Detected: Zoom (90.00%)".into()),
            ]
        );
        assert_eq!(sm.display().current(), Some(zoom));
    }

    #[test]
    fn cooldown_suppresses_second_hold_and_consumes_it() {
        let mut sm = machine();
        let t0 = Instant::now();
        let fired = feed(&mut sm, t0, "Zoom", 0.9, 0, 4500);
        assert_eq!(fired, vec![2000]);

        // Hold restarted at 2100 and matured at 4100, inside the cooldown:
        // suppressed, and the hold restarted at 4200.
        let snap = sm.snapshot(&"Zoom".into()).unwrap();
        assert_eq!(snap.hold_start, Some(t0 + ms(4200)));
        assert_eq!(snap.last_fired, Some(t0 + ms(2000)));
    }

    #[test]
    fn steady_confidence_fires_every_hold_plus_suppressed_cycle() {
        let mut sm = machine();
        let t0 = Instant::now();
        let fired = feed(&mut sm, t0, "Zoom", 0.9, 0, 12000);
        assert_eq!(fired, vec![2000, 6200, 10400]);
        for pair in fired.windows(2) {
            assert!(pair[1] - pair[0] > 3000);
        }
    }

    #[test]
    fn oscillating_confidence_never_confirms() {
        let mut sm = machine();
        let t0 = Instant::now();
        let zoom = ClassLabel::new("Zoom");
        for frame in 0..200u64 {
            let p = if (frame / 5) % 2 == 0 { 0.9 } else { 0.5 };
            let out = sm.observe(&zoom, p, t0 + ms(frame * 100));
            assert!(!out.is_confirmation(), "confirmed at frame {frame}");
        }
        assert!(sm.snapshot(&zoom).unwrap().last_fired.is_none());
    }

    #[test]
    fn drop_below_threshold_resets_hold() {
        let mut sm = machine();
        let t0 = Instant::now();
        let zoom = ClassLabel::new("Zoom");
        sm.evaluate(&zoom, 0.9, t0);
        sm.evaluate(&zoom, 0.9, t0 + ms(1500));
        let out = sm.evaluate(&zoom, 0.5, t0 + ms(1600));
        assert_eq!(out.decision, Decision::BelowThreshold);
        assert!(sm.snapshot(&zoom).unwrap().hold_start.is_none());

        // Fresh hold period starts at the next rise.
        assert_eq!(sm.evaluate(&zoom, 0.9, t0 + ms(1700)).decision, Decision::HoldStarted);
        assert_eq!(sm.evaluate(&zoom, 0.9, t0 + ms(3600)).decision, Decision::Holding);
        assert_eq!(sm.evaluate(&zoom, 0.9, t0 + ms(3700)).decision, Decision::Confirmed);
    }

    #[test]
    fn threshold_is_inclusive_and_cooldown_exclusive() {
        let mut sm = machine();
        let t0 = Instant::now();
        let zoom = ClassLabel::new("Zoom");
        assert_eq!(sm.evaluate(&zoom, 0.75, t0).decision, Decision::HoldStarted);
        assert_eq!(sm.evaluate(&zoom, 0.75, t0 + ms(2000)).decision, Decision::Confirmed);

        // Exactly `cooldown` after the fire is still cooling.
        sm.evaluate(&zoom, 0.9, t0 + ms(3000));
        assert_eq!(sm.evaluate(&zoom, 0.9, t0 + ms(5000)).decision, Decision::Suppressed);
        sm.evaluate(&zoom, 0.9, t0 + ms(5001));
        assert_eq!(sm.evaluate(&zoom, 0.9, t0 + ms(7001)).decision, Decision::Confirmed);
    }

    #[test]
    fn alternating_winners_progress_independently() {
        let mut sm = machine();
        let t0 = Instant::now();
        let a = ClassLabel::new("Zoom");
        let b = ClassLabel::new("Speaking");
        let mut fired = Vec::new();
        for frame in 0..=25u64 {
            let label = if frame % 2 == 0 { &a } else { &b };
            let out = sm.observe(label, 0.9, t0 + ms(frame * 100));
            if out.is_confirmation() {
                fired.push((label.to_string(), frame * 100));
            }
        }
        assert_eq!(
            fired,
            vec![("Zoom".to_string(), 2000), ("Speaking".to_string(), 2100)]
        );
        assert_eq!(sm.display().current(), Some(b));
    }

    #[test]
    fn losing_class_hold_is_left_untouched() {
        // Only the per-frame winner is evaluated; a class that stops winning
        // keeps its old hold start. Updating every class from its own score
        // each frame would clear it instead.
        let mut sm = machine();
        let t0 = Instant::now();
        let a = ClassLabel::new("Zoom");
        let b = ClassLabel::new("Speaking");
        sm.observe(&a, 0.9, t0);
        for frame in 1..30u64 {
            sm.observe(&b, 0.4, t0 + ms(frame * 100));
        }
        assert_eq!(sm.snapshot(&a).unwrap().hold_start, Some(t0));
        assert_eq!(sm.phase(&a, t0 + ms(3000)), DetectionPhase::Candidate);

        // The stale hold matures the moment the class wins again.
        let out = sm.observe(&a, 0.9, t0 + ms(3000));
        assert_eq!(out.decision, Decision::Confirmed);
    }

    #[test]
    fn neutral_shown_only_when_nothing_on_display() {
        let mut sm = machine();
        let t0 = Instant::now();
        let zoom = ClassLabel::new("Zoom");
        let neutral = Command::ShowImage(ClassLabel::new(NEUTRAL_IMAGE));

        let out = sm.evaluate(&zoom, 0.2, t0);
        assert_eq!(out.commands, vec![neutral.clone(), Command::UpdateStatus("No detection".into())]);

        sm.display().set(ClassLabel::new("Speaking"));
        let out = sm.evaluate(&zoom, 0.2, t0 + ms(100));
        assert!(!out.commands.contains(&neutral));
    }

    #[test]
    fn phases_follow_timers() {
        let mut sm = machine();
        let t0 = Instant::now();
        let zoom = ClassLabel::new("Zoom");
        assert_eq!(sm.phase(&zoom, t0), DetectionPhase::Idle);
        sm.evaluate(&zoom, 0.9, t0);
        assert_eq!(sm.phase(&zoom, t0), DetectionPhase::Candidate);
        sm.evaluate(&zoom, 0.9, t0 + ms(2000));
        assert_eq!(sm.phase(&zoom, t0 + ms(2000)), DetectionPhase::Cooling);
        assert_eq!(sm.phase(&zoom, t0 + ms(5001)), DetectionPhase::Idle);
    }

    #[test]
    fn classes_are_created_lazily() {
        let mut sm = machine();
        assert!(sm.known_labels().is_empty());
        sm.push(&"Zoom".into(), 0.3);
        sm.push(&"Default".into(), 0.3);
        assert_eq!(sm.known_labels(), vec![ClassLabel::new("Default"), ClassLabel::new("Zoom")]);
        assert_eq!(sm.snapshot(&"Zoom".into()).unwrap().buffered, 1);
    }
}
