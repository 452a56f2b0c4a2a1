//! Frame loop driver: capture → pose/classify → winner → smoothing →
//! detection → sink, one tick at a time.
//!
//! Ticks never overlap: the next capture starts only after the previous
//! tick's detection pass and dispatch have returned. Blocking camera and
//! model calls run on the blocking pool; per-frame failures are logged and
//! the frame is skipped. Stopping cancels scheduling; a frame captured after
//! the stop never reaches the model, and a tick that is mid inference
//! finishes but its result is dropped without touching state.

use std::sync::Arc;

use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::capture::{Camera, CaptureError};
use crate::config::SessionConfig;
use crate::display::{DisplaySlot, DisplayTimers, ScheduledDisplay};
use crate::metrics::{metric_names, MetricsRegistry, SessionIds};
use crate::model::{InferenceError, ModelLoadError, ModelLoader, PoseEstimate, PoseModel};
use crate::prediction::{select_winner, ClassLabel, Prediction, COMPLETED_IMAGE};
use crate::sink::{ActionSink, Command};
use crate::state_machine::{Decision, DetectionStateMachine, FrameOutcome};

pub const STATUS_WEBCAM_FAILED: &str = "Webcam initialization failed!";
pub const STATUS_MODEL_FAILED: &str = "Model loading failed!";
pub const STATUS_MODEL_LOADED: &str = "Model loaded!";
pub const STATUS_NO_PREDICTIONS: &str = "No predictions";
pub const STATUS_PREDICTION_ERROR: &str = "Prediction error! See console.";

/// Startup failures. Per-frame failures never surface here.
#[derive(Debug)]
pub enum SessionError {
    Acquisition(CaptureError),
    ModelLoad(ModelLoadError),
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionError::Acquisition(e) => write!(f, "session start failed: {e}"),
            SessionError::ModelLoad(e) => write!(f, "session start failed: {e}"),
        }
    }
}

impl std::error::Error for SessionError {}

/// Counters accumulated over a session, returned when the loop exits.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SessionReport {
    pub session_id: String,
    pub frames: u64,
    pub no_pose: u64,
    pub empty_predictions: u64,
    pub capture_errors: u64,
    pub inference_errors: u64,
    pub discarded: u64,
    pub confirmations: u64,
    pub suppressed: u64,
    pub confirmed_labels: Vec<String>,
}

/// Running session. Dropping the handle does not stop the loop; call `stop`.
pub struct SessionHandle {
    ids: SessionIds,
    cancel: CancellationToken,
    display: Arc<DisplaySlot>,
    join: JoinHandle<SessionReport>,
}

impl SessionHandle {
    pub fn session_id(&self) -> &str {
        &self.ids.session_id
    }

    pub fn display(&self) -> &Arc<DisplaySlot> {
        &self.display
    }

    /// Stop scheduling further ticks.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Token that stops the session when cancelled.
    pub fn stop_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Wait for the loop to exit (stream end or `stop`).
    pub async fn wait(self) -> SessionReport {
        let session_id = self.ids.session_id.clone();
        match self.join.await {
            Ok(report) => report,
            Err(e) => {
                error!(error = %e, "frame loop task panicked");
                SessionReport {
                    session_id,
                    ..SessionReport::default()
                }
            }
        }
    }

    pub async fn stop_and_wait(self) -> SessionReport {
        self.stop();
        self.wait().await
    }
}

/// Start the camera, load the model and spawn the frame loop.
/// Must be called from within a Tokio runtime.
pub async fn start_session<L>(
    config: SessionConfig,
    camera: Arc<dyn Camera>,
    loader: L,
    sink: Arc<dyn ActionSink>,
    metrics: Arc<MetricsRegistry>,
) -> Result<SessionHandle, SessionError>
where
    L: ModelLoader + Send + 'static,
{
    let ids = SessionIds::new();

    let start_camera = Arc::clone(&camera);
    let started = tokio::task::spawn_blocking(move || start_camera.start())
        .await
        .unwrap_or_else(|e| Err(CaptureError::DeviceUnavailable(format!("camera start panicked: {e}"))));
    if let Err(e) = started {
        error!(error = %e, "webcam initialization failed");
        sink.update_status_text(STATUS_WEBCAM_FAILED);
        return Err(SessionError::Acquisition(e));
    }
    info!(session_id = %ids.session_id, "webcam ready");

    let loaded = tokio::task::spawn_blocking(move || loader.load())
        .await
        .unwrap_or_else(|e| Err(ModelLoadError::Invalid(format!("model load panicked: {e}"))));
    let model = match loaded {
        Ok(model) => model,
        Err(e) => {
            error!(error = %e, "model loading failed");
            sink.update_status_text(STATUS_MODEL_FAILED);
            return Err(SessionError::ModelLoad(e));
        }
    };
    info!(session_id = %ids.session_id, "model loaded");
    sink.update_status_text(STATUS_MODEL_LOADED);

    let frame_loop = FrameLoop::new(config, camera, model, sink, metrics, ids.session_id.clone());
    let display = Arc::clone(frame_loop.machine.display());
    let cancel = CancellationToken::new();

    let span = info_span!("session", session_id = %ids.session_id);
    let join = tokio::spawn(frame_loop.run(cancel.clone()).instrument(span));

    Ok(SessionHandle {
        ids,
        cancel,
        display,
        join,
    })
}

enum Tick {
    Continue,
    Ended,
    Cancelled,
}

type InferenceOutput = Result<Option<(PoseEstimate, Vec<Prediction>)>, InferenceError>;

pub(crate) struct FrameLoop {
    config: SessionConfig,
    camera: Arc<dyn Camera>,
    model: Arc<dyn PoseModel>,
    sink: Arc<dyn ActionSink>,
    metrics: Arc<MetricsRegistry>,
    machine: DetectionStateMachine,
    timers: DisplayTimers,
    pending_display: Option<ScheduledDisplay>,
    report: SessionReport,
}

impl FrameLoop {
    pub(crate) fn new(
        config: SessionConfig,
        camera: Arc<dyn Camera>,
        model: Arc<dyn PoseModel>,
        sink: Arc<dyn ActionSink>,
        metrics: Arc<MetricsRegistry>,
        session_id: String,
    ) -> Self {
        let display = Arc::new(DisplaySlot::new());
        let show_completed = config.assets.has_image(&ClassLabel::new(COMPLETED_IMAGE));
        let timers = DisplayTimers::new(
            Arc::clone(&sink),
            Arc::clone(&display),
            config.detection.completed_delay(),
            config.detection.display_hold_duration(),
            show_completed,
        );
        let machine = DetectionStateMachine::new(config.detection.clone(), display);
        Self {
            config,
            camera,
            model,
            sink,
            metrics,
            machine,
            timers,
            pending_display: None,
            report: SessionReport {
                session_id,
                ..SessionReport::default()
            },
        }
    }

    pub(crate) async fn run(mut self, cancel: CancellationToken) -> SessionReport {
        let interval = self.config.frame_interval();
        info!(interval_ms = self.config.frame_interval_ms, "frame loop started");

        loop {
            let cycle_start = Instant::now();
            if cancel.is_cancelled() {
                break;
            }

            match self.tick(&cancel).await {
                Tick::Continue => {}
                Tick::Ended | Tick::Cancelled => break,
            }

            self.metrics.record(
                metric_names::FRAME_CYCLE,
                cycle_start.elapsed().as_micros() as f64,
            );

            let elapsed = cycle_start.elapsed();
            if elapsed < interval {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(interval - elapsed) => {}
                }
            }
        }

        if let Some(pending) = self.pending_display.take() {
            debug!(generation = pending.generation(), "cancelling pending display timers");
            pending.cancel();
        }
        self.timers.cancel_all();

        let report = self.report;
        info!(
            stats = %serde_json::to_value(&report).unwrap_or_default(),
            "frame loop stopped"
        );
        report
    }

    async fn tick(&mut self, cancel: &CancellationToken) -> Tick {
        let capture_span = self.metrics.span(metric_names::CAPTURE);
        let camera = Arc::clone(&self.camera);
        let captured = tokio::task::spawn_blocking(move || camera.capture_frame()).await;
        capture_span.finish();

        let frame = match captured {
            Ok(Ok(frame)) => frame,
            Ok(Err(CaptureError::StreamEnded)) => {
                info!("frame stream ended");
                return Tick::Ended;
            }
            Ok(Err(e)) => {
                warn!(error = %e, "frame capture failed, skipping frame");
                self.report.capture_errors += 1;
                return Tick::Continue;
            }
            Err(e) => {
                error!(error = %e, "capture task panicked");
                self.report.capture_errors += 1;
                return Tick::Continue;
            }
        };

        if cancel.is_cancelled() {
            debug!(seq = frame.seq, "session stopped mid-capture, discarding frame");
            self.report.discarded += 1;
            return Tick::Cancelled;
        }

        self.report.frames += 1;

        let inference_span = self.metrics.span(metric_names::INFERENCE);
        let model = Arc::clone(&self.model);
        let inferred = tokio::task::spawn_blocking(move || -> InferenceOutput {
            let Some(pose) = model.estimate_pose(&frame)? else {
                return Ok(None);
            };
            let predictions = model.classify(&pose)?;
            Ok(Some((pose, predictions)))
        })
        .await;
        inference_span.finish();

        if cancel.is_cancelled() {
            debug!("session stopped mid-inference, discarding result");
            self.report.discarded += 1;
            return Tick::Cancelled;
        }

        match inferred {
            Ok(Ok(Some((pose, predictions)))) => {
                self.sink.show_predictions(&predictions);
                self.sink
                    .draw_overlay(&pose.with_confident_keypoints(self.config.min_part_confidence));
                let detection_span = self.metrics.span(metric_names::DETECTION);
                self.process_predictions(&predictions, Instant::now());
                detection_span.finish();
            }
            Ok(Ok(None)) => {
                debug!("no pose in frame, skipping");
                self.report.no_pose += 1;
            }
            Ok(Err(e)) => {
                warn!(error = %e, "prediction failed, skipping frame");
                self.report.inference_errors += 1;
                self.sink.update_status_text(STATUS_PREDICTION_ERROR);
            }
            Err(e) => {
                error!(error = %e, "inference task panicked");
                self.report.inference_errors += 1;
                self.sink.update_status_text(STATUS_PREDICTION_ERROR);
            }
        }
        Tick::Continue
    }

    /// Detection pass for one frame's prediction set.
    pub(crate) fn process_predictions(
        &mut self,
        predictions: &[Prediction],
        now: Instant,
    ) -> Option<FrameOutcome> {
        let Some((label, probability)) = select_winner(predictions) else {
            self.report.empty_predictions += 1;
            self.sink.update_status_text(STATUS_NO_PREDICTIONS);
            return None;
        };

        let outcome = self.machine.observe(&label, probability, now);
        debug!(
            label = %label,
            probability,
            average = outcome.average,
            decision = ?outcome.decision,
            "frame_evaluated"
        );
        self.dispatch(&outcome);
        Some(outcome)
    }

    fn dispatch(&mut self, outcome: &FrameOutcome) {
        for command in &outcome.commands {
            match command {
                Command::Play(label) if !self.config.assets.has_sound(label) => {
                    debug!(label = %label, "no sound asset, not playing");
                }
                _ => command.apply(self.sink.as_ref()),
            }
        }

        match outcome.decision {
            Decision::Confirmed => {
                self.report.confirmations += 1;
                self.report.confirmed_labels.push(outcome.label.to_string());
                self.pending_display = Some(self.timers.schedule(&outcome.label));
            }
            Decision::Suppressed => self.report.suppressed += 1,
            _ => {}
        }
    }

    #[cfg(test)]
    pub(crate) fn machine(&self) -> &DetectionStateMachine {
        &self.machine
    }

    #[cfg(test)]
    pub(crate) fn report(&self) -> &SessionReport {
        &self.report
    }
}
