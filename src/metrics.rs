//! Observability: per-session ids and latency histograms for the frame loop.
//! Each named metric keeps its most recent samples; summaries report p50/p95/p99.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use serde::Serialize;

/// Identifier attached to every log line of one detection session.
#[derive(Debug, Clone)]
pub struct SessionIds {
    pub session_id: String,
}

impl SessionIds {
    pub fn new() -> Self {
        Self {
            session_id: uuid::Uuid::new_v4().to_string(),
        }
    }
}

impl Default for SessionIds {
    fn default() -> Self {
        Self::new()
    }
}

/// Measures from creation until `finish`, then records into the registry.
pub struct TimingSpan {
    name: &'static str,
    start: Instant,
    registry: Arc<MetricsRegistry>,
}

impl TimingSpan {
    pub fn finish(self) -> f64 {
        let elapsed_us = self.start.elapsed().as_micros() as f64;
        self.registry.record(self.name, elapsed_us);
        elapsed_us
    }
}

/// Latest `capacity` samples of one metric.
struct LatencyWindow {
    samples: VecDeque<f64>,
    capacity: usize,
}

impl LatencyWindow {
    fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    fn push(&mut self, value: f64) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(value);
    }

    fn sorted(&self) -> Vec<f64> {
        let mut sorted: Vec<f64> = self.samples.iter().copied().collect();
        sorted.sort_by(f64::total_cmp);
        sorted
    }
}

/// Nearest-rank percentile over an ascending slice.
fn percentile_of(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let idx = ((p / 100.0) * (sorted.len() as f64 - 1.0)).round() as usize;
    sorted[idx.min(sorted.len() - 1)]
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricSummary {
    pub p50_us: f64,
    pub p95_us: f64,
    pub p99_us: f64,
    pub max_us: f64,
    pub count: usize,
}

/// Named latency histograms, shared between the loop and the caller.
pub struct MetricsRegistry {
    windows: Mutex<HashMap<&'static str, LatencyWindow>>,
    capacity: usize,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::with_capacity(1024)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            windows: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Record a sample in microseconds.
    pub fn record(&self, name: &'static str, value_us: f64) {
        self.windows
            .lock()
            .entry(name)
            .or_insert_with(|| LatencyWindow::new(self.capacity))
            .push(value_us);
        tracing::trace!(metric = name, value_us, "metric_recorded");
    }

    pub fn span(self: &Arc<Self>, name: &'static str) -> TimingSpan {
        TimingSpan {
            name,
            start: Instant::now(),
            registry: Arc::clone(self),
        }
    }

    pub fn count(&self, name: &str) -> usize {
        self.windows.lock().get(name).map_or(0, |w| w.samples.len())
    }

    /// Percentile (0-100) of `name` in microseconds; 0.0 when unknown.
    pub fn percentile(&self, name: &str, p: f64) -> f64 {
        self.windows
            .lock()
            .get(name)
            .map_or(0.0, |w| percentile_of(&w.sorted(), p))
    }

    pub fn summary(&self) -> BTreeMap<String, MetricSummary> {
        let windows = self.windows.lock();
        windows
            .iter()
            .map(|(&name, window)| {
                let sorted = window.sorted();
                let summary = MetricSummary {
                    p50_us: percentile_of(&sorted, 50.0),
                    p95_us: percentile_of(&sorted, 95.0),
                    p99_us: percentile_of(&sorted, 99.0),
                    max_us: sorted.last().copied().unwrap_or(0.0),
                    count: sorted.len(),
                };
                (name.to_string(), summary)
            })
            .collect()
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Well-known metric names (constants to avoid typos).
pub mod metric_names {
    pub const CAPTURE: &str = "t_capture";
    pub const INFERENCE: &str = "t_inference";
    pub const DETECTION: &str = "t_detection";
    pub const FRAME_CYCLE: &str = "t_frame_cycle";
}
