//! Display session state: the single "currently detected" slot and the
//! cancellable timers that move the display back to neutral.
//!
//! Each confirmation advances a timer generation. Pending timers from the
//! previous confirmation are cancelled, and a timer that wakes after being
//! superseded checks its guard before touching the sink or the slot.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cancellation::{GenerationGuard, TaskGeneration};
use crate::prediction::{ClassLabel, COMPLETED_IMAGE, NEUTRAL_IMAGE};
use crate::sink::ActionSink;

/// `currentDetectedClass`: at most one label on display.
pub struct DisplaySlot {
    current: RwLock<Option<ClassLabel>>,
}

impl DisplaySlot {
    pub fn new() -> Self {
        Self {
            current: RwLock::new(None),
        }
    }

    pub fn current(&self) -> Option<ClassLabel> {
        self.current.read().clone()
    }

    pub fn is_active(&self) -> bool {
        self.current.read().is_some()
    }

    pub fn set(&self, label: ClassLabel) {
        *self.current.write() = Some(label);
    }

    /// Run `on_clear` and empty the slot, unless a different label took it
    /// over. Both happen under the write lock, so a concurrent `set` lands
    /// either before (and wins) or after. Returns whether `on_clear` ran.
    pub fn clear_if(&self, label: &ClassLabel, on_clear: impl FnOnce()) -> bool {
        let mut current = self.current.write();
        match current.as_ref() {
            Some(held) if held != label => {
                debug!(held = %held, expected = %label, "display_slot_taken_over");
                false
            }
            _ => {
                on_clear();
                if current.take().is_some() {
                    debug!(label = %label, "display_slot_cleared");
                }
                true
            }
        }
    }
}

impl Default for DisplaySlot {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle to the two deferred display actions of one confirmation.
pub struct ScheduledDisplay {
    guard: GenerationGuard,
    completed: Option<JoinHandle<()>>,
    reset: JoinHandle<()>,
}

impl ScheduledDisplay {
    pub fn generation(&self) -> u64 {
        self.guard.my_generation()
    }

    pub fn cancel(&self) {
        self.guard.token().cancel();
    }

    pub fn is_pending(&self) -> bool {
        self.guard.should_continue() && !self.reset.is_finished()
    }

    /// Wait until both timer tasks have ended (fired or cancelled).
    pub async fn join(self) {
        if let Some(completed) = self.completed {
            let _ = completed.await;
        }
        let _ = self.reset.await;
    }
}

/// Schedules the "Completed" and "Neutral" follow-ups after a confirmation.
pub struct DisplayTimers {
    generations: TaskGeneration,
    sink: Arc<dyn ActionSink>,
    slot: Arc<DisplaySlot>,
    completed_delay: Duration,
    display_hold: Duration,
    show_completed: bool,
}

impl DisplayTimers {
    pub fn new(
        sink: Arc<dyn ActionSink>,
        slot: Arc<DisplaySlot>,
        completed_delay: Duration,
        display_hold: Duration,
        show_completed: bool,
    ) -> Self {
        Self {
            generations: TaskGeneration::new(),
            sink,
            slot,
            completed_delay,
            display_hold,
            show_completed,
        }
    }

    /// Supersede any pending timers and schedule the follow-ups for `label`.
    /// Must be called from within a Tokio runtime.
    pub fn schedule(&self, label: &ClassLabel) -> ScheduledDisplay {
        let guard = self.generations.cancel_and_advance();
        info!(label = %label, generation = guard.my_generation(), "display_timers_scheduled");

        let completed = if self.show_completed {
            let sink = Arc::clone(&self.sink);
            Some(tokio::spawn(run_deferred(
                guard.clone(),
                self.completed_delay,
                move || sink.show_image(&ClassLabel::new(COMPLETED_IMAGE)),
            )))
        } else {
            None
        };

        let sink = Arc::clone(&self.sink);
        let slot = Arc::clone(&self.slot);
        let shown = label.clone();
        let reset = tokio::spawn(run_deferred(guard.clone(), self.display_hold, move || {
            slot.clear_if(&shown, || sink.show_image(&ClassLabel::new(NEUTRAL_IMAGE)));
        }));

        ScheduledDisplay {
            guard,
            completed,
            reset,
        }
    }

    /// Cancel whatever is pending (session shutdown).
    pub fn cancel_all(&self) {
        self.generations.cancel_all();
    }

    pub fn current_generation(&self) -> u64 {
        self.generations.current_generation()
    }
}

async fn run_deferred<F: FnOnce()>(guard: GenerationGuard, delay: Duration, action: F) {
    tokio::select! {
        _ = guard.token().cancelled() => {
            debug!(generation = guard.my_generation(), "display_timer_cancelled");
        }
        _ = tokio::time::sleep(delay) => {
            if guard.should_continue() {
                action();
            } else {
                debug!(generation = guard.my_generation(), "display_timer_stale");
            }
        }
    }
}
