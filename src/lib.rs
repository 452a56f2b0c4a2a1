//! Posecue: turns a live pose-classification stream into confirmed cue events.
//! Per-frame classifier output is smoothed, held, rate-limited and turned into
//! sound/image/status commands for an external sink.

pub mod cancellation;
pub mod capture;
pub mod config;
pub mod display;
pub mod frame_loop;
pub mod metrics;
pub mod model;
pub mod prediction;
pub mod replay;
pub mod sink;
pub mod smoothing;
pub mod state_machine;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::{DetectionConfig, SessionConfig};
pub use frame_loop::{start_session, SessionError, SessionHandle, SessionReport};
pub use prediction::{ClassLabel, Prediction};
pub use sink::{ActionSink, Command};
pub use state_machine::{Decision, DetectionStateMachine, FrameOutcome};

/// Initialize the global tracing subscriber. `RUST_LOG` overrides the default filter.
pub fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("posecue=info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);

    let result = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    if let Err(e) = result {
        eprintln!("tracing already initialized: {e}");
    }
}
