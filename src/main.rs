use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

use posecue::metrics::MetricsRegistry;
use posecue::replay::{ReplayCamera, ReplayScript};
use posecue::sink::{ActionSink, JsonEventSink};
use posecue::SessionConfig;

/// Replay recorded classifier output through the detection pipeline and
/// print the resulting cue events as JSON lines.
#[derive(Parser, Debug)]
#[command(name = "posecue", version)]
struct Args {
    /// JSON-lines file with one prediction list per frame.
    #[arg(long)]
    replay: PathBuf,

    /// Session config (JSON). Defaults are used when omitted.
    #[arg(long, env = "POSECUE_CONFIG")]
    config: Option<PathBuf>,

    /// Emit logs as JSON.
    #[arg(long)]
    json_logs: bool,

    #[arg(long)]
    threshold: Option<f32>,

    #[arg(long)]
    hold_ms: Option<u64>,

    #[arg(long)]
    cooldown_ms: Option<u64>,

    #[arg(long)]
    frame_interval_ms: Option<u64>,
}

fn load_config(args: &Args) -> Result<SessionConfig> {
    let mut config = match &args.config {
        Some(path) => SessionConfig::load_from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => SessionConfig::default(),
    };
    if let Some(threshold) = args.threshold {
        config.detection.confidence_threshold = threshold;
    }
    if let Some(hold) = args.hold_ms {
        config.detection.hold_time_ms = hold;
    }
    if let Some(cooldown) = args.cooldown_ms {
        config.detection.cooldown_ms = cooldown;
    }
    if let Some(interval) = args.frame_interval_ms {
        config.frame_interval_ms = interval;
    }
    config.validate().context("invalid config overrides")?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    posecue::init_tracing(args.json_logs);

    let config = load_config(&args)?;
    let script = Arc::new(
        ReplayScript::load_from_file(&args.replay)
            .with_context(|| format!("loading replay {}", args.replay.display()))?,
    );

    let sink: Arc<dyn ActionSink> = Arc::new(JsonEventSink::new(std::io::stdout(), config.assets.clone()));
    let metrics = Arc::new(MetricsRegistry::new());
    let camera = Arc::new(ReplayCamera::new(Arc::clone(&script)));

    let session = posecue::start_session(config, camera, Arc::clone(&script), sink, Arc::clone(&metrics))
        .await
        .context("starting session")?;
    info!(session_id = session.session_id(), "session started");

    let stop = session.stop_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, stopping session");
            stop.cancel();
        }
    });

    let report = session.wait().await;

    for (name, summary) in metrics.summary() {
        info!(metric = %name, p50_us = summary.p50_us, p95_us = summary.p95_us, count = summary.count, "metric_summary");
    }
    eprintln!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
