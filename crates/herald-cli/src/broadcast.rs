//! The `broadcast` subcommand: wire transport, registry and engine, then
//! run the 1 Hz control tick until the job ends or Ctrl-C stops it.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::warn;

use herald_broadcast::{
    Broadcaster, DestinationRegistry, EventSink, JobParams, SinkEvent, Store,
};
use herald_core::config::HeraldConfig;

use crate::{await_handle, spawn_transport, CONNECT_TIMEOUT, REFRESH_TIMEOUT};

/// Durable log for error/failure events, next to wherever herald runs.
const ERROR_LOG_FILE: &str = "herald-errors.log";

#[derive(Args)]
pub struct BroadcastArgs {
    /// Message text; may contain {a|b} spintax groups.
    #[arg(short, long, conflicts_with = "template_id")]
    message: Option<String>,

    /// Send a stored template instead of an inline message.
    #[arg(long)]
    template_id: Option<String>,

    /// Destination id to target (repeatable). Defaults to every sendable
    /// destination.
    #[arg(long = "target")]
    targets: Vec<i64>,

    /// Minimum spacing between sends to one destination, in seconds.
    #[arg(long)]
    interval_secs: Option<u64>,

    /// Total run budget, in minutes.
    #[arg(long)]
    duration_mins: Option<u64>,

    /// Expand spintax independently for every send.
    #[arg(long)]
    spin: bool,

    /// Allow per-destination intervals under 60 seconds.
    #[arg(long)]
    no_safe_floor: bool,
}

pub async fn run(config: &HeraldConfig, store: &Store, args: BroadcastArgs) -> anyhow::Result<()> {
    let message = match (&args.message, &args.template_id) {
        (Some(message), _) => message.clone(),
        (None, Some(id)) => store
            .list_templates()?
            .into_iter()
            .find(|t| t.id == *id)
            .ok_or_else(|| anyhow::anyhow!("template {id} not found"))?
            .body,
        (None, None) => anyhow::bail!("provide --message or --template-id"),
    };

    let facade = spawn_transport(config)?;
    let identity = store.get_setting("identity")?;
    await_handle(facade.connect(identity), CONNECT_TIMEOUT, "connect").await?;

    let registry = Arc::new(DestinationRegistry::new());
    let fetched = await_handle(
        registry.begin_refresh(&facade),
        REFRESH_TIMEOUT,
        "destination refresh",
    )
    .await?;
    let denylist = store.load_denylist()?;
    registry.apply_refresh(fetched, &denylist);
    if let Err(e) = store.persist_destinations(&registry.all()) {
        warn!(error = %e, "failed to persist destination snapshot");
    }

    let target_ids: Vec<i64> = if args.targets.is_empty() {
        registry
            .all()
            .iter()
            .filter(|d| d.sendable())
            .map(|d| d.id)
            .collect()
    } else {
        args.targets.clone()
    };

    let defaults = &config.broadcast;
    let params = JobParams {
        target_ids,
        template: message,
        variation: args.spin || defaults.variation,
        base_interval: Duration::from_secs(args.interval_secs.unwrap_or(defaults.interval_secs)),
        safe_floor: defaults.safe_floor && !args.no_safe_floor,
        duration: Duration::from_secs(args.duration_mins.unwrap_or(defaults.duration_mins) * 60),
    };

    let (sink, mut events) = EventSink::channel();
    let engine = Broadcaster::new(facade, Arc::clone(&registry), sink);
    engine.start(params)?;
    println!("broadcast running — Ctrl-C to stop");

    let mut tick = tokio::time::interval(Duration::from_secs(1));
    let mut last_progress = 0u32;
    loop {
        tokio::select! {
            _ = tick.tick() => {
                registry.tick();
                drain_events(&mut events);

                let pct = (engine.progress() * 100.0).round() as u32;
                if pct != last_progress {
                    println!("progress: {pct}%");
                    last_progress = pct;
                }
                if !engine.is_running() {
                    drain_events(&mut events);
                    break;
                }
            }
            // A second Ctrl-C while stopping is a no-op; the loop drains
            // until the engine reaches Idle on its own.
            _ = tokio::signal::ctrl_c() => {
                engine.stop();
            }
        }
    }
    Ok(())
}

/// Print pending sink events; error/failure events also go to the durable
/// log file.
fn drain_events(rx: &mut UnboundedReceiver<SinkEvent>) {
    while let Ok(event) = rx.try_recv() {
        println!("[{}] {}", event.at.format("%H:%M:%S"), event.message);

        let lower = event.message.to_lowercase();
        if lower.contains("error") || lower.contains("failed") {
            tracing::error!("{}", event.message);
            append_error_log(&event);
        }
    }
}

fn append_error_log(event: &SinkEvent) {
    let line = format!("{} - {}\n", event.at.to_rfc3339(), event.message);
    let appended = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(ERROR_LOG_FILE)
        .and_then(|mut file| file.write_all(line.as_bytes()));
    if let Err(e) = appended {
        warn!(error = %e, "failed to append to {ERROR_LOG_FILE}");
    }
}
