//! Headless host bridge binary for stdin/stdout JSON communication.
//!
//! Loads the tracker for the configured user, starts the reminder service,
//! then reads `CommandEnvelope` messages as newline-delimited JSON from
//! stdin and writes `ResponseEnvelope` and `EventEnvelope` messages to
//! stdout.
//!
//! All tracing/diagnostic output goes to stderr (and optionally a daily
//! log file) so that stdout remains a clean JSON protocol channel.
//!
//! Usage: `tickler-host [CONFIG_PATH]`. Without an argument the platform
//! config file is used when it exists, defaults otherwise.

use anyhow::Context;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tickler::TicklerConfig;
use tickler::host::{HostNotificationSink, TrackerCommandHandler, run_stdio_bridge};
use tickler::notify::{AudioCue, SilentCue, TerminalBell};
use tickler::scheduler::ReminderService;
use tickler::tracker::TaskTracker;
use tokio::sync::broadcast;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Event broadcast channel capacity shared by the sink and the router.
const EVENT_CAPACITY: usize = 128;

fn load_config() -> anyhow::Result<TicklerConfig> {
    let explicit = std::env::args_os().nth(1).map(PathBuf::from);
    let path = explicit
        .clone()
        .unwrap_or_else(TicklerConfig::default_config_path);
    if explicit.is_some() || path.exists() {
        TicklerConfig::from_file(&path)
            .with_context(|| format!("cannot load config {}", path.display()))
    } else {
        Ok(TicklerConfig::default())
    }
}

/// Install stderr logging plus, when enabled, a daily-rolling log file.
///
/// The returned guard flushes the file writer on drop.
fn init_tracing(
    config: &TicklerConfig,
) -> anyhow::Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let filter = || {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("tickler=info"))
    };
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(filter());

    let (file_layer, guard) = if config.logging.file_logs {
        let dir = tickler::tickler_dirs::logs_dir(&config.storage.root());
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("cannot create log directory {}", dir.display()))?;
        let appender = tracing_appender::rolling::daily(dir, "tickler-host.log");
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(writer)
            .with_filter(filter());
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .init();
    Ok(guard)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = load_config()?;
    let _log_guard = init_tracing(&config)?;

    tracing::info!(user = %config.storage.user, "tickler-host starting");

    let (event_tx, _event_rx) = broadcast::channel(EVENT_CAPACITY);
    let sink = Arc::new(HostNotificationSink::new(event_tx.clone()));
    let cue: Arc<dyn AudioCue> = if config.reminders.sound_enabled {
        Arc::new(TerminalBell)
    } else {
        Arc::new(SilentCue)
    };

    let tracker = TaskTracker::from_config(&config, sink.clone(), cue)
        .context("cannot open task list")?;
    let tracker = Arc::new(Mutex::new(tracker));

    let interval = std::time::Duration::from_secs(config.scheduler.reconcile_interval_secs);
    let service = ReminderService::new(Arc::clone(&tracker), interval);
    let service_cancel = service.cancel_token();
    let service_handle = service.run();

    // runtime.stop halts reminders at once; the bridge exits after replying.
    let handler = TrackerCommandHandler::new(tracker, sink, service_cancel.clone());
    let bridge_result = run_stdio_bridge(handler, event_tx).await;

    service_cancel.cancel();
    if let Err(e) = service_handle.await {
        tracing::warn!(error = %e, "reminder service task ended abnormally");
    }

    bridge_result.map_err(|e| {
        tracing::error!(error = %e, "tickler-host exited with error");
        anyhow::anyhow!("tickler-host failed: {e}")
    })?;

    tracing::info!("tickler-host shut down cleanly");
    Ok(())
}
