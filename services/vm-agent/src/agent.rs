//! Agent lifecycle.
//!
//! Starts the metadata watch loop in the background, waits for a stop
//! signal, then cancels the loop and waits for it to wind down.

use std::future::Future;

use anyhow::Result;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::metadata::MetadataSource;
use crate::watch::{WatchLoop, WatchStats};
use crate::VERSION;

/// How the agent was launched, which decides what stops it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Foreground process; stops on Ctrl-C.
    Foreground,
    /// Under the service manager; stops on SIGTERM or Ctrl-C.
    Service,
}

/// Run the watch loop until `stop` resolves.
///
/// Returns once the loop has observed cancellation. The loop finishes an
/// in-flight dispatch before it exits.
pub async fn run_until<M, F>(watch_loop: WatchLoop<M>, stop: F) -> WatchStats
where
    M: MetadataSource + 'static,
    F: Future<Output = ()>,
{
    info!(version = VERSION, "Agent started");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut handle = tokio::spawn(watch_loop.run(shutdown_rx));

    tokio::select! {
        _ = stop => {
            info!("Received stop signal");
        }
        result = &mut handle => {
            // The loop only returns after cancellation, so this is a panic.
            error!(result = ?result.map(|_| ()), "Metadata watch loop exited unexpectedly");
            info!("Agent stopped");
            return WatchStats::default();
        }
    }

    let _ = shutdown_tx.send(true);

    let stats = match handle.await {
        Ok(stats) => stats,
        Err(e) => {
            error!(error = %e, "Metadata watch loop panicked");
            WatchStats::default()
        }
    };

    info!(cycles = stats.cycles, "Agent stopped");
    stats
}

/// Resolves when the process is asked to stop in the given mode.
pub async fn stop_signal(mode: RunMode) {
    match mode {
        RunMode::Foreground => ctrl_c().await,
        RunMode::Service => service_stop().await,
    }
}

async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}

#[cfg(unix)]
async fn service_stop() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            tokio::select! {
                _ = term.recv() => {}
                _ = ctrl_c() => {}
            }
        }
        Err(e) => {
            warn!(error = %e, "Failed to listen for SIGTERM");
            ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn service_stop() {
    ctrl_c().await;
}

/// Run the agent in the given mode until stopped.
pub async fn run<M>(watch_loop: WatchLoop<M>, mode: RunMode) -> Result<WatchStats>
where
    M: MetadataSource + 'static,
{
    Ok(run_until(watch_loop, stop_signal(mode)).await)
}
