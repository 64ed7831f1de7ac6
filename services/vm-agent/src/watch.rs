//! Metadata watch loop.
//!
//! The loop:
//! - Waits on the metadata long-poll for the next snapshot
//! - Backs off and retries forever when a fetch fails
//! - Dispatches every configuration domain for each snapshot received
//! - Advances the previous snapshot once the dispatch has joined

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info};
use vmagent_reconcile::{CycleInputs, CycleReport, Dispatcher, FetchFailures};

use crate::metadata::{FetchError, MetadataSource, Snapshot};
use crate::overrides::load_overrides;

/// Counters describing a loop's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WatchStats {
    /// Cycles whose dispatch completed.
    pub cycles: u64,
    /// Fetches that failed.
    pub fetch_failures: u64,
    /// Fetch failures that produced a diagnostic log entry.
    pub failures_logged: u64,
}

/// The metadata watch loop.
pub struct WatchLoop<M> {
    source: M,
    dispatcher: Dispatcher<Snapshot>,
    override_path: PathBuf,
    backoff: Duration,
    failures: FetchFailures,
    previous: Arc<Snapshot>,
    stats: WatchStats,
}

impl<M> WatchLoop<M>
where
    M: MetadataSource,
{
    /// Create a new watch loop. The first cycle diffs against an empty snapshot.
    pub fn new(
        source: M,
        dispatcher: Dispatcher<Snapshot>,
        override_path: impl Into<PathBuf>,
        backoff: Duration,
    ) -> Self {
        Self {
            source,
            dispatcher,
            override_path: override_path.into(),
            backoff,
            failures: FetchFailures::new(),
            previous: Arc::new(Snapshot::default()),
            stats: WatchStats::default(),
        }
    }

    /// Run until shutdown is signaled.
    ///
    /// Shutdown interrupts a pending fetch or backoff sleep, and is checked
    /// again between a successful fetch and its dispatch. A dispatch that has
    /// started always runs to completion.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> WatchStats {
        info!(
            backoff_secs = self.backoff.as_secs(),
            domains = ?self.dispatcher.domain_names(),
            "Starting metadata watch loop"
        );

        loop {
            let fetched = tokio::select! {
                result = self.source.next_snapshot() => result,
                _ = shutdown_requested(&mut shutdown) => break,
            };

            let snapshot = match fetched {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    self.on_fetch_error(&e);
                    let stopped = tokio::select! {
                        _ = tokio::time::sleep(self.backoff) => false,
                        _ = shutdown_requested(&mut shutdown) => true,
                    };
                    if stopped {
                        break;
                    }
                    continue;
                }
            };

            self.failures.record_success();

            if *shutdown.borrow() {
                info!("Shutdown requested, skipping dispatch");
                break;
            }

            self.run_cycle(snapshot).await;
        }

        info!(cycles = self.stats.cycles, "Metadata watch loop stopped");
        self.stats
    }

    /// Dispatch one snapshot against the previous one, then advance.
    pub async fn run_cycle(&mut self, snapshot: Snapshot) -> CycleReport {
        let current = Arc::new(snapshot);
        let overrides = Arc::new(load_overrides(&self.override_path));
        let inputs = CycleInputs::new(Arc::clone(&self.previous), Arc::clone(&current), overrides);

        let report = self.dispatcher.dispatch(inputs).await;

        self.previous = current;
        self.stats.cycles += 1;
        debug!(
            cycle = self.stats.cycles,
            applied = report.applied(),
            failed = report.failed(),
            "Reconciliation cycle complete"
        );
        report
    }

    /// Counters so far.
    pub fn stats(&self) -> WatchStats {
        self.stats
    }

    fn on_fetch_error(&mut self, err: &FetchError) {
        self.stats.fetch_failures += 1;

        // Only the second consecutive failure is logged, to ride out
        // transient errors without spamming the log on network outages.
        if !self.failures.record_failure() {
            return;
        }
        self.stats.failures_logged += 1;

        if let Some(hint) = err.hint() {
            error!(kind = ?err.kind(), "{}", hint);
        }
        error!(
            error = %err,
            consecutive_failures = self.failures.consecutive(),
            "Failed to fetch metadata"
        );
    }
}

/// Resolves once shutdown is signaled or the signaling side goes away.
async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}
