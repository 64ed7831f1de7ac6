//! Concurrent dispatch of one reconciliation cycle.
//!
//! Every registered domain runs on its own tokio task. The dispatcher joins
//! all of them before returning, so a cycle is complete only once each
//! domain was skipped, applied, or failed. Failures (including panics) stay
//! with the domain that produced them and are reported through logs.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use tracing::{debug, error, info};

use crate::domain::{CycleInputs, Domain, Registry};

/// What happened to a single domain during a cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomainOutcome {
    /// `disabled()` was true; nothing else was called.
    Disabled,
    /// `diff()` was false; `set()` was not called.
    Unchanged,
    /// `set()` completed.
    Applied,
    /// `set()` returned an error.
    Failed(String),
    /// The domain task panicked.
    Panicked(String),
}

impl DomainOutcome {
    /// Returns true if `set()` was invoked, regardless of its result.
    pub fn attempted(&self) -> bool {
        matches!(self, Self::Applied | Self::Failed(_))
    }
}

impl fmt::Display for DomainOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DomainOutcome::Disabled => write!(f, "disabled"),
            DomainOutcome::Unchanged => write!(f, "unchanged"),
            DomainOutcome::Applied => write!(f, "applied"),
            DomainOutcome::Failed(e) => write!(f, "failed: {}", e),
            DomainOutcome::Panicked(e) => write!(f, "panicked: {}", e),
        }
    }
}

/// Per-domain outcomes of one completed cycle, in registration order.
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    pub outcomes: Vec<(&'static str, DomainOutcome)>,
}

impl CycleReport {
    /// Outcome for the named domain.
    pub fn outcome(&self, name: &str) -> Option<&DomainOutcome> {
        self.outcomes
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, o)| o)
    }

    /// Number of domains whose `set()` completed.
    pub fn applied(&self) -> usize {
        self.count(|o| matches!(o, DomainOutcome::Applied))
    }

    /// Number of domains that failed or panicked.
    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, DomainOutcome::Failed(_) | DomainOutcome::Panicked(_)))
    }

    fn count(&self, pred: impl Fn(&DomainOutcome) -> bool) -> usize {
        self.outcomes.iter().filter(|(_, o)| pred(o)).count()
    }
}

/// Remembers the last enabled/disabled state logged per domain.
#[derive(Default)]
struct StatusLog {
    seen: Mutex<HashMap<&'static str, bool>>,
}

impl StatusLog {
    fn observe(&self, name: &'static str, disabled: bool) {
        let mut seen = self.seen.lock().unwrap_or_else(|p| p.into_inner());
        if seen.insert(name, disabled) != Some(disabled) {
            let status = if disabled { "disabled" } else { "enabled" };
            info!(domain = name, status, "{} manager status: {}", name, status);
        }
    }
}

/// The reconciliation engine.
///
/// Owns the domain registry and fans each cycle out across it.
pub struct Dispatcher<S> {
    registry: Registry<S>,
    status: Arc<StatusLog>,
}

impl<S> Dispatcher<S>
where
    S: Send + Sync + 'static,
{
    /// Create a dispatcher over a fixed registry.
    pub fn new(registry: Registry<S>) -> Self {
        info!(domains = ?registry.names(), "Registered configuration domains");
        Self {
            registry,
            status: Arc::new(StatusLog::default()),
        }
    }

    /// Registered domain names.
    pub fn domain_names(&self) -> Vec<&'static str> {
        self.registry.names()
    }

    /// Run one cycle and wait for every domain to finish.
    pub async fn dispatch(&self, inputs: CycleInputs<S>) -> CycleReport {
        let domains = self.registry.instantiate(&inputs);
        debug!(count = domains.len(), "Dispatching configuration domains");

        let handles: Vec<_> = domains
            .into_iter()
            .map(|domain| {
                let name = domain.name();
                let status = Arc::clone(&self.status);
                (name, tokio::spawn(run_domain(domain, status)))
            })
            .collect();

        let mut report = CycleReport {
            outcomes: Vec::with_capacity(handles.len()),
        };
        for (name, handle) in handles {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(domain = name, error = %e, "Domain task panicked");
                    DomainOutcome::Panicked(e.to_string())
                }
            };
            report.outcomes.push((name, outcome));
        }

        debug!(
            applied = report.applied(),
            failed = report.failed(),
            "Cycle dispatch complete"
        );
        report
    }
}

async fn run_domain(domain: Box<dyn Domain>, status: Arc<StatusLog>) -> DomainOutcome {
    let name = domain.name();

    let disabled = domain.disabled();
    status.observe(name, disabled);
    if disabled {
        return DomainOutcome::Disabled;
    }

    if !domain.diff() {
        return DomainOutcome::Unchanged;
    }

    info!(domain = name, "Applying configuration changes");
    match domain.set().await {
        Ok(()) => {
            debug!(domain = name, "Configuration applied");
            DomainOutcome::Applied
        }
        Err(e) => {
            error!(domain = name, error = %e, "Failed to apply configuration");
            DomainOutcome::Failed(e.to_string())
        }
    }
}
