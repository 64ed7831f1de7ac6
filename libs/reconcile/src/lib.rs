//! Reconciliation cycle primitives.
//!
//! This library holds the domain-agnostic half of the host agent: the
//! contract every configuration domain implements, and the engine that
//! dispatches a full set of domains for one snapshot pair. Key concepts:
//!
//! - **Snapshot pair**: the previously applied snapshot and the one just
//!   fetched. Domains compare them to decide whether anything changed.
//! - **Domain**: an independently reconciled slice of host configuration.
//! - **Cycle**: one dispatch of every registered domain, joined before the
//!   caller may start the next one.
//!
//! # Invariants
//!
//! - `set` is only invoked when `disabled` is false and `diff` is true
//! - A failing or panicking domain never affects the other domains
//! - Domains are built fresh per cycle and hold no state across cycles

mod dispatch;
mod domain;
mod failures;
mod overrides;

pub use dispatch::{CycleReport, Dispatcher, DomainOutcome};
pub use domain::{ApplyError, CycleInputs, Domain, DomainFactory, Registry};
pub use failures::FetchFailures;
pub use overrides::{parse_bool, OverrideConfig};

/// Default delay between a failed metadata fetch and the next attempt.
pub const DEFAULT_FETCH_BACKOFF: std::time::Duration = std::time::Duration::from_secs(5);
