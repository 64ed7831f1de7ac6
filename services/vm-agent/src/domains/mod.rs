//! Configuration domains reconciled by the agent.
//!
//! - `addresses`: forwarded and alias IP addresses on the local interfaces
//! - `accounts`: local accounts provisioned from published keys
//! - `diagnostics`: on-demand diagnostics collection
//! - `cluster`: failover cluster membership
//!
//! Each domain decides *whether* to act from the snapshot pair and the
//! override file; the host mutation itself goes through [`HostBackend`].
//!
//! An empty previous snapshot means nothing was applied yet, so the
//! addresses, accounts and cluster domains report a change against it
//! unconditionally. If the service keeps publishing the empty snapshot,
//! those domains re-apply it every cycle; `set` is idempotent, so the
//! host ends up in the same state.

pub mod accounts;
pub mod addresses;
pub mod backend;
pub mod cluster;
pub mod diagnostics;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use vmagent_reconcile::{CycleInputs, Domain, DomainFactory, Registry};

use crate::metadata::Snapshot;

pub use accounts::AccountKey;
pub use backend::{HostBackend, HostState, MockHost};
pub use cluster::ClusterSettings;
pub use diagnostics::DiagnosticsRequest;

type Build = fn(CycleInputs<Snapshot>, Arc<dyn HostBackend>) -> Box<dyn Domain>;

/// Factory that hands every domain instance the shared host backend.
struct BackendFactory {
    name: &'static str,
    backend: Arc<dyn HostBackend>,
    build: Build,
}

impl DomainFactory<Snapshot> for BackendFactory {
    fn name(&self) -> &'static str {
        self.name
    }

    fn build(&self, inputs: &CycleInputs<Snapshot>) -> Box<dyn Domain> {
        (self.build)(inputs.clone(), Arc::clone(&self.backend))
    }
}

/// Whether an RFC 3339 expiry lies in the past.
///
/// An absent or empty expiry never expires; an unparseable one counts as
/// expired.
pub(crate) fn is_expired(expire_on: Option<&str>, now: DateTime<Utc>) -> bool {
    match expire_on.map(str::trim) {
        None | Some("") => false,
        Some(s) => DateTime::parse_from_rfc3339(s)
            .map(|t| t < now)
            .unwrap_or(true),
    }
}

/// Every domain the agent knows about, in a fixed order.
pub fn registry(backend: Arc<dyn HostBackend>) -> Registry<Snapshot> {
    let factory = |name, build| BackendFactory {
        name,
        backend: Arc::clone(&backend),
        build,
    };

    Registry::new()
        .register(factory(addresses::NAME, addresses::build as Build))
        .register(factory(accounts::NAME, accounts::build as Build))
        .register(factory(cluster::NAME, cluster::build as Build))
        .register(factory(diagnostics::NAME, diagnostics::build as Build))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_expired() {
        let now = Utc::now();
        assert!(!is_expired(None, now));
        assert!(!is_expired(Some(""), now));
        assert!(is_expired(Some("2001-01-01T00:00:00Z"), now));
        assert!(!is_expired(Some("2999-01-01T00:00:00+00:00"), now));
        assert!(is_expired(Some("next tuesday"), now));
    }

    #[test]
    fn test_registry_lists_all_domains() {
        let registry = registry(Arc::new(MockHost::new()));
        assert_eq!(
            registry.names(),
            vec!["addresses", "accounts", "cluster", "diagnostics"]
        );
    }

    #[test]
    fn test_empty_previous_always_reports_change() {
        let registry = registry(Arc::new(MockHost::new()));
        let empty = Arc::new(Snapshot::default());
        let inputs = CycleInputs::new(
            Arc::clone(&empty),
            Arc::clone(&empty),
            Arc::new(vmagent_reconcile::OverrideConfig::empty()),
        );

        let changed: Vec<_> = registry
            .instantiate(&inputs)
            .iter()
            .filter(|d| d.diff())
            .map(|d| d.name())
            .collect();
        // Diagnostics only acts on a non-empty request.
        assert_eq!(changed, vec!["addresses", "accounts", "cluster"]);
    }
}
