//! Failover cluster membership.
//!
//! When membership is enabled the host runs a health-check agent on
//! `agent_port` and the listed addresses are owned by the cluster rather
//! than assigned locally.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;
use vmagent_reconcile::{ApplyError, CycleInputs, Domain, OverrideConfig};

use super::backend::HostBackend;
use crate::metadata::Snapshot;

pub const NAME: &str = "cluster";

/// Health-check agent port used when none is configured.
pub const DEFAULT_AGENT_PORT: u16 = 59998;

/// Effective cluster membership settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterSettings {
    pub enabled: bool,
    pub addresses: Vec<String>,
    pub agent_port: u16,
}

impl ClusterSettings {
    /// Resolve settings from the override file, falling back to metadata.
    ///
    /// Listing cluster addresses implies membership unless it is
    /// explicitly switched off.
    pub fn resolve(snapshot: &Snapshot, overrides: &OverrideConfig) -> Self {
        let mut addresses: Vec<String> = overrides
            .get("wsfc", "addresses")
            .or_else(|| snapshot.attribute("wsfc-addrs"))
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .map(str::to_owned)
            .collect();
        addresses.sort();
        addresses.dedup();

        let enabled = overrides
            .get_bool("wsfc", "enable")
            .or_else(|| snapshot.attribute_bool("enable-wsfc"))
            .unwrap_or(!addresses.is_empty());

        let agent_port = overrides
            .get_u16("wsfc", "port")
            .or_else(|| {
                snapshot
                    .attribute("wsfc-agent-port")
                    .and_then(|p| p.trim().parse().ok())
            })
            .unwrap_or(DEFAULT_AGENT_PORT);

        Self {
            enabled,
            addresses,
            agent_port,
        }
    }
}

pub struct Cluster {
    inputs: CycleInputs<Snapshot>,
    backend: Arc<dyn HostBackend>,
}

pub fn build(inputs: CycleInputs<Snapshot>, backend: Arc<dyn HostBackend>) -> Box<dyn Domain> {
    Box::new(Cluster { inputs, backend })
}

#[async_trait]
impl Domain for Cluster {
    fn name(&self) -> &'static str {
        NAME
    }

    // Membership must be actively left when metadata turns it off, so only
    // the override file can take this domain out of the cycle.
    fn disabled(&self) -> bool {
        self.inputs
            .overrides
            .get_bool("wsfc", "disable")
            .unwrap_or(false)
    }

    fn diff(&self) -> bool {
        let overrides = &self.inputs.overrides;
        self.inputs.previous.is_empty()
            || ClusterSettings::resolve(&self.inputs.previous, overrides)
                != ClusterSettings::resolve(&self.inputs.current, overrides)
    }

    async fn set(&self) -> Result<(), ApplyError> {
        let settings = ClusterSettings::resolve(&self.inputs.current, &self.inputs.overrides);
        info!(
            enabled = settings.enabled,
            port = settings.agent_port,
            addresses = ?settings.addresses,
            "Configuring cluster membership"
        );
        self.backend.apply_cluster(&settings).await
    }
}
