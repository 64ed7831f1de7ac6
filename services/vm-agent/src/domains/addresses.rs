//! Forwarded and alias IP addresses.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;
use vmagent_reconcile::{ApplyError, CycleInputs, Domain, OverrideConfig};

use super::backend::HostBackend;
use super::cluster::ClusterSettings;
use crate::metadata::Snapshot;

pub const NAME: &str = "addresses";

/// Addresses the host should carry for a snapshot, sorted and deduplicated.
///
/// Addresses owned by an enabled cluster are left to the cluster.
pub fn desired_addresses(snapshot: &Snapshot, overrides: &OverrideConfig) -> Vec<String> {
    let cluster = ClusterSettings::resolve(snapshot, overrides);
    let mut addresses: Vec<String> = snapshot
        .instance
        .network_interfaces
        .iter()
        .flat_map(|nic| {
            nic.forwarded_ips
                .iter()
                .chain(&nic.target_instance_ips)
                .chain(&nic.ip_aliases)
        })
        .map(|a| a.trim().to_string())
        .filter(|a| !a.is_empty())
        .filter(|a| !(cluster.enabled && cluster.addresses.contains(a)))
        .collect();
    addresses.sort();
    addresses.dedup();
    addresses
}

pub struct Addresses {
    inputs: CycleInputs<Snapshot>,
    backend: Arc<dyn HostBackend>,
}

pub fn build(inputs: CycleInputs<Snapshot>, backend: Arc<dyn HostBackend>) -> Box<dyn Domain> {
    Box::new(Addresses { inputs, backend })
}

#[async_trait]
impl Domain for Addresses {
    fn name(&self) -> &'static str {
        NAME
    }

    fn disabled(&self) -> bool {
        self.inputs
            .overrides
            .get_bool("addressManager", "disable")
            .or_else(|| self.inputs.current.attribute_bool("disable-address-manager"))
            .unwrap_or(false)
    }

    fn diff(&self) -> bool {
        let overrides = &self.inputs.overrides;
        self.inputs.previous.is_empty()
            || desired_addresses(&self.inputs.previous, overrides)
                != desired_addresses(&self.inputs.current, overrides)
    }

    async fn set(&self) -> Result<(), ApplyError> {
        let addresses = desired_addresses(&self.inputs.current, &self.inputs.overrides);
        info!(count = addresses.len(), "Configuring forwarded addresses");
        self.backend.apply_addresses(&addresses).await
    }
}
