//! Configuration snapshot published by the metadata service.

use std::collections::BTreeMap;

use serde::Deserialize;
use vmagent_reconcile::parse_bool;

/// Full configuration state at one point in time.
///
/// Missing fields deserialize to their defaults, so the zero value doubles
/// as the "nothing applied yet" snapshot of the first cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Snapshot {
    pub instance: InstanceMetadata,
    pub project: ProjectMetadata,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct InstanceMetadata {
    pub id: u64,
    pub hostname: String,
    pub attributes: BTreeMap<String, String>,
    pub network_interfaces: Vec<NetworkInterface>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProjectMetadata {
    pub project_id: String,
    pub attributes: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NetworkInterface {
    pub mac: String,
    pub forwarded_ips: Vec<String>,
    pub target_instance_ips: Vec<String>,
    pub ip_aliases: Vec<String>,
}

impl Snapshot {
    /// Returns true for the zero-valued snapshot.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Attribute value, preferring instance over project attributes.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.instance
            .attributes
            .get(name)
            .or_else(|| self.project.attributes.get(name))
            .map(String::as_str)
    }

    /// Boolean attribute; values that do not parse as booleans read as unset.
    pub fn attribute_bool(&self, name: &str) -> Option<bool> {
        self.instance
            .attributes
            .get(name)
            .and_then(|v| parse_bool(v))
            .or_else(|| self.project.attributes.get(name).and_then(|v| parse_bool(v)))
    }
}
