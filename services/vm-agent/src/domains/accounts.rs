//! Local accounts provisioned from published keys.
//!
//! The `windows-keys` attribute carries one JSON object per line. Each
//! object names a user and the public key material used to provision or
//! reset that user's credentials.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{info, warn};
use vmagent_reconcile::{ApplyError, CycleInputs, Domain};

use super::backend::HostBackend;
use super::is_expired;
use crate::metadata::Snapshot;

pub const NAME: &str = "accounts";

const KEYS_ATTRIBUTE: &str = "windows-keys";

/// A published account key.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountKey {
    pub user_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub expire_on: Option<String>,
    pub modulus: String,
    pub exponent: String,
}

/// Parse the keys attribute, dropping malformed and expired entries.
///
/// When a user appears more than once the last entry wins. The result is
/// ordered by user name.
pub fn parse_keys(raw: &str, now: DateTime<Utc>) -> Vec<AccountKey> {
    let mut keys = BTreeMap::new();
    for line in raw.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let key: AccountKey = match serde_json::from_str(line) {
            Ok(key) => key,
            Err(e) => {
                warn!(error = %e, "Skipping malformed account key");
                continue;
            }
        };
        if key.user_name.is_empty() {
            warn!("Skipping account key without a user name");
            continue;
        }
        if is_expired(key.expire_on.as_deref(), now) {
            info!(user = %key.user_name, "Skipping expired account key");
            continue;
        }
        keys.insert(key.user_name.clone(), key);
    }
    keys.into_values().collect()
}

pub struct Accounts {
    inputs: CycleInputs<Snapshot>,
    backend: Arc<dyn HostBackend>,
}

pub fn build(inputs: CycleInputs<Snapshot>, backend: Arc<dyn HostBackend>) -> Box<dyn Domain> {
    Box::new(Accounts { inputs, backend })
}

#[async_trait]
impl Domain for Accounts {
    fn name(&self) -> &'static str {
        NAME
    }

    fn disabled(&self) -> bool {
        self.inputs
            .overrides
            .get_bool("accountManager", "disable")
            .or_else(|| self.inputs.current.attribute_bool("disable-account-manager"))
            .unwrap_or(false)
    }

    fn diff(&self) -> bool {
        self.inputs.previous.is_empty()
            || self.inputs.previous.attribute(KEYS_ATTRIBUTE)
                != self.inputs.current.attribute(KEYS_ATTRIBUTE)
    }

    async fn set(&self) -> Result<(), ApplyError> {
        let raw = self.inputs.current.attribute(KEYS_ATTRIBUTE).unwrap_or_default();
        let keys = parse_keys(raw, Utc::now());
        info!(count = keys.len(), "Provisioning accounts");
        self.backend.apply_accounts(&keys).await
    }
}
