//! On-demand diagnostics collection.
//!
//! Publishing a request in the `diagnostics` attribute asks the host to
//! gather logs and upload them to a signed URL. Each distinct request is
//! handled once.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use tracing::info;
use vmagent_reconcile::{ApplyError, CycleInputs, Domain};

use super::backend::HostBackend;
use super::is_expired;
use crate::metadata::Snapshot;

pub const NAME: &str = "diagnostics";

const REQUEST_ATTRIBUTE: &str = "diagnostics";

/// A diagnostics collection request.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticsRequest {
    pub signed_url: String,
    #[serde(default)]
    pub expire_on: Option<String>,
    #[serde(default)]
    pub trace: bool,
}

pub struct Diagnostics {
    inputs: CycleInputs<Snapshot>,
    backend: Arc<dyn HostBackend>,
}

pub fn build(inputs: CycleInputs<Snapshot>, backend: Arc<dyn HostBackend>) -> Box<dyn Domain> {
    Box::new(Diagnostics { inputs, backend })
}

impl Diagnostics {
    fn request(snapshot: &Snapshot) -> Option<&str> {
        snapshot
            .attribute(REQUEST_ATTRIBUTE)
            .map(str::trim)
            .filter(|r| !r.is_empty())
    }
}

#[async_trait]
impl Domain for Diagnostics {
    fn name(&self) -> &'static str {
        NAME
    }

    // Off unless explicitly enabled.
    fn disabled(&self) -> bool {
        !self
            .inputs
            .overrides
            .get_bool("diagnostics", "enable")
            .or_else(|| self.inputs.current.attribute_bool("enable-diagnostics"))
            .unwrap_or(false)
    }

    fn diff(&self) -> bool {
        let current = Self::request(&self.inputs.current);
        current.is_some() && current != Self::request(&self.inputs.previous)
    }

    async fn set(&self) -> Result<(), ApplyError> {
        let Some(raw) = Self::request(&self.inputs.current) else {
            return Ok(());
        };
        let request: DiagnosticsRequest = serde_json::from_str(raw)
            .map_err(|e| ApplyError::InvalidInput(format!("diagnostics request: {}", e)))?;

        if is_expired(request.expire_on.as_deref(), Utc::now()) {
            info!("Diagnostics request expired, ignoring");
            return Ok(());
        }

        info!(trace = request.trace, "Collecting diagnostics");
        self.backend.collect_diagnostics(&request).await
    }
}
