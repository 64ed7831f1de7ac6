//! Host mutation interface and recording implementation.

use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;
use tracing::{debug, info};
use vmagent_reconcile::ApplyError;

use super::accounts::AccountKey;
use super::cluster::ClusterSettings;
use super::diagnostics::DiagnosticsRequest;

/// Host mutation interface.
///
/// Each method receives the complete desired state for one domain and must
/// be idempotent.
#[async_trait]
pub trait HostBackend: Send + Sync {
    /// Make `addresses` the full set of forwarded/alias addresses.
    async fn apply_addresses(&self, addresses: &[String]) -> Result<(), ApplyError>;

    /// Create or update local accounts for the given keys.
    async fn apply_accounts(&self, keys: &[AccountKey]) -> Result<(), ApplyError>;

    /// Collect diagnostics and upload them to the request's signed URL.
    async fn collect_diagnostics(&self, request: &DiagnosticsRequest) -> Result<(), ApplyError>;

    /// Join, update, or leave cluster membership.
    async fn apply_cluster(&self, settings: &ClusterSettings) -> Result<(), ApplyError>;
}

/// State last applied through a [`MockHost`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostState {
    pub addresses: Vec<String>,
    pub accounts: Vec<String>,
    pub diagnostics_uploads: Vec<String>,
    pub cluster: Option<ClusterSettings>,
    /// Number of calls that actually changed recorded state.
    pub mutations: usize,
}

/// Host backend that records desired state instead of applying it.
///
/// Used for development and tests. Re-applying identical state is a no-op,
/// and individual domains can be told to fail.
pub struct MockHost {
    state: Mutex<HostState>,
    failing: Mutex<HashSet<&'static str>>,
}

impl MockHost {
    /// Create a new mock host.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(HostState::default()),
            failing: Mutex::new(HashSet::new()),
        }
    }

    /// Create a mock host whose calls for `domain` fail.
    pub fn failing(domain: &'static str) -> Self {
        let host = Self::new();
        host.set_failing(domain, true);
        host
    }

    /// Toggle failure injection for a domain.
    pub fn set_failing(&self, domain: &'static str, fail: bool) {
        let mut failing = self.failing.lock().unwrap_or_else(|p| p.into_inner());
        if fail {
            failing.insert(domain);
        } else {
            failing.remove(domain);
        }
    }

    /// Copy of the recorded state.
    pub fn state(&self) -> HostState {
        self.state.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    fn check(&self, domain: &'static str) -> Result<(), ApplyError> {
        let failing = self.failing.lock().unwrap_or_else(|p| p.into_inner());
        if failing.contains(domain) {
            return Err(ApplyError::Host(format!(
                "mock host configured to fail {}",
                domain
            )));
        }
        Ok(())
    }

    fn update<T: PartialEq>(
        &self,
        domain: &'static str,
        desired: T,
        field: impl FnOnce(&mut HostState) -> &mut T,
    ) -> Result<(), ApplyError> {
        self.check(domain)?;
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        let slot = field(&mut *state);
        if *slot == desired {
            debug!(domain, "[MOCK] Host already in desired state");
            return Ok(());
        }
        *slot = desired;
        state.mutations += 1;
        info!(domain, "[MOCK] Host state updated");
        Ok(())
    }
}

impl Default for MockHost {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HostBackend for MockHost {
    async fn apply_addresses(&self, addresses: &[String]) -> Result<(), ApplyError> {
        self.update("addresses", addresses.to_vec(), |s| &mut s.addresses)
    }

    async fn apply_accounts(&self, keys: &[AccountKey]) -> Result<(), ApplyError> {
        let mut users: Vec<String> = keys.iter().map(|k| k.user_name.clone()).collect();
        users.sort();
        self.update("accounts", users, |s| &mut s.accounts)
    }

    async fn collect_diagnostics(&self, request: &DiagnosticsRequest) -> Result<(), ApplyError> {
        self.check("diagnostics")?;
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        if state.diagnostics_uploads.contains(&request.signed_url) {
            debug!("[MOCK] Diagnostics already uploaded for this request");
            return Ok(());
        }
        state.diagnostics_uploads.push(request.signed_url.clone());
        state.mutations += 1;
        info!(trace = request.trace, "[MOCK] Diagnostics collected");
        Ok(())
    }

    async fn apply_cluster(&self, settings: &ClusterSettings) -> Result<(), ApplyError> {
        self.update("cluster", Some(settings.clone()), |s| &mut s.cluster)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_reapply_is_noop() {
        let host = MockHost::new();
        let addresses = vec!["10.0.0.5".to_string()];

        host.apply_addresses(&addresses).await.unwrap();
        host.apply_addresses(&addresses).await.unwrap();

        let state = host.state();
        assert_eq!(state.addresses, addresses);
        assert_eq!(state.mutations, 1);
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let host = MockHost::failing("addresses");
        assert!(host.apply_addresses(&[]).await.is_err());

        host.set_failing("addresses", false);
        assert!(host.apply_addresses(&[]).await.is_ok());
    }

    #[tokio::test]
    async fn test_duplicate_diagnostics_request_uploads_once() {
        let host = MockHost::new();
        let request = DiagnosticsRequest {
            signed_url: "https://storage.example/upload?sig=1".to_string(),
            expire_on: None,
            trace: false,
        };

        host.collect_diagnostics(&request).await.unwrap();
        host.collect_diagnostics(&request).await.unwrap();

        assert_eq!(host.state().diagnostics_uploads.len(), 1);
    }
}
