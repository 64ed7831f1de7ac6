//! The configuration domain contract.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::overrides::OverrideConfig;

/// Errors a domain reports when the host mutation cannot be completed.
#[derive(Debug, Error)]
pub enum ApplyError {
    /// The desired configuration in the snapshot could not be interpreted.
    #[error("invalid desired state: {0}")]
    InvalidInput(String),

    /// The host refused or failed the mutation.
    #[error("host mutation failed: {0}")]
    Host(String),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// Read-only inputs shared by every domain instance of one cycle.
pub struct CycleInputs<S> {
    /// Last snapshot handed to a completed dispatch.
    pub previous: Arc<S>,

    /// Snapshot just fetched.
    pub current: Arc<S>,

    /// Local override file contents for this cycle.
    pub overrides: Arc<OverrideConfig>,
}

impl<S> CycleInputs<S> {
    /// Bundle a snapshot pair with the cycle's overrides.
    pub fn new(previous: Arc<S>, current: Arc<S>, overrides: Arc<OverrideConfig>) -> Self {
        Self {
            previous,
            current,
            overrides,
        }
    }
}

impl<S> Clone for CycleInputs<S> {
    fn clone(&self) -> Self {
        Self {
            previous: Arc::clone(&self.previous),
            current: Arc::clone(&self.current),
            overrides: Arc::clone(&self.overrides),
        }
    }
}

impl<S> fmt::Debug for CycleInputs<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CycleInputs")
            .field("overrides", &self.overrides)
            .finish_non_exhaustive()
    }
}

/// One independently reconciled slice of host configuration.
///
/// Instances are short-lived: the engine builds one per cycle from the
/// [`CycleInputs`] and drops it when the cycle joins. Implementations must
/// only touch their own slice of host configuration, since every domain of
/// a cycle runs concurrently and the engine takes no locks on their behalf.
#[async_trait]
pub trait Domain: Send + Sync {
    /// Stable name used in logs.
    fn name(&self) -> &'static str;

    /// Whether this domain is switched off for the cycle.
    ///
    /// Must be cheap and free of side effects.
    fn disabled(&self) -> bool;

    /// Whether the domain's inputs changed since they were last applied.
    ///
    /// Must be cheap and free of side effects; it runs every cycle.
    fn diff(&self) -> bool;

    /// Mutate host state to match the current snapshot.
    ///
    /// Must be idempotent: a second call with the same snapshot leaves the
    /// host as the first call did.
    async fn set(&self) -> Result<(), ApplyError>;
}

/// Builds a fresh [`Domain`] instance for each cycle.
pub trait DomainFactory<S>: Send + Sync {
    /// Name of the domain this factory builds.
    fn name(&self) -> &'static str;

    /// Construct the domain for one cycle.
    fn build(&self, inputs: &CycleInputs<S>) -> Box<dyn Domain>;
}

impl<S, F> DomainFactory<S> for (&'static str, F)
where
    F: Fn(&CycleInputs<S>) -> Box<dyn Domain> + Send + Sync,
{
    fn name(&self) -> &'static str {
        self.0
    }

    fn build(&self, inputs: &CycleInputs<S>) -> Box<dyn Domain> {
        (self.1)(inputs)
    }
}

/// Ordered list of every known domain, fixed at process start.
pub struct Registry<S> {
    factories: Vec<Box<dyn DomainFactory<S>>>,
}

impl<S> Registry<S> {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            factories: Vec::new(),
        }
    }

    /// Register a domain factory. Registration order is only used for
    /// logging; dispatch order within a cycle is unspecified.
    pub fn register(mut self, factory: impl DomainFactory<S> + 'static) -> Self {
        self.factories.push(Box::new(factory));
        self
    }

    /// Number of registered domains.
    pub fn len(&self) -> usize {
        self.factories.len()
    }

    /// Whether no domains are registered.
    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// Names of the registered domains, in registration order.
    pub fn names(&self) -> Vec<&'static str> {
        self.factories.iter().map(|f| f.name()).collect()
    }

    /// Build one instance of every registered domain.
    pub fn instantiate(&self, inputs: &CycleInputs<S>) -> Vec<Box<dyn Domain>> {
        self.factories.iter().map(|f| f.build(inputs)).collect()
    }
}

impl<S> Default for Registry<S> {
    fn default() -> Self {
        Self::new()
    }
}
