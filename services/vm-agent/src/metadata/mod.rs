//! Metadata service access.
//!
//! - `snapshot`: the configuration snapshot data model
//! - `client`: long-poll HTTP client for the metadata service
//! - `error`: fetch error taxonomy and operator hints

mod client;
mod error;
mod snapshot;

use async_trait::async_trait;

pub use client::MetadataClient;
pub use error::{classify, FetchError, FetchErrorKind};
pub use snapshot::{InstanceMetadata, NetworkInterface, ProjectMetadata, Snapshot};

/// Source of successive configuration snapshots.
///
/// `next_snapshot` may block for as long as the service holds the long-poll
/// open. Dropping the returned future abandons the request.
#[async_trait]
pub trait MetadataSource: Send + Sync {
    /// Wait for and return the next full snapshot.
    async fn next_snapshot(&self) -> Result<Snapshot, FetchError>;
}

#[async_trait]
impl MetadataSource for MetadataClient {
    async fn next_snapshot(&self) -> Result<Snapshot, FetchError> {
        self.watch().await
    }
}
