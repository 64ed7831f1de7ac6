//! Long-poll client for the metadata service.
//!
//! Each call asks the service to hold the request open until the metadata
//! changes (or the long-poll timeout passes), passing the ETag of the last
//! snapshot received so the service knows what "changed" means.

use std::sync::Mutex;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::header::ETAG;
use tracing::debug;

use super::error::FetchError;
use super::snapshot::Snapshot;
use crate::config::Config;

/// ETag sent before any snapshot has been received.
const INITIAL_ETAG: &str = "NONE";

/// Extra time granted past the long-poll timeout before the client gives up.
const TIMEOUT_MARGIN: Duration = Duration::from_secs(10);

/// Metadata service client.
pub struct MetadataClient {
    client: reqwest::Client,
    base_url: String,
    long_poll_timeout_secs: u64,
    etag: Mutex<String>,
}

impl MetadataClient {
    /// Create a new metadata client.
    pub fn new(base_url: impl Into<String>, long_poll_timeout_secs: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(long_poll_timeout_secs).saturating_add(TIMEOUT_MARGIN))
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            long_poll_timeout_secs,
            etag: Mutex::new(INITIAL_ETAG.to_string()),
        })
    }

    /// Create a client from the agent configuration.
    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(config.metadata_url.clone(), config.long_poll_timeout_secs)
    }

    /// ETag of the last snapshot received.
    pub fn last_etag(&self) -> String {
        self.etag.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    /// Wait for the next snapshot.
    pub async fn watch(&self) -> Result<Snapshot, FetchError> {
        let last_etag = self.last_etag();
        let timeout = self.long_poll_timeout_secs.to_string();
        debug!(url = %self.base_url, last_etag = %last_etag, "Watching metadata");

        let response = self
            .client
            .get(&self.base_url)
            .header("Metadata-Flavor", "Google")
            .query(&[
                ("recursive", "true"),
                ("alt", "json"),
                ("wait_for_change", "true"),
                ("timeout_sec", timeout.as_str()),
                ("last_etag", last_etag.as_str()),
            ])
            .send()
            .await
            .map_err(FetchError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let etag = response
            .headers()
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);

        let snapshot: Snapshot = response.json().await.map_err(FetchError::from_reqwest)?;

        if let Some(etag) = etag {
            *self.etag.lock().unwrap_or_else(|p| p.into_inner()) = etag;
        }
        debug!(etag = %self.last_etag(), "Received metadata snapshot");

        Ok(snapshot)
    }
}
