//! Configuration for the host agent.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

/// Host agent configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Metadata service base URL.
    pub metadata_url: String,

    /// Path to the local override file.
    pub override_path: PathBuf,

    /// Delay between a failed metadata fetch and the next attempt.
    pub fetch_backoff: Duration,

    /// How long the metadata service may hold a long-poll open, in seconds.
    pub long_poll_timeout_secs: u64,

    /// Serial console device that receives a copy of the logs.
    pub serial_port: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Name used when registering as a system service.
    pub service_name: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            metadata_url: "http://169.254.169.254/computeMetadata/v1/".to_string(),
            override_path: PathBuf::from("/etc/vmagent/instance_configs.cfg"),
            fetch_backoff: vmagent_reconcile::DEFAULT_FETCH_BACKOFF,
            long_poll_timeout_secs: 60,
            serial_port: None,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            service_name: "vm-agent".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        let metadata_url = lookup("VMAGENT_METADATA_URL").unwrap_or(defaults.metadata_url);

        let override_path = lookup("VMAGENT_OVERRIDE_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.override_path);

        let fetch_backoff = match lookup("VMAGENT_BACKOFF_SECS") {
            Some(v) => {
                let secs: u64 = v
                    .parse()
                    .with_context(|| format!("invalid VMAGENT_BACKOFF_SECS '{}'", v))?;
                if secs == 0 {
                    anyhow::bail!("VMAGENT_BACKOFF_SECS must be at least 1");
                }
                Duration::from_secs(secs)
            }
            None => defaults.fetch_backoff,
        };

        let long_poll_timeout_secs = match lookup("VMAGENT_LONG_POLL_TIMEOUT_SECS") {
            Some(v) => v
                .parse()
                .with_context(|| format!("invalid VMAGENT_LONG_POLL_TIMEOUT_SECS '{}'", v))?,
            None => defaults.long_poll_timeout_secs,
        };

        let serial_port = lookup("VMAGENT_SERIAL_PORT")
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from);

        let log_level = lookup("VMAGENT_LOG_LEVEL").unwrap_or(defaults.log_level);

        let log_format = match lookup("VMAGENT_LOG_FORMAT").as_deref() {
            None | Some("text") => LogFormat::Text,
            Some("json") => LogFormat::Json,
            Some(other) => anyhow::bail!("invalid VMAGENT_LOG_FORMAT '{}'", other),
        };

        let service_name = lookup("VMAGENT_SERVICE_NAME").unwrap_or(defaults.service_name);

        Ok(Self {
            metadata_url,
            override_path,
            fetch_backoff,
            long_poll_timeout_secs,
            serial_port,
            log_level,
            log_format,
            service_name,
        })
    }
}
