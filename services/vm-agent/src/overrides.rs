//! Local override file loading.
//!
//! The override file is INI-formatted. It is read fresh every cycle so
//! operators can flip domains on and off without restarting the agent.

use std::io;
use std::path::{Path, PathBuf};

use config::{Config as ConfigBuilder, File, FileFormat, Source};
use thiserror::Error;
use tracing::error;
use vmagent_reconcile::OverrideConfig;

#[derive(Debug, Error)]
pub enum OverrideError {
    #[error("failed to read override file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse override file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: config::ConfigError,
    },
}

/// Read and parse the override file. A missing file yields an empty config.
pub fn read_overrides(path: &Path) -> Result<OverrideConfig, OverrideError> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(OverrideConfig::empty()),
        Err(source) => {
            return Err(OverrideError::Read {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    parse_overrides(&contents).map_err(|source| OverrideError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Load the override file, degrading to an empty config on any error.
pub fn load_overrides(path: &Path) -> OverrideConfig {
    read_overrides(path).unwrap_or_else(|e| {
        error!(error = %e, "Using default configuration");
        OverrideConfig::empty()
    })
}

fn parse_overrides(contents: &str) -> Result<OverrideConfig, config::ConfigError> {
    let parsed = ConfigBuilder::builder()
        .add_source(File::from_str(contents, FileFormat::Ini))
        .build()?;

    let mut entries = Vec::new();
    for (section, value) in parsed.collect()? {
        // Keys outside any section have no meaning here.
        let Ok(table) = value.into_table() else {
            continue;
        };
        for (key, value) in table {
            if let Ok(value) = value.into_string() {
                entries.push((section.clone(), key, value));
            }
        }
    }
    Ok(OverrideConfig::from_entries(entries))
}
