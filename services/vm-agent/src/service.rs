//! System service registration and control.
//!
//! The agent registers itself as a systemd unit. `install` writes the unit
//! and enables it, `start`/`stop` drive it, and `remove` disables and
//! deletes it. Any failure here is fatal to the invoking command.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

use thiserror::Error;
use tracing::info;

/// Service control verbs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceAction {
    Install,
    Start,
    Stop,
    Remove,
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    #[error("{command} failed: {detail}")]
    Command { command: String, detail: String },
}

/// A systemd-managed service for the agent binary.
#[derive(Debug, Clone)]
pub struct SystemdService {
    name: String,
    executable: PathBuf,
    unit_dir: PathBuf,
    systemctl: PathBuf,
}

impl SystemdService {
    /// Default directory for locally installed units.
    pub const UNIT_DIR: &'static str = "/etc/systemd/system";

    /// Create a service definition for `executable`.
    pub fn new(name: impl Into<String>, executable: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            executable: executable.into(),
            unit_dir: PathBuf::from(Self::UNIT_DIR),
            systemctl: PathBuf::from("systemctl"),
        }
    }

    /// Use a different unit directory.
    pub fn with_unit_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.unit_dir = dir.into();
        self
    }

    /// Use a different `systemctl` binary.
    pub fn with_systemctl(mut self, systemctl: impl Into<PathBuf>) -> Self {
        self.systemctl = systemctl.into();
        self
    }

    /// Path of the unit file.
    pub fn unit_path(&self) -> PathBuf {
        self.unit_dir.join(format!("{}.service", self.name))
    }

    /// Unit file contents.
    pub fn render_unit(&self) -> String {
        format!(
            "[Unit]\n\
             Description=VM configuration agent\n\
             Wants=network-online.target\n\
             After=network-online.target\n\
             \n\
             [Service]\n\
             Type=simple\n\
             ExecStart={} run\n\
             Restart=always\n\
             RestartSec=5\n\
             KillSignal=SIGTERM\n\
             \n\
             [Install]\n\
             WantedBy=multi-user.target\n",
            self.executable.display()
        )
    }

    /// Perform a control action.
    pub fn control(&self, action: ServiceAction) -> Result<(), ServiceError> {
        info!(service = %self.name, action = ?action, "Service control");
        match action {
            ServiceAction::Install => self.install(),
            ServiceAction::Start => self.systemctl(&["start", &self.name]),
            ServiceAction::Stop => self.systemctl(&["stop", &self.name]),
            ServiceAction::Remove => self.remove(),
        }
    }

    fn install(&self) -> Result<(), ServiceError> {
        let path = self.unit_path();
        write_atomic(&path, &self.render_unit()).map_err(|source| ServiceError::Io {
            context: format!("failed to write {}", path.display()),
            source,
        })?;
        info!(unit = %path.display(), "Service unit written");

        self.systemctl(&["daemon-reload"])?;
        self.systemctl(&["enable", &self.name])
    }

    fn remove(&self) -> Result<(), ServiceError> {
        self.systemctl(&["disable", &self.name])?;

        let path = self.unit_path();
        match fs::remove_file(&path) {
            Ok(()) => info!(unit = %path.display(), "Service unit removed"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(source) => {
                return Err(ServiceError::Io {
                    context: format!("failed to remove {}", path.display()),
                    source,
                })
            }
        }

        self.systemctl(&["daemon-reload"])
    }

    /// Run a `systemctl` command.
    fn systemctl(&self, args: &[&str]) -> Result<(), ServiceError> {
        let command = format!("{} {}", self.systemctl.display(), args.join(" "));
        let output = Command::new(&self.systemctl)
            .args(args)
            .output()
            .map_err(|source| ServiceError::Io {
                context: format!("failed to execute {}", command),
                source,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ServiceError::Command {
                command,
                detail: format!("{}: {}", output.status, stderr.trim()),
            });
        }

        Ok(())
    }
}

fn write_atomic(path: &Path, contents: &str) -> io::Result<()> {
    let tmp = path.with_extension("service.tmp");
    fs::write(&tmp, contents)?;
    fs::rename(&tmp, path)
}
