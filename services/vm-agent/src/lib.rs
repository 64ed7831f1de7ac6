//! VM host agent library.
//!
//! The agent runs inside a virtual machine and keeps its local
//! configuration in line with what the metadata service publishes.
//!
//! ## Architecture
//!
//! ```text
//! agent (lifecycle)
//! └── WatchLoop            (long-poll, backoff, snapshot succession)
//!     └── Dispatcher       (one task per domain, joined per cycle)
//!         ├── addresses
//!         ├── accounts
//!         ├── cluster
//!         └── diagnostics
//! ```
//!
//! ## Modules
//!
//! - `agent`: start/stop wiring around the watch loop
//! - `domains`: configuration domains and the host backend seam
//! - `metadata`: snapshot model and metadata service client
//! - `overrides`: local override file loading
//! - `service`: system service registration
//! - `watch`: the metadata watch loop

pub mod agent;
pub mod config;
pub mod domains;
pub mod logging;
pub mod metadata;
pub mod overrides;
pub mod service;
pub mod watch;

/// Agent version (semver).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// Re-export commonly used types
pub use config::Config;
pub use metadata::{MetadataClient, MetadataSource, Snapshot};
pub use watch::{WatchLoop, WatchStats};
