//! VM host agent.
//!
//! Reconciles the VM's network addresses, local accounts, diagnostics and
//! cluster membership against the metadata service.
//!
//! Usage: `vm-agent [run|noservice|install|start|stop|remove]`

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing::{error, info};
use vmagent::agent::{self, RunMode};
use vmagent::domains::{self, MockHost};
use vmagent::service::{ServiceAction, SystemdService};
use vmagent::{logging, Config, MetadataClient, WatchLoop};
use vmagent_reconcile::Dispatcher;

#[derive(Debug, Parser)]
#[command(name = "vm-agent", version, about = "VM configuration agent")]
struct Cli {
    /// What to do.
    #[arg(value_enum, default_value_t = Action::Run)]
    action: Action,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Action {
    /// Run under the service manager.
    Run,
    /// Run in the foreground until interrupted.
    Noservice,
    /// Register the system service.
    Install,
    /// Start the system service.
    Start,
    /// Stop the system service.
    Stop,
    /// Unregister the system service.
    Remove,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {:#}", e);
            return ExitCode::from(1);
        }
    };

    if let Err(e) = logging::init(&config) {
        eprintln!("Failed to initialize logging: {:#}", e);
        return ExitCode::from(1);
    }

    match run(cli.action, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "vm-agent failed");
            let mut source = e.source();
            while let Some(cause) = source {
                error!(cause = %cause, "caused by");
                source = cause.source();
            }
            ExitCode::from(1)
        }
    }
}

async fn run(action: Action, config: Config) -> Result<()> {
    let service_action = match action {
        Action::Run => return run_agent(config, RunMode::Service).await,
        Action::Noservice => return run_agent(config, RunMode::Foreground).await,
        Action::Install => ServiceAction::Install,
        Action::Start => ServiceAction::Start,
        Action::Stop => ServiceAction::Stop,
        Action::Remove => ServiceAction::Remove,
    };

    let executable = std::env::current_exe().context("failed to locate agent executable")?;
    SystemdService::new(&config.service_name, executable)
        .control(service_action)
        .with_context(|| format!("service {:?} failed", service_action))?;
    Ok(())
}

async fn run_agent(config: Config, mode: RunMode) -> Result<()> {
    info!(
        metadata_url = %config.metadata_url,
        override_path = %config.override_path.display(),
        mode = ?mode,
        "Configuration loaded"
    );

    let client = MetadataClient::from_config(&config)?;

    // Host mutations are recorded, not applied, until platform backends land.
    let backend = Arc::new(MockHost::new());
    let dispatcher = Dispatcher::new(domains::registry(backend));

    let watch_loop = WatchLoop::new(
        client,
        dispatcher,
        config.override_path.clone(),
        config.fetch_backoff,
    );

    agent::run(watch_loop, mode).await?;
    Ok(())
}
