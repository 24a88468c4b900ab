//! `provctl`: command-line front end of the discovery controller.
//!
//! # Usage
//!
//! ```text
//! provctl [--config <PATH>] [--quiet] search [--prefix P] [--service ID]...
//!         [--transport K] [--security L] [--pop S] [--username U] [--json]
//! provctl [--config <PATH>] [--quiet] create --name N [--transport K]
//!         [--security L] [--pop S] [--username U] [--password W] [--json]
//! ```
//!
//! Transports: `radio-link` (`ble`), `local-network` (`softap`).
//! Security levels: `none` (`unsecure`), `encrypted` (`secure`),
//! `encrypted-mutual-auth` (`secure2`).
//!
//! Radio scans run against the simulated radio described by the
//! `[[simulated_devices]]` table of the config file.  Ctrl+C during a scan
//! stops it and reports the cancellation.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tracing::{debug, info};

use prov_controller::application::DiscoveryError;
use prov_controller::infrastructure::logging::{enable_logging, init_logging};
use prov_controller::infrastructure::storage::config::{load_config, load_config_from, AppConfig};
use prov_controller::infrastructure::transport::simulated::SimulatedRadioFactory;
use prov_controller::{CreateDeviceRequest, Orchestrator, SearchRequest};
use prov_core::{DeviceRecord, SecurityLevel, TransportKind};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Discover provisionable devices and prepare them for provisioning.
#[derive(Debug, Parser)]
#[command(
    name = "provctl",
    about = "Discovery and session-configuration controller for provisionable devices",
    version
)]
struct Cli {
    /// Config file to use instead of the platform default.
    #[arg(long, global = true, env = "PROVCTL_CONFIG")]
    config: Option<PathBuf>,

    /// Switch log output off.
    #[arg(long, short, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Scan for every device matching a name prefix and/or service ids.
    Search(SearchArgs),
    /// Obtain one device by name, ready for provisioning.
    Create(CreateArgs),
}

#[derive(Debug, Args)]
struct SearchArgs {
    /// Only report devices whose name starts with this prefix.
    #[arg(long)]
    prefix: Option<String>,

    /// Only report devices advertising this service id (repeatable).
    #[arg(long = "service", value_name = "ID")]
    services: Vec<String>,

    /// Transport to scan on [default: from config].
    #[arg(long)]
    transport: Option<TransportKind>,

    /// Security level attached to found devices [default: from config].
    #[arg(long)]
    security: Option<SecurityLevel>,

    /// Proof of possession attached to found devices.
    #[arg(long)]
    pop: Option<String>,

    /// Username attached to found devices.
    #[arg(long)]
    username: Option<String>,

    /// Print JSON instead of a table.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Args)]
struct CreateArgs {
    /// Exact device name.
    #[arg(long)]
    name: String,

    /// Transport the device is reached over [default: from config].
    #[arg(long)]
    transport: Option<TransportKind>,

    /// Security level of the provisioning session [default: from config].
    #[arg(long)]
    security: Option<SecurityLevel>,

    /// Proof of possession for the session.
    #[arg(long)]
    pop: Option<String>,

    #[arg(long)]
    username: Option<String>,

    /// Password of the device's access point (local-network only).
    #[arg(long, env = "PROVCTL_NETWORK_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Print JSON instead of a table.
    #[arg(long)]
    json: bool,
}

impl SearchArgs {
    fn to_request(&self, default_transport: TransportKind) -> SearchRequest {
        let mut request = SearchRequest::new(self.transport.unwrap_or(default_transport));
        if let Some(prefix) = &self.prefix {
            request = request.with_name_prefix(prefix.clone());
        }
        if !self.services.is_empty() {
            request = request.with_service_ids(self.services.iter().cloned());
        }
        if let Some(level) = self.security {
            request = request.with_security(level);
        }
        if let Some(pop) = &self.pop {
            request = request.with_proof_of_possession(pop.clone());
        }
        if let Some(username) = &self.username {
            request = request.with_username(username.clone());
        }
        request
    }
}

impl CreateArgs {
    fn to_request(&self, default_transport: TransportKind) -> CreateDeviceRequest {
        let mut request = CreateDeviceRequest::new(
            self.name.clone(),
            self.transport.unwrap_or(default_transport),
        );
        if let Some(level) = self.security {
            request = request.with_security(level);
        }
        if let Some(pop) = &self.pop {
            request = request.with_proof_of_possession(pop.clone());
        }
        if let Some(username) = &self.username {
            request = request.with_username(username.clone());
        }
        if let Some(password) = &self.password {
            request = request.with_network_password(password.clone());
        }
        request
    }
}

// ── Output ────────────────────────────────────────────────────────────────────

/// What `provctl` prints for a device.  Secrets are never printed.
#[derive(Debug, Serialize)]
struct DeviceView<'a> {
    name: &'a str,
    transport: TransportKind,
    security: SecurityLevel,
    #[serde(skip_serializing_if = "no_services")]
    service_ids: &'a [String],
    has_credentials: bool,
}

fn no_services(ids: &&[String]) -> bool {
    ids.is_empty()
}

impl<'a> From<&'a DeviceRecord> for DeviceView<'a> {
    fn from(record: &'a DeviceRecord) -> Self {
        Self {
            name: &record.name,
            transport: record.transport_kind,
            security: record.security_level,
            service_ids: &record.service_ids,
            has_credentials: record.credentials.is_some(),
        }
    }
}

fn print_devices(devices: &[DeviceRecord], json: bool) -> anyhow::Result<()> {
    let views: Vec<DeviceView<'_>> = devices.iter().map(DeviceView::from).collect();
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&views).context("failed to encode devices as JSON")?
        );
        return Ok(());
    }

    println!("{:<24} {:<14} {:<22} SERVICES", "NAME", "TRANSPORT", "SECURITY");
    for view in &views {
        println!(
            "{:<24} {:<14} {:<22} {}",
            view.name,
            view.transport.to_string(),
            view.security.to_string(),
            view.service_ids.join(",")
        );
    }
    Ok(())
}

// ── Completion bridging ───────────────────────────────────────────────────────

/// Waits for the completion behind `rx`; Ctrl+C stops the scan first.
async fn await_completion<T>(
    orchestrator: &Orchestrator,
    mut rx: oneshot::Receiver<Result<T, DiscoveryError>>,
) -> anyhow::Result<T> {
    let received = tokio::select! {
        received = &mut rx => received,
        _ = tokio::signal::ctrl_c() => {
            info!("interrupted; stopping scan");
            if let Err(e) = orchestrator.stop_search() {
                debug!(error = %e, "nothing to stop");
            }
            rx.await
        }
    };
    let outcome = received.context("discovery completion was dropped")?;
    outcome.context("discovery failed")
}

async fn run_search(orchestrator: &Orchestrator, args: &SearchArgs) -> anyhow::Result<()> {
    let request = args.to_request(orchestrator.config().default_transport);
    let (tx, rx) = oneshot::channel();
    orchestrator.search(request, move |result| {
        let _ = tx.send(result);
    });

    let devices = await_completion(orchestrator, rx).await?;
    print_devices(&devices, args.json)
}

async fn run_create(orchestrator: &Orchestrator, args: &CreateArgs) -> anyhow::Result<()> {
    let request = args.to_request(orchestrator.config().default_transport);
    let (tx, rx) = oneshot::channel();
    orchestrator.create_device(request, move |result| {
        let _ = tx.send(result);
    });

    let device = await_completion(orchestrator, rx).await?;
    print_devices(std::slice::from_ref(&device), args.json)
}

fn read_config(cli: &Cli) -> anyhow::Result<AppConfig> {
    match &cli.config {
        Some(path) => load_config_from(path)
            .with_context(|| format!("failed to load config from {}", path.display())),
        None => load_config().context("failed to load config"),
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = read_config(&cli)?;

    init_logging(&config.logging.level, config.logging.enabled)
        .context("failed to initialise logging")?;
    if cli.quiet {
        enable_logging(false).context("failed to silence logging")?;
    }

    info!(
        devices = config.simulated_devices.len(),
        timeout_ms = config.discovery.scan_timeout_ms,
        "provctl starting"
    );

    let factory = Arc::new(SimulatedRadioFactory::new(
        config.simulated_devices.clone(),
        Handle::current(),
    ));
    let orchestrator = Orchestrator::new(factory, config.discovery.to_orchestrator_config());

    match &cli.command {
        Command::Search(args) => run_search(&orchestrator, args).await,
        Command::Create(args) => run_create(&orchestrator, args).await,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
