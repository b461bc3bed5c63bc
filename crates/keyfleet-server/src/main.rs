// ============================================
// File: crates/keyfleet-server/src/main.rs
// ============================================
//! # Keyfleet Admin Entry Point
//!
//! ## Creation Reason
//! Main entry point for the `keyfleetd` binary. Operators manage nodes,
//! clients and credentials of the fleet from here.
//!
//! ## Main Functionality
//! - CLI argument parsing with clap
//! - Logging initialization with tracing
//! - Configuration loading
//! - One `Fleet` per invocation, backed by the state file
//!
//! ## Usage
//! ```bash
//! # Register a node and provision every existing client on it
//! keyfleetd node add Vienna --url https://10.0.0.5:2053 \
//!     --domain vienna.example.com --password secret
//!
//! # Create a client on every enabled node
//! keyfleetd client add alice@example.com
//!
//! # Other commands
//! keyfleetd client disable alice@example.com
//! keyfleetd client subscription alice@example.com
//! keyfleetd key add alice@example.com 'trojan://pw@legacy.example.com:443'
//! keyfleetd stats --node Vienna
//! keyfleetd validate
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - The state file contains node passwords; keep it on a private volume
//! - `RUST_LOG` overrides the configured log level
//! - Per-node failures are printed, not turned into a non-zero exit
//!
//! ## Last Modified
//! v0.1.0 - Initial CLI implementation

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use keyfleet_common::CredentialId;
use keyfleet_panel::HttpPanelConnector;
use keyfleet_server::services::{BackfillReport, ClientOutcome};
use keyfleet_server::store::{NewNode, NodePatch};
use keyfleet_server::{Fleet, FleetConfig, NodeOutcome, NodeSnapshot, OutcomeStatus, Store};

// ============================================
// CLI Definition
// ============================================

/// Keyfleet credential reconciliation for proxy-panel fleets
#[derive(Parser, Debug)]
#[command(name = "keyfleetd")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, default_value = "/etc/keyfleet/keyfleet.toml")]
    config: PathBuf,

    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Manage panel nodes
    Node {
        #[command(subcommand)]
        action: NodeCommand,
    },

    /// Manage clients
    Client {
        #[command(subcommand)]
        action: ClientCommand,
    },

    /// Manage individual credentials
    Key {
        #[command(subcommand)]
        action: KeyCommand,
    },

    /// Show node statistics
    Stats {
        /// Only this node
        #[arg(long)]
        node: Option<String>,
    },

    /// Validate configuration file
    Validate,
}

#[derive(Subcommand, Debug)]
enum NodeCommand {
    /// Register a node and backfill every client on it
    Add {
        /// Unique node name
        name: String,
        /// Control-API base URL
        #[arg(long)]
        url: String,
        /// Public domain used in connection URLs
        #[arg(long)]
        domain: String,
        /// Control-API username
        #[arg(long, default_value = "admin")]
        username: String,
        /// Control-API password
        #[arg(long)]
        password: String,
    },

    /// List nodes
    List,

    /// Edit a node
    Edit {
        /// Node name
        name: String,
        /// New name
        #[arg(long)]
        rename: Option<String>,
        /// New control-API base URL
        #[arg(long)]
        url: Option<String>,
        /// New public domain
        #[arg(long)]
        domain: Option<String>,
        /// New username
        #[arg(long)]
        username: Option<String>,
        /// New password
        #[arg(long)]
        password: Option<String>,
    },

    /// Include a node in fan-outs again
    Enable {
        /// Node name
        name: String,
    },

    /// Exclude a node from fan-outs
    Disable {
        /// Node name
        name: String,
    },

    /// Revoke every client on a node and remove it
    Remove {
        /// Node name
        name: String,
    },

    /// Provision every client on a node
    Backfill {
        /// Node name
        name: String,
    },

    /// Compare the ledger with a node's entries
    Audit {
        /// Node name
        name: String,
    },
}

#[derive(Subcommand, Debug)]
enum ClientCommand {
    /// Create a client on every enabled node
    Add {
        /// Unique client label
        label: String,
        /// Maximum simultaneous IPs (0 = unlimited)
        #[arg(long, default_value_t = 0)]
        limit: u32,
    },

    /// List clients
    List,

    /// Enable a client fleet-wide
    Enable {
        /// Client label
        label: String,
    },

    /// Disable a client fleet-wide
    Disable {
        /// Client label
        label: String,
    },

    /// Revoke a client fleet-wide and delete it
    Remove {
        /// Client label
        label: String,
    },

    /// Set a client's connection limit
    Limit {
        /// Client label
        label: String,
        /// Maximum simultaneous IPs (0 = unlimited)
        limit: u32,
    },

    /// Print a client's subscription
    Subscription {
        /// Client label
        label: String,
        /// Print only the base64 bundle
        #[arg(long)]
        raw: bool,
    },
}

#[derive(Subcommand, Debug)]
enum KeyCommand {
    /// Attach an operator-supplied link to a client
    Add {
        /// Client label
        label: String,
        /// Connection link
        link: String,
    },

    /// List a client's credentials
    List {
        /// Client label
        label: String,
    },

    /// Delete one credential from the ledger
    Remove {
        /// Credential id
        id: CredentialId,
    },
}

// ============================================
// Main
// ============================================

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Validate => {
            init_logging("info");
            cmd_validate(&cli.config).await
        }
        command => run(command, &cli.config).await,
    };

    if let Err(e) = result {
        error!("{e:#}");
        std::process::exit(1);
    }
}

async fn run(command: Commands, config_path: &Path) -> anyhow::Result<()> {
    let config = load_or_default_config(config_path).await?;
    init_logging(&config.logging.level);
    let fleet = open_fleet(&config)?;

    match command {
        Commands::Node { action } => cmd_node(&fleet, action).await,
        Commands::Client { action } => cmd_client(&fleet, action).await,
        Commands::Key { action } => cmd_key(&fleet, action),
        Commands::Stats { node } => cmd_stats(&fleet, node).await,
        Commands::Validate => Ok(()),
    }
}

// ============================================
// Commands
// ============================================

async fn cmd_node(fleet: &Fleet, action: NodeCommand) -> anyhow::Result<()> {
    match action {
        NodeCommand::Add {
            name,
            url,
            domain,
            username,
            password,
        } => {
            let (node, report) = fleet
                .add_node(NewNode {
                    name,
                    base_url: url,
                    domain,
                    username,
                    password,
                })
                .await?;
            println!("✅ Node '{}' registered (id {})", node.name, node.id);
            print_backfill(&report);
        }
        NodeCommand::List => {
            let nodes = fleet.nodes();
            if nodes.is_empty() {
                println!("No nodes registered");
            }
            for node in nodes {
                let state = if node.enabled { "enabled" } else { "disabled" };
                println!(
                    "{:>4}  {:<16} {:<9} {:<32} {}",
                    node.id, node.name, state, node.base_url, node.domain
                );
            }
        }
        NodeCommand::Edit {
            name,
            rename,
            url,
            domain,
            username,
            password,
        } => {
            let patch = NodePatch {
                name: rename,
                base_url: url,
                domain,
                username,
                password,
            };
            let (node, rewritten) = fleet.update_node(&name, patch)?;
            println!("✅ Node '{}' updated, {rewritten} URLs rewritten", node.name);
        }
        NodeCommand::Enable { name } => {
            fleet.set_node_enabled(&name, true)?;
            println!("✅ Node '{name}' enabled");
        }
        NodeCommand::Disable { name } => {
            fleet.set_node_enabled(&name, false)?;
            println!("✅ Node '{name}' disabled");
        }
        NodeCommand::Remove { name } => {
            let report = fleet.remove_node(&name).await?;
            print_client_outcomes(&report.revocations);
            println!(
                "✅ Node '{}' removed, {} credentials dropped",
                report.node, report.removed_credentials
            );
        }
        NodeCommand::Backfill { name } => {
            let report = fleet.backfill_node(&name).await?;
            print_backfill(&report);
        }
        NodeCommand::Audit { name } => {
            let report = fleet.audit_node(&name).await?;
            if report.is_consistent() {
                println!("✅ Node '{name}' matches the ledger");
                return Ok(());
            }
            for label in &report.missing_remotely {
                println!("❌ missing on node:   {label}");
            }
            for label in &report.unknown_remotely {
                println!("⚠️  unknown to ledger: {label}");
            }
        }
    }
    Ok(())
}

async fn cmd_client(fleet: &Fleet, action: ClientCommand) -> anyhow::Result<()> {
    match action {
        ClientCommand::Add { label, limit } => {
            let (client, outcomes) = fleet.create_client(&label, limit).await?;
            println!("✅ Client '{}' created (id {})", client.label, client.id);
            print_outcomes(&outcomes);
        }
        ClientCommand::List => {
            let clients = fleet.clients();
            if clients.is_empty() {
                println!("No clients");
            }
            for client in clients {
                let state = if client.enabled { "enabled" } else { "disabled" };
                let keys = fleet.credentials(&client.label)?.len();
                println!(
                    "{:>4}  {:<32} {:<9} limit={:<3} keys={keys}",
                    client.id, client.label, state, client.limit_ip
                );
            }
        }
        ClientCommand::Enable { label } => print_outcomes(&fleet.enable_client(&label).await?),
        ClientCommand::Disable { label } => print_outcomes(&fleet.disable_client(&label).await?),
        ClientCommand::Remove { label } => {
            let (outcomes, removed) = fleet.delete_client(&label).await?;
            print_outcomes(&outcomes);
            println!("✅ Client '{label}' deleted, {removed} credentials dropped");
        }
        ClientCommand::Limit { label, limit } => {
            print_outcomes(&fleet.set_connection_limit(&label, limit).await?);
        }
        ClientCommand::Subscription { label, raw } => {
            let subscription = fleet.subscription(&label)?;
            if raw {
                println!("{}", subscription.bundle);
                return Ok(());
            }
            println!("Link: {}", subscription.link);
            println!();
            for url in &subscription.urls {
                println!("{url}");
            }
        }
    }
    Ok(())
}

fn cmd_key(fleet: &Fleet, action: KeyCommand) -> anyhow::Result<()> {
    match action {
        KeyCommand::Add { label, link } => {
            let credential = fleet.add_manual_credential(&label, &link)?;
            println!("✅ Credential {} added to '{label}'", credential.id);
        }
        KeyCommand::List { label } => {
            for credential in fleet.credentials(&label)? {
                let origin = if credential.is_manual() { "manual" } else { "managed" };
                let state = if credential.enabled { "" } else { " (disabled)" };
                println!("{:>4}  {origin:<8}{} {state}", credential.id, credential.url);
            }
        }
        KeyCommand::Remove { id } => {
            fleet.delete_credential(id)?;
            println!("✅ Credential {id} deleted");
        }
    }
    Ok(())
}

async fn cmd_stats(fleet: &Fleet, node: Option<String>) -> anyhow::Result<()> {
    if let Some(name) = node {
        let snapshot = fleet.get_stats(&name).await?;
        print_snapshot(&name, &snapshot);
        return Ok(());
    }

    let snapshots = fleet.fleet_stats().await;
    if snapshots.is_empty() {
        println!("No nodes registered");
    }
    for (node, snapshot) in snapshots {
        print_snapshot(&node.name, &snapshot);
    }
    Ok(())
}

/// Validates configuration file.
async fn cmd_validate(config_path: &Path) -> anyhow::Result<()> {
    if !config_path.exists() {
        println!("⚠️  Config file not found: {}", config_path.display());
        println!("   Defaults will be used.");
        return Ok(());
    }

    let config = FleetConfig::load(config_path).await?;

    println!("✅ Configuration is valid");
    println!();
    println!("Storage:");
    println!("   State File:   {}", config.storage.state_file.display());
    println!();
    println!("Panel:");
    println!("   API Prefix:   {}", config.panel.api_prefix);
    println!("   Timeout:      {}s", config.panel.request_timeout_secs);
    println!();
    println!("Inbounds:");
    println!("   Protocol:     {}", config.inbounds.protocol);
    println!(
        "   Secondary:    {}",
        config.inbounds.secondary_remark.as_deref().unwrap_or("-")
    );
    println!();
    println!("Reconcile:");
    println!("   Concurrency:  {}", config.reconcile.max_concurrency);
    println!("   Rotate IDs:   {}", config.reconcile.rotate_identifier);
    println!();

    Ok(())
}

// ============================================
// Helper Functions
// ============================================

/// Initializes the tracing subscriber.
fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(filter)
        .try_init()
        .ok();
}

/// Loads config or returns default.
async fn load_or_default_config(path: &Path) -> anyhow::Result<FleetConfig> {
    if path.exists() {
        Ok(FleetConfig::load(path).await?)
    } else {
        Ok(FleetConfig::default())
    }
}

fn open_fleet(config: &FleetConfig) -> anyhow::Result<Fleet> {
    let store = Arc::new(Store::open(&config.storage.state_file)?);
    info!(state_file = %config.storage.state_file.display(), "State loaded");
    let connector = Arc::new(HttpPanelConnector::new(config.panel.clone()));
    Ok(Fleet::new(config, store, connector))
}

fn print_outcomes(outcomes: &[NodeOutcome]) {
    if outcomes.is_empty() {
        println!("No enabled nodes");
    }
    for outcome in outcomes {
        let mark = match outcome.status {
            OutcomeStatus::Success => "✅",
            OutcomeStatus::Degraded => "⚠️ ",
            OutcomeStatus::Failed => "❌",
        };
        let hint = if outcome.retryable { " (retry later)" } else { "" };
        println!("{mark} {:<16} {}{hint}", outcome.node_name, outcome.detail);
    }
}

fn print_client_outcomes(outcomes: &[ClientOutcome]) {
    for entry in outcomes {
        print!("{:<32} ", entry.client);
        print_outcomes(std::slice::from_ref(&entry.outcome));
    }
}

fn print_backfill(report: &BackfillReport) {
    print_client_outcomes(&report.outcomes);
    println!(
        "Backfill of '{}': {} succeeded, {} failed",
        report.node, report.succeeded, report.failed
    );
}

fn print_snapshot(name: &str, snapshot: &NodeSnapshot) {
    if !snapshot.online {
        println!("❌ {name:<16} offline");
        return;
    }
    println!(
        "✅ {name:<16} clients {}/{} enabled, {} active, up {} B, down {} B",
        snapshot.enabled_clients,
        snapshot.total_clients,
        snapshot.active_clients,
        snapshot.up,
        snapshot.down
    );
}
