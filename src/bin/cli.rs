//! Gatelink CLI
//!
//! Command-line interface for the device identity and for talking to a
//! gateway: listen to its events or issue a single request.

use anyhow::{bail, Context};
use chrono::{TimeZone, Utc};
use clap::{Parser, Subcommand};
use console::style;
use gatelink::config::{config_path, load_config, load_config_from_path, save_config, validate_config};
use gatelink::gateway::EventFrame;
use gatelink::identity::DeviceIdentityStore;
use gatelink::storage::open_store;
use gatelink::{Config, ConnectionState, GatewayClient, VERSION};
use serde_json::Value;
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

#[derive(Parser)]
#[command(
    name = "gatelink",
    version = VERSION,
    about = "Gatelink - gateway protocol client",
    long_about = None
)]
struct Cli {
    /// Config file (defaults to the config directory)
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    /// Gateway URL, overrides the config file
    #[arg(long, global = true)]
    url: Option<String>,

    /// Log as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the device identity, creating it if needed
    Identity,

    /// Connect and print gateway events until Ctrl-C
    Listen,

    /// Connect, issue one request and print its payload
    Call {
        /// Method name, e.g. `health`
        method: String,
        /// Params as JSON
        params: Option<String>,
        /// Seconds to wait for the connection to become ready
        #[arg(long, default_value_t = 30)]
        wait: u64,
    },

    /// Print a sample configuration
    InitConfig {
        /// Write it to the config path instead of printing it
        #[arg(long)]
        write: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_json)?;

    match cli.command {
        Commands::Identity => show_identity(load(&cli.config, &cli.url)?).await,
        Commands::Listen => listen(load(&cli.config, &cli.url)?).await,
        Commands::Call { method, params, wait } => {
            let wait = Duration::from_secs(wait);
            call(load(&cli.config, &cli.url)?, &method, params.as_deref(), wait).await
        }
        Commands::InitConfig { write } => init_config(cli.config, write),
    }
}

fn init_logging(json: bool) -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new("gatelink=info"))?;

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }
    Ok(())
}

/// Load configuration: file, environment, then command-line overrides
fn load(path: &Option<PathBuf>, url: &Option<String>) -> anyhow::Result<Config> {
    let mut config = match path {
        Some(path) => {
            let mut config = load_config_from_path(path)?;
            gatelink::config::apply_env_overrides(&mut config);
            config
        }
        None => load_config()?,
    };
    if let Some(url) = url {
        config.gateway.url = url.clone();
    }

    let validation = validate_config(&config);
    for warning in &validation.warnings {
        println!("{} {}: {}", style("⚠").yellow(), warning.path, warning.message);
    }
    if !validation.valid {
        for error in &validation.errors {
            println!("{} {}: {}", style("✗").red(), error.path, error.message);
            if let Some(suggestion) = &error.suggestion {
                println!("    {}", style(suggestion).dim());
            }
        }
        bail!("invalid configuration");
    }
    Ok(config)
}

// ============================================================================
// Commands
// ============================================================================

async fn show_identity(config: Config) -> anyhow::Result<()> {
    let store = DeviceIdentityStore::shared(open_store(&config.storage));
    let identity = store.load_or_create().await;
    let token = store.load_token(&config.gateway.url).await;

    let created = Utc
        .timestamp_millis_opt(identity.created_at_ms)
        .single()
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| "unknown".to_string());

    println!("{}", style("Device identity").bold());
    println!("  Device ID:  {}", style(&identity.device_id).cyan());
    println!("  Public key: {}", identity.public_key);
    println!("  Created:    {}", created);
    println!(
        "  Token:      {}",
        if token.is_some() {
            style(format!("issued by {}", config.gateway.url)).green()
        } else {
            style("none yet (device not paired)".to_string()).dim()
        }
    );
    Ok(())
}

fn print_event(event: &EventFrame) {
    let seq = event.seq.map(|s| format!("#{} ", s)).unwrap_or_default();
    println!("{}{} {}", style(seq).dim(), style(&event.event).cyan(), event.payload);
}

async fn listen(config: Config) -> anyhow::Result<()> {
    let client = GatewayClient::builder(config)
        .on_event(print_event)
        .on_connection_change(|connected| {
            if connected {
                println!("{} connected", style("●").green());
            } else {
                println!("{} disconnected", style("●").red());
            }
        })
        .on_pairing_required(|required| {
            if required {
                println!("{} waiting for an operator to approve this device", style("⏳").yellow());
            } else {
                println!("{} device approved", style("✓").green());
            }
        })
        .on_gap(|gap| {
            println!(
                "{} missed events {}..{}",
                style("⚠").yellow(),
                gap.expected,
                gap.received
            );
        })
        .build()?;

    println!("Connecting to {} (Ctrl-C to stop)", style(&client.config().gateway.url).bold());
    client.connect();

    let mut state = client.subscribe_state();
    let halted = async { state.wait_for(|s| *s == ConnectionState::Halted).await.is_ok() };
    tokio::select! {
        result = tokio::signal::ctrl_c() => result.context("failed to listen for Ctrl-C")?,
        true = halted => {
            client.disconnect().await;
            bail!("gave up reconnecting to the gateway");
        }
    }

    client.disconnect().await;
    Ok(())
}

async fn call(config: Config, method: &str, params: Option<&str>, wait: Duration) -> anyhow::Result<()> {
    let params: Option<Value> = params
        .map(serde_json::from_str)
        .transpose()
        .context("params must be valid JSON")?;

    let client = GatewayClient::builder(config)
        .on_pairing_required(|required| {
            if required {
                eprintln!("{} waiting for an operator to approve this device", style("⏳").yellow());
            }
        })
        .build()?;
    client.connect();

    let mut state = client.subscribe_state();
    let settled = state.wait_for(|s| s.is_ready() || *s == ConnectionState::Halted);
    let reached = match tokio::time::timeout(wait, settled).await {
        Ok(Ok(state)) => *state,
        Ok(Err(_)) | Err(_) => client.state(),
    };
    if !reached.is_ready() {
        client.disconnect().await;
        bail!("gateway not ready after {:?} (state: {})", wait, reached);
    }

    debug!("Calling {}", method);
    let result = client.request(method, params).await;
    client.disconnect().await;

    let payload = result?;
    println!("{}", serde_json::to_string_pretty(&payload)?);
    Ok(())
}

fn init_config(path: Option<PathBuf>, write: bool) -> anyhow::Result<()> {
    let config = Config::default();
    if !write {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    let path = path.unwrap_or_else(config_path);
    if path.exists() {
        bail!("{} already exists", path.display());
    }
    save_config(&config, &path)?;
    println!("{} Wrote {}", style("✓").green(), path.display());
    Ok(())
}
