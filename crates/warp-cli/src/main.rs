//! warpctl: WARP account manager
//!
//! Registers a device with the WARP registration service, binds it to a
//! license key and writes a WireGuard profile for it.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;
use warp_account::{AccountOrchestrator, AccountStore, DeviceStatus, ProfileStore, WarpConfig};
use warp_api::WarpApiClient;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser, Debug)]
#[command(name = "warpctl")]
#[command(about = "Manage a WARP device account and its WireGuard profile")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "warpctl.toml", env = "WARPCTL_CONFIG")]
    config: PathBuf,

    /// Directory holding the account and profile files (overrides config file)
    #[arg(short, long, env = "WARPCTL_DIR")]
    dir: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
enum Command {
    /// Register a new device account
    Register,
    /// Bind the account to a license key
    Update {
        license_key: String,
        /// Name shown for this device in the account
        device_name: Option<String>,
    },
    /// Write the WireGuard profile
    Generate,
    /// Show the device and account state
    Status,
    /// Register if needed, update and generate in one go
    Run { license_key: String },
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "warpctl=debug,warp_account=debug,warp_api=debug"
    } else {
        "warpctl=info,warp_account=info,warp_api=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}

fn load_config(cli: &Cli) -> Result<WarpConfig> {
    let mut config = WarpConfig::load(&cli.config)
        .with_context(|| format!("cannot load config {}", cli.config.display()))?;
    if let Some(dir) = &cli.dir {
        config = config.with_conf_dir(dir);
    }
    Ok(config)
}

fn print_status(status: &DeviceStatus) {
    println!("{}", status);
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = load_config(&cli)?;
    debug!("Using {}", config.conf_dir.display());

    let accounts = AccountStore::new(config.account_path());
    let profiles = ProfileStore::new(
        config.warp_config_path(),
        config.profile_path(),
        config.profile.clone(),
    );
    let client = WarpApiClient::new(&config.api)?;
    let mut orchestrator = AccountOrchestrator::new(client, accounts, profiles)
        .with_platform(config.api.platform.clone());

    match cli.command {
        Command::Register => {
            if let Some(status) = orchestrator.register().await? {
                print_status(&status);
            }
        }
        Command::Update { license_key, device_name } => {
            if let Some(status) = orchestrator.update(&license_key, device_name.as_deref()).await? {
                print_status(&status);
            }
        }
        Command::Generate => {
            let status = orchestrator.generate().await?;
            print_status(&status);
            info!("Profile written to {}", orchestrator.profiles().profile_path().display());
        }
        Command::Status => {
            let status = orchestrator.status().await?;
            print_status(&status);
        }
        Command::Run { license_key } => {
            let status = orchestrator.run(&license_key).await?;
            print_status(&status);
        }
    }

    Ok(())
}
