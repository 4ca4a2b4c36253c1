//! Rotor: rotating, de-duplicated VPN egress
//!
//! Command line entry point. Loads the configuration, sets up logging and
//! runs one daemon operation per invocation.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use rotor_vpn::{RotorConfig, SessionManager};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

// Use mimalloc as the global allocator for reduced memory fragmentation
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

const DEFAULT_LOG_FILTER: &str = "rotor=info,rotor_vpn=info,rotor_network=info";

#[derive(Debug, Parser)]
#[command(name = "rotor", version, about = "Connect through a never-used VPN provider")]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, env = "ROTOR_CONFIG")]
    config: Option<PathBuf>,

    /// Control daemon base URI
    #[arg(long, env = "ROTOR_DAEMON_URI")]
    daemon_uri: Option<String>,

    /// Directory holding the exclusion stores
    #[arg(long, env = "ROTOR_STATE_DIR")]
    state_dir: Option<PathBuf>,

    /// Maximum reselections per negotiation
    #[arg(long)]
    max_retries: Option<u32>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Connect through a fresh provider and print the session as JSON
    Acquire {
        /// Keep the session even when its exit IP was seen before
        #[arg(long)]
        keep_duplicate: bool,
    },
    /// Disconnect the current session
    Release,
    /// Print the daemon connection status
    Status,
    /// Refresh the catalog and list provider ids
    Proposals,
}

impl Cli {
    fn load_config(&self) -> Result<RotorConfig> {
        let mut config = match &self.config {
            Some(path) => RotorConfig::from_toml_file(path)
                .with_context(|| format!("failed to load {}", path.display()))?,
            None => RotorConfig::default(),
        };

        if let Some(uri) = &self.daemon_uri {
            config.daemon_uri = uri.clone();
        }
        if let Some(dir) = &self.state_dir {
            config.state_dir = dir.clone();
        }
        if let Some(max) = self.max_retries {
            config.max_retries = max;
        }

        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();
    let config = cli.load_config()?;
    let mut manager = SessionManager::from_config(&config).await?;

    match cli.command {
        Command::Acquire { keep_duplicate } => {
            let session = manager.acquire_unique_session().await?;
            println!("{}", serde_json::to_string_pretty(&session)?);

            if !session.is_novel_ip {
                if keep_duplicate {
                    warn!("Keeping session with reused exit IP {}", session.exit_ip);
                } else {
                    manager.release(&session.consumer_id).await;
                    bail!("exit IP {} was already used", session.exit_ip);
                }
            }
            info!(
                "Session up via {} after {} retries",
                session.proposal.provider_id, session.retry_count
            );
        }
        Command::Release => {
            let consumer = manager.consumer_id().await?;
            manager.release(&consumer).await;
        }
        Command::Status => {
            println!("{}", manager.status().await?);
        }
        Command::Proposals => {
            let count = manager.refresh_catalog().await?;
            for proposal in manager.catalog().proposals() {
                println!("{}", proposal.provider_id);
            }
            info!("{} proposals", count);
        }
    }

    Ok(())
}
