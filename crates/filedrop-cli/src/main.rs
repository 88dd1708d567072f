//! filedrop daemon
//!
//! Usage:
//!   filedrop [--config filedrop.toml] start [--addr 0.0.0.0:8900]
//!   filedrop [--config filedrop.toml] config

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use filedrop_cli::config::default_config_path;
use filedrop_cli::{Config, FiledropServer, MemorySessionStore, SessionStore};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "filedrop")]
#[command(about = "File listing API and WebRTC signaling relay", long_about = None)]
struct Cli {
    /// Config file, created with defaults if missing
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the daemon
    Start {
        /// Overrides server.bind_address
        #[arg(long)]
        addr: Option<String>,
    },
    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("filedrop=info".parse()?))
        .init();

    let cli = Cli::parse();
    let config_path = cli.config.unwrap_or_else(default_config_path);
    let config = Config::load(&config_path)?;

    match cli.command {
        Commands::Start { addr } => {
            let addr = addr.unwrap_or_else(|| config.server.bind_address.clone());
            let store: Arc<dyn SessionStore> =
                Arc::new(MemorySessionStore::with_feed_capacity(config.store.feed_capacity));

            info!("Using config {}", config_path.display());
            FiledropServer::new(store, addr)
                .with_files_ttl(config.store.files_ttl())
                .with_outbound_buffer(config.server.outbound_buffer)
                .with_reap_interval(config.store.reap_interval())
                .run()
                .await?;
        }
        Commands::Config => {
            let rendered =
                toml::to_string_pretty(&config).context("Failed to render config")?;
            println!("# {}", config_path.display());
            print!("{}", rendered);
        }
    }

    Ok(())
}
