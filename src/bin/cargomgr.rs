//! Cargo manager binary

use cargomgr::{Manager, ManagerConfig};
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "cargomgr")]
#[command(about = "Cargo manager: node registry, replica placement and write locks")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the manager server
    Serve {
        /// gRPC listen port
        #[arg(long)]
        port: Option<u16>,

        /// Interface to bind
        #[arg(long)]
        host: Option<String>,

        /// Bind address for the HTTP admin API
        #[arg(long)]
        admin: Option<SocketAddr>,

        /// TOML configuration file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Default wait bound for AcquireWriteLock (e.g. "30s")
        #[arg(long)]
        acquire_timeout: Option<String>,

        /// Write lock lease (e.g. "5m")
        #[arg(long)]
        lock_lease: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            port,
            host,
            admin,
            config,
            acquire_timeout,
            lock_lease,
        } => {
            // File and environment first, CLI flags have priority
            let mut manager_config = ManagerConfig::load(config.as_deref())?;
            if let Some(port) = port {
                manager_config.port = port;
            }
            if let Some(host) = host {
                manager_config.host = host;
            }
            if admin.is_some() {
                manager_config.admin_addr = admin;
            }
            if acquire_timeout.is_some() {
                manager_config.acquire_timeout = acquire_timeout;
            }
            if lock_lease.is_some() {
                manager_config.lock_lease = lock_lease;
            }
            manager_config.validate()?;

            tracing_subscriber::registry()
                .with(
                    tracing_subscriber::EnvFilter::try_from_default_env()
                        .unwrap_or_else(|_| manager_config.log_level.clone().into()),
                )
                .with(tracing_subscriber::fmt::layer())
                .init();

            let manager = Manager::new(manager_config)?;
            manager.serve().await?;
        }
    }

    Ok(())
}
