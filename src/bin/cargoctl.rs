//! Command-line client for the cargo manager

use anyhow::Result;
use cargomgr::common::parse_duration;
use cargomgr::ManagerClient;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "cargoctl")]
#[command(about = "Talk to a cargo manager")]
struct Cli {
    /// Manager gRPC address
    #[arg(long, global = true, default_value = "http://127.0.0.1:7000")]
    manager: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a cargo node
    Register {
        #[arg(long)]
        ip: String,
        #[arg(long)]
        port: u32,
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        lon: f64,
        /// Total capacity
        #[arg(long)]
        size: f64,
    },
    /// Request a replica set for an application
    Request {
        app_id: String,
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        lon: f64,
        #[arg(long, default_value = "3")]
        replicas: i64,
    },
    /// Acquire an application's write lock
    Lock {
        app_id: String,
        /// Give up after this long (e.g. "30s")
        #[arg(long)]
        wait: Option<String>,
    },
    /// Release an application's write lock
    Unlock {
        app_id: String,
        /// Generation printed by `lock`; skips the release if the replica set changed since
        #[arg(long)]
        generation: Option<u64>,
    },
    /// Show an application's replica set
    Replicas { app_id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut client = ManagerClient::connect(cli.manager).await?;

    match cli.command {
        Commands::Register {
            ip,
            port,
            lat,
            lon,
            size,
        } => {
            let ack = client.register(ip, port, lat, lon, size).await?;
            println!("{} ({})", ack.id, ack.ack);
        }
        Commands::Request {
            app_id,
            lat,
            lon,
            replicas,
        } => {
            let cargos = client.request_cargo(app_id, lat, lon, replicas).await?;
            if cargos.ips.is_empty() {
                println!("no cargo available");
            }
            for (ip, port) in cargos.ips.iter().zip(&cargos.ports) {
                println!("{}:{}", ip, port);
            }
        }
        Commands::Lock { app_id, wait } => {
            let wait = wait.as_deref().map(parse_duration).transpose()?;
            let ack = client.acquire_write_lock(app_id.clone(), wait).await?;
            println!(
                "{}: locked={} generation={}",
                app_id, ack.locked, ack.generation
            );
        }
        Commands::Unlock { app_id, generation } => {
            let released = client.release_write_lock(app_id.clone(), generation).await?;
            println!("{}: released={}", app_id, released);
        }
        Commands::Replicas { app_id } => {
            let info = client.get_replica_info(app_id).await?;
            for ((id, ip), port) in info.cargo_ids.iter().zip(&info.ips).zip(&info.ports) {
                println!("{}  {}:{}", id, ip, port);
            }
        }
    }

    Ok(())
}
