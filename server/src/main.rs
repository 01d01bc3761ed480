//! DoorLink backend binary.
//!
//! `serve` runs the device API; the remaining subcommands are the
//! operator's collaborator surface over the same database.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use doorlink_server::clock::SystemClock;
use doorlink_server::queue::CommandQueue;
use doorlink_server::routes::{AppState, build_router};
use doorlink_server::storage::DoorLinkDatabase;

#[derive(Parser, Debug)]
#[command(name = "doorlink-server")]
#[command(version, about = "DoorLink backend - device command queue and OTA releases")]
struct Args {
    /// Path to SQLite database file.
    #[arg(long, env = "DOORLINK_DB", default_value = "doorlink.db")]
    db: PathBuf,

    /// Output logs as JSON (for structured log aggregation).
    #[arg(long)]
    log_json: bool,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Serve the device API.
    Serve {
        #[arg(long, env = "LISTEN_ADDR", default_value = "0.0.0.0:8000")]
        addr: SocketAddr,
    },
    /// Manage registered devices.
    #[command(subcommand)]
    Device(DeviceCmd),
    /// Door-open commands.
    #[command(subcommand)]
    Command(CommandCmd),
    /// Device releases.
    #[command(subcommand)]
    Release(ReleaseCmd),
    /// Show a device's most recent logs.
    Logs {
        #[arg(long)]
        device: i64,
        #[arg(long, default_value_t = 50)]
        limit: i64,
    },
}

#[derive(Subcommand, Debug)]
enum CommandCmd {
    /// Queue an open command for a device.
    Queue {
        #[arg(long)]
        device: i64,
        /// Who asked for the door to open.
        #[arg(long)]
        requester: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
enum ReleaseCmd {
    /// Publish a firmware release, optionally with a settings document.
    Set {
        #[arg(long)]
        device: i64,
        #[arg(long)]
        firmware_version: String,
        /// File holding the firmware artifact.
        #[arg(long)]
        firmware: PathBuf,
        /// File holding the settings document.
        #[arg(long, requires = "config_version")]
        config: Option<PathBuf>,
        #[arg(long, requires = "config")]
        config_version: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
enum DeviceCmd {
    /// Register a device and print its token.
    Add { label: String },
    List,
    Remove { id: i64 },
}

fn init_tracing(json: bool) {
    let env_filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG")
            .unwrap_or_else(|_| "doorlink_server=info,tower_http=info".into()),
    );
    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

fn read_text(path: &PathBuf) -> anyhow::Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_json);

    info!(path = %args.db.display(), "Opening database");
    let db = DoorLinkDatabase::open(&args.db).await?;
    let queue = CommandQueue::new(db.clone(), Arc::new(SystemClock));

    match args.command {
        Cmd::Serve { addr } => {
            info!(version = env!("CARGO_PKG_VERSION"), addr = %addr, "Starting doorlink-server");
            let app = build_router(AppState { queue });
            let listener = tokio::net::TcpListener::bind(addr).await?;
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await?;
        }
        Cmd::Device(DeviceCmd::Add { label }) => {
            let device = queue.register_device(&label).await?;
            println!("{}\t{}\t{}", device.id, device.label, device.api_token);
        }
        Cmd::Device(DeviceCmd::List) => {
            for d in db.list_devices().await? {
                let seen = d.last_seen.map_or_else(|| "never".into(), |t| t.to_string());
                println!("{}\t{}\tlast_seen={}", d.id, d.label, seen);
            }
        }
        Cmd::Device(DeviceCmd::Remove { id }) => {
            if !db.delete_device(id).await? {
                anyhow::bail!("no device {id}");
            }
            println!("removed device {id}");
        }
        Cmd::Command(CommandCmd::Queue { device, requester }) => {
            let device = db.get_device(device).await?;
            let command = queue.create_command(device.id, requester.as_deref()).await?;
            println!("queued command {} for {}", command.id, device.label);
        }
        Cmd::Release(ReleaseCmd::Set {
            device,
            firmware_version,
            firmware,
            config,
            config_version,
        }) => {
            let device = db.get_device(device).await?;
            let content = read_text(&firmware)?;
            let config = config.as_ref().map(read_text).transpose()?.unwrap_or_default();
            let release = queue
                .publish_release(
                    device.id,
                    &firmware_version,
                    &content,
                    &config,
                    config_version.as_deref().unwrap_or_default(),
                )
                .await?;
            println!(
                "release {} for {} (checksum {})",
                release.version, device.label, release.checksum
            );
        }
        Cmd::Logs { device, limit } => {
            for log in db.recent_logs(device, limit).await? {
                println!(
                    "{}\t{}\t{}\t{}\t{}",
                    log.created_at, log.level, log.event_type, log.message, log.metadata
                );
            }
        }
    }
    Ok(())
}
