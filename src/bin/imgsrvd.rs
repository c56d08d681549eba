//! imgsrv daemon - TCP image processing server
//!
//! Accepts clients on a TCP port, receives an image from each and answers
//! with a grayscale or black-and-white version (command profile) or with a
//! single success byte (byte-ack profile).
//!
//! # Usage
//!
//! ```bash
//! # Serve the command profile on 0.0.0.0:8080
//! imgsrvd start
//!
//! # Serve the byte-ack profile (default port 2121)
//! imgsrvd start --profile byte-ack
//!
//! # Use a config file, overriding its port
//! imgsrvd start --config /etc/imgsrv.toml --port 9000
//! ```

use std::env;
use std::net::IpAddr;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use imgsrv_core::RasterProcessor;
use imgsrvd::config::{Profile, ServerConfig};
use imgsrvd::server::{ImageServer, ServerContext};

/// Environment variable naming the config file
const CONFIG_ENV: &str = "IMGSRV_CONFIG";

/// imgsrv daemon - grayscale and binary image conversion over TCP
#[derive(Parser, Debug)]
#[command(name = "imgsrvd", version, about)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the server in the foreground
    Start(StartArgs),
}

#[derive(ClapArgs, Debug, Default)]
struct StartArgs {
    /// Config file (TOML); defaults to $IMGSRV_CONFIG, then the user config dir
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Protocol profile to serve
    #[arg(long, value_enum)]
    profile: Option<ProfileArg>,

    /// Address to bind
    #[arg(long)]
    bind: Option<IpAddr>,

    /// Port to bind
    #[arg(short, long)]
    port: Option<u16>,

    /// Listen backlog
    #[arg(long)]
    backlog: Option<u32>,

    /// Idle timeout in seconds for the selected profile
    #[arg(long)]
    idle_timeout: Option<u64>,

    /// Storage directory for grayscale uploads and results
    #[arg(long)]
    grayscale_dir: Option<PathBuf>,

    /// Storage directory for binary uploads and results
    #[arg(long)]
    binary_dir: Option<PathBuf>,

    /// Keep original uploads after a successful conversion
    #[arg(long)]
    keep_uploads: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ProfileArg {
    Command,
    ByteAck,
}

impl From<ProfileArg> for Profile {
    fn from(arg: ProfileArg) -> Self {
        match arg {
            ProfileArg::Command => Profile::Command,
            ProfileArg::ByteAck => Profile::ByteAck,
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let Command::Start(start) = args.command.unwrap_or(Command::Start(StartArgs::default()));

    let config = load_config(&start)?;
    run_server(config)
}

/// Picks the config file: flag, then environment, then the user config dir
/// if a file exists there.
fn config_path(flag: Option<&PathBuf>) -> Option<PathBuf> {
    if let Some(path) = flag {
        return Some(path.clone());
    }
    if let Ok(path) = env::var(CONFIG_ENV) {
        if !path.is_empty() {
            return Some(PathBuf::from(path));
        }
    }
    dirs::config_dir()
        .map(|dir| dir.join("imgsrv").join("config.toml"))
        .filter(|path| path.is_file())
}

fn load_config(start: &StartArgs) -> Result<ServerConfig> {
    let mut config = match config_path(start.config.as_ref()) {
        Some(path) => ServerConfig::load(&path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => ServerConfig::default(),
    };

    if let Some(profile) = start.profile {
        config.profile = profile.into();
    }
    if let Some(bind) = start.bind {
        config.bind_addr = bind;
    }
    if let Some(port) = start.port {
        config.port = Some(port);
    }
    if let Some(backlog) = start.backlog {
        config.backlog = backlog;
    }
    if let Some(secs) = start.idle_timeout {
        match config.profile {
            Profile::Command => config.idle_timeout_secs = secs,
            Profile::ByteAck => config.byte_ack_idle_timeout_secs = secs,
        }
    }
    if let Some(dir) = &start.grayscale_dir {
        config.grayscale_dir = dir.clone();
    }
    if let Some(dir) = &start.binary_dir {
        config.binary_dir = dir.clone();
    }
    if start.keep_uploads {
        config.keep_uploads = true;
    }

    config.validate().context("Invalid command line options")?;
    Ok(config)
}

#[tokio::main]
async fn run_server(config: ServerConfig) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("imgsrvd=info".parse()?)
                .add_directive("imgsrv_core=info".parse()?)
                .add_directive("imgsrv_protocol=info".parse()?),
        )
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = process::id(),
        "imgsrv daemon starting"
    );
    debug!(config = ?config, "Effective configuration");

    let cancel_token = CancellationToken::new();

    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        if let Err(e) = wait_for_shutdown_signal().await {
            error!(error = %e, "Error waiting for shutdown signal");
        }
        info!("Shutdown signal received");
        shutdown_token.cancel();
    });

    let context = Arc::new(ServerContext::new(config, Arc::new(RasterProcessor::new())));
    let server = ImageServer::bind(context, cancel_token).context("Failed to start server")?;

    if let Err(e) = server.run().await {
        error!(error = %e, "Server error");
        return Err(e.into());
    }

    info!("imgsrv daemon stopped");
    Ok(())
}

async fn wait_for_shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C");
    }

    Ok(())
}
