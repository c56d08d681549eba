//! imgsrv - command line client for imgsrvd
//!
//! # Usage
//!
//! ```text
//! imgsrv gs photo.jpeg                        # writes photo-gs.png
//! imgsrv bin photo.jpeg --threshold 100       # writes photo-bin.png
//! imgsrv gs photo.jpeg --name cat -o out.png
//! imgsrv upload photo.jpeg --server 10.0.0.5:2121
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use imgsrv_client::{ClientConfig, ImageClient, ImageRequest};

// ============================================================================
// CLI Arguments
// ============================================================================

/// imgsrv client - send an image to imgsrvd and fetch the result
#[derive(Parser, Debug)]
#[command(name = "imgsrv", version, about)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Seconds to wait for the server before giving up
    #[arg(long, global = true, default_value_t = 30)]
    timeout: u64,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Convert an image to grayscale
    Gs(ConvertArgs),

    /// Convert an image to black and white around a threshold
    Bin {
        #[command(flatten)]
        convert: ConvertArgs,

        /// Luminance threshold (0-255); brighter pixels become white
        #[arg(short, long)]
        threshold: i32,
    },

    /// Upload an image to a byte-ack server and report the outcome
    Upload {
        /// Image to upload
        input: PathBuf,

        /// Server address
        #[arg(short, long, default_value = "127.0.0.1:2121")]
        server: SocketAddr,
    },
}

#[derive(ClapArgs, Debug)]
struct ConvertArgs {
    /// Image to convert
    input: PathBuf,

    /// Server address
    #[arg(short, long, default_value = "127.0.0.1:8080")]
    server: SocketAddr,

    /// Name sent to the server (3-10 characters); defaults to the file stem
    #[arg(short, long)]
    name: Option<String>,

    /// Where to write the result; defaults to `<stem>-<command>.png`
    #[arg(short, long)]
    output: Option<PathBuf>,
}

// ============================================================================
// Main
// ============================================================================

fn main() {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    if let Err(e) = run(args) {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

#[tokio::main]
async fn run(args: Args) -> Result<()> {
    let idle_timeout = Duration::from_secs(args.timeout);

    match args.command {
        Command::Gs(convert) => {
            let request = |name: String, image: Vec<u8>| ImageRequest::grayscale(name, image);
            convert_image(convert, "gs", idle_timeout, request).await
        }
        Command::Bin { convert, threshold } => {
            if !(0..=255).contains(&threshold) {
                bail!("Threshold must be between 0 and 255, got {threshold}");
            }
            let request =
                move |name: String, image: Vec<u8>| ImageRequest::binary(name, image, threshold);
            convert_image(convert, "bin", idle_timeout, request).await
        }
        Command::Upload { input, server } => {
            let image = read_image(&input)?;
            let client = ImageClient::new(ClientConfig {
                idle_timeout,
                ..ClientConfig::new(server)
            });

            if client.upload_with_ack(&image).await? {
                println!("Server converted {}", input.display());
                Ok(())
            } else {
                bail!("Server could not convert {}", input.display());
            }
        }
    }
}

async fn convert_image(
    args: ConvertArgs,
    suffix: &str,
    idle_timeout: Duration,
    request: impl FnOnce(String, Vec<u8>) -> ImageRequest,
) -> Result<()> {
    let image = read_image(&args.input)?;
    let name = match args.name {
        Some(name) => name,
        None => default_name(&args.input)?,
    };
    let output = args
        .output
        .unwrap_or_else(|| default_output(&args.input, suffix));

    let client = ImageClient::new(ClientConfig {
        idle_timeout,
        ..ClientConfig::new(args.server)
    });

    debug!(server = %args.server, name = %name, "Sending image");
    let result = client
        .process(request(name, image))
        .await
        .with_context(|| format!("Request to {} failed", args.server))?;

    std::fs::write(&output, &result)
        .with_context(|| format!("Failed to write {}", output.display()))?;

    println!("Wrote {} ({} bytes)", output.display(), result.len());
    Ok(())
}

fn read_image(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))
}

/// File stem cut to at most 10 characters.
fn default_name(input: &Path) -> Result<String> {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name: String = stem.chars().take(10).collect();
    if name.chars().count() < 3 {
        bail!("File name too short to derive a name; pass --name");
    }
    Ok(name)
}

fn default_output(input: &Path, suffix: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string());
    input.with_file_name(format!("{stem}-{suffix}.png"))
}
