use anyhow::Result;
use clap::{Parser, Subcommand};
use glance_core::Facing;
use glance_hw::{devices, V4lBackend};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

mod config;
mod console;
mod snapshot;

use config::Config;

#[derive(Parser)]
#[command(name = "glance", about = "Camera session manager for face and expression demos")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List capture devices and the facing mode each resolves to
    Devices,
    /// Show the camera permission state
    Permission,
    /// Capture one frame to an image file
    Snapshot {
        /// Camera to use: user or environment
        #[arg(short, long)]
        facing: Option<Facing>,
        /// Output path; the extension picks the format
        #[arg(short, long, default_value = "snapshot.png")]
        output: PathBuf,
    },
    /// Run an interactive camera session
    Run {
        /// Default camera: user or environment
        #[arg(short, long)]
        facing: Option<Facing>,
        /// Detection polling interval in milliseconds
        #[arg(long)]
        interval_ms: Option<u64>,
        /// Print status events as JSON lines
        #[arg(long)]
        json: bool,
        /// Open the camera immediately
        #[arg(long)]
        autostart: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let mut config = Config::from_env();

    match cli.command {
        Commands::Devices => {
            let backend = V4lBackend::new(config.overrides.clone());
            let found = backend.devices();
            if found.is_empty() {
                println!("no capture devices found");
            }
            for (dev, facing) in found {
                let usb = dev
                    .usb_ids
                    .map(|(vid, pid)| format!("{vid:04x}:{pid:04x}"))
                    .unwrap_or_else(|| "-".into());
                let known = dev
                    .usb_ids
                    .and_then(|(vid, pid)| devices::lookup_camera(vid, pid))
                    .map(|_| " [known]")
                    .unwrap_or("");
                println!(
                    "{}\t{facing}\t{usb}\t{} ({}){known}",
                    dev.path, dev.name, dev.driver
                );
            }
        }
        Commands::Permission => {
            let state = glance_hw::permission::probe(&config.overrides);
            println!("{state}");
        }
        Commands::Snapshot { facing, output } => {
            let facing = facing.unwrap_or(config.facing);
            snapshot::capture(&config, facing, &output).await?;
        }
        Commands::Run {
            facing,
            interval_ms,
            json,
            autostart,
        } => {
            if let Some(ms) = interval_ms.filter(|&ms| ms > 0) {
                config.poll_interval = Duration::from_millis(ms);
            }
            let opts = console::RunOptions {
                facing: facing.unwrap_or(config.facing),
                json,
                autostart,
            };
            tracing::info!(
                facing = %opts.facing,
                interval_ms = config.poll_interval.as_millis() as u64,
                "glance session starting"
            );
            console::run(config, opts).await?;
        }
    }

    Ok(())
}
