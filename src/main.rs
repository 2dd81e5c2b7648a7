// SPDX-License-Identifier: GPL-3.0-only

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

mod cli;

#[derive(Parser)]
#[command(name = "media-capture")]
#[command(about = "Inspect and stream audio and camera devices")]
#[command(version = env!("GIT_VERSION"))]
struct Cli {
    /// Configuration file (default: ~/.config/media-capture/config.json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum StreamKind {
    Audio,
    Camera,
}

#[derive(Subcommand)]
enum Commands {
    /// List available devices in discovery order
    List,

    /// Stream buffers from a device and print one line per buffer
    Stream {
        /// Which kind of device to stream from
        #[arg(short, long, value_enum, default_value = "camera")]
        kind: StreamKind,

        /// Device index among devices of that kind (from 'media-capture list')
        #[arg(short, long, default_value = "0")]
        device: usize,

        /// Number of buffers to receive before stopping
        #[arg(short, long, default_value = "10")]
        frames: usize,

        /// Convert camera frames to portrait RGBA
        #[arg(short, long)]
        rotate: bool,
    },

    /// Capture a single photo and print its properties
    Photo {
        /// Camera index (from 'media-capture list')
        #[arg(short, long, default_value = "0")]
        camera: usize,
    },

    /// Show the permission status for audio and camera capture
    Permissions {
        /// Prompt for permissions that are not granted yet
        #[arg(short, long)]
        request: bool,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    // Set RUST_LOG environment variable to control log level
    // Examples: RUST_LOG=debug, RUST_LOG=media_capture=trace
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(true)
        .with_level(true)
        .init();

    let cli = Cli::parse();
    tracing::debug!(version = env!("GIT_VERSION"), "Starting media-capture");
    let context = cli::create_context(cli.config.as_deref())?;

    match cli.command {
        Commands::List => cli::list_devices(&context),
        Commands::Stream {
            kind,
            device,
            frames,
            rotate,
        } => match kind {
            StreamKind::Audio => cli::stream_audio(&context, device, frames),
            StreamKind::Camera => cli::stream_camera(&context, device, frames, rotate),
        },
        Commands::Photo { camera } => cli::take_photo(&context, camera),
        Commands::Permissions { request } => cli::show_permissions(&context, request),
    }
}
