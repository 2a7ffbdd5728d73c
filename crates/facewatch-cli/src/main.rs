use anyhow::Result;
use clap::{Parser, Subcommand};
use facewatch_core::MatchPolicy;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod build;
mod config;
mod watch;

use config::Config;

#[derive(Parser)]
#[command(name = "facewatch", version, about = "Webcam face recognition with a monitor overlay")]
struct Cli {
    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Encode every image under the faces directory into the cache
    Build {
        /// Directory laid out as <Name>/<image>
        #[arg(long)]
        faces: Option<PathBuf>,
        /// Cache file to create or extend
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Extraction threads (0 = all cores)
        #[arg(short, long)]
        workers: Option<usize>,
    },
    /// Recognize faces from the webcam and project them onto a monitor
    Watch {
        /// Cache file produced by `build`
        #[arg(long)]
        cache: Option<PathBuf>,
        /// Camera index or device path
        #[arg(long)]
        camera: Option<String>,
        /// Monitor index as listed by `facewatch monitors`
        #[arg(long)]
        monitor: Option<usize>,
        /// Maximum encoding distance for a match
        #[arg(long)]
        threshold: Option<f32>,
        /// Which cached face wins: first within threshold, or closest
        #[arg(long)]
        policy: Option<MatchPolicy>,
    },
    /// List monitors available for the overlay
    Monitors,
    /// List V4L2 capture devices
    Cameras,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Build { faces, output, workers } => {
            if let Some(faces) = faces {
                config.build.faces_dir = faces;
            }
            if let Some(output) = output {
                config.cache_path = output;
            }
            if let Some(workers) = workers {
                config.build.workers = workers;
            }
            build::run(&config)
        }
        Commands::Watch {
            cache,
            camera,
            monitor,
            threshold,
            policy,
        } => {
            if let Some(cache) = cache {
                config.cache_path = cache;
            }
            if let Some(camera) = camera {
                config.camera.device = camera;
            }
            if let Some(monitor) = monitor {
                config.overlay.monitor = monitor;
            }
            if let Some(threshold) = threshold {
                config.matching.threshold = threshold;
            }
            if let Some(policy) = policy {
                config.matching.policy = policy;
            }
            watch::run(&config)
        }
        Commands::Monitors => list_monitors(&config),
        Commands::Cameras => {
            let devices = facewatch_hw::Camera::list_devices();
            if devices.is_empty() {
                println!("No V4L2 capture devices found");
            }
            for dev in devices {
                println!("{}  {} ({}, {})", dev.path, dev.name, dev.driver, dev.bus);
            }
            Ok(())
        }
    }
}

fn list_monitors(config: &Config) -> Result<()> {
    if let Some(pinned) = config.overlay.geometry {
        println!(
            "pinned  {}x{}+{}+{} (from config)",
            pinned.width, pinned.height, pinned.x, pinned.y
        );
    }
    let monitors = facewatch_hw::list_monitors()?;
    if monitors.is_empty() {
        println!("No monitors reported by xrandr");
    }
    for (index, m) in monitors.iter().enumerate() {
        println!("{index}: {}  {}x{}+{}+{}", m.name, m.width, m.height, m.x, m.y);
    }
    Ok(())
}
