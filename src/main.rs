mod capture;
mod detection;
mod output;
mod pacing;
mod serve;

use anyhow::{Context, Result};
use capture::{CameraThread, WebcamTrack};
use clap::{Parser, Subcommand};
use detection::{DetectionBridge, NativeModule};
use output::LogOverlay;
use pacing::PacingConfig;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Capture webcam frames and run face detection on each one
    Detect {
        /// Input webcam device index
        #[arg(short, long, default_value_t = 0)]
        input_device: u32,

        /// Capture resolution width
        #[arg(long, default_value_t = 1280)]
        capture_width: u32,

        /// Capture resolution height
        #[arg(long, default_value_t = 720)]
        capture_height: u32,

        /// Target frames per second
        #[arg(long, default_value_t = pacing::DEFAULT_FPS)]
        fps: u32,

        /// Log frame statistics every N frames (0 disables)
        #[arg(long, default_value_t = pacing::DEFAULT_STATS_INTERVAL)]
        stats_interval: u64,

        /// Path to the face detection module (shared library)
        /// If not provided, frames are paced and counted without detection
        #[arg(long)]
        detector: Option<PathBuf>,
    },

    /// Serve the browser front end with cross-origin isolation headers
    Serve {
        /// Directory to serve
        #[arg(long, default_value = ".")]
        root: PathBuf,

        #[arg(long, default_value = serve::DEFAULT_HOST)]
        host: String,

        #[arg(long, default_value_t = serve::DEFAULT_PORT)]
        port: u16,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    match args.command {
        Command::Detect {
            input_device,
            capture_width,
            capture_height,
            fps,
            stats_interval,
            detector,
        } => {
            let config = PacingConfig::new(fps)
                .context("Invalid pacing configuration")?
                .with_stats_interval(stats_interval);
            run_detect(
                input_device,
                capture_width,
                capture_height,
                config,
                detector,
            )
        }
        Command::Serve { root, host, port } => {
            let runtime = tokio::runtime::Runtime::new().context("Failed to start runtime")?;
            runtime.block_on(serve::run(root, &host, port))
        }
    }
}

fn run_detect(
    input_device: u32,
    capture_width: u32,
    capture_height: u32,
    config: PacingConfig,
    detector: Option<PathBuf>,
) -> Result<()> {
    tracing::info!("facecam starting");
    tracing::info!("Capture: {}x{}", capture_width, capture_height);
    tracing::info!("Target FPS: {}", config.target_fps());

    let track = match WebcamTrack::open(input_device, capture_width, capture_height) {
        Ok(track) => Some(track),
        Err(e) => {
            tracing::error!("{:#}", e);
            None
        }
    };

    let mut camera = CameraThread::new(config);
    if !camera.init(track) {
        anyhow::bail!("No usable video track on device {}", input_device);
    }

    let stop = camera.stop_handle();
    ctrlc::set_handler(move || {
        tracing::info!("Stop requested");
        stop.shutdown();
    })
    .context("Failed to install Ctrl+C handler")?;

    if let Some(path) = &detector {
        let module = NativeModule::load(path)
            .with_context(|| format!("Failed to load detection module {}", path.display()))?;
        let mut bridge =
            DetectionBridge::new(module, LogOverlay::new(capture_width, capture_height));
        camera.set_callback(move |frame| {
            bridge.process(frame)?;
            Ok(())
        });
    } else {
        tracing::info!("Running in passthrough mode (no detection module)");
    }

    tracing::info!("Press Ctrl+C to stop");
    camera.start();
    camera.stats().report();
    camera.release();

    Ok(())
}
