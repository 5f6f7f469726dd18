use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rollcall_core::{enroll_directory, EnrollError, NearestMatcher, OnnxFaceProvider};
use rollcall_hw::Camera;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod annotate;
mod config;
mod frame_loop;
mod ledger;
mod preview;

use annotate::Annotator;
use config::Config;
use frame_loop::{FrameLoop, LoopSettings, StopReason};
use ledger::{Attendance, Clock, SystemClock};

#[derive(Parser)]
#[command(name = "rollcall", version, about = "Webcam attendance logger")]
struct Cli {
    /// TOML config file; keys are the lowercase environment variable names
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Run without a preview window (same as NO_GUI=1)
    #[arg(long, global = true)]
    headless: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Enroll known faces and watch the camera (default)
    Run,
    /// Enroll known faces and report the result per image
    Enroll {
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// List video capture devices
    Devices {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the resolved configuration
    Config,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let mut cfg = Config::load(cli.config.as_deref())?;
    if cli.headless {
        cfg.headless = true;
    }

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run(cfg),
        Commands::Enroll { json } => enroll(&cfg, json),
        Commands::Devices { json } => devices(json),
        Commands::Config => {
            for (key, value) in cfg.entries() {
                println!("{key} = {value:?}");
            }
            Ok(())
        }
    }
}

fn run(cfg: Config) -> Result<()> {
    tracing::info!("rollcall starting");
    cfg.log_summary();

    ensure_images_path(&cfg.images_path)?;
    let mut provider = load_provider(&cfg)?;
    let enrollment = enroll_directory(&cfg.images_path, &mut provider)?;

    let clock = SystemClock;
    let attendance = Attendance::open(&cfg.attendance_file, cfg.daily_rotation, clock.now().date());

    let camera = Camera::open_index(cfg.camera_index, cfg.video_backend)
        .with_context(|| format!("cannot open webcam {}", Camera::device_path(cfg.camera_index)))?;
    tracing::info!(
        device = %camera.device_path,
        width = camera.width,
        height = camera.height,
        fourcc = ?camera.fourcc,
        backend = %camera.backend,
        "camera opened"
    );

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = stop.clone();
        ctrlc::set_handler(move || stop.store(true, Ordering::SeqCst))
            .context("failed to install signal handler")?;
    }

    let metric = rollcall_core::FaceProvider::metric(&provider);
    let frame_loop = FrameLoop::new(
        camera,
        provider,
        preview::open(cfg.headless, cfg.headless_sleep),
        clock,
        enrollment.identities,
        NearestMatcher::new(cfg.distance_threshold, metric),
        attendance,
        Annotator::new(cfg.font_path.as_deref()),
        LoopSettings {
            frame_scale: cfg.frame_scale,
            warmup_frames: cfg.warmup_frames,
        },
        stop,
    );

    let summary = frame_loop.run();
    match &summary.reason {
        StopReason::SourceFailed(e) => tracing::warn!(error = %e, frames = summary.frames, "stopped: camera failure"),
        reason => tracing::info!(?reason, frames = summary.frames, "stopped"),
    }
    tracing::info!("goodbye");
    Ok(())
}

/// Fail on a missing images directory before the (slow) model load.
fn ensure_images_path(path: &Path) -> Result<(), EnrollError> {
    if path.is_dir() {
        Ok(())
    } else {
        Err(EnrollError::DirectoryNotFound(path.to_path_buf()))
    }
}

fn load_provider(cfg: &Config) -> Result<OnnxFaceProvider> {
    OnnxFaceProvider::load(&cfg.model_dir, cfg.detection_model).context("failed to load face models")
}

fn enroll(cfg: &Config, json: bool) -> Result<()> {
    ensure_images_path(&cfg.images_path)?;
    let mut provider = load_provider(cfg)?;
    let enrollment = enroll_directory(&cfg.images_path, &mut provider)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&enrollment.report)?);
    } else {
        for entry in &enrollment.report {
            println!("{:<32} {:?}", entry.file, entry.status);
        }
        println!(
            "{} identities enrolled ({})",
            enrollment.identities.len(),
            enrollment.model_version().unwrap_or("unversioned")
        );
    }
    Ok(())
}

fn devices(json: bool) -> Result<()> {
    let devices = Camera::list_devices();
    if json {
        println!("{}", serde_json::to_string_pretty(&devices)?);
        return Ok(());
    }
    if devices.is_empty() {
        println!("No video capture devices found");
    }
    for d in &devices {
        println!("[{}] {}  {} ({}, {})", d.index, d.path, d.name, d.driver, d.bus);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults_to_run() {
        let cli = Cli::try_parse_from(["rollcall"]).unwrap();
        assert!(cli.command.is_none());
        assert!(!cli.headless);
    }

    #[test]
    fn test_cli_global_flags() {
        let cli = Cli::try_parse_from(["rollcall", "enroll", "--json", "--headless", "-c", "r.toml"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Enroll { json: true })));
        assert!(cli.headless);
        assert_eq!(cli.config, Some(PathBuf::from("r.toml")));
    }

    #[test]
    fn test_images_path_checked_before_models() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Config {
            images_path: dir.path().join("Images"),
            model_dir: dir.path().join("models"),
            ..Config::default()
        };
        // Neither directory exists; the images error must win.
        let err = enroll(&cfg, false).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<EnrollError>(),
            Some(EnrollError::DirectoryNotFound(_))
        ));
        assert!(err.to_string().starts_with("images directory not found"));

        assert!(ensure_images_path(dir.path()).is_ok());
    }
}
