//! proximity_watch - interactive proximity viewer
//!
//! Opens the configured camera, runs the detection loop, and renders the
//! person/distance/alert fields to the terminal. Commands are read from stdin,
//! one per line:
//! - `open` / `close`: acquire or release the camera
//! - `size <inches>`: set the reference size
//! - `status`: log the session state
//! - `quit` / `exit`: stop
//!
//! Ctrl-C also stops the loop; the camera is always released on the way out.

use anyhow::{anyhow, Result};
use clap::Parser;
use std::io::{BufRead, IsTerminal};
use std::path::PathBuf;

use proximity_watch::estimate::ApparentDimension;
use proximity_watch::present::TerminalSink;
use proximity_watch::scheduler::{Controller, Runner};
use proximity_watch::ui::Ui;
use proximity_watch::{build_pipeline, ProximityConfig};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Warn when a person sits too close to the screen"
)]
struct Args {
    /// Camera URL: `stub://<name>` or a V4L2 device path.
    #[arg(long)]
    source: Option<String>,

    /// Reference size (screen diagonal) in inches.
    #[arg(long)]
    reference_size: Option<f64>,

    /// Detector backend name.
    #[arg(long)]
    backend: Option<String>,

    /// Model file for backends that load one.
    #[arg(long)]
    model_path: Option<PathBuf>,

    /// Detection class the distance estimate follows.
    #[arg(long)]
    target_label: Option<String>,

    /// Bounding-box dimension used as the apparent size (width|height).
    #[arg(long)]
    dimension: Option<String>,

    /// Wait for an `open` command instead of opening the camera at start.
    #[arg(long)]
    no_autostart: bool,

    /// Terminal output style: auto|plain|pretty.
    #[arg(long, env = "PROXIMITY_UI", default_value = "auto")]
    ui: String,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let is_tty = std::io::stderr().is_terminal();
    let stdout_is_tty = std::io::stdout().is_terminal();
    let ui = Ui::from_args(Some(&args.ui), is_tty, !stdout_is_tty);

    let cfg = {
        let _stage = ui.stage("Load configuration");
        load_config(&args)?
    };
    log::info!(
        "source={} backend={} reference={} in target={}",
        cfg.camera.url,
        cfg.detector.backend,
        cfg.reference_size_in,
        cfg.target_label
    );

    let pipeline = build_pipeline(&cfg, TerminalSink::new(&ui))?;
    let (runner, controller) = Runner::new(pipeline);

    let on_signal = controller.clone();
    ctrlc::set_handler(move || {
        log::info!("shutdown signal received");
        on_signal.shutdown();
    })
    .map_err(|e| anyhow!("error setting Ctrl-C handler: {}", e))?;

    let commands = controller.clone();
    std::thread::Builder::new()
        .name("stdin-commands".to_string())
        .spawn(move || read_commands(commands))
        .map_err(|e| anyhow!("failed to spawn command reader: {}", e))?;

    if !args.no_autostart {
        controller.open()?;
    }

    let (_sink, stats) = runner.run();
    log::info!(
        "processed {} frame(s), skipped {}, {} alert(s) raised",
        stats.frames_processed,
        stats.frames_skipped,
        stats.alerts_raised
    );
    Ok(())
}

fn load_config(args: &Args) -> Result<ProximityConfig> {
    let mut cfg = ProximityConfig::load()?;
    if let Some(source) = &args.source {
        cfg.camera.url = source.clone();
    }
    if let Some(size) = args.reference_size {
        cfg.reference_size_in = size;
    }
    if let Some(backend) = &args.backend {
        cfg.detector.backend = backend.clone();
    }
    if let Some(path) = &args.model_path {
        cfg.detector.model_path = Some(path.clone());
    }
    if let Some(label) = &args.target_label {
        cfg.target_label = label.clone();
    }
    if let Some(dimension) = &args.dimension {
        cfg.dimension = ApparentDimension::parse(dimension)
            .ok_or_else(|| anyhow!("dimension must be width or height, got {:?}", dimension))?;
    }
    cfg.validate()?;
    Ok(cfg)
}

fn read_commands(controller: Controller) {
    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                log::warn!("stdin read failed: {}", e);
                break;
            }
        };
        let mut parts = line.split_whitespace();
        let result = match parts.next() {
            None => continue,
            Some("open") => controller.open(),
            Some("close") => controller.close(),
            Some("status") => controller.status(),
            Some("size") => {
                let value = parts.next().unwrap_or_default();
                controller.set_reference_size(value);
                Ok(())
            }
            Some("quit") | Some("exit") => {
                controller.shutdown();
                break;
            }
            Some(other) => {
                log::warn!(
                    "unknown command {:?} (expected open, close, size <inches>, status, quit)",
                    other
                );
                Ok(())
            }
        };
        if result.is_err() {
            break;
        }
    }
    log::debug!("command reader finished");
}
