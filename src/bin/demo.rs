//! demo - bounded end-to-end run over the synthetic camera
//!
//! Opens the synthetic camera, processes a fixed number of frames, closes and
//! reopens the camera halfway through, and prints a summary.

use anyhow::{anyhow, Result};
use clap::Parser;
use std::io::IsTerminal;
use std::time::Duration;

use proximity_watch::pipeline::{LoopStats, Next, Pipeline};
use proximity_watch::present::MemorySink;
use proximity_watch::ui::Ui;
use proximity_watch::{build_pipeline, ProximityConfig};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Frames to process.
    #[arg(long, default_value_t = 240)]
    frames: u64,
    /// Frames per second for the synthetic camera (0 runs uncapped).
    #[arg(long, default_value_t = 30)]
    fps: u32,
    /// Reference size in inches. 40 makes the walking person trip the alert
    /// at the far ends of the walk.
    #[arg(long, default_value_t = 40.0)]
    reference_size: f64,
    /// Model retry delay in milliseconds.
    #[arg(long, default_value_t = 100)]
    retry_ms: u64,
    /// Skip the close/reopen cycle.
    #[arg(long)]
    no_reopen: bool,
    /// Terminal output style: auto|plain|pretty.
    #[arg(long, env = "PROXIMITY_UI", default_value = "auto")]
    ui: String,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();
    let is_tty = std::io::stderr().is_terminal();
    let stdout_is_tty = std::io::stdout().is_terminal();
    let ui = Ui::from_args(Some(&args.ui), is_tty, !stdout_is_tty);

    let mut cfg = ProximityConfig::default();
    cfg.camera.url = "stub://demo".to_string();
    cfg.camera.target_fps = args.fps;
    cfg.reference_size_in = args.reference_size;
    cfg.model_retry = Duration::from_millis(args.retry_ms);
    cfg.validate()?;

    let mut pipeline = build_pipeline(&cfg, MemorySink::new())?;
    let half = args.frames / 2;

    {
        let _stage = ui.stage("Open camera");
        pipeline.open_camera()?;
    }
    {
        let _stage = ui.stage(&format!("Process {} frames", half));
        run_frames(&mut pipeline, half)?;
    }
    if !args.no_reopen {
        let _stage = ui.stage("Close and reopen camera");
        pipeline.close_camera();
        if pipeline.session().active_tracks() != 0 {
            return Err(anyhow!("camera tracks still active after close"));
        }
        pipeline.open_camera()?;
    }
    {
        let _stage = ui.stage(&format!("Process {} frames", args.frames - half));
        run_frames(&mut pipeline, args.frames)?;
    }

    let stats = pipeline.stats();
    let sink = pipeline.teardown();
    print_summary(&cfg, &stats, &sink);
    Ok(())
}

/// Cycle until `target` frames have been processed in total.
fn run_frames(pipeline: &mut Pipeline<MemorySink>, target: u64) -> Result<()> {
    while pipeline.stats().frames_processed < target {
        match pipeline.cycle() {
            Next::Frame => {}
            Next::RetryAfter(delay) => std::thread::sleep(delay),
            Next::Idle => return Err(anyhow!("camera closed unexpectedly")),
        }
        if let Some(error) = pipeline.sink().errors.last() {
            return Err(anyhow!("{}", error));
        }
    }
    Ok(())
}

fn print_summary(cfg: &ProximityConfig, stats: &LoopStats, sink: &MemorySink) {
    let safe = cfg.estimator.calculate_safe_distance(cfg.reference_size_in);
    println!("reference size:    {} in", cfg.reference_size_in);
    println!("safe distance:     {} in", safe);
    println!("frames processed:  {}", stats.frames_processed);
    println!("frames skipped:    {}", stats.frames_skipped);
    println!("model waits:       {}", stats.model_waits);
    println!("alerts raised:     {}", stats.alerts_raised);
    println!("overlay redraws:   {}", sink.draw_count());
    println!(
        "fields cleared:    {}",
        if sink.fields.is_cleared() { "yes" } else { "no" }
    );
}
