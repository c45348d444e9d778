//! Drives the pipeline on the loop thread.
//!
//! `Runner` owns the pipeline and runs one cycle at a time. Other threads hold
//! a `Controller` and talk to the runner through a command channel. Shutdown
//! and close requests are also flagged atomically so they are seen inside a
//! cycle, not only between cycles.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};

use crate::pipeline::{LoopStats, Next, Pipeline};
use crate::present::PresentationSink;
use crate::reference::ReferenceSize;

#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    Open,
    Close,
    /// Log a one-line status report.
    Status,
    Shutdown,
}

/// Cloneable handle for the UI side.
#[derive(Clone)]
pub struct Controller {
    tx: Sender<Command>,
    close_requested: Arc<AtomicBool>,
    shutdown: Arc<AtomicBool>,
    reference: ReferenceSize,
}

impl Controller {
    pub fn open(&self) -> Result<()> {
        self.send(Command::Open)
    }

    pub fn close(&self) -> Result<()> {
        self.close_requested.store(true, Ordering::SeqCst);
        self.send(Command::Close)
    }

    pub fn status(&self) -> Result<()> {
        self.send(Command::Status)
    }

    /// Stop the runner. Safe to call after the runner has exited.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        let _ = self.tx.send(Command::Shutdown);
    }

    /// Write the reference size from raw user input. Takes effect on the next
    /// cycle without going through the runner.
    pub fn set_reference_size(&self, input: &str) -> Option<f64> {
        let parsed = self.reference.set_from_input(input);
        match parsed {
            Some(inches) => log::info!("reference size set to {} in", inches),
            None => log::warn!("invalid reference size {:?}; distance is unknown", input),
        }
        parsed
    }

    pub fn reference_size(&self) -> f64 {
        self.reference.get()
    }

    fn send(&self, command: Command) -> Result<()> {
        self.tx
            .send(command)
            .map_err(|_| anyhow!("detection loop has stopped"))
    }
}

pub struct Runner<P: PresentationSink> {
    pipeline: Pipeline<P>,
    rx: Receiver<Command>,
    shutdown: Arc<AtomicBool>,
}

impl<P: PresentationSink> Runner<P> {
    pub fn new(pipeline: Pipeline<P>) -> (Self, Controller) {
        let (tx, rx) = mpsc::channel();
        let shutdown = Arc::new(AtomicBool::new(false));
        let controller = Controller {
            tx,
            close_requested: pipeline.close_flag(),
            shutdown: Arc::clone(&shutdown),
            reference: pipeline.session().reference().clone(),
        };
        let runner = Self {
            pipeline,
            rx,
            shutdown,
        };
        (runner, controller)
    }

    pub fn pipeline(&self) -> &Pipeline<P> {
        &self.pipeline
    }

    /// Run until shutdown, then close the camera and return the sink and the
    /// loop counters.
    pub fn run(mut self) -> (P, LoopStats) {
        log::info!("detection loop started");
        while self.step() {}
        let stats = self.pipeline.stats();
        log::info!(
            "detection loop stopped: cycles={} processed={} skipped={} alerts={}",
            stats.cycles,
            stats.frames_processed,
            stats.frames_skipped,
            stats.alerts_raised
        );
        (self.pipeline.teardown(), stats)
    }

    /// One iteration: commands, one cycle, then the wait the cycle asked for.
    /// Returns false once the runner should stop.
    fn step(&mut self) -> bool {
        if !self.drain() {
            return false;
        }
        let next = self.pipeline.cycle();
        match next {
            Next::Frame => {
                let interval = self.pipeline.options().frame_interval;
                interval.is_zero() || self.wait(interval)
            }
            Next::RetryAfter(delay) => self.wait(delay),
            Next::Idle => match self.rx.recv() {
                Ok(command) => self.handle(command),
                Err(_) => false,
            },
        }
    }

    /// Handle every queued command without blocking.
    fn drain(&mut self) -> bool {
        loop {
            if self.shutdown.load(Ordering::SeqCst) {
                return false;
            }
            match self.rx.try_recv() {
                Ok(command) => {
                    if !self.handle(command) {
                        return false;
                    }
                }
                Err(mpsc::TryRecvError::Empty) => return true,
                Err(mpsc::TryRecvError::Disconnected) => return false,
            }
        }
    }

    /// Wait out `delay` in full while still handling commands.
    fn wait(&mut self, delay: Duration) -> bool {
        let deadline = Instant::now() + delay;
        loop {
            if self.shutdown.load(Ordering::SeqCst) {
                return false;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return true;
            }
            match self.rx.recv_timeout(remaining) {
                Ok(command) => {
                    if !self.handle(command) {
                        return false;
                    }
                }
                Err(RecvTimeoutError::Timeout) => return true,
                Err(RecvTimeoutError::Disconnected) => return false,
            }
        }
    }

    fn handle(&mut self, command: Command) -> bool {
        log::debug!("command: {:?}", command);
        match command {
            Command::Open => {
                // Failures are already reported to the sink.
                let _ = self.pipeline.open_camera();
            }
            Command::Close => self.pipeline.close_camera(),
            Command::Status => {
                let session = self.pipeline.session();
                let stats = self.pipeline.stats();
                log::info!(
                    "status: state={} source={} tracks={} reference={} in model_ready={} model_attempts={} processed={} alerts={}",
                    session.state(),
                    session.source_name(),
                    session.active_tracks(),
                    session.reference().get(),
                    session.model_ready(),
                    session.load_attempts(),
                    stats.frames_processed,
                    stats.alerts_raised
                );
            }
            Command::Shutdown => return false,
        }
        !self.shutdown.load(Ordering::SeqCst)
    }
}
