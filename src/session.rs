//! The owned session: camera handle, model slot and reference size.
//!
//! All state the loop depends on lives here with an explicit lifecycle.
//! `teardown` (or dropping the session) closes the camera.

use anyhow::{anyhow, Result};

use crate::detect::{Detection, DetectorBackend};
use crate::frame::Frame;
use crate::ingest::{FrameSource, SourceError, StreamHandle};
use crate::loader::{LoadPoll, ModelLoader, ModelSource};
use crate::reference::ReferenceSize;

pub const DEFAULT_MAX_LOAD_ATTEMPTS: u32 = 3;

/// Lifecycle state derived from the camera handle and the model slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// No stream attached.
    Idle,
    /// Stream attached, model not ready.
    Initializing,
    /// Stream attached, model ready.
    Running,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Initializing => "initializing",
            SessionState::Running => "running",
        };
        f.write_str(name)
    }
}

enum ModelSlot {
    Unloaded,
    Loading(ModelLoader),
    Ready(Box<dyn DetectorBackend>),
    Failed(String),
}

/// Result of checking on the model once per cycle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ModelStatus {
    Ready,
    NotReady,
    /// Load attempts are exhausted. Returned once per exhaustion.
    GaveUp(String),
}

pub struct Session {
    source: Box<dyn FrameSource>,
    stream: Option<StreamHandle>,
    models: ModelSource,
    model: ModelSlot,
    load_attempts: u32,
    max_load_attempts: u32,
    failure_reported: bool,
    capture_failures: u32,
    reference: ReferenceSize,
    last_alert: bool,
}

impl Session {
    pub fn new(source: Box<dyn FrameSource>, models: ModelSource, reference: ReferenceSize) -> Self {
        Self {
            source,
            stream: None,
            models,
            model: ModelSlot::Unloaded,
            load_attempts: 0,
            max_load_attempts: DEFAULT_MAX_LOAD_ATTEMPTS,
            failure_reported: false,
            capture_failures: 0,
            reference,
            last_alert: false,
        }
    }

    pub fn with_max_load_attempts(mut self, attempts: u32) -> Self {
        self.max_load_attempts = attempts.max(1);
        self
    }

    pub fn state(&self) -> SessionState {
        match (&self.stream, &self.model) {
            (None, _) => SessionState::Idle,
            (Some(_), ModelSlot::Ready(_)) => SessionState::Running,
            (Some(_), _) => SessionState::Initializing,
        }
    }

    pub fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    pub fn model_ready(&self) -> bool {
        matches!(self.model, ModelSlot::Ready(_))
    }

    pub fn load_attempts(&self) -> u32 {
        self.load_attempts
    }

    pub fn source_name(&self) -> &str {
        self.source.name()
    }

    pub fn stream(&self) -> Option<&StreamHandle> {
        self.stream.as_ref()
    }

    /// Hardware tracks still held by the source.
    pub fn active_tracks(&self) -> usize {
        self.source.active_tracks()
    }

    /// Consecutive failed captures on the current stream.
    pub fn capture_failures(&self) -> u32 {
        self.capture_failures
    }

    pub fn frames_captured(&self) -> u64 {
        self.source.frames_captured()
    }

    pub fn reference(&self) -> &ReferenceSize {
        &self.reference
    }

    pub fn last_alert(&self) -> bool {
        self.last_alert
    }

    pub(crate) fn set_last_alert(&mut self, active: bool) {
        self.last_alert = active;
    }

    /// Acquire the camera and start loading the model if needed.
    ///
    /// Opening an open camera does nothing. A model whose attempts were
    /// exhausted gets a fresh round of attempts.
    pub fn open_camera(&mut self) -> Result<(), SourceError> {
        if self.stream.is_some() {
            log::info!("camera already open");
            return Ok(());
        }
        let stream = self.source.open()?;
        log::info!(
            "camera open: source={} stream={} tracks={}",
            self.source.name(),
            stream.id(),
            stream.live_tracks()
        );
        self.stream = Some(stream);
        self.capture_failures = 0;

        let exhausted = matches!(self.model, ModelSlot::Failed(_))
            && self.load_attempts >= self.max_load_attempts;
        if exhausted {
            self.load_attempts = 0;
            self.failure_reported = false;
        }
        if exhausted || matches!(self.model, ModelSlot::Unloaded) {
            self.start_load();
        }
        Ok(())
    }

    /// Stop every track and drop the stream handle. Returns the number of
    /// tracks that were stopped; closing a closed camera returns 0.
    pub fn close_camera(&mut self) -> usize {
        self.last_alert = false;
        let Some(mut stream) = self.stream.take() else {
            return 0;
        };
        let live = stream.live_tracks();
        self.source.close(&mut stream);
        log::info!(
            "camera closed: stream={} stopped {} track(s), {} still active",
            stream.id(),
            live,
            self.source.active_tracks()
        );
        live
    }

    /// Advance the model slot. Called once per cycle before any detection.
    pub fn poll_model(&mut self) -> ModelStatus {
        if let ModelSlot::Loading(loader) = &mut self.model {
            match loader.poll() {
                LoadPoll::Pending => return ModelStatus::NotReady,
                LoadPoll::Ready(backend) => {
                    log::info!(
                        "detector '{}' ready after {} attempt(s) ({}ms)",
                        backend.name(),
                        loader.attempt(),
                        loader.elapsed().as_millis()
                    );
                    self.model = ModelSlot::Ready(backend);
                }
                LoadPoll::Failed(err) => {
                    log::error!(
                        "detector load attempt {}/{} failed: {:#}",
                        loader.attempt(),
                        self.max_load_attempts,
                        err
                    );
                    self.model = ModelSlot::Failed(format!("{:#}", err));
                }
            }
        }

        let reason = match &self.model {
            ModelSlot::Ready(_) => return ModelStatus::Ready,
            ModelSlot::Loading(_) => return ModelStatus::NotReady,
            ModelSlot::Unloaded => None,
            ModelSlot::Failed(reason) => Some(reason.clone()),
        };
        match reason {
            _ if self.load_attempts < self.max_load_attempts => {
                self.start_load();
                ModelStatus::NotReady
            }
            Some(reason) if !self.failure_reported => {
                self.failure_reported = true;
                ModelStatus::GaveUp(format!(
                    "object detector unavailable after {} attempt(s): {}",
                    self.load_attempts, reason
                ))
            }
            _ => ModelStatus::NotReady,
        }
    }

    /// Capture from the attached stream.
    pub fn capture(&mut self) -> Result<Frame> {
        let stream = self.stream.as_ref().ok_or(SourceError::Closed)?;
        match self.source.next_frame(stream) {
            Ok(frame) => {
                self.capture_failures = 0;
                Ok(frame)
            }
            Err(err) => {
                self.capture_failures += 1;
                Err(err)
            }
        }
    }

    /// Run the loaded detector on `frame`.
    pub fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        match &mut self.model {
            ModelSlot::Ready(backend) => backend.detect(frame),
            _ => Err(anyhow!("detector is not ready")),
        }
    }

    /// Close the camera and release the session.
    pub fn teardown(mut self) {
        self.close_camera();
    }

    fn start_load(&mut self) {
        self.load_attempts += 1;
        let attempt = self.load_attempts;
        let started = self
            .models
            .next_factory()
            .and_then(|factory| ModelLoader::spawn(factory, attempt));
        match started {
            Ok(loader) => {
                log::info!("loading detector (attempt {}/{})", attempt, self.max_load_attempts);
                self.model = ModelSlot::Loading(loader);
            }
            Err(err) => {
                log::error!("could not start detector load: {:#}", err);
                self.model = ModelSlot::Failed(format!("{:#}", err));
            }
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close_camera();
    }
}
