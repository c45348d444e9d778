//! Frame sources.
//!
//! This module provides the camera side of the loop:
//! - Synthetic camera (`stub://...`, testing and demos)
//! - USB/V4L2 devices (feature: ingest-v4l2)
//!
//! Every source follows the same lifecycle:
//! - `open` acquires the device and returns a `StreamHandle` listing the
//!   hardware tracks it holds
//! - `next_frame` captures from an open handle
//! - `close` stops every track and releases the device; it is idempotent
//!
//! Sources MUST NOT:
//! - Store frames to disk
//! - Keep frames after handing them to the loop

use anyhow::Result;

use crate::frame::Frame;

#[cfg(feature = "ingest-v4l2")]
mod normalize;
pub mod synthetic;
#[cfg(feature = "ingest-v4l2")]
pub mod v4l2;

pub use synthetic::SyntheticCamera;
#[cfg(feature = "ingest-v4l2")]
pub use v4l2::V4l2Source;

pub const DEFAULT_SOURCE_URL: &str = "stub://webcam";
pub const DEFAULT_WIDTH: u32 = 640;
pub const DEFAULT_HEIGHT: u32 = 480;
pub const DEFAULT_FPS: u32 = 15;

/// Why a source could not be acquired or read.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SourceError {
    /// The user or the OS refused access to the device.
    PermissionDenied(String),
    /// No such device, or it is held by another process.
    DeviceUnavailable(String),
    /// Capture was attempted on a handle that has been closed.
    Closed,
    /// The device is open but a frame could not be read.
    Capture(String),
}

impl std::fmt::Display for SourceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceError::PermissionDenied(msg) => write!(f, "camera permission denied: {}", msg),
            SourceError::DeviceUnavailable(msg) => write!(f, "camera unavailable: {}", msg),
            SourceError::Closed => write!(f, "camera stream is closed"),
            SourceError::Capture(msg) => write!(f, "frame capture failed: {}", msg),
        }
    }
}

impl std::error::Error for SourceError {}

/// One hardware track held by an open stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Track {
    pub label: String,
    pub live: bool,
}

/// Handle to an open camera stream.
#[derive(Debug)]
pub struct StreamHandle {
    id: u64,
    tracks: Vec<Track>,
}

impl StreamHandle {
    pub(crate) fn new(id: u64, track_labels: &[&str]) -> Self {
        Self {
            id,
            tracks: track_labels
                .iter()
                .map(|label| Track {
                    label: label.to_string(),
                    live: true,
                })
                .collect(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn live_tracks(&self) -> usize {
        self.tracks.iter().filter(|track| track.live).count()
    }

    pub fn is_live(&self) -> bool {
        self.live_tracks() > 0
    }

    /// Mark every track stopped. Returns how many were still live.
    pub(crate) fn stop_all(&mut self) -> usize {
        let mut stopped = 0;
        for track in self.tracks.iter_mut().filter(|track| track.live) {
            track.live = false;
            stopped += 1;
        }
        stopped
    }
}

/// Capability contract for a camera.
pub trait FrameSource {
    /// Source identifier (URL or device path).
    fn name(&self) -> &str;

    /// Acquire the device.
    fn open(&mut self) -> Result<StreamHandle, SourceError>;

    /// Capture the next frame from an open stream.
    fn next_frame(&mut self, stream: &StreamHandle) -> Result<Frame>;

    /// Stop every track of `stream` and release the device. Idempotent.
    fn close(&mut self, stream: &mut StreamHandle);

    /// Hardware tracks currently held by this source.
    fn active_tracks(&self) -> usize;

    /// Frames captured since construction.
    fn frames_captured(&self) -> u64 {
        0
    }
}

/// Frame source settings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceSettings {
    /// `stub://<name>` for the synthetic camera, otherwise a device path.
    pub url: String,
    /// Target frame rate. Zero disables pacing in the synthetic camera.
    pub target_fps: u32,
    pub width: u32,
    pub height: u32,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            url: DEFAULT_SOURCE_URL.to_string(),
            target_fps: DEFAULT_FPS,
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
        }
    }
}

/// Build the source named by `settings.url`.
pub fn open_source(settings: &SourceSettings) -> Result<Box<dyn FrameSource>> {
    if settings.url.starts_with("stub://") {
        return Ok(Box::new(SyntheticCamera::new(settings.clone())));
    }
    #[cfg(feature = "ingest-v4l2")]
    {
        Ok(Box::new(V4l2Source::new(settings.clone())))
    }
    #[cfg(not(feature = "ingest-v4l2"))]
    {
        Err(anyhow::anyhow!(
            "camera device {} requires the ingest-v4l2 feature",
            settings.url
        ))
    }
}
