//! V4L2 frame source.
//!
//! This module provides `V4l2Source` for local webcams (e.g., /dev/video0).
//!
//! The V4L2 source is responsible for:
//! - Opening the device node and negotiating a capture format
//! - Capturing frames in-memory through an mmap stream
//! - Normalizing YUYV / NV12 / RGB3 buffers to RGB24
//! - Releasing the device (and its buffers) on close
//!
//! The V4L2 source MUST NOT:
//! - Store captured frames to disk
//! - Retain frames beyond handoff to the detection loop

use anyhow::{anyhow, Context, Result};
use ouroboros::self_referencing;
use std::io::ErrorKind;

use super::normalize::{normalize_to_rgb, PixelFormat};
use super::{FrameSource, SourceError, SourceSettings, StreamHandle};
use crate::frame::{Frame, FrameCounter};

/// V4L2 camera source.
pub struct V4l2Source {
    settings: SourceSettings,
    state: Option<DeviceState>,
    counter: FrameCounter,
    next_stream_id: u64,
    open_stream: Option<u64>,
    active_width: u32,
    active_height: u32,
    format: PixelFormat,
}

#[self_referencing]
struct DeviceState {
    device: v4l::Device,
    #[borrows(mut device)]
    #[covariant]
    stream: v4l::prelude::MmapStream<'this, v4l::Device>,
}

impl V4l2Source {
    pub fn new(settings: SourceSettings) -> Self {
        Self {
            active_width: settings.width,
            active_height: settings.height,
            settings,
            state: None,
            counter: FrameCounter::default(),
            next_stream_id: 0,
            open_stream: None,
            format: PixelFormat::Yuyv,
        }
    }

    fn acquire(&mut self) -> Result<(), SourceError> {
        use v4l::buffer::Type;
        use v4l::video::Capture;

        let path = self.settings.url.clone();
        let mut device = v4l::Device::with_path(&path).map_err(|err| classify(&path, err))?;

        let mut format = device.format().map_err(|err| classify(&path, err))?;
        format.width = self.settings.width;
        format.height = self.settings.height;
        format.fourcc = v4l::FourCC::new(b"YUYV");
        let format = match device.set_format(&format) {
            Ok(format) => format,
            Err(err) => {
                log::warn!("V4l2Source: failed to set format on {}: {}", path, err);
                device.format().map_err(|err| classify(&path, err))?
            }
        };
        self.format = PixelFormat::from_fourcc(&format.fourcc.repr).ok_or_else(|| {
            SourceError::DeviceUnavailable(format!(
                "{} delivers unsupported pixel format {}",
                path, format.fourcc
            ))
        })?;

        if self.settings.target_fps > 0 {
            let params = v4l::video::capture::Parameters::with_fps(self.settings.target_fps);
            if let Err(err) = device.set_params(&params) {
                log::warn!("V4l2Source: failed to set fps on {}: {}", path, err);
            }
        }

        self.active_width = format.width;
        self.active_height = format.height;

        let state = DeviceStateTryBuilder {
            device,
            stream_builder: |device| {
                v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, 4)
            },
        }
        .try_build()
        .map_err(|err| classify(&path, err))?;
        self.state = Some(state);
        Ok(())
    }
}

impl FrameSource for V4l2Source {
    fn name(&self) -> &str {
        &self.settings.url
    }

    fn open(&mut self) -> Result<StreamHandle, SourceError> {
        if self.open_stream.is_some() {
            return Err(SourceError::DeviceUnavailable(format!(
                "{} is already streaming",
                self.settings.url
            )));
        }
        self.acquire()?;
        self.next_stream_id += 1;
        self.open_stream = Some(self.next_stream_id);
        log::info!(
            "V4l2Source: opened {} ({}x{} {:?})",
            self.settings.url,
            self.active_width,
            self.active_height,
            self.format
        );
        Ok(StreamHandle::new(self.next_stream_id, &["v4l2 video capture"]))
    }

    fn next_frame(&mut self, stream: &StreamHandle) -> Result<Frame> {
        use v4l::io::traits::CaptureStream;

        if self.open_stream != Some(stream.id()) || !stream.is_live() {
            return Err(anyhow!(SourceError::Closed));
        }
        let state = self.state.as_mut().context("v4l2 device not connected")?;
        let (buf, _meta) = state
            .with_mut(|fields| fields.stream.next())
            .map_err(|err| anyhow!(SourceError::Capture(err.to_string())))?;
        let rgb = normalize_to_rgb(buf, self.active_width, self.active_height, self.format)?;
        let sequence = self.counter.next();
        Frame::from_rgb(rgb, self.active_width, self.active_height, sequence)
    }

    fn close(&mut self, stream: &mut StreamHandle) {
        let stopped = stream.stop_all();
        if self.open_stream == Some(stream.id()) {
            // Dropping the state unmaps the buffers and closes the device node.
            self.state = None;
            self.open_stream = None;
            log::info!(
                "V4l2Source: closed {} ({} track(s) stopped)",
                self.settings.url,
                stopped
            );
        }
    }

    fn active_tracks(&self) -> usize {
        usize::from(self.state.is_some())
    }

    fn frames_captured(&self) -> u64 {
        self.counter.captured()
    }
}

fn classify(path: &str, err: std::io::Error) -> SourceError {
    match err.kind() {
        ErrorKind::PermissionDenied => SourceError::PermissionDenied(format!("{}: {}", path, err)),
        _ => SourceError::DeviceUnavailable(format!("{}: {}", path, err)),
    }
}
