//! Synthetic camera (`stub://...`).
//!
//! Renders a dark room with two objects the stub detector can find:
//! - a near-white "person" block that walks toward and away from the camera
//!   (its width follows a triangle wave) and leaves the scene for part of
//!   every period
//! - a fixed green "chair" block in the lower-left corner
//!
//! Special URLs simulate acquisition failures:
//! - `stub://denied` fails with `SourceError::PermissionDenied`
//! - `stub://unavailable` fails with `SourceError::DeviceUnavailable`

use anyhow::{anyhow, Result};
use rand::Rng;
use std::time::{Duration, Instant};

use super::{FrameSource, SourceError, SourceSettings, StreamHandle};
use crate::frame::{rgb_len, Frame, FrameCounter};

pub const PERSON_RGB: [u8; 3] = [235, 235, 235];
pub const CHAIR_RGB: [u8; 3] = [40, 200, 60];
const BACKGROUND_RGB: [u8; 3] = [24, 24, 32];

/// Frames per walk cycle.
const SCENE_PERIOD: u64 = 120;
/// The person is out of view for the last frames of every cycle.
const ABSENT_FRAMES: u64 = 20;
const MIN_PERSON_WIDTH: u32 = 12;
const CHAIR_SIZE: u32 = 60;

/// Synthetic camera source.
pub struct SyntheticCamera {
    settings: SourceSettings,
    counter: FrameCounter,
    next_stream_id: u64,
    open_stream: Option<u64>,
    last_frame_at: Option<Instant>,
    jitter: bool,
}

impl SyntheticCamera {
    pub fn new(settings: SourceSettings) -> Self {
        Self {
            settings,
            counter: FrameCounter::default(),
            next_stream_id: 0,
            open_stream: None,
            last_frame_at: None,
            jitter: true,
        }
    }

    /// Disable positional noise (deterministic frames).
    pub fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }

    /// Person block width for a frame, or `None` while the person is away.
    pub fn person_width_at(&self, sequence: u64) -> Option<u32> {
        let phase = sequence % SCENE_PERIOD;
        let walking = SCENE_PERIOD - ABSENT_FRAMES;
        if phase >= walking {
            return None;
        }
        let max_width = (self.settings.width / 2).max(MIN_PERSON_WIDTH);
        let half = walking / 2;
        // Triangle wave: approach for the first half, retreat for the second.
        let step = if phase < half { phase } else { walking - phase };
        let span = (max_width - MIN_PERSON_WIDTH) as u64;
        Some(MIN_PERSON_WIDTH + (span * step / half.max(1)) as u32)
    }

    fn pace(&mut self) {
        if self.settings.target_fps == 0 {
            return;
        }
        let interval = Duration::from_millis(1000 / self.settings.target_fps as u64);
        if let Some(last) = self.last_frame_at {
            let elapsed = last.elapsed();
            if elapsed < interval {
                std::thread::sleep(interval - elapsed);
            }
        }
        self.last_frame_at = Some(Instant::now());
    }

    fn render(&self, sequence: u64) -> Result<Vec<u8>> {
        let width = self.settings.width;
        let height = self.settings.height;
        let mut pixels = Vec::with_capacity(rgb_len(width, height)?);
        for _ in 0..(width as usize * height as usize) {
            pixels.extend_from_slice(&BACKGROUND_RGB);
        }

        if height > CHAIR_SIZE + 10 && width > CHAIR_SIZE + 10 {
            fill_rect(
                &mut pixels,
                width,
                10,
                height - CHAIR_SIZE - 10,
                CHAIR_SIZE,
                CHAIR_SIZE,
                CHAIR_RGB,
            );
        }

        if let Some(person_width) = self.person_width_at(sequence) {
            let person_height = (person_width as f32 * 1.6) as u32;
            let person_height = person_height.min(height.saturating_sub(20)).max(1);
            let offset: i64 = if self.jitter {
                rand::thread_rng().gen_range(-2..=2)
            } else {
                0
            };
            let x = ((width.saturating_sub(person_width) / 2) as i64 + offset).max(0) as u32;
            let y = height.saturating_sub(person_height) / 2;
            fill_rect(
                &mut pixels,
                width,
                x,
                y,
                person_width,
                person_height,
                PERSON_RGB,
            );
        }

        Ok(pixels)
    }
}

impl FrameSource for SyntheticCamera {
    fn name(&self) -> &str {
        &self.settings.url
    }

    fn open(&mut self) -> Result<StreamHandle, SourceError> {
        match self.settings.url.as_str() {
            "stub://denied" => {
                return Err(SourceError::PermissionDenied(self.settings.url.clone()));
            }
            "stub://unavailable" => {
                return Err(SourceError::DeviceUnavailable(self.settings.url.clone()));
            }
            _ => {}
        }
        if self.open_stream.is_some() {
            return Err(SourceError::DeviceUnavailable(format!(
                "{} is already streaming",
                self.settings.url
            )));
        }
        self.next_stream_id += 1;
        self.open_stream = Some(self.next_stream_id);
        self.last_frame_at = None;
        log::info!(
            "SyntheticCamera: opened {} ({}x{})",
            self.settings.url,
            self.settings.width,
            self.settings.height
        );
        Ok(StreamHandle::new(self.next_stream_id, &["synthetic video"]))
    }

    fn next_frame(&mut self, stream: &StreamHandle) -> Result<Frame> {
        if self.open_stream != Some(stream.id()) || !stream.is_live() {
            return Err(anyhow!(SourceError::Closed));
        }
        self.pace();
        let sequence = self.counter.next();
        let pixels = self.render(sequence)?;
        Frame::from_rgb(pixels, self.settings.width, self.settings.height, sequence)
    }

    fn close(&mut self, stream: &mut StreamHandle) {
        let stopped = stream.stop_all();
        if self.open_stream == Some(stream.id()) {
            self.open_stream = None;
            log::info!(
                "SyntheticCamera: closed {} ({} track(s) stopped)",
                self.settings.url,
                stopped
            );
        }
    }

    fn active_tracks(&self) -> usize {
        usize::from(self.open_stream.is_some())
    }

    fn frames_captured(&self) -> u64 {
        self.counter.captured()
    }
}

fn fill_rect(pixels: &mut [u8], stride: u32, x: u32, y: u32, w: u32, h: u32, rgb: [u8; 3]) {
    let rows = pixels.len() / (stride as usize * 3);
    for row in (y as usize)..((y + h) as usize).min(rows) {
        for col in (x as usize)..((x + w) as usize).min(stride as usize) {
            let offset = (row * stride as usize + col) * 3;
            pixels[offset..offset + 3].copy_from_slice(&rgb);
        }
    }
}
