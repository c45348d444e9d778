use anyhow::Result;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::{BoundingBox, Detection};
use crate::frame::Frame;
use crate::ingest::synthetic::{CHAIR_RGB, PERSON_RGB};

/// Per-channel tolerance when matching a color key.
const TOLERANCE: i16 = 12;
/// Sampling stride in pixels.
const STRIDE: u32 = 2;

struct ColorKey {
    label: &'static str,
    rgb: [u8; 3],
}

const KEYS: [ColorKey; 2] = [
    ColorKey {
        label: "person",
        rgb: PERSON_RGB,
    },
    ColorKey {
        label: "chair",
        rgb: CHAIR_RGB,
    },
];

/// Stub backend for testing and demos.
///
/// Finds the synthetic camera's color-keyed objects: each key that matches
/// enough pixels yields one box around all matching pixels. The score is how
/// densely the matches fill that box.
pub struct StubBackend {
    min_pixels: usize,
}

impl StubBackend {
    pub fn new() -> Self {
        Self { min_pixels: 4 }
    }
}

impl Default for StubBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl DetectorBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        let mut detections = Vec::new();
        for key in &KEYS {
            if let Some(detection) = self.find(frame, key) {
                detections.push(detection);
            }
        }
        Ok(detections)
    }
}

impl StubBackend {
    fn find(&self, frame: &Frame, key: &ColorKey) -> Option<Detection> {
        let mut hits = 0usize;
        let (mut x1, mut y1, mut x2, mut y2) = (u32::MAX, u32::MAX, 0u32, 0u32);
        for y in (0..frame.height).step_by(STRIDE as usize) {
            for x in (0..frame.width).step_by(STRIDE as usize) {
                let Some(px) = frame.pixel(x, y) else {
                    continue;
                };
                if !matches_key(px, key.rgb) {
                    continue;
                }
                hits += 1;
                x1 = x1.min(x);
                y1 = y1.min(y);
                x2 = x2.max(x);
                y2 = y2.max(y);
            }
        }
        if hits < self.min_pixels {
            return None;
        }
        // Extend to the far edge of the last sampled cell.
        let bbox = BoundingBox::from_corners(
            x1 as f32,
            y1 as f32,
            (x2 + STRIDE).min(frame.width) as f32,
            (y2 + STRIDE).min(frame.height) as f32,
        );
        let cells = (bbox.area() / (STRIDE * STRIDE) as f32).max(1.0);
        let confidence = (hits as f32 / cells).min(1.0);
        Some(Detection::new(key.label, confidence, bbox))
    }
}

fn matches_key(px: [u8; 3], key: [u8; 3]) -> bool {
    px.iter()
        .zip(key.iter())
        .all(|(&a, &b)| (a as i16 - b as i16).abs() <= TOLERANCE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::{FrameSource, SourceSettings, SyntheticCamera};

    fn camera() -> SyntheticCamera {
        SyntheticCamera::new(SourceSettings {
            url: "stub://test".to_string(),
            target_fps: 0,
            width: 320,
            height: 240,
        })
        .without_jitter()
    }

    #[test]
    fn finds_person_and_chair_in_synthetic_frames() -> Result<()> {
        let mut camera = camera();
        let stream = camera.open()?;
        let mut backend = StubBackend::new();
        backend.load()?;

        // Skip ahead so the person is large.
        let mut frame = camera.next_frame(&stream)?;
        while frame.sequence < 40 {
            frame = camera.next_frame(&stream)?;
        }
        let detections = backend.detect(&frame)?;
        let labels: Vec<&str> = detections.iter().map(|d| d.label.as_str()).collect();
        assert_eq!(labels, vec!["person", "chair"]);

        let person = &detections[0];
        let expected_width = camera.person_width_at(frame.sequence).unwrap() as f32;
        assert!((person.bbox.width - expected_width).abs() <= STRIDE as f32 * 2.0);
        assert!(person.confidence > 0.8);
        Ok(())
    }

    #[test]
    fn empty_frames_yield_no_detections() -> Result<()> {
        let frame = Frame::from_rgb(vec![0u8; 16 * 16 * 3], 16, 16, 1)?;
        let mut backend = StubBackend::new();
        assert!(backend.detect(&frame)?.is_empty());
        Ok(())
    }
}
