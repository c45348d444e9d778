#![cfg(feature = "backend-tract")]

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use image::{imageops::FilterType, RgbImage};
use tract_onnx::prelude::*;

use crate::detect::backend::DetectorBackend;
use crate::detect::labels::coco_label;
use crate::detect::result::{BoundingBox, Detection};
use crate::frame::Frame;

type Plan = TypedRunnableModel<TypedModel>;

/// Tract-based backend for SSD-style ONNX detectors trained on COCO.
///
/// Expected model signature (the ONNX model zoo SSD-MobileNet layout):
/// - input 0: `u8[1, H, W, 3]` RGB
/// - output 0: boxes `f32[1, N, 4]` as normalized `(ymin, xmin, ymax, xmax)`
/// - output 1: class ids `f32[1, N]` (COCO 1-based ids)
/// - output 2: scores `f32[1, N]`
/// - output 3: valid detection count `f32[1]`
///
/// The model file is read in `load`, which runs on the loader thread.
pub struct TractBackend {
    model_path: PathBuf,
    plan: Option<Plan>,
    input_width: u32,
    input_height: u32,
    confidence_threshold: f32,
}

impl TractBackend {
    pub fn new<P: AsRef<Path>>(model_path: P, input_width: u32, input_height: u32) -> Self {
        Self {
            model_path: model_path.as_ref().to_path_buf(),
            plan: None,
            input_width,
            input_height,
            confidence_threshold: 0.5,
        }
    }

    /// Override the default confidence threshold.
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    fn build_input(&self, frame: &Frame) -> Result<Tensor> {
        let image = RgbImage::from_raw(frame.width, frame.height, frame.pixels().to_vec())
            .ok_or_else(|| anyhow!("frame buffer does not match {}x{}", frame.width, frame.height))?;
        let resized = image::imageops::resize(
            &image,
            self.input_width,
            self.input_height,
            FilterType::Triangle,
        );
        let input = tract_ndarray::Array4::from_shape_fn(
            (1, self.input_height as usize, self.input_width as usize, 3),
            |(_, y, x, channel)| resized.get_pixel(x as u32, y as u32)[channel],
        );
        Ok(input.into_tensor())
    }

    fn decode(&self, outputs: TVec<TValue>, frame: &Frame) -> Result<Vec<Detection>> {
        if outputs.len() < 3 {
            return Err(anyhow!(
                "expected at least 3 model outputs, got {}",
                outputs.len()
            ));
        }
        let boxes = outputs[0]
            .to_array_view::<f32>()
            .context("boxes output was not f32")?;
        let classes = outputs[1]
            .to_array_view::<f32>()
            .context("classes output was not f32")?;
        let scores = outputs[2]
            .to_array_view::<f32>()
            .context("scores output was not f32")?;

        let available = scores.len().min(classes.len()).min(boxes.len() / 4);
        let count = match outputs.get(3) {
            Some(num) => {
                let num = num
                    .to_array_view::<f32>()
                    .context("detection count output was not f32")?;
                num.iter()
                    .next()
                    .map(|n| (*n).max(0.0) as usize)
                    .unwrap_or(available)
                    .min(available)
            }
            None => available,
        };

        let boxes: Vec<f32> = boxes.iter().copied().collect();
        let frame_w = frame.width as f32;
        let frame_h = frame.height as f32;
        let mut detections = Vec::new();
        for (i, (&class_id, &score)) in classes.iter().zip(scores.iter()).take(count).enumerate() {
            if score < self.confidence_threshold {
                continue;
            }
            let Some(label) = coco_label(class_id.round() as i64) else {
                continue;
            };
            let b = &boxes[i * 4..i * 4 + 4];
            let (ymin, xmin, ymax, xmax) = (b[0], b[1], b[2], b[3]);
            let bbox = BoundingBox::from_corners(
                xmin.clamp(0.0, 1.0) * frame_w,
                ymin.clamp(0.0, 1.0) * frame_h,
                xmax.clamp(0.0, 1.0) * frame_w,
                ymax.clamp(0.0, 1.0) * frame_h,
            );
            detections.push(Detection::new(label, score, bbox));
        }
        Ok(detections)
    }
}

impl DetectorBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn load(&mut self) -> Result<()> {
        let path = &self.model_path;
        let plan = tract_onnx::onnx()
            .model_for_path(path)
            .with_context(|| format!("failed to load ONNX model from {}", path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(
                    u8::datum_type(),
                    tvec!(
                        1,
                        self.input_height as usize,
                        self.input_width as usize,
                        3
                    ),
                ),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;
        self.plan = Some(plan);
        log::info!("TractBackend: loaded {}", path.display());
        Ok(())
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        let input = self.build_input(frame)?;
        let plan = self
            .plan
            .as_ref()
            .ok_or_else(|| anyhow!("model not loaded"))?;
        let outputs = plan.run(tvec!(input.into())).context("ONNX inference failed")?;
        self.decode(outputs, frame)
    }
}
