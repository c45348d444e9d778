use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::detect::{DetectorSettings, PERSON_LABEL};
use crate::estimate::{ApparentDimension, EstimatorSettings};
use crate::ingest::SourceSettings;
use crate::pipeline::{LoopOptions, DEFAULT_MODEL_RETRY};
use crate::session::DEFAULT_MAX_LOAD_ATTEMPTS;

/// A 15.6 inch laptop screen.
pub const DEFAULT_REFERENCE_SIZE_IN: f64 = 15.6;

#[derive(Debug, Deserialize, Default)]
struct ProximityConfigFile {
    reference_size_in: Option<f64>,
    camera: Option<CameraConfigFile>,
    detector: Option<DetectorConfigFile>,
    estimator: Option<EstimatorConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraConfigFile {
    url: Option<String>,
    target_fps: Option<u32>,
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectorConfigFile {
    backend: Option<String>,
    model_path: Option<PathBuf>,
    input_width: Option<u32>,
    input_height: Option<u32>,
    confidence_threshold: Option<f32>,
    retry_ms: Option<u64>,
    max_load_attempts: Option<u32>,
    target_label: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct EstimatorConfigFile {
    known_size_in: Option<f64>,
    half_angle_deg: Option<f64>,
    safe_fraction: Option<f64>,
    dimension: Option<ApparentDimension>,
}

#[derive(Debug, Clone)]
pub struct ProximityConfig {
    pub reference_size_in: f64,
    pub camera: SourceSettings,
    pub detector: DetectorSettings,
    pub estimator: EstimatorSettings,
    pub dimension: ApparentDimension,
    pub target_label: String,
    pub model_retry: Duration,
    pub max_load_attempts: u32,
}

impl Default for ProximityConfig {
    fn default() -> Self {
        Self::from_file(ProximityConfigFile::default())
    }
}

impl ProximityConfig {
    /// Defaults, then the JSON file named by `PROXIMITY_CONFIG`, then
    /// `PROXIMITY_*` environment overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("PROXIMITY_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: ProximityConfigFile) -> Self {
        let camera_defaults = SourceSettings::default();
        let camera = file.camera.unwrap_or_default();
        let camera = SourceSettings {
            url: camera.url.unwrap_or(camera_defaults.url),
            target_fps: camera.target_fps.unwrap_or(camera_defaults.target_fps),
            width: camera.width.unwrap_or(camera_defaults.width),
            height: camera.height.unwrap_or(camera_defaults.height),
        };

        let detector_defaults = DetectorSettings::default();
        let detector_file = file.detector.unwrap_or_default();
        let model_retry = detector_file
            .retry_ms
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_MODEL_RETRY);
        let max_load_attempts = detector_file
            .max_load_attempts
            .unwrap_or(DEFAULT_MAX_LOAD_ATTEMPTS);
        let target_label = detector_file
            .target_label
            .unwrap_or_else(|| PERSON_LABEL.to_string());
        let detector = DetectorSettings {
            backend: detector_file.backend.unwrap_or(detector_defaults.backend),
            model_path: detector_file.model_path.or(detector_defaults.model_path),
            input_width: detector_file
                .input_width
                .unwrap_or(detector_defaults.input_width),
            input_height: detector_file
                .input_height
                .unwrap_or(detector_defaults.input_height),
            confidence_threshold: detector_file
                .confidence_threshold
                .unwrap_or(detector_defaults.confidence_threshold),
        };

        let estimator_defaults = EstimatorSettings::default();
        let estimator_file = file.estimator.unwrap_or_default();
        let dimension = estimator_file.dimension.unwrap_or_default();
        let estimator = EstimatorSettings {
            known_size_in: estimator_file
                .known_size_in
                .unwrap_or(estimator_defaults.known_size_in),
            half_angle_deg: estimator_file
                .half_angle_deg
                .unwrap_or(estimator_defaults.half_angle_deg),
            safe_fraction: estimator_file
                .safe_fraction
                .unwrap_or(estimator_defaults.safe_fraction),
        };

        Self {
            reference_size_in: file.reference_size_in.unwrap_or(DEFAULT_REFERENCE_SIZE_IN),
            camera,
            detector,
            estimator,
            dimension,
            target_label,
            model_retry,
            max_load_attempts,
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(url) = std::env::var("PROXIMITY_SOURCE_URL") {
            if !url.trim().is_empty() {
                self.camera.url = url;
            }
        }
        if let Ok(size) = std::env::var("PROXIMITY_REFERENCE_SIZE") {
            self.reference_size_in = size
                .trim()
                .parse()
                .map_err(|_| anyhow!("PROXIMITY_REFERENCE_SIZE must be a number of inches"))?;
        }
        if let Ok(backend) = std::env::var("PROXIMITY_BACKEND") {
            if !backend.trim().is_empty() {
                self.detector.backend = backend;
            }
        }
        if let Ok(path) = std::env::var("PROXIMITY_MODEL_PATH") {
            if !path.trim().is_empty() {
                self.detector.model_path = Some(PathBuf::from(path));
            }
        }
        if let Ok(retry) = std::env::var("PROXIMITY_MODEL_RETRY_MS") {
            let millis: u64 = retry.trim().parse().map_err(|_| {
                anyhow!("PROXIMITY_MODEL_RETRY_MS must be an integer number of milliseconds")
            })?;
            self.model_retry = Duration::from_millis(millis);
        }
        if let Ok(label) = std::env::var("PROXIMITY_TARGET_LABEL") {
            if !label.trim().is_empty() {
                self.target_label = label;
            }
        }
        Ok(())
    }

    pub fn validate(&mut self) -> Result<()> {
        if !(self.reference_size_in.is_finite() && self.reference_size_in > 0.0) {
            return Err(anyhow!("reference size must be a positive number of inches"));
        }
        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(anyhow!("camera width and height must be greater than zero"));
        }
        if self.detector.input_width == 0 || self.detector.input_height == 0 {
            return Err(anyhow!("detector input size must be greater than zero"));
        }
        if !(0.0..=1.0).contains(&self.detector.confidence_threshold) {
            return Err(anyhow!("confidence threshold must be within [0, 1]"));
        }
        if !(self.estimator.known_size_in.is_finite() && self.estimator.known_size_in > 0.0) {
            return Err(anyhow!("known size must be a positive number of inches"));
        }
        if !(self.estimator.half_angle_deg > 0.0 && self.estimator.half_angle_deg < 90.0) {
            return Err(anyhow!("half angle must be between 0 and 90 degrees"));
        }
        if !(self.estimator.safe_fraction.is_finite() && self.estimator.safe_fraction > 0.0) {
            return Err(anyhow!("safe fraction must be greater than zero"));
        }
        if self.model_retry.is_zero() {
            return Err(anyhow!("model retry delay must be greater than zero"));
        }
        if self.max_load_attempts == 0 {
            return Err(anyhow!("max load attempts must be at least 1"));
        }
        self.target_label = self.target_label.trim().to_lowercase();
        if self.target_label.is_empty() {
            return Err(anyhow!("target label must not be empty"));
        }
        self.detector.backend = self.detector.backend.trim().to_string();
        Ok(())
    }

    /// Loop options for the pipeline. Pacing is left to the camera.
    pub fn loop_options(&self) -> LoopOptions {
        LoopOptions {
            target_label: self.target_label.clone(),
            dimension: self.dimension,
            estimator: self.estimator,
            model_retry: self.model_retry,
            frame_interval: Duration::ZERO,
        }
    }
}

fn read_config_file(path: &Path) -> Result<ProximityConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}
