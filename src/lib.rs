//! Proximity Watch
//!
//! A camera viewer that runs object detection on every frame, draws a labeled
//! box for every detection, and estimates how far the first detected person
//! is from the screen. When the estimate drops below a safe distance derived
//! from the user's reference size (a screen diagonal in inches), the viewer
//! raises a "too close" alert.
//!
//! The distance is a proportionality heuristic over one bounding-box
//! dimension. It is not a calibrated measurement; its accuracy depends on
//! camera optics that are not modeled here.
//!
//! # Module Structure
//!
//! - `ingest`: frame sources (synthetic camera, V4L2 devices)
//! - `detect`: detector backends, the backend registry, detection types
//! - `loader`: off-thread model loading
//! - `estimate`: distance and safe-distance heuristics
//! - `reference`: the shared reference size cell
//! - `session`: the owned session (camera handle, model slot)
//! - `pipeline`: one detection cycle and its decision logic
//! - `scheduler`: the loop runner and its controller
//! - `present`: presentation sinks and the box overlay
//! - `config`: JSON file plus environment configuration

pub mod config;
pub mod detect;
pub mod estimate;
pub mod frame;
pub mod ingest;
pub mod loader;
pub mod pipeline;
pub mod present;
pub mod reference;
pub mod scheduler;
pub mod session;
pub mod ui;

pub use config::ProximityConfig;
pub use detect::{BoundingBox, Detection, DetectorBackend};
pub use estimate::{calculate_safe_distance, estimate_distance, EstimatorSettings};
pub use frame::Frame;
pub use ingest::{FrameSource, SourceError, StreamHandle};
pub use loader::ModelSource;
pub use pipeline::{evaluate, LoopOptions, Next, Pipeline};
pub use present::{DisplayFields, Overlay, PresentationSink};
pub use reference::ReferenceSize;
pub use scheduler::{Controller, Runner};
pub use session::{Session, SessionState};

/// Build a session and pipeline from configuration.
pub fn build_pipeline<P: PresentationSink>(
    cfg: &ProximityConfig,
    sink: P,
) -> anyhow::Result<Pipeline<P>> {
    let source = ingest::open_source(&cfg.camera)?;
    let mut registry = detect::BackendRegistry::with_builtin();
    if !cfg.detector.backend.is_empty() {
        registry.set_default(&cfg.detector.backend)?;
    }
    let models = ModelSource::from_registry(registry, cfg.detector.clone());
    let session = Session::new(source, models, ReferenceSize::new(cfg.reference_size_in))
        .with_max_load_attempts(cfg.max_load_attempts);
    Ok(Pipeline::new(session, sink, cfg.loop_options()))
}
