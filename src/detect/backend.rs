use anyhow::Result;

use crate::detect::result::Detection;
use crate::frame::Frame;

/// Detector backend trait.
///
/// A backend is a pretrained model treated as a black box: frames in, labeled
/// boxes out.
///
/// Lifecycle:
/// - the backend is constructed cheaply by a factory
/// - `load` runs once on a loader thread and may be slow or fail
/// - `detect` runs on the loop thread, once per frame, only after `load`
///   succeeded
pub trait DetectorBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// One-time model initialization.
    fn load(&mut self) -> Result<()> {
        Ok(())
    }

    /// Run detection on a frame.
    ///
    /// Results are ordered as the model reports them; the loop relies on that
    /// order when it picks the first target-class entry. Implementations must
    /// treat the frame as read-only and must not keep it beyond the call.
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>>;
}

/// Deferred backend construction, run on the loader thread.
pub type BackendFactory = Box<dyn FnOnce() -> Result<Box<dyn DetectorBackend>> + Send>;

/// Factory that hands over an already constructed backend.
pub fn factory_for<B: DetectorBackend + 'static>(backend: B) -> BackendFactory {
    Box::new(move || -> Result<Box<dyn DetectorBackend>> { Ok(Box::new(backend)) })
}
