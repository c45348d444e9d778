mod backend;
pub mod backends;
pub mod labels;
mod registry;
mod result;

pub use backend::{factory_for, BackendFactory, DetectorBackend};
pub use backends::{ScriptedBackend, StubBackend};
pub use registry::{BackendRegistry, DetectorSettings};
pub use result::{BoundingBox, Detection};

/// Class the loop measures distance for.
pub const PERSON_LABEL: &str = "person";
