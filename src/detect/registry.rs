use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{anyhow, Result};

use super::backend::{BackendFactory, DetectorBackend};
use super::backends::StubBackend;

pub const DEFAULT_BACKEND: &str = "stub";

/// Settings handed to backend constructors.
#[derive(Clone, Debug, PartialEq)]
pub struct DetectorSettings {
    /// Registered backend name.
    pub backend: String,
    /// Model file for backends that load one.
    pub model_path: Option<PathBuf>,
    /// Model input size.
    pub input_width: u32,
    pub input_height: u32,
    /// Minimum score a detection needs to be reported.
    pub confidence_threshold: f32,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            backend: DEFAULT_BACKEND.to_string(),
            model_path: None,
            input_width: 300,
            input_height: 300,
            confidence_threshold: 0.5,
        }
    }
}

type Constructor = fn(&DetectorSettings) -> Result<Box<dyn DetectorBackend>>;

/// Registry of detector backends by name.
///
/// Backends are registered as constructors rather than instances: the loop
/// builds and loads the chosen backend off-thread, once.
pub struct BackendRegistry {
    constructors: BTreeMap<String, Constructor>,
    default_name: Option<String>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self {
            constructors: BTreeMap::new(),
            default_name: None,
        }
    }

    /// Registry with every backend compiled into this build.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(DEFAULT_BACKEND, |_| Ok(Box::new(StubBackend::new())));
        #[cfg(feature = "backend-tract")]
        registry.register("tract", |settings| {
            let path = settings
                .model_path
                .clone()
                .ok_or_else(|| anyhow!("the tract backend requires a model path"))?;
            Ok(Box::new(
                super::backends::TractBackend::new(
                    path,
                    settings.input_width,
                    settings.input_height,
                )
                .with_threshold(settings.confidence_threshold),
            ))
        });
        registry
    }

    /// Register a backend. The first registered backend becomes the default.
    pub fn register(&mut self, name: &str, constructor: Constructor) {
        if self.default_name.is_none() {
            self.default_name = Some(name.to_string());
        }
        self.constructors.insert(name.to_string(), constructor);
    }

    /// Set default backend by name.
    pub fn set_default(&mut self, name: &str) -> Result<()> {
        if !self.constructors.contains_key(name) {
            return Err(anyhow!("backend '{}' not registered", name));
        }
        self.default_name = Some(name.to_string());
        Ok(())
    }

    pub fn default_name(&self) -> Option<&str> {
        self.default_name.as_deref()
    }

    /// List registered backends.
    pub fn list(&self) -> Vec<String> {
        self.constructors.keys().cloned().collect()
    }

    /// Deferred constructor for the backend named in `settings` (or the
    /// default when the name is empty).
    pub fn factory(&self, settings: &DetectorSettings) -> Result<BackendFactory> {
        let name = if settings.backend.trim().is_empty() {
            self.default_name
                .clone()
                .ok_or_else(|| anyhow!("no detector backends registered"))?
        } else {
            settings.backend.clone()
        };
        let constructor = *self.constructors.get(&name).ok_or_else(|| {
            anyhow!(
                "backend '{}' not registered (available: {})",
                name,
                self.list().join(", ")
            )
        })?;
        let settings = settings.clone();
        Ok(Box::new(move || constructor(&settings)))
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::with_builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::backends::ScriptedBackend;

    #[test]
    fn builtin_registry_defaults_to_stub() -> Result<()> {
        let registry = BackendRegistry::with_builtin();
        assert_eq!(registry.default_name(), Some("stub"));
        let backend = registry.factory(&DetectorSettings::default())?()?;
        assert_eq!(backend.name(), "stub");
        Ok(())
    }

    #[test]
    fn unknown_backends_are_rejected() {
        let registry = BackendRegistry::with_builtin();
        let settings = DetectorSettings {
            backend: "yolo-v99".to_string(),
            ..DetectorSettings::default()
        };
        let err = registry.factory(&settings).err().unwrap();
        assert!(err.to_string().contains("yolo-v99"));
    }

    #[test]
    fn set_default_requires_registration() -> Result<()> {
        let mut registry = BackendRegistry::with_builtin();
        assert!(registry.set_default("missing").is_err());
        registry.register("scripted", |_| Ok(Box::new(ScriptedBackend::new())));
        registry.set_default("scripted")?;
        let settings = DetectorSettings {
            backend: String::new(),
            ..DetectorSettings::default()
        };
        assert_eq!(registry.factory(&settings)?()?.name(), "scripted");
        assert!(registry.list().contains(&"scripted".to_string()));
        Ok(())
    }
}
