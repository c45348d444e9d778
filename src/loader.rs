//! Off-thread model loading.
//!
//! `ModelLoader` builds a backend and runs its one-time `load` on a named
//! worker thread. The loop polls it without blocking, once per cycle.

use anyhow::{anyhow, Result};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::time::{Duration, Instant};

use crate::detect::{factory_for, BackendFactory, BackendRegistry, DetectorBackend, DetectorSettings};

/// Outcome of a non-blocking poll.
pub enum LoadPoll {
    Pending,
    Ready(Box<dyn DetectorBackend>),
    Failed(anyhow::Error),
}

/// One in-flight model load.
pub struct ModelLoader {
    rx: Receiver<Result<Box<dyn DetectorBackend>>>,
    started_at: Instant,
    attempt: u32,
}

impl ModelLoader {
    /// Start loading on a worker thread.
    pub fn spawn(factory: BackendFactory, attempt: u32) -> Result<Self> {
        let (tx, rx) = mpsc::channel();
        std::thread::Builder::new()
            .name("detector-load".to_string())
            .spawn(move || {
                let result = factory().and_then(|mut backend| {
                    backend.load()?;
                    Ok(backend)
                });
                // The session may have been torn down meanwhile; nobody to tell.
                let _ = tx.send(result);
            })
            .map_err(|e| anyhow!("failed to spawn detector load thread: {}", e))?;
        Ok(Self {
            rx,
            started_at: Instant::now(),
            attempt,
        })
    }

    pub fn poll(&mut self) -> LoadPoll {
        match self.rx.try_recv() {
            Ok(Ok(backend)) => LoadPoll::Ready(backend),
            Ok(Err(err)) => LoadPoll::Failed(err),
            Err(TryRecvError::Empty) => LoadPoll::Pending,
            Err(TryRecvError::Disconnected) => {
                LoadPoll::Failed(anyhow!("detector load thread exited without a result"))
            }
        }
    }

    /// Which load attempt this is (starts at 1).
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }
}

/// Where load attempts get their backend from.
///
/// A failed load consumes its factory, so every retry asks for a new one.
pub struct ModelSource {
    make: Box<dyn FnMut() -> Result<BackendFactory> + Send>,
}

impl ModelSource {
    /// Resolve the backend named in `settings` on every attempt.
    pub fn from_registry(registry: BackendRegistry, settings: DetectorSettings) -> Self {
        Self {
            make: Box::new(move || registry.factory(&settings)),
        }
    }

    /// A single pre-built backend. Retries after a failed load error out.
    pub fn once<B: DetectorBackend + 'static>(backend: B) -> Self {
        let mut slot = Some(backend);
        Self {
            make: Box::new(move || -> Result<BackendFactory> {
                slot.take()
                    .map(factory_for)
                    .ok_or_else(|| anyhow!("detector backend was already consumed"))
            }),
        }
    }

    /// Build a fresh backend for every attempt.
    pub fn each<B, F>(mut make: F) -> Self
    where
        B: DetectorBackend + 'static,
        F: FnMut() -> B + Send + 'static,
    {
        Self {
            make: Box::new(move || -> Result<BackendFactory> { Ok(factory_for(make())) }),
        }
    }

    pub(crate) fn next_factory(&mut self) -> Result<BackendFactory> {
        (self.make)()
    }
}
