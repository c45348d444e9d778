use anyhow::{anyhow, Result};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::Receiver;
use std::sync::Arc;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::Detection;
use crate::frame::Frame;

/// One scripted response to a `detect` call.
#[derive(Clone, Debug)]
pub enum ScriptStep {
    Detections(Vec<Detection>),
    Fail(String),
}

/// Backend that replays canned responses.
///
/// Used as a test double and for demos without a model. Steps are consumed in
/// order; once the script runs out the last step repeats (an empty script
/// always answers with no detections).
pub struct ScriptedBackend {
    steps: VecDeque<ScriptStep>,
    last: ScriptStep,
    calls: Arc<AtomicUsize>,
    load_gate: Option<Receiver<()>>,
    load_failures: usize,
    on_detect: Option<Box<dyn FnMut() + Send>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self {
            steps: VecDeque::new(),
            last: ScriptStep::Detections(Vec::new()),
            calls: Arc::new(AtomicUsize::new(0)),
            load_gate: None,
            load_failures: 0,
            on_detect: None,
        }
    }

    /// Answer the next call with these detections.
    pub fn then_detect(mut self, detections: Vec<Detection>) -> Self {
        self.steps.push_back(ScriptStep::Detections(detections));
        self
    }

    /// Fail the next call.
    pub fn then_fail(mut self, message: &str) -> Self {
        self.steps.push_back(ScriptStep::Fail(message.to_string()));
        self
    }

    /// Block `load` until the gate receives a value (or its sender is dropped).
    pub fn with_load_gate(mut self, gate: Receiver<()>) -> Self {
        self.load_gate = Some(gate);
        self
    }

    /// Fail every `load` call.
    pub fn failing_load(mut self) -> Self {
        self.load_failures = usize::MAX;
        self
    }

    /// Run `hook` inside every `detect` call, before it answers.
    pub fn on_detect(mut self, hook: impl FnMut() + Send + 'static) -> Self {
        self.on_detect = Some(Box::new(hook));
        self
    }

    /// Shared counter of `detect` calls.
    pub fn call_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }
}

impl Default for ScriptedBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl DetectorBackend for ScriptedBackend {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn load(&mut self) -> Result<()> {
        if let Some(gate) = self.load_gate.take() {
            let _ = gate.recv();
        }
        if self.load_failures > 0 {
            self.load_failures -= 1;
            return Err(anyhow!("scripted model failed to load"));
        }
        Ok(())
    }

    fn detect(&mut self, _frame: &Frame) -> Result<Vec<Detection>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(hook) = self.on_detect.as_mut() {
            hook();
        }
        let step = match self.steps.pop_front() {
            Some(step) => {
                self.last = step.clone();
                step
            }
            None => self.last.clone(),
        };
        match step {
            ScriptStep::Detections(detections) => Ok(detections),
            ScriptStep::Fail(message) => Err(anyhow!(message)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::result::BoundingBox;

    fn frame() -> Frame {
        Frame::from_rgb(vec![0u8; 3], 1, 1, 1).unwrap()
    }

    #[test]
    fn replays_steps_then_repeats_the_last() {
        let person = Detection::new("person", 0.9, BoundingBox::new(0.0, 0.0, 10.0, 20.0));
        let mut backend = ScriptedBackend::new()
            .then_fail("boom")
            .then_detect(vec![person.clone()]);
        let counter = backend.call_counter();

        assert!(backend.detect(&frame()).is_err());
        assert_eq!(backend.detect(&frame()).unwrap(), vec![person.clone()]);
        assert_eq!(backend.detect(&frame()).unwrap(), vec![person]);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn failing_load_reports_an_error() {
        let mut backend = ScriptedBackend::new().failing_load();
        assert!(backend.load().is_err());
        assert!(backend.load().is_err());
    }
}
