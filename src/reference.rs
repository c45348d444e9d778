use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::estimate::parse_reference_size;

/// Shared reference size (inches).
///
/// Single writer (the UI), many readers (the detection loop reads it once per
/// cycle). The `f64` is stored as raw bits so reads and writes are single
/// atomic operations. Invalid input is stored as NaN, which the estimator
/// treats as "unknown".
#[derive(Clone, Debug)]
pub struct ReferenceSize {
    bits: Arc<AtomicU64>,
}

impl ReferenceSize {
    pub fn new(inches: f64) -> Self {
        Self {
            bits: Arc::new(AtomicU64::new(inches.to_bits())),
        }
    }

    pub fn get(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Acquire))
    }

    pub fn set(&self, inches: f64) {
        self.bits.store(inches.to_bits(), Ordering::Release);
    }

    /// Store raw user input. Returns the parsed value when it is valid.
    pub fn set_from_input(&self, input: &str) -> Option<f64> {
        let parsed = parse_reference_size(input);
        self.set(parsed.unwrap_or(f64::NAN));
        parsed
    }

    pub fn is_valid(&self) -> bool {
        let value = self.get();
        value.is_finite() && value > 0.0
    }
}
