//! The published reactive parameter.
//!
//! One scalar in [0, 1], last write wins. The loop holds the only writer;
//! presentation code holds any number of readers.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Create a connected writer/reader pair, starting at 0.
pub fn react_param() -> (ParamWriter, ParamReader) {
    let cell = Arc::new(AtomicU32::new(0.0f32.to_bits()));
    (
        ParamWriter { cell: cell.clone() },
        ParamReader { cell },
    )
}

/// Sole writer of the parameter. Not `Clone`.
#[derive(Debug)]
pub struct ParamWriter {
    cell: Arc<AtomicU32>,
}

impl ParamWriter {
    /// Store `value`, clamped to [0, 1].
    pub fn publish(&self, value: f32) {
        let value = if value.is_nan() {
            0.0
        } else {
            value.clamp(0.0, 1.0)
        };
        self.cell.store(value.to_bits(), Ordering::Release);
    }

    pub fn reset(&self) {
        self.publish(0.0);
    }

    pub fn reader(&self) -> ParamReader {
        ParamReader {
            cell: self.cell.clone(),
        }
    }
}

/// Read-only view of the parameter.
#[derive(Debug, Clone)]
pub struct ParamReader {
    cell: Arc<AtomicU32>,
}

impl ParamReader {
    pub fn get(&self) -> f32 {
        f32::from_bits(self.cell.load(Ordering::Acquire))
    }
}
