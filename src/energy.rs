//! Band energy: one frequency frame in, one bounded scalar out.

use crate::error::ConfigError;

/// Band selection plus affine normalisation, validated on construction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnergyBand {
    start: f32,
    end: f32,
    floor: f32,
    span: f32,
}

impl EnergyBand {
    /// Low-mid band with a low floor: subtle, musical movement.
    pub const LOW_MID: EnergyBand = EnergyBand {
        start: 0.03,
        end: 0.18,
        floor: 18.0,
        span: 110.0,
    };

    /// Slightly wider band with a softer response curve.
    pub const WIDE: EnergyBand = EnergyBand {
        start: 0.04,
        end: 0.20,
        floor: 10.0,
        span: 140.0,
    };

    /// Custom band `[start, end)` over the bin range, normalised as
    /// `(avg - floor) / span`.
    pub fn new(start: f32, end: f32, floor: f32, span: f32) -> Result<Self, ConfigError> {
        if !(0.0..=1.0).contains(&start) || !(0.0..=1.0).contains(&end) || start >= end {
            return Err(ConfigError::InvalidBand { start, end });
        }
        if !span.is_finite() || span <= 0.0 || !floor.is_finite() {
            return Err(ConfigError::InvalidSpan(span));
        }
        Ok(Self {
            start,
            end,
            floor,
            span,
        })
    }

    pub fn start(&self) -> f32 {
        self.start
    }

    pub fn end(&self) -> f32 {
        self.end
    }

    pub fn floor(&self) -> f32 {
        self.floor
    }

    pub fn span(&self) -> f32 {
        self.span
    }

    pub fn extract(&self, frame: &[u8]) -> f32 {
        extract(frame, self.start, self.end, self.floor, self.span)
    }
}

impl Default for EnergyBand {
    fn default() -> Self {
        Self::LOW_MID
    }
}

/// Bin indices `[floor(len * start), floor(len * end))`, end clamped to `len`.
pub fn band_range(len: usize, start: f32, end: f32) -> std::ops::Range<usize> {
    let lo = (len as f32 * start).floor().max(0.0) as usize;
    let hi = ((len as f32 * end).floor().max(0.0) as usize).min(len);
    lo.min(hi)..hi
}

/// Average the band, normalise, clamp to [0, 1].
pub fn extract(frame: &[u8], start: f32, end: f32, floor: f32, span: f32) -> f32 {
    let range = band_range(frame.len(), start, end);
    let count = range.len().max(1);
    let sum: u32 = frame[range].iter().map(|&b| u32::from(b)).sum();
    let avg = sum as f32 / count as f32;

    let normalized = (avg - floor) / span;
    if normalized.is_nan() {
        return 0.0;
    }
    normalized.clamp(0.0, 1.0)
}
