//! One-pole smoothing of the raw energy value.

use crate::error::ConfigError;

pub const DEFAULT_RETAIN: f32 = 0.92;
pub const DEFAULT_INPUT_WEIGHT: f32 = 0.08;

/// `prev * retain + input * input_weight`
pub fn step(prev: f32, input: f32, retain: f32, input_weight: f32) -> f32 {
    prev * retain + input * input_weight
}

/// Exponential smoother whose weights always sum to 1.
#[derive(Debug, Clone)]
pub struct Smoother {
    value: f32,
    retain: f32,
    input_weight: f32,
}

impl Smoother {
    pub fn new() -> Self {
        Self {
            value: 0.0,
            retain: DEFAULT_RETAIN,
            input_weight: DEFAULT_INPUT_WEIGHT,
        }
    }

    /// Smoother retaining `retain` of its value each step (0 = instant, 1 = frozen).
    pub fn with_retain(retain: f32) -> Result<Self, ConfigError> {
        if !(0.0..=1.0).contains(&retain) {
            return Err(ConfigError::InvalidRetain(retain));
        }
        Ok(Self {
            value: 0.0,
            retain,
            input_weight: 1.0 - retain,
        })
    }

    /// Blend `input` (clamped to [0, 1]) into the running value.
    pub fn push(&mut self, input: f32) -> f32 {
        let input = if input.is_nan() {
            0.0
        } else {
            input.clamp(0.0, 1.0)
        };
        self.value = step(self.value, input, self.retain, self.input_weight).clamp(0.0, 1.0);
        self.value
    }

    pub fn value(&self) -> f32 {
        self.value
    }

    pub fn retain(&self) -> f32 {
        self.retain
    }

    pub fn reset(&mut self) {
        self.value = 0.0;
    }
}

impl Default for Smoother {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_single_step_from_zero() {
        assert_relative_eq!(step(0.0, 1.0, 0.92, 0.08), 0.08);
        let mut smoother = Smoother::new();
        assert_relative_eq!(smoother.push(1.0), 0.08);
    }

    #[test]
    fn test_rises_monotonically_and_stays_below_one() {
        let mut smoother = Smoother::new();
        let mut prev = smoother.value();
        for _ in 0..10 {
            let next = smoother.push(1.0);
            assert!(next > prev);
            assert!(next < 1.0);
            prev = next;
        }
        // 1 - 0.92^10
        assert_relative_eq!(prev, 1.0 - 0.92f32.powi(10), epsilon = 1e-5);
    }

    #[test]
    fn test_step_is_deterministic() {
        let a = step(0.37, 0.81, 0.92, 0.08);
        let b = step(0.37, 0.81, 0.92, 0.08);
        assert_eq!(a.to_bits(), b.to_bits());
    }

    #[test]
    fn test_converges_to_constant_input() {
        for target in [0.0f32, 0.25, 0.5, 0.9, 1.0] {
            let mut value = 0.0;
            for _ in 0..500 {
                value = step(value, target, DEFAULT_RETAIN, DEFAULT_INPUT_WEIGHT);
            }
            assert_relative_eq!(value, target, epsilon = 1e-4);
        }
    }

    #[test]
    fn test_out_of_range_input_is_clamped() {
        let mut smoother = Smoother::with_retain(0.0).unwrap();
        assert_eq!(smoother.push(4.0), 1.0);
        assert_eq!(smoother.push(-3.0), 0.0);
        assert_eq!(smoother.push(f32::NAN), 0.0);
    }

    #[test]
    fn test_reset_and_invalid_retain() {
        let mut smoother = Smoother::new();
        smoother.push(1.0);
        smoother.reset();
        assert_eq!(smoother.value(), 0.0);
        assert!(Smoother::with_retain(1.2).is_err());
        assert_relative_eq!(Smoother::with_retain(0.9).unwrap().retain(), 0.9);
    }
}
