use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Deterministic full-scale white noise in [-1, 1).
pub fn noise(len: usize, seed: u64) -> Vec<f32> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..len).map(|_| rng.random_range(-1.0..1.0)).collect()
}
