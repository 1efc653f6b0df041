//! Gaussian noise generation for the diffusion process.

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

/// Source of independent standard-normal samples.
///
/// A trait so tests can substitute a scripted sequence for the real
/// generator and make a full reverse pass deterministic.
pub trait NoiseSource {
    fn fill_standard_normal(&mut self, out: &mut [f32]);
}

/// Box-Muller transform over a uniform RNG.
pub struct BoxMullerSource<R: Rng> {
    rng: R,
}

impl BoxMullerSource<SmallRng> {
    pub fn from_entropy() -> Self {
        Self::new(SmallRng::from_entropy())
    }

    /// Seeded source for reproducible output windows.
    pub fn from_seed(seed: u64) -> Self {
        Self::new(SmallRng::seed_from_u64(seed))
    }
}

impl<R: Rng> BoxMullerSource<R> {
    pub fn new(rng: R) -> Self {
        Self { rng }
    }
}

impl<R: Rng> NoiseSource for BoxMullerSource<R> {
    fn fill_standard_normal(&mut self, out: &mut [f32]) {
        let mut i = 0;
        while i < out.len() {
            // gen::<f64>() is [0, 1); flip to (0, 1] so ln() stays finite.
            let u1 = 1.0 - self.rng.gen::<f64>();
            let u2 = self.rng.gen::<f64>();
            let r = (-2.0 * u1.ln()).sqrt();
            let theta = 2.0 * std::f64::consts::PI * u2;
            out[i] = (r * theta.cos()) as f32;
            if i + 1 < out.len() {
                out[i + 1] = (r * theta.sin()) as f32;
            }
            i += 2;
        }
    }
}
