//! Reverse-diffusion sampling loop.
//!
//! One call produces one finished audio window: start from pure Gaussian
//! noise and walk the mapped inference steps in strict reverse order,
//! removing predicted noise and re-noising at every step but the last.
//! Samples are clipped to [-1, 1] after every step, so whatever leaves this
//! loop is always valid audio.

use crate::denoise::Denoiser;
use crate::noise::NoiseSource;
use crate::schedule::ScheduleMapping;
use crate::{Error, Result};

/// Run one full reverse pass and return a finished audio window.
///
/// Strictly sequential: each step consumes the previous step's output. A
/// failed denoiser call or a non-finite sample aborts the window; the
/// caller's retry policy decides what happens next.
pub fn sample_window(
    denoiser: &mut dyn Denoiser,
    noise: &mut dyn NoiseSource,
    win_length: usize,
    mapping: &ScheduleMapping,
    conditioning: &[f32],
) -> Result<Vec<f32>> {
    let mut x = vec![0.0f32; win_length];
    noise.fill_standard_normal(&mut x);
    let mut z = vec![0.0f32; win_length];

    let steps = mapping.steps();
    for p in (0..steps.len()).rev() {
        let step = steps[p];
        let s = step.inference_index;
        let c1 = 1.0 / mapping.alpha(s).sqrt();
        let c2 = mapping.beta(s) / (1.0 - mapping.alpha_cum(s)).sqrt();

        let eps = denoiser.denoise(&x, step.floor_step(), conditioning)?;
        if eps.len() != x.len() {
            return Err(Error::DenoiserOutputLength {
                expected: x.len(),
                got: eps.len(),
            });
        }

        for (xi, &ei) in x.iter_mut().zip(&eps) {
            *xi = ((*xi as f64 - c2 * ei as f64) * c1) as f32;
        }

        if p > 0 {
            // Re-noise toward the previous (less noisy) mapped step.
            let prev = steps[p - 1].inference_index;
            let sigma = ((1.0 - mapping.alpha_cum(prev)) / (1.0 - mapping.alpha_cum(s))
                * mapping.beta(s))
            .sqrt();
            noise.fill_standard_normal(&mut z);
            for (xi, &zi) in x.iter_mut().zip(&z) {
                *xi += (sigma * zi as f64) as f32;
            }
        }

        for xi in x.iter_mut() {
            *xi = xi.clamp(-1.0, 1.0);
        }

        if !x.iter().all(|v| v.is_finite()) {
            return Err(Error::NonFinite("reverse diffusion step"));
        }
    }

    Ok(x)
}
