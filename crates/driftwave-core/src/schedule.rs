//! Virtual-timestep mapping between training and inference noise schedules.
//!
//! A model is trained with a long, fine-grained noise schedule but sampled
//! with a short one for speed. Each inference step is located on the
//! training schedule's index space by bracketing its cumulative
//! signal-retention product between two adjacent training steps and
//! interpolating. The denoiser is then queried at that (floored) training
//! step, which is what makes few-step sampling land on noise levels the
//! model actually saw during training.

use crate::config::ModelConfig;
use crate::{Error, Result};

/// One inference step mapped onto the training schedule's index space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MappedStep {
    /// Index into the inference schedule this entry came from. Retained so
    /// β lookups stay aligned when unbracketable steps are skipped.
    pub inference_index: usize,
    /// Fractional position in the training schedule.
    pub virtual_t: f64,
}

impl MappedStep {
    /// Integer step actually handed to the denoiser. The fractional part is
    /// deliberately not used for step conditioning.
    #[inline]
    pub fn floor_step(&self) -> i64 {
        self.virtual_t.floor() as i64
    }
}

/// Derived schedule state, computed once per model load.
#[derive(Debug, Clone)]
pub struct ScheduleMapping {
    steps: Vec<MappedStep>,
    beta: Vec<f64>,
    alpha: Vec<f64>,
    alpha_cum: Vec<f64>,
}

impl ScheduleMapping {
    pub fn new(training: &[f64], inference: &[f64]) -> Result<Self> {
        if training.is_empty() || inference.is_empty() {
            return Err(Error::InvalidConfig("empty noise schedule".into()));
        }
        if inference.len() > training.len() {
            return Err(Error::InvalidConfig(format!(
                "inference schedule ({} steps) is longer than training schedule ({} steps)",
                inference.len(),
                training.len()
            )));
        }

        let talpha_cum = cumprod(training.iter().map(|b| 1.0 - b));
        let beta = inference.to_vec();
        let alpha: Vec<f64> = beta.iter().map(|b| 1.0 - b).collect();
        let alpha_cum = cumprod(alpha.iter().copied());

        let mut steps = Vec::with_capacity(inference.len());
        for (s, &ac) in alpha_cum.iter().enumerate() {
            match bracket(&talpha_cum, ac) {
                Some(virtual_t) => steps.push(MappedStep {
                    inference_index: s,
                    virtual_t,
                }),
                None => tracing::warn!(
                    "Inference step {} (alpha_cum {:.6}) falls outside the training \
                     schedule's range; skipping",
                    s,
                    ac
                ),
            }
        }

        if steps.is_empty() {
            return Err(Error::InvalidConfig(
                "no inference step maps onto the training schedule".into(),
            ));
        }

        Ok(Self {
            steps,
            beta,
            alpha,
            alpha_cum,
        })
    }

    pub fn from_config(config: &ModelConfig) -> Result<Self> {
        Self::new(&config.noise_schedule, config.inference_schedule())
    }

    /// Mapped steps in inference order (ascending noise level).
    pub fn steps(&self) -> &[MappedStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// β at inference step `s`.
    #[inline]
    pub fn beta(&self, s: usize) -> f64 {
        self.beta[s]
    }

    /// 1 − β at inference step `s`.
    #[inline]
    pub fn alpha(&self, s: usize) -> f64 {
        self.alpha[s]
    }

    /// Cumulative product of α up to and including step `s`.
    #[inline]
    pub fn alpha_cum(&self, s: usize) -> f64 {
        self.alpha_cum[s]
    }
}

/// First `t` with `talpha_cum[t + 1] <= ac <= talpha_cum[t]`, interpolated
/// between the bracketing steps on sqrt scale.
fn bracket(talpha_cum: &[f64], ac: f64) -> Option<f64> {
    for t in 0..talpha_cum.len().saturating_sub(1) {
        if talpha_cum[t + 1] <= ac && ac <= talpha_cum[t] {
            let hi = talpha_cum[t].sqrt();
            let lo = talpha_cum[t + 1].sqrt();
            let twiddle = (hi - ac.sqrt()) / (hi - lo);
            return Some(t as f64 + twiddle);
        }
    }
    None
}

fn cumprod(values: impl Iterator<Item = f64>) -> Vec<f64> {
    let mut acc = 1.0;
    values
        .map(|v| {
            acc *= v;
            acc
        })
        .collect()
}
