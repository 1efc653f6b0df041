//! Denoiser seam — framework-agnostic inference boundary.
//!
//! The engine consumes the neural denoiser as an opaque call over flat
//! `&[f32]` slices; no ML framework ships with this crate. Backends (ONNX
//! Runtime, Burn, candle, etc.) implement [`Denoiser`] and are created on
//! the engine thread via [`DenoiserFactory`], so a non-`Send` inference
//! session never has to cross a thread boundary.

use crate::config::ModelAssets;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DenoiseError {
    #[error("Backend initialization failed: {0}")]
    BackendInit(String),

    #[error("Forward pass failed: {0}")]
    Forward(String),
}

/// One reverse-diffusion denoising query.
pub trait Denoiser {
    /// Predict the noise component of `audio` at training-schedule `step`,
    /// steered by `conditioning`. Must return `audio.len()` samples.
    fn denoise(
        &mut self,
        audio: &[f32],
        step: i64,
        conditioning: &[f32],
    ) -> core::result::Result<Vec<f32>, DenoiseError>;
}

/// Factory invoked on the engine thread at each successful model load.
///
/// Receives the loaded model assets (weights path + typed config) and
/// returns the backend that will serve every denoise call for that model.
pub type DenoiserFactory = Box<
    dyn Fn(&ModelAssets) -> core::result::Result<Box<dyn Denoiser>, DenoiseError> + Send,
>;
