//! Error types for driftwave-core.

use crate::denoise::DenoiseError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Error type for core synthesis operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Failed to load model: {0}")]
    ModelLoad(String),

    #[error("Conditioning length mismatch: expected {expected}, got {got}")]
    ConditioningLength { expected: usize, got: usize },

    #[error("Window length mismatch: expected {expected}, got {got}")]
    WindowLength { expected: usize, got: usize },

    #[error("Denoiser returned {got} samples, expected {expected}")]
    DenoiserOutputLength { expected: usize, got: usize },

    #[error("Denoiser error: {0}")]
    Denoise(#[from] DenoiseError),

    #[error("Non-finite sample produced during {0}")]
    NonFinite(&'static str),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
