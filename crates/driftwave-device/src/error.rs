//! Error types for the device runtime.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Synthesis error: {0}")]
    Core(#[from] driftwave_core::Error),

    #[error("Failed to spawn engine thread: {0}")]
    Spawn(String),

    #[error("Engine command send failed (engine stopped)")]
    CommandSend,

    #[error("No denoiser factory configured")]
    MissingFactory,
}
