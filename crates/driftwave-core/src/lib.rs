//! Driftwave core — the numerical engine behind the live diffusion device.
//!
//! Everything needed to turn a trained DiffWave-style model into a stream
//! of audio windows, minus the device runtime and minus any ML framework:
//!
//! - **config** — model metadata (`model.txt`) and validation
//! - **noise** — Box-Muller standard-normal source behind a swappable trait
//! - **schedule** — virtual-timestep mapping for few-step sampling
//! - **denoise** — the framework-agnostic [`Denoiser`] inference seam
//! - **sampler** — the reverse-diffusion loop producing one window per call
//! - **overlap** — zero-crossing-aligned overlap-add streaming
//!
//! The denoiser itself is bring-your-own: implement [`Denoiser`] over
//! whatever inference runtime hosts the weights and hand the engine a
//! [`DenoiserFactory`].

mod error;
pub use error::{Error, Result};

mod config;
pub use config::{ModelAssets, ModelConfig};

mod noise;
pub use noise::{BoxMullerSource, NoiseSource};

mod schedule;
pub use schedule::{MappedStep, ScheduleMapping};

mod denoise;
pub use denoise::{DenoiseError, Denoiser, DenoiserFactory};

mod sampler;
pub use sampler::sample_window;

mod overlap;
pub use overlap::OverlapAddBuffer;
