//! # Driftwave — live diffusion audio synthesis engine
//!
//! A device-style runtime that continuously samples audio windows from a
//! DiffWave-style reverse diffusion process, steered by an externally
//! updated conditioning vector, and splices them into a click-free stream
//! with a zero-crossing-aligned overlap-add buffer.
//!
//! ## Architecture
//!
//! Driftwave is an umbrella crate coordinating:
//! - **driftwave-core** — noise schedules and virtual-timestep mapping,
//!   Box-Muller noise source, reverse-diffusion sampler, overlap-add
//!   streaming, and the framework-agnostic [`Denoiser`] inference seam
//! - **driftwave-device** — the engine thread with its `load`/`predict`
//!   command surface and frame/error event stream
//!
//! No ML framework ships here: implement [`Denoiser`] over whatever
//! runtime hosts the model weights (ONNX Runtime, Burn, candle, ...) and
//! hand the engine a [`DenoiserFactory`].
//!
//! ## Quick Start
//!
//! ```ignore
//! use driftwave::prelude::*;
//!
//! let engine = DeviceEngine::builder()
//!     .denoiser_factory(my_backend_factory())
//!     .build()?;
//!
//! engine.load("models/breeze")?;
//! engine.predict(vec![0.2, 0.8, 0.1, 0.0, 0.5])?;
//!
//! for event in engine.event_receiver() {
//!     if let DeviceEvent::Frame(samples) = event {
//!         // hand samples to the audio output
//!     }
//! }
//! ```

/// Re-export of driftwave-core for direct access
pub use driftwave_core as core;

/// Re-export of driftwave-device for direct access
pub use driftwave_device as device;

// Core types
pub use driftwave_core::{
    sample_window, BoxMullerSource, DenoiseError, Denoiser, DenoiserFactory, Error, MappedStep,
    ModelAssets, ModelConfig, NoiseSource, OverlapAddBuffer, Result, ScheduleMapping,
};

// Device runtime
pub use driftwave_device::{DeviceCommand, DeviceEngine, DeviceEngineBuilder, DeviceEvent};

/// Common imports for working with the engine.
pub mod prelude {
    pub use crate::{
        BoxMullerSource, DenoiseError, Denoiser, DenoiserFactory, DeviceCommand, DeviceEngine,
        DeviceEvent, ModelAssets, ModelConfig, NoiseSource, OverlapAddBuffer, ScheduleMapping,
    };
}
