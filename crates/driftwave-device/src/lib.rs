//! Driftwave device runtime — the long-running synthesis loop behind a
//! command/event surface.
//!
//! The device is driven by two commands: `load` a model folder and
//! `predict` a new conditioning vector. After a successful load the engine
//! thread generates continuously — one reverse-diffusion window per
//! iteration, folded into the overlap-add stream — and every iteration
//! emits one output frame. Failures never kill the loop: they are
//! reported, the loop backs off, and it retries with a fresh iteration.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use driftwave_device::{DeviceEngine, DeviceEvent};
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

mod error;
pub use error::{Error, Result};

mod command;
pub use command::{DeviceCommand, DeviceEvent};

mod engine;
pub use engine::{DeviceEngine, DeviceEngineBuilder};

// Internal
mod state;
