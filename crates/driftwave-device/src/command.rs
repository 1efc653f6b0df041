//! Command and event surface of the device runtime.

use std::path::PathBuf;
use std::time::Duration;

/// Inbound commands. Drained between generation iterations, so a command
/// never interrupts a reverse pass mid-step.
#[derive(Debug)]
pub enum DeviceCommand {
    /// Load a model folder (weights handle + `model.txt` metadata) and
    /// (re)start generation. A failed load leaves previous state untouched.
    Load(PathBuf),
    /// Replace the conditioning vector wholesale. Takes effect at the next
    /// iteration.
    Predict(Vec<f32>),
    /// Stop the engine thread.
    Shutdown,
}

/// Outbound signals from the engine thread.
///
/// Emission is best-effort: a full event channel drops the event rather
/// than stalling the generation loop.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceEvent {
    /// Announced after each successful load.
    ModelDims {
        num_parameters: usize,
        win_length: usize,
    },
    /// One output frame per successful iteration.
    Frame(Vec<f32>),
    /// Wall time of the iteration that produced the preceding frame.
    IterationTime(Duration),
    /// Load, predict, or synthesis failure notification.
    Error(String),
}
