//! Runtime state owned by the engine thread.
//!
//! What the original device kept as module-level globals lives here as one
//! explicit object: the currently loaded model (with its cached schedule
//! mapping, denoiser backend, and overlap-add buffer) and the shared
//! conditioning vector.

use arc_swap::ArcSwap;
use driftwave_core::{Denoiser, ModelConfig, OverlapAddBuffer, ScheduleMapping};
use std::sync::Arc;

/// Conditioning vector shared between the handle and the engine thread.
///
/// `Predict` stores a freshly allocated vector; readers take `load_full()`
/// snapshots. A snapshot is always a complete vector, never a partial
/// write.
pub(crate) type SharedConditioning = Arc<ArcSwap<Vec<f32>>>;

/// Everything a successful load swaps in at an iteration boundary.
pub(crate) struct LoadedModel {
    pub config: ModelConfig,
    pub mapping: ScheduleMapping,
    pub denoiser: Box<dyn Denoiser>,
    pub overlap: OverlapAddBuffer,
}

pub(crate) struct RuntimeState {
    pub model: Option<LoadedModel>,
    pub conditioning: SharedConditioning,
}

impl RuntimeState {
    pub fn new(conditioning: SharedConditioning) -> Self {
        Self {
            model: None,
            conditioning,
        }
    }

    /// Snapshot for the current iteration.
    pub fn conditioning_snapshot(&self) -> Arc<Vec<f32>> {
        self.conditioning.load_full()
    }
}
