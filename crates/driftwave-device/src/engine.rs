//! Device engine — the generation loop on a dedicated thread.
//!
//! One long-lived thread runs the whole device: it drains commands at
//! iteration boundaries, samples one window per iteration, folds it into
//! the overlap-add stream, and emits the resulting frame. Synthesis
//! failures put the loop into a fixed backoff and it retries forever; only
//! `Shutdown` (or dropping every command sender) ends the thread.
//!
//! The denoiser backend is created *on this thread* by the configured
//! [`DenoiserFactory`], so non-`Send` inference sessions never cross a
//! thread boundary.

use crate::command::{DeviceCommand, DeviceEvent};
use crate::error::{Error, Result};
use crate::state::{LoadedModel, RuntimeState, SharedConditioning};

use arc_swap::ArcSwap;
use crossbeam_channel::{
    bounded, Receiver, RecvTimeoutError, Sender, TryRecvError, TrySendError,
};
use driftwave_core::{
    sample_window, BoxMullerSource, DenoiserFactory, ModelConfig, NoiseSource, OverlapAddBuffer,
    ScheduleMapping,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

const DEFAULT_COMMAND_CAPACITY: usize = 64;
const DEFAULT_EVENT_CAPACITY: usize = 256;
/// The original device's retry delay after a failed iteration.
const DEFAULT_BACKOFF: Duration = Duration::from_secs(1);
const IDLE_POLL: Duration = Duration::from_millis(20);
const BACKOFF_POLL: Duration = Duration::from_millis(10);

/// Handle to the engine thread.
pub struct DeviceEngine {
    command_tx: Sender<DeviceCommand>,
    event_rx: Receiver<DeviceEvent>,
    conditioning: SharedConditioning,
    running: Arc<AtomicBool>,
    thread: Option<std::thread::JoinHandle<()>>,
}

impl DeviceEngine {
    pub fn builder() -> DeviceEngineBuilder {
        DeviceEngineBuilder::default()
    }

    /// Ask the engine to load a model folder and (re)start generation.
    pub fn load(&self, model_dir: impl Into<PathBuf>) -> Result<()> {
        self.send(DeviceCommand::Load(model_dir.into()))
    }

    /// Replace the conditioning vector. Applies at the next iteration.
    pub fn predict(&self, values: Vec<f32>) -> Result<()> {
        self.send(DeviceCommand::Predict(values))
    }

    fn send(&self, command: DeviceCommand) -> Result<()> {
        self.command_tx.send(command).map_err(|_| Error::CommandSend)
    }

    /// Clone of the command sender for host-facing adapters.
    pub fn command_sender(&self) -> Sender<DeviceCommand> {
        self.command_tx.clone()
    }

    /// Outbound event stream: frames, dims, timing, errors.
    pub fn event_receiver(&self) -> Receiver<DeviceEvent> {
        self.event_rx.clone()
    }

    /// Snapshot of the current conditioning vector.
    pub fn conditioning(&self) -> Arc<Vec<f32>> {
        self.conditioning.load_full()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Stop the engine thread and wait for it to finish.
    pub fn shutdown(&mut self) {
        let _ = self.command_tx.send(DeviceCommand::Shutdown);
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for DeviceEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

pub struct DeviceEngineBuilder {
    factory: Option<DenoiserFactory>,
    command_capacity: usize,
    event_capacity: usize,
    backoff: Duration,
    noise_seed: Option<u64>,
}

impl Default for DeviceEngineBuilder {
    fn default() -> Self {
        Self {
            factory: None,
            command_capacity: DEFAULT_COMMAND_CAPACITY,
            event_capacity: DEFAULT_EVENT_CAPACITY,
            backoff: DEFAULT_BACKOFF,
            noise_seed: None,
        }
    }
}

impl DeviceEngineBuilder {
    /// The factory that builds a denoiser backend at each successful load.
    pub fn denoiser_factory(mut self, factory: DenoiserFactory) -> Self {
        self.factory = Some(factory);
        self
    }

    pub fn command_capacity(mut self, capacity: usize) -> Self {
        self.command_capacity = capacity.max(1);
        self
    }

    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }

    /// Cooldown before retrying after a failed iteration.
    pub fn backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// Seed the Gaussian noise source for reproducible output.
    pub fn noise_seed(mut self, seed: u64) -> Self {
        self.noise_seed = Some(seed);
        self
    }

    pub fn build(self) -> Result<DeviceEngine> {
        let factory = self.factory.ok_or(Error::MissingFactory)?;
        let (command_tx, command_rx) = bounded(self.command_capacity);
        let (event_tx, event_rx) = bounded(self.event_capacity);
        let conditioning: SharedConditioning = Arc::new(ArcSwap::from_pointee(Vec::new()));
        let running = Arc::new(AtomicBool::new(true));

        let running_clone = Arc::clone(&running);
        let conditioning_clone = Arc::clone(&conditioning);
        let backoff = self.backoff;
        let seed = self.noise_seed;

        let thread = std::thread::Builder::new()
            .name("driftwave-engine".into())
            .spawn(move || {
                let mut noise: Box<dyn NoiseSource> = match seed {
                    Some(seed) => Box::new(BoxMullerSource::from_seed(seed)),
                    None => Box::new(BoxMullerSource::from_entropy()),
                };
                engine_loop(
                    command_rx,
                    event_tx,
                    factory,
                    conditioning_clone,
                    backoff,
                    noise.as_mut(),
                    &running_clone,
                );
                running_clone.store(false, Ordering::Release);
            })
            .map_err(|e| Error::Spawn(e.to_string()))?;

        tracing::info!("Device engine started");

        Ok(DeviceEngine {
            command_tx,
            event_rx,
            conditioning,
            running,
            thread: Some(thread),
        })
    }
}

/// Loop phases. Success cycles through Running; any failure detours
/// through Backoff and returns to Running with a fresh iteration.
#[derive(Clone, Copy)]
enum LoopPhase {
    /// No model loaded; wait for commands.
    Idle,
    /// Generating one window per pass.
    Running,
    /// Post-failure cooldown.
    Backoff { until: Instant },
}

enum Flow {
    Continue,
    Shutdown,
}

fn engine_loop(
    command_rx: Receiver<DeviceCommand>,
    event_tx: Sender<DeviceEvent>,
    factory: DenoiserFactory,
    conditioning: SharedConditioning,
    backoff: Duration,
    noise: &mut dyn NoiseSource,
    running: &AtomicBool,
) {
    let mut state = RuntimeState::new(conditioning);
    let mut phase = LoopPhase::Idle;

    while running.load(Ordering::Acquire) {
        // Commands apply at iteration boundaries only.
        loop {
            match command_rx.try_recv() {
                Ok(cmd) => match handle_command(cmd, &mut state, &factory, &event_tx) {
                    Flow::Continue => {}
                    Flow::Shutdown => {
                        tracing::info!("Device engine shutting down");
                        return;
                    }
                },
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    tracing::info!("Command channel closed, stopping device engine");
                    return;
                }
            }
        }

        match phase {
            LoopPhase::Idle => {
                if state.model.is_some() {
                    phase = LoopPhase::Running;
                    continue;
                }
                match command_rx.recv_timeout(IDLE_POLL) {
                    Ok(cmd) => match handle_command(cmd, &mut state, &factory, &event_tx) {
                        Flow::Continue => {}
                        Flow::Shutdown => {
                            tracing::info!("Device engine shutting down");
                            return;
                        }
                    },
                    Err(RecvTimeoutError::Timeout) => {}
                    Err(RecvTimeoutError::Disconnected) => {
                        tracing::info!("Command channel closed, stopping device engine");
                        return;
                    }
                }
            }

            LoopPhase::Backoff { until } => {
                let now = Instant::now();
                if now < until {
                    // Short slices keep shutdown responsive during backoff.
                    std::thread::sleep(BACKOFF_POLL.min(until - now));
                } else {
                    phase = LoopPhase::Running;
                }
            }

            LoopPhase::Running => {
                let snapshot = state.conditioning_snapshot();
                let started = Instant::now();
                let Some(model) = state.model.as_mut() else {
                    phase = LoopPhase::Idle;
                    continue;
                };

                match run_iteration(model, &snapshot, noise) {
                    Ok(frame) => {
                        emit(&event_tx, DeviceEvent::Frame(frame));
                        emit(&event_tx, DeviceEvent::IterationTime(started.elapsed()));
                    }
                    Err(e) => {
                        tracing::error!("Synthesis iteration failed: {}", e);
                        emit(&event_tx, DeviceEvent::Error(e.to_string()));
                        phase = LoopPhase::Backoff {
                            until: Instant::now() + backoff,
                        };
                    }
                }
            }
        }
    }
}

/// One generation iteration: sample a window, fold it into the stream.
fn run_iteration(
    model: &mut LoadedModel,
    conditioning: &[f32],
    noise: &mut dyn NoiseSource,
) -> driftwave_core::Result<Vec<f32>> {
    let window = sample_window(
        model.denoiser.as_mut(),
        noise,
        model.config.win_length,
        &model.mapping,
        conditioning,
    )?;
    model.overlap.ingest_and_emit(&window)
}

fn handle_command(
    cmd: DeviceCommand,
    state: &mut RuntimeState,
    factory: &DenoiserFactory,
    event_tx: &Sender<DeviceEvent>,
) -> Flow {
    match cmd {
        DeviceCommand::Shutdown => Flow::Shutdown,

        DeviceCommand::Load(dir) => {
            match load_model(&dir, factory, state) {
                Ok((num_parameters, win_length)) => {
                    tracing::info!(
                        "Model loaded from {} ({} parameters, {}-sample windows)",
                        dir.display(),
                        num_parameters,
                        win_length
                    );
                    emit(
                        event_tx,
                        DeviceEvent::ModelDims {
                            num_parameters,
                            win_length,
                        },
                    );
                }
                Err(e) => {
                    // Previous model, if any, stays in place.
                    tracing::error!("Model load failed: {}", e);
                    emit(event_tx, DeviceEvent::Error(e.to_string()));
                }
            }
            Flow::Continue
        }

        DeviceCommand::Predict(values) => {
            match &state.model {
                Some(model) if values.len() != model.config.num_parameters => {
                    let e = driftwave_core::Error::ConditioningLength {
                        expected: model.config.num_parameters,
                        got: values.len(),
                    };
                    // Rejected wholesale; the previous vector stays active.
                    tracing::warn!("{}", e);
                    emit(event_tx, DeviceEvent::Error(e.to_string()));
                }
                _ => state.conditioning.store(Arc::new(values)),
            }
            Flow::Continue
        }
    }
}

/// Load a model folder and swap the runtime state atomically. Any error
/// leaves `state` untouched.
fn load_model(
    dir: &Path,
    factory: &DenoiserFactory,
    state: &mut RuntimeState,
) -> driftwave_core::Result<(usize, usize)> {
    let assets = ModelConfig::from_model_dir(dir)?;
    let mapping = ScheduleMapping::from_config(&assets.config)?;
    let denoiser = factory(&assets)?;
    let overlap = OverlapAddBuffer::new(assets.config.win_length)?;

    // Conditioning from a previous model may have the wrong length now.
    let num_parameters = assets.config.num_parameters;
    let win_length = assets.config.win_length;
    if state.conditioning.load().len() != num_parameters {
        state
            .conditioning
            .store(Arc::new(vec![0.0; num_parameters]));
    }

    state.model = Some(LoadedModel {
        config: assets.config,
        mapping,
        denoiser,
        overlap,
    });
    Ok((num_parameters, win_length))
}

/// Best-effort event emission; never stalls the generation loop.
fn emit(event_tx: &Sender<DeviceEvent>, event: DeviceEvent) {
    match event_tx.try_send(event) {
        Ok(()) => {}
        Err(TrySendError::Full(_)) => {
            tracing::trace!("Event channel full, dropping event");
        }
        Err(TrySendError::Disconnected(_)) => {
            tracing::warn!("Event channel disconnected");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use driftwave_core::{DenoiseError, Denoiser};
    use std::path::PathBuf;

    struct ZeroDenoiser;

    impl Denoiser for ZeroDenoiser {
        fn denoise(
            &mut self,
            audio: &[f32],
            _step: i64,
            _conditioning: &[f32],
        ) -> core::result::Result<Vec<f32>, DenoiseError> {
            Ok(vec![0.0; audio.len()])
        }
    }

    struct FailingDenoiser;

    impl Denoiser for FailingDenoiser {
        fn denoise(
            &mut self,
            _audio: &[f32],
            _step: i64,
            _conditioning: &[f32],
        ) -> core::result::Result<Vec<f32>, DenoiseError> {
            Err(DenoiseError::Forward("stub failure".into()))
        }
    }

    fn zero_factory() -> DenoiserFactory {
        Box::new(|_assets| Ok(Box::new(ZeroDenoiser) as Box<dyn Denoiser>))
    }

    fn failing_factory() -> DenoiserFactory {
        Box::new(|_assets| Ok(Box::new(FailingDenoiser) as Box<dyn Denoiser>))
    }

    fn write_model_dir(dir: &tempfile::TempDir) -> PathBuf {
        let text = "Number of parameters: 3\n\
                    win_length: 8\n\
                    noise_schedule: [0.1, 0.2, 0.3, 0.4]\n\
                    inference_noise_schedule: [0.1, 0.3]\n";
        std::fs::write(dir.path().join("model.txt"), text).unwrap();
        dir.path().to_path_buf()
    }

    fn recv_until(
        rx: &Receiver<DeviceEvent>,
        mut pred: impl FnMut(&DeviceEvent) -> bool,
    ) -> Option<DeviceEvent> {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            match rx.recv_timeout(Duration::from_millis(100)) {
                Ok(event) if pred(&event) => return Some(event),
                Ok(_) => {}
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => return None,
            }
        }
        None
    }

    #[test]
    fn test_engine_start_shutdown() {
        let mut engine = DeviceEngine::builder()
            .denoiser_factory(zero_factory())
            .build()
            .unwrap();
        assert!(engine.is_running());
        engine.shutdown();
        assert!(!engine.is_running());
    }

    #[test]
    fn test_builder_requires_factory() {
        assert!(matches!(
            DeviceEngine::builder().build(),
            Err(Error::MissingFactory)
        ));
    }

    #[test]
    fn test_load_emits_dims_then_frames() {
        let dir = tempfile::tempdir().unwrap();
        let model_dir = write_model_dir(&dir);

        let engine = DeviceEngine::builder()
            .denoiser_factory(zero_factory())
            .noise_seed(7)
            .build()
            .unwrap();
        let events = engine.event_receiver();
        engine.load(&model_dir).unwrap();

        let dims = recv_until(&events, |e| matches!(e, DeviceEvent::ModelDims { .. }));
        assert_eq!(
            dims,
            Some(DeviceEvent::ModelDims {
                num_parameters: 3,
                win_length: 8
            })
        );

        for _ in 0..3 {
            let frame = recv_until(&events, |e| matches!(e, DeviceEvent::Frame(_)));
            let Some(DeviceEvent::Frame(samples)) = frame else {
                panic!("expected a frame event");
            };
            assert_eq!(samples.len(), 8);
            assert!(samples.iter().all(|v| (-1.0..=1.0).contains(v)));
        }

        let timing = recv_until(&events, |e| matches!(e, DeviceEvent::IterationTime(_)));
        assert!(timing.is_some());
    }

    #[test]
    fn test_load_failure_keeps_engine_alive() {
        let engine = DeviceEngine::builder()
            .denoiser_factory(zero_factory())
            .build()
            .unwrap();
        let events = engine.event_receiver();

        engine.load("/nonexistent/model/folder").unwrap();
        let error = recv_until(&events, |e| matches!(e, DeviceEvent::Error(_)));
        assert!(error.is_some());
        assert!(engine.is_running());
    }

    #[test]
    fn test_wrong_length_predict_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let model_dir = write_model_dir(&dir);

        let engine = DeviceEngine::builder()
            .denoiser_factory(zero_factory())
            .build()
            .unwrap();
        let events = engine.event_receiver();
        engine.load(&model_dir).unwrap();
        recv_until(&events, |e| matches!(e, DeviceEvent::ModelDims { .. })).unwrap();

        engine.predict(vec![1.0; 99]).unwrap();
        let error = recv_until(&events, |e| {
            matches!(e, DeviceEvent::Error(msg) if msg.contains("Conditioning length"))
        });
        assert!(error.is_some());

        // The loop survives and the stale vector stays in place.
        assert!(engine.is_running());
        assert_eq!(engine.conditioning().len(), 3);
        let frame = recv_until(&events, |e| matches!(e, DeviceEvent::Frame(_)));
        assert!(frame.is_some());
    }

    #[test]
    fn test_correct_length_predict_applies() {
        let dir = tempfile::tempdir().unwrap();
        let model_dir = write_model_dir(&dir);

        let engine = DeviceEngine::builder()
            .denoiser_factory(zero_factory())
            .build()
            .unwrap();
        let events = engine.event_receiver();
        engine.load(&model_dir).unwrap();
        recv_until(&events, |e| matches!(e, DeviceEvent::ModelDims { .. })).unwrap();

        engine.predict(vec![0.5, -0.5, 1.0]).unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            if *engine.conditioning() == vec![0.5, -0.5, 1.0] {
                break;
            }
            assert!(Instant::now() < deadline, "predict never applied");
            std::thread::sleep(Duration::from_millis(10));
        }
    }

    #[test]
    fn test_failing_denoiser_retries_forever() {
        let dir = tempfile::tempdir().unwrap();
        let model_dir = write_model_dir(&dir);

        let engine = DeviceEngine::builder()
            .denoiser_factory(failing_factory())
            .backoff(Duration::from_millis(1))
            .build()
            .unwrap();
        let events = engine.event_receiver();
        engine.load(&model_dir).unwrap();

        // Two error events prove the loop came back after backoff.
        for _ in 0..2 {
            let error = recv_until(&events, |e| {
                matches!(e, DeviceEvent::Error(msg) if msg.contains("stub failure"))
            });
            assert!(error.is_some());
        }
        assert!(engine.is_running());
    }

    #[test]
    fn test_reload_replaces_model() {
        let dir_a = tempfile::tempdir().unwrap();
        let model_a = write_model_dir(&dir_a);

        let dir_b = tempfile::tempdir().unwrap();
        let text = "Number of parameters: 5\n\
                    win_length: 16\n\
                    noise_schedule: [0.1, 0.2, 0.3, 0.4]\n";
        std::fs::write(dir_b.path().join("model.txt"), text).unwrap();

        let engine = DeviceEngine::builder()
            .denoiser_factory(zero_factory())
            .build()
            .unwrap();
        let events = engine.event_receiver();

        engine.load(&model_a).unwrap();
        recv_until(&events, |e| matches!(e, DeviceEvent::ModelDims { .. })).unwrap();

        engine.load(dir_b.path()).unwrap();
        let dims = recv_until(&events, |e| {
            matches!(
                e,
                DeviceEvent::ModelDims {
                    num_parameters: 5,
                    ..
                }
            )
        });
        assert!(dims.is_some());

        // Frames from the new model have the new window length.
        let frame = recv_until(&events, |e| {
            matches!(e, DeviceEvent::Frame(samples) if samples.len() == 16)
        });
        assert!(frame.is_some());
    }
}
