//! Mix pipeline orchestration
//!
//! Runs one mix at a time through a fixed sequence:
//! 1. Compute crossfade gains
//! 2. Render the gain-scaled sum offline
//! 3. Quantize to a 16-bit PCM WAV container
//! 4. Encode the container to MP3 frame by frame
//!
//! A stage failure ends the run in `Failed` with the stage's error and no
//! partial output. The pipeline is reusable after `Done` or `Failed`.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::buffer::AudioBuffer;
use crate::config::MixConfig;
use crate::encoder::{Mp3Settings, Mp3Stream, transcode_wav_with};
use crate::error::{MixError, MixResult};
use crate::gain::gains;
use crate::render::{OfflineRenderer, RenderEngine, RenderRequest, RenderSpec};
use crate::wav::{PcmQuantizer, WavContainer};

// ═══════════════════════════════════════════════════════════════════════════════
// PIPELINE STATE
// ═══════════════════════════════════════════════════════════════════════════════

/// Pipeline execution state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PipelineState {
    Idle,
    Rendering,
    Quantizing,
    Mp3Encoding,
    Done,
    Failed,
}

impl Default for PipelineState {
    fn default() -> Self {
        Self::Idle
    }
}

impl PipelineState {
    /// A run is in flight
    pub fn is_active(self) -> bool {
        matches!(self, Self::Rendering | Self::Quantizing | Self::Mp3Encoding)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// PIPELINE PROGRESS
// ═══════════════════════════════════════════════════════════════════════════════

/// Snapshot of a run's progress
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipelineProgress {
    pub state: PipelineState,
    /// Frames handed to the MP3 encoder so far
    pub frames_encoded: u64,
    /// Frames in the render window
    pub total_frames: u64,
    pub elapsed_ms: u64,
}

impl PipelineProgress {
    /// Encoding progress, 0.0 - 1.0
    pub fn fraction(&self) -> f64 {
        match self.state {
            PipelineState::Done => 1.0,
            _ if self.total_frames == 0 => 0.0,
            _ => self.frames_encoded as f64 / self.total_frames as f64,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// MIX OUTPUT
// ═══════════════════════════════════════════════════════════════════════════════

/// Everything one successful run produces
#[derive(Debug, Clone)]
pub struct MixOutput {
    pub wav: WavContainer,
    pub mp3: Mp3Stream,
    pub spec: RenderSpec,
    pub first_gain: f64,
    pub second_gain: f64,
    /// Peak of the rendered mix before quantization
    pub peak_db: f32,
    pub elapsed: Duration,
}

// ═══════════════════════════════════════════════════════════════════════════════
// MIX PIPELINE
// ═══════════════════════════════════════════════════════════════════════════════

/// Two-source crossfade mixdown pipeline
pub struct MixPipeline<R: RenderEngine = OfflineRenderer> {
    config: MixConfig,
    renderer: R,

    state: Mutex<PipelineState>,
    cancelled: AtomicBool,
    frames_encoded: AtomicU64,
    total_frames: AtomicU64,
    start_time: Mutex<Option<Instant>>,
}

impl MixPipeline<OfflineRenderer> {
    /// Create pipeline with the built-in renderer
    pub fn new(config: MixConfig) -> Self {
        let renderer = OfflineRenderer::from_config(&config);
        Self::with_renderer(config, renderer)
    }
}

impl Default for MixPipeline<OfflineRenderer> {
    fn default() -> Self {
        Self::new(MixConfig::default())
    }
}

impl<R: RenderEngine> MixPipeline<R> {
    /// Create pipeline with a caller-supplied render engine
    pub fn with_renderer(config: MixConfig, renderer: R) -> Self {
        Self {
            config,
            renderer,
            state: Mutex::new(PipelineState::Idle),
            cancelled: AtomicBool::new(false),
            frames_encoded: AtomicU64::new(0),
            total_frames: AtomicU64::new(0),
            start_time: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &MixConfig {
        &self.config
    }

    /// Get current state
    pub fn state(&self) -> PipelineState {
        *self.state.lock()
    }

    /// Request cancellation; honored before the next MP3 frame
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Check if cancelled
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Get progress
    pub fn progress(&self) -> PipelineProgress {
        let elapsed_ms = self
            .start_time
            .lock()
            .map(|t| t.elapsed().as_millis() as u64)
            .unwrap_or(0);

        PipelineProgress {
            state: self.state(),
            frames_encoded: self.frames_encoded.load(Ordering::Relaxed),
            total_frames: self.total_frames.load(Ordering::Relaxed),
            elapsed_ms,
        }
    }

    fn set_state(&self, state: PipelineState) {
        log::debug!("Mix pipeline -> {:?}", state);
        *self.state.lock() = state;
    }

    /// Claim the pipeline for a new run
    fn begin(&self) -> MixResult<()> {
        let mut state = self.state.lock();
        if state.is_active() {
            return Err(MixError::Busy(format!("{:?}", *state)));
        }

        self.cancelled.store(false, Ordering::SeqCst);
        self.frames_encoded.store(0, Ordering::Relaxed);
        self.total_frames.store(0, Ordering::Relaxed);
        *self.start_time.lock() = Some(Instant::now());
        *state = PipelineState::Rendering;
        Ok(())
    }

    /// Mix two sources at `crossfade` and encode the result
    ///
    /// Fails with [`MixError::Busy`] if another run is in flight; that run is
    /// not affected.
    pub fn start(
        &self,
        first: &AudioBuffer,
        second: &AudioBuffer,
        crossfade: f64,
    ) -> MixResult<MixOutput> {
        self.begin()?;
        let guard = RunGuard { state: &self.state };

        match self.run(first, second, crossfade) {
            Ok(output) => {
                guard.complete();
                log::info!(
                    "Mix complete: {} frames, {} WAV bytes, {} MP3 bytes in {:?}",
                    output.spec.frame_count,
                    output.wav.len(),
                    output.mp3.len(),
                    output.elapsed
                );
                Ok(output)
            }
            Err(e) => {
                log::error!("Mix failed: {}", e);
                drop(guard);
                Err(e)
            }
        }
    }

    fn run(&self, first: &AudioBuffer, second: &AudioBuffer, crossfade: f64) -> MixResult<MixOutput> {
        let started = Instant::now();

        let (first_gain, second_gain) = gains(crossfade);
        let spec = RenderSpec::for_sources(first, second, self.config.sample_rate);
        self.total_frames.store(spec.frame_count as u64, Ordering::Relaxed);

        log::info!(
            "Mixing {:.2}s + {:.2}s at crossfade {:.3} (gains {:.3}/{:.3}) into {} frames",
            first.duration(),
            second.duration(),
            crossfade,
            first_gain,
            second_gain,
            spec.frame_count
        );

        if spec.frame_count > self.renderer.max_frames() {
            return Err(MixError::Render(format!(
                "render length {} frames exceeds engine limit of {} frames",
                spec.frame_count,
                self.renderer.max_frames()
            )));
        }

        // Step 1: Render
        let rendered = self.renderer.render(&RenderRequest {
            first,
            first_gain,
            second,
            second_gain,
            spec,
        })?;
        let peak_db = rendered.peak_db();

        // Step 2: Quantize
        self.set_state(PipelineState::Quantizing);
        let wav = PcmQuantizer::encode(&rendered)?;
        drop(rendered);

        // Step 3: Encode
        self.set_state(PipelineState::Mp3Encoding);
        let mp3 = transcode_wav_with(
            &wav,
            &Mp3Settings::from_config(&self.config),
            &self.cancelled,
            &self.frames_encoded,
        )?;

        Ok(MixOutput {
            wav,
            mp3,
            spec,
            first_gain,
            second_gain,
            peak_db,
            elapsed: started.elapsed(),
        })
    }
}

/// Marks the run `Failed` when dropped before completion, including on unwind
struct RunGuard<'a> {
    state: &'a Mutex<PipelineState>,
}

impl RunGuard<'_> {
    fn complete(self) {
        log::debug!("Mix pipeline -> {:?}", PipelineState::Done);
        *self.state.lock() = PipelineState::Done;
        std::mem::forget(self);
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        log::debug!("Mix pipeline -> {:?}", PipelineState::Failed);
        *self.state.lock() = PipelineState::Failed;
    }
}

/// Mix two sources with the default configuration and return the MP3 stream
pub fn mix(first: &AudioBuffer, second: &AudioBuffer, crossfade: f64) -> MixResult<Mp3Stream> {
    MixPipeline::default()
        .start(first, second, crossfade)
        .map(|output| output.mp3)
}
