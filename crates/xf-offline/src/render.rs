//! Offline rendering of the gain-scaled sum of two sources
//!
//! Both sources start at frame 0 and run to the end of the render window;
//! the shorter one is padded with silence. Rendering is plain buffer math,
//! there is no playback graph and no shared engine state.

use rayon::prelude::*;

use crate::buffer::AudioBuffer;
use crate::config::{DEFAULT_MAX_RENDER_FRAMES, MixConfig};
use crate::error::{MixError, MixResult};

/// Output channel count; the mix is always stereo
pub const RENDER_CHANNELS: usize = 2;

// ═══════════════════════════════════════════════════════════════════════════════
// RENDER SPEC
// ═══════════════════════════════════════════════════════════════════════════════

/// Dimensions of one render
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderSpec {
    pub frame_count: usize,
    pub channel_count: usize,
    pub sample_rate: u32,
}

impl RenderSpec {
    /// Create stereo spec
    pub fn new(frame_count: usize, sample_rate: u32) -> Self {
        Self {
            frame_count,
            channel_count: RENDER_CHANNELS,
            sample_rate,
        }
    }

    /// Spec covering the longer of two sources
    ///
    /// Length is `sample_rate * max(duration)` rounded to the nearest frame,
    /// so sources already at `sample_rate` give exactly their frame count.
    pub fn for_sources(first: &AudioBuffer, second: &AudioBuffer, sample_rate: u32) -> Self {
        let duration = first.duration().max(second.duration());
        let frame_count = (sample_rate as f64 * duration).round() as usize;
        Self::new(frame_count, sample_rate)
    }

    /// Duration in seconds
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            0.0
        } else {
            self.frame_count as f64 / self.sample_rate as f64
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// RENDER ENGINE
// ═══════════════════════════════════════════════════════════════════════════════

/// Everything a render engine needs for one mix
#[derive(Debug, Clone, Copy)]
pub struct RenderRequest<'a> {
    pub first: &'a AudioBuffer,
    pub first_gain: f64,
    pub second: &'a AudioBuffer,
    pub second_gain: f64,
    pub spec: RenderSpec,
}

/// Offline render engine
///
/// Implementations block until the whole buffer is rendered; there are no
/// partial results.
pub trait RenderEngine: Send + Sync {
    /// Render `first_gain * first + second_gain * second` over `spec`
    fn render(&self, request: &RenderRequest<'_>) -> MixResult<AudioBuffer>;

    /// Longest render accepted, in frames
    fn max_frames(&self) -> usize;
}

// ═══════════════════════════════════════════════════════════════════════════════
// OFFLINE RENDERER
// ═══════════════════════════════════════════════════════════════════════════════

/// Built-in numerical render engine
#[derive(Debug, Clone)]
pub struct OfflineRenderer {
    max_frames: usize,
    threads: usize,
}

impl Default for OfflineRenderer {
    fn default() -> Self {
        Self {
            max_frames: DEFAULT_MAX_RENDER_FRAMES,
            threads: 0,
        }
    }
}

impl OfflineRenderer {
    pub fn new(max_frames: usize) -> Self {
        Self {
            max_frames,
            ..Default::default()
        }
    }

    pub fn from_config(config: &MixConfig) -> Self {
        Self {
            max_frames: config.max_render_frames,
            threads: config.render_threads,
        }
    }

    /// Set worker thread count (0 = rayon global pool)
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    fn validate(&self, request: &RenderRequest<'_>) -> MixResult<()> {
        let spec = &request.spec;
        if spec.sample_rate == 0 {
            return Err(MixError::Render("sample rate must be non-zero".to_string()));
        }
        if spec.frame_count == 0 {
            return Err(MixError::Render("render length is zero frames".to_string()));
        }
        if spec.frame_count > self.max_frames {
            return Err(MixError::Render(format!(
                "render length {} frames exceeds engine limit of {} frames",
                spec.frame_count, self.max_frames
            )));
        }
        for (name, source) in [("first", request.first), ("second", request.second)] {
            if source.frames() == 0 {
                return Err(MixError::Render(format!("{} source has no frames", name)));
            }
            if !matches!(source.channel_count(), 1 | 2) {
                return Err(MixError::Render(format!(
                    "{} source has {} channels, only mono and stereo are supported",
                    name,
                    source.channel_count()
                )));
            }
            if source.sample_rate() != spec.sample_rate {
                return Err(MixError::Render(format!(
                    "{} source is {} Hz, render is {} Hz",
                    name,
                    source.sample_rate(),
                    spec.sample_rate
                )));
            }
        }
        Ok(())
    }

    fn render_channels(&self, request: &RenderRequest<'_>) -> Vec<Vec<f32>> {
        let spec = request.spec;
        (0..spec.channel_count)
            .into_par_iter()
            .map(|channel| {
                let mut out = vec![0.0f32; spec.frame_count];
                accumulate(&mut out, request.first, channel, request.first_gain as f32);
                accumulate(&mut out, request.second, channel, request.second_gain as f32);
                out
            })
            .collect()
    }
}

impl RenderEngine for OfflineRenderer {
    fn render(&self, request: &RenderRequest<'_>) -> MixResult<AudioBuffer> {
        self.validate(request)?;

        let channels = if self.threads == 0 {
            self.render_channels(request)
        } else {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(self.threads)
                .build()
                .map_err(|e| MixError::Render(format!("render thread pool: {}", e)))?;
            pool.install(|| self.render_channels(request))
        };

        log::debug!(
            "Rendered {} frames x {} channels at {} Hz",
            request.spec.frame_count,
            request.spec.channel_count,
            request.spec.sample_rate
        );

        AudioBuffer::new(channels, request.spec.sample_rate)
    }

    fn max_frames(&self) -> usize {
        self.max_frames
    }
}

/// Add `gain * source[channel]` into `out`; frames past the source end stay silent.
/// A mono source feeds every output channel.
fn accumulate(out: &mut [f32], source: &AudioBuffer, channel: usize, gain: f32) {
    let source_channel = if source.channel_count() == 1 { 0 } else { channel };
    let samples = source.channel(source_channel);
    for (dst, &src) in out.iter_mut().zip(samples) {
        *dst += gain * src;
    }
}
