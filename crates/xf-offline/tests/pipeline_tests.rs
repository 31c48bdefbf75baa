//! End-to-end tests for xf-offline
//!
//! - Reentrancy guard (Busy while a run is in flight)
//! - Cancellation between MP3 frames
//! - WAV output read back with hound
//! - Decoding sources and encoded MP3 through symphonia

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

use approx::assert_abs_diff_eq;
use xf_offline::{
    AudioBuffer, AudioDecoder, MixConfig, MixError, MixPipeline, MixResult, OfflineRenderer,
    PipelineState, RenderEngine, RenderRequest, SAMPLES_PER_FRAME, quantize_sample,
};

// ═══════════════════════════════════════════════════════════════════════════════
// HELPERS
// ═══════════════════════════════════════════════════════════════════════════════

fn sine(frames: usize, freq: f32, amplitude: f32) -> Vec<f32> {
    (0..frames)
        .map(|i| amplitude * (2.0 * std::f32::consts::PI * freq * i as f32 / 44100.0).sin())
        .collect()
}

fn stereo_sine(frames: usize, freq: f32) -> AudioBuffer {
    AudioBuffer::stereo(sine(frames, freq, 0.5), sine(frames, freq * 1.5, 0.5), 44100).unwrap()
}

/// Renderer that parks inside `render` until the test releases it
struct GatedRenderer {
    inner: OfflineRenderer,
    entered: Arc<Barrier>,
    release: Arc<Barrier>,
}

impl RenderEngine for GatedRenderer {
    fn render(&self, request: &RenderRequest<'_>) -> MixResult<AudioBuffer> {
        self.entered.wait();
        self.release.wait();
        self.inner.render(request)
    }

    fn max_frames(&self) -> usize {
        self.inner.max_frames()
    }
}

fn gated_pipeline() -> (Arc<MixPipeline<GatedRenderer>>, Arc<Barrier>, Arc<Barrier>) {
    let entered = Arc::new(Barrier::new(2));
    let release = Arc::new(Barrier::new(2));
    let renderer = GatedRenderer {
        inner: OfflineRenderer::default(),
        entered: Arc::clone(&entered),
        release: Arc::clone(&release),
    };
    let pipeline = Arc::new(MixPipeline::with_renderer(MixConfig::default(), renderer));
    (pipeline, entered, release)
}

/// Renderer that panics on its first call only
struct PanicOnceRenderer {
    armed: AtomicBool,
}

impl RenderEngine for PanicOnceRenderer {
    fn render(&self, request: &RenderRequest<'_>) -> MixResult<AudioBuffer> {
        if self.armed.swap(false, Ordering::SeqCst) {
            panic!("render engine failure");
        }
        OfflineRenderer::default().render(request)
    }

    fn max_frames(&self) -> usize {
        OfflineRenderer::default().max_frames()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// REENTRANCY
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_second_start_while_rendering_is_busy() {
    let first = stereo_sine(5000, 440.0);
    let second = stereo_sine(3000, 220.0);
    let (pipeline, entered, release) = gated_pipeline();

    let worker = {
        let pipeline = Arc::clone(&pipeline);
        let (first, second) = (first.clone(), second.clone());
        thread::spawn(move || pipeline.start(&first, &second, 0.25))
    };

    entered.wait();
    assert_eq!(pipeline.state(), PipelineState::Rendering);

    let rejected = pipeline.start(&first, &second, -0.75);
    assert!(matches!(rejected, Err(MixError::Busy(_))));
    assert_eq!(pipeline.state(), PipelineState::Rendering);

    release.wait();
    let output = worker.join().unwrap().unwrap();
    assert_eq!(pipeline.state(), PipelineState::Done);

    // The rejected call must not have touched the in-flight run
    let reference = MixPipeline::default().start(&first, &second, 0.25).unwrap();
    assert_eq!(output.first_gain, 0.375);
    assert_eq!(output.second_gain, 0.625);
    assert_eq!(output.wav.as_bytes(), reference.wav.as_bytes());
    assert_eq!(output.mp3.to_bytes(), reference.mp3.to_bytes());
}

#[test]
fn test_cancel_stops_before_first_frame() {
    let first = stereo_sine(4000, 440.0);
    let second = stereo_sine(4000, 330.0);
    let (pipeline, entered, release) = gated_pipeline();

    let worker = {
        let pipeline = Arc::clone(&pipeline);
        let (first, second) = (first.clone(), second.clone());
        thread::spawn(move || pipeline.start(&first, &second, 0.0))
    };

    entered.wait();
    pipeline.cancel();
    release.wait();

    let result = worker.join().unwrap();
    assert!(matches!(result, Err(MixError::Cancelled)));
    assert_eq!(pipeline.state(), PipelineState::Failed);
    assert_eq!(pipeline.progress().frames_encoded, 0);
}

#[test]
fn test_pipeline_reusable_after_failure() {
    let pipeline = MixPipeline::new(MixConfig::default().with_max_render_frames(1000));
    let long = stereo_sine(2000, 440.0);
    let short = stereo_sine(800, 440.0);

    assert!(matches!(
        pipeline.start(&long, &short, 0.0),
        Err(MixError::Render(_))
    ));
    assert_eq!(pipeline.state(), PipelineState::Failed);

    let output = pipeline.start(&short, &short, 0.0).unwrap();
    assert_eq!(pipeline.state(), PipelineState::Done);
    assert_eq!(output.spec.frame_count, 800);
}

#[test]
fn test_panicking_engine_leaves_pipeline_failed() {
    let pipeline = MixPipeline::with_renderer(
        MixConfig::default(),
        PanicOnceRenderer {
            armed: AtomicBool::new(true),
        },
    );
    let source = stereo_sine(1000, 440.0);

    let unwound = catch_unwind(AssertUnwindSafe(|| pipeline.start(&source, &source, 0.0)));
    assert!(unwound.is_err());
    assert_eq!(pipeline.state(), PipelineState::Failed);

    let output = pipeline.start(&source, &source, 0.0).unwrap();
    assert_eq!(pipeline.state(), PipelineState::Done);
    assert_eq!(output.spec.frame_count, 1000);
}

// ═══════════════════════════════════════════════════════════════════════════════
// OUTPUT CONTENT
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_wav_output_reads_back_with_hound() {
    let left = sine(2500, 440.0, 0.8);
    let right = sine(2500, 660.0, 0.8);
    let first = AudioBuffer::stereo(left.clone(), right.clone(), 44100).unwrap();
    let second = AudioBuffer::mono(vec![0.1; 1200], 44100);

    let output = MixPipeline::default().start(&first, &second, -0.5).unwrap();
    let (g1, g2) = (output.first_gain as f32, output.second_gain as f32);
    assert_eq!((g1, g2), (0.75, 0.25));

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("mix.wav");
    std::fs::write(&path, output.wav.as_bytes()).unwrap();

    let mut reader = hound::WavReader::open(&path).unwrap();
    let spec = reader.spec();
    assert_eq!(spec.channels, 2);
    assert_eq!(spec.sample_rate, 44100);
    assert_eq!(spec.bits_per_sample, 16);
    assert_eq!(spec.sample_format, hound::SampleFormat::Int);
    assert_eq!(reader.duration(), 2500);

    let samples: Vec<i16> = reader.samples::<i16>().map(Result::unwrap).collect();
    assert_eq!(samples.len(), 5000);

    for i in 0..2500 {
        let pad = if i < 1200 { g2 * 0.1 } else { 0.0 };
        let expected_l = g1 * left[i] + pad;
        let expected_r = g1 * right[i] + pad;
        assert_eq!(samples[2 * i], quantize_sample(expected_l));
        assert_eq!(samples[2 * i + 1], quantize_sample(expected_r));
        assert_abs_diff_eq!(samples[2 * i] as f32 / 32767.0, expected_l, epsilon = 1e-3);
    }
}

#[test]
fn test_extrapolated_crossfade_and_clamping() {
    let loud = AudioBuffer::mono(vec![0.9; 100], 44100);

    // gains at 3.0 are (-1, 2), the sum stays in range
    let output = MixPipeline::default().start(&loud, &loud, 3.0).unwrap();
    assert_eq!((output.first_gain, output.second_gain), (-1.0, 2.0));
    assert_eq!(output.wav.samples().unwrap()[0], quantize_sample(0.9));

    let hot = AudioBuffer::mono(vec![1.5; 100], 44100);
    let output = MixPipeline::default().start(&hot, &hot, 0.0).unwrap();
    let samples = output.wav.samples().unwrap();
    assert_eq!(samples.len(), 200);
    assert!(samples.iter().all(|&s| s == i16::MAX));
    assert!(output.peak_db > 0.0);
}

#[test]
fn test_mp3_call_count_and_decode() {
    let frames = SAMPLES_PER_FRAME * 4 + 100;
    let first = stereo_sine(frames, 440.0);
    let second = stereo_sine(SAMPLES_PER_FRAME, 880.0);

    let output = MixPipeline::default().start(&first, &second, 0.0).unwrap();
    assert_eq!(output.mp3.encode_calls(), 5);
    assert_eq!(output.spec.frame_count, frames);

    let bytes = output.mp3.to_bytes();
    assert!(bytes.windows(2).any(|w| w[0] == 0xFF && w[1] & 0xE0 == 0xE0));

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("mix.mp3");
    std::fs::write(&path, &bytes).unwrap();

    let decoded = AudioDecoder::decode(&path).unwrap();
    assert_eq!(decoded.channel_count(), 2);
    assert_eq!(decoded.sample_rate(), 44100);
    assert!(decoded.frames() >= frames);
}

// ═══════════════════════════════════════════════════════════════════════════════
// DECODER
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_decode_hound_written_wav() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("source.wav");

    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 44100,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let pcm: Vec<i16> = (0..3000).map(|i| ((i % 200) as i16 - 100) * 300).collect();
    {
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for &s in &pcm {
            writer.write_sample(s).unwrap();
        }
        writer.finalize().unwrap();
    }

    let buffer = AudioDecoder::decode(&path).unwrap();
    assert_eq!(buffer.channel_count(), 1);
    assert_eq!(buffer.sample_rate(), 44100);
    assert_eq!(buffer.frames(), 3000);
    for (i, &s) in pcm.iter().enumerate() {
        assert_abs_diff_eq!(buffer.channel(0)[i], s as f32 / 32768.0, epsilon = 1e-4);
    }
}

#[test]
fn test_decoded_sources_mix_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let spec = hound::WavSpec {
        channels: 2,
        sample_rate: 44100,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut paths = Vec::new();
    for (name, frames) in [("a.wav", 4410usize), ("b.wav", 2205)] {
        let path = dir.path().join(name);
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for i in 0..frames {
            let s = ((i % 100) as i16 - 50) * 200;
            writer.write_sample(s).unwrap();
            writer.write_sample(-s).unwrap();
        }
        writer.finalize().unwrap();
        paths.push(path);
    }

    let first = AudioDecoder::decode(&paths[0]).unwrap();
    let second = AudioDecoder::decode(&paths[1]).unwrap();
    let output = MixPipeline::default().start(&first, &second, 0.0).unwrap();

    assert_eq!(output.spec.frame_count, 4410);
    assert_eq!(output.wav.len(), 44 + 4410 * 4);
    assert_eq!(output.mp3.encode_calls(), 4);
}
