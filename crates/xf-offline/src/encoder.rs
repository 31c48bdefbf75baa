//! Frame-based MP3 encoding (native LAME via mp3lame-encoder)
//!
//! PCM is fed to the encoder in fixed 1152-sample frames per channel. The last
//! frame may be short; LAME pads it internally. Every non-empty chunk LAME
//! returns is kept in call order, followed by the output of a single flush.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use mp3lame_encoder::{Builder, DualPcm, FlushGap};

use crate::config::{MixConfig, Mp3Quality};
use crate::error::{MixError, MixResult};
use crate::wav::WavContainer;

/// Samples per channel in one MPEG-1 Layer III frame
pub const SAMPLES_PER_FRAME: usize = 1152;

/// MIME type of MP3 output
pub const MP3_MIME_TYPE: &str = "audio/mpeg";

/// Bytes LAME may emit on flush
const FLUSH_BUFFER_SIZE: usize = 7200;

// ═══════════════════════════════════════════════════════════════════════════════
// SETTINGS
// ═══════════════════════════════════════════════════════════════════════════════

/// Constant-bitrate MP3 settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mp3Settings {
    pub bitrate_kbps: u32,
    pub quality: Mp3Quality,
}

impl Default for Mp3Settings {
    fn default() -> Self {
        Self {
            bitrate_kbps: crate::config::DEFAULT_BITRATE_KBPS,
            quality: Mp3Quality::default(),
        }
    }
}

impl Mp3Settings {
    pub fn from_config(config: &MixConfig) -> Self {
        Self {
            bitrate_kbps: config.bitrate_kbps,
            quality: config.mp3_quality,
        }
    }

    /// Convert kbps to the LAME bitrate enum, snapping down to a supported rate
    fn lame_bitrate(&self) -> mp3lame_encoder::Bitrate {
        let bitrate = match self.bitrate_kbps {
            0..=111 => mp3lame_encoder::Bitrate::Kbps96,
            112..=127 => mp3lame_encoder::Bitrate::Kbps112,
            128..=159 => mp3lame_encoder::Bitrate::Kbps128,
            160..=191 => mp3lame_encoder::Bitrate::Kbps160,
            192..=223 => mp3lame_encoder::Bitrate::Kbps192,
            224..=255 => mp3lame_encoder::Bitrate::Kbps224,
            256..=319 => mp3lame_encoder::Bitrate::Kbps256,
            _ => mp3lame_encoder::Bitrate::Kbps320,
        };
        if !matches!(self.bitrate_kbps, 96 | 112 | 128 | 160 | 192 | 224 | 256 | 320) {
            log::warn!(
                "{} kbps is not a supported MP3 bitrate, using nearest supported rate",
                self.bitrate_kbps
            );
        }
        bitrate
    }

    fn lame_quality(&self) -> mp3lame_encoder::Quality {
        match self.quality {
            Mp3Quality::Best => mp3lame_encoder::Quality::Best,
            Mp3Quality::Good => mp3lame_encoder::Quality::Good,
            Mp3Quality::Fast => mp3lame_encoder::Quality::Decent,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// FRAME ENCODER
// ═══════════════════════════════════════════════════════════════════════════════

/// Encoder lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncoderState {
    Constructed,
    Encoding,
    /// Terminal
    Flushed,
}

/// Stateful frame-at-a-time encoder
pub trait FrameEncoder {
    /// Channels expected per call
    fn channel_count(&self) -> usize;

    /// Encode `len` samples starting at `offset` of every channel buffer
    fn encode_frame(
        &mut self,
        channels: &[&[i16]],
        offset: usize,
        len: usize,
    ) -> MixResult<Vec<u8>>;

    /// Drain buffered output and close the stream
    fn flush(&mut self) -> MixResult<Vec<u8>>;
}

/// Validate one frame request and slice it out of the channel buffers
fn frame_slices<'a>(
    expected_channels: usize,
    channels: &[&'a [i16]],
    offset: usize,
    len: usize,
) -> MixResult<Vec<&'a [i16]>> {
    if channels.len() != expected_channels {
        return Err(MixError::Encode(format!(
            "expected {} channel buffers, got {}",
            expected_channels,
            channels.len()
        )));
    }
    let length = channels.first().map_or(0, |ch| ch.len());
    if channels.iter().any(|ch| ch.len() != length) {
        return Err(MixError::Encode(
            "channel buffers have unequal lengths".to_string(),
        ));
    }
    let end = offset
        .checked_add(len)
        .filter(|end| *end <= length)
        .ok_or_else(|| {
            MixError::Encode(format!(
                "frame {}..{} is outside {} samples",
                offset,
                offset.saturating_add(len),
                length
            ))
        })?;
    Ok(channels.iter().map(|ch| &ch[offset..end]).collect())
}

/// LAME-backed MP3 frame encoder (constant bitrate)
pub struct Mp3FrameEncoder {
    encoder: mp3lame_encoder::Encoder,
    channels: usize,
    state: EncoderState,
}

impl Mp3FrameEncoder {
    /// Create encoder with default quality
    pub fn new(channels: usize, sample_rate: u32, bitrate_kbps: u32) -> MixResult<Self> {
        Self::with_settings(
            channels,
            sample_rate,
            &Mp3Settings {
                bitrate_kbps,
                ..Default::default()
            },
        )
    }

    /// Create encoder from settings; only mono and stereo are supported
    pub fn with_settings(
        channels: usize,
        sample_rate: u32,
        settings: &Mp3Settings,
    ) -> MixResult<Self> {
        if !matches!(channels, 1 | 2) {
            return Err(MixError::Encode(format!(
                "MP3 supports 1 or 2 channels, got {}",
                channels
            )));
        }

        let mut builder = Builder::new()
            .ok_or_else(|| MixError::Encode("LAME encoder init failed".to_string()))?;

        builder
            .set_num_channels(channels as u8)
            .map_err(|e| MixError::Encode(format!("LAME set channels failed: {:?}", e)))?;

        builder
            .set_sample_rate(sample_rate)
            .map_err(|e| MixError::Encode(format!("LAME set sample rate failed: {:?}", e)))?;

        builder
            .set_brate(settings.lame_bitrate())
            .map_err(|e| MixError::Encode(format!("LAME set bitrate failed: {:?}", e)))?;

        builder
            .set_quality(settings.lame_quality())
            .map_err(|e| MixError::Encode(format!("LAME set quality failed: {:?}", e)))?;

        let encoder = builder
            .build()
            .map_err(|e| MixError::Encode(format!("LAME build failed: {:?}", e)))?;

        Ok(Self {
            encoder,
            channels,
            state: EncoderState::Constructed,
        })
    }

    /// Current lifecycle state
    pub fn state(&self) -> EncoderState {
        self.state
    }

    fn ensure_open(&self, operation: &str) -> MixResult<()> {
        if self.state == EncoderState::Flushed {
            return Err(MixError::EncoderState(format!(
                "{} called after flush",
                operation
            )));
        }
        Ok(())
    }
}

impl FrameEncoder for Mp3FrameEncoder {
    fn channel_count(&self) -> usize {
        self.channels
    }

    fn encode_frame(
        &mut self,
        channels: &[&[i16]],
        offset: usize,
        len: usize,
    ) -> MixResult<Vec<u8>> {
        self.ensure_open("encode_frame")?;
        let slices = frame_slices(self.channels, channels, offset, len)?;
        self.state = EncoderState::Encoding;

        // Mono encoders read only the left input
        let input = DualPcm {
            left: slices[0],
            right: slices[slices.len() - 1],
        };

        let mut output: Vec<u8> =
            Vec::with_capacity(mp3lame_encoder::max_required_buffer_size(len));
        let written = self
            .encoder
            .encode(input, output.spare_capacity_mut())
            .map_err(|e| MixError::Encode(format!("LAME encode failed: {:?}", e)))?;

        // SAFETY: encoder wrote `written` bytes into spare capacity
        unsafe {
            output.set_len(written);
        }
        Ok(output)
    }

    fn flush(&mut self) -> MixResult<Vec<u8>> {
        self.ensure_open("flush")?;
        self.state = EncoderState::Flushed;

        let mut output: Vec<u8> = Vec::with_capacity(FLUSH_BUFFER_SIZE);
        let written = self
            .encoder
            .flush::<FlushGap>(output.spare_capacity_mut())
            .map_err(|e| MixError::Encode(format!("LAME flush failed: {:?}", e)))?;

        // SAFETY: encoder wrote `written` bytes into spare capacity
        unsafe {
            output.set_len(written);
        }
        Ok(output)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// MP3 STREAM
// ═══════════════════════════════════════════════════════════════════════════════

/// Encoded MP3 output as the ordered chunks the encoder produced
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Mp3Stream {
    chunks: Vec<Vec<u8>>,
    encode_calls: usize,
}

impl Mp3Stream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk; empty chunks are dropped
    pub fn push(&mut self, chunk: Vec<u8>) {
        if !chunk.is_empty() {
            self.chunks.push(chunk);
        }
    }

    pub fn chunks(&self) -> &[Vec<u8>] {
        &self.chunks
    }

    /// Frame encode calls made while producing this stream (flush excluded)
    pub fn encode_calls(&self) -> usize {
        self.encode_calls
    }

    /// Total encoded size
    pub fn len(&self) -> usize {
        self.chunks.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Concatenated stream
    pub fn to_bytes(&self) -> Vec<u8> {
        self.chunks.concat()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.chunks.concat()
    }

    pub fn mime_type(&self) -> &'static str {
        MP3_MIME_TYPE
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// FRAME LOOP
// ═══════════════════════════════════════════════════════════════════════════════

/// Feed planar PCM through `encoder` frame by frame, then flush once
///
/// `cancelled` is checked before every frame; `frames_encoded` is updated
/// after every frame.
pub fn encode_frames<E: FrameEncoder + ?Sized>(
    encoder: &mut E,
    channels: &[Vec<i16>],
    cancelled: &AtomicBool,
    frames_encoded: &AtomicU64,
) -> MixResult<Mp3Stream> {
    let views: Vec<&[i16]> = channels.iter().map(Vec::as_slice).collect();
    let total = views.first().map_or(0, |ch| ch.len());
    let mut stream = Mp3Stream::new();

    for offset in (0..total).step_by(SAMPLES_PER_FRAME) {
        if cancelled.load(Ordering::SeqCst) {
            return Err(MixError::Cancelled);
        }

        let len = SAMPLES_PER_FRAME.min(total - offset);
        let chunk = encoder.encode_frame(&views, offset, len)?;
        stream.encode_calls += 1;
        stream.push(chunk);
        frames_encoded.store((offset + len) as u64, Ordering::Relaxed);
    }

    stream.push(encoder.flush()?);
    Ok(stream)
}

/// Encode a 16-bit mono or stereo WAV container to MP3
pub fn transcode_wav(wav: &WavContainer, settings: &Mp3Settings) -> MixResult<Mp3Stream> {
    transcode_wav_with(wav, settings, &AtomicBool::new(false), &AtomicU64::new(0))
}

/// [`transcode_wav`] with caller-owned cancel flag and progress counter
pub fn transcode_wav_with(
    wav: &WavContainer,
    settings: &Mp3Settings,
    cancelled: &AtomicBool,
    frames_encoded: &AtomicU64,
) -> MixResult<Mp3Stream> {
    let header = wav.header()?;
    let channels = wav.deinterleave()?;
    let mut encoder =
        Mp3FrameEncoder::with_settings(header.channels as usize, header.sample_rate, settings)?;

    let stream = encode_frames(&mut encoder, &channels, cancelled, frames_encoded)?;

    log::debug!(
        "Encoded {} MP3 bytes in {} chunks from {} frame calls",
        stream.len(),
        stream.chunks().len(),
        stream.encode_calls()
    );
    Ok(stream)
}
