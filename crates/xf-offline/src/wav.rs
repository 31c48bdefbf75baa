//! 16-bit PCM quantization and canonical WAV framing
//!
//! The container is always the 44-byte RIFF/WAVE header (PCM format 1,
//! 16 bits per sample) followed by interleaved little-endian `i16` samples.

use crate::buffer::AudioBuffer;
use crate::error::{MixError, MixResult};

/// Canonical WAV header length
pub const WAV_HEADER_LEN: usize = 44;

/// MIME type of WAV output
pub const WAV_MIME_TYPE: &str = "audio/wav";

const BITS_PER_SAMPLE: u16 = 16;
const BYTES_PER_SAMPLE: u16 = BITS_PER_SAMPLE / 8;
const FORMAT_PCM: u16 = 1;

// ═══════════════════════════════════════════════════════════════════════════════
// QUANTIZATION
// ═══════════════════════════════════════════════════════════════════════════════

/// Quantize one float sample to 16-bit signed PCM
///
/// Clamps to [-1, 1], then scales by 32768 below -0.5 and by 32767 otherwise,
/// truncating toward zero. The threshold is -0.5, not 0: samples in (-0.5, 0)
/// use the 32767 scale.
#[inline]
pub fn quantize_sample(sample: f32) -> i16 {
    let clamped = (sample as f64).clamp(-1.0, 1.0);
    let scaled = if clamped < -0.5 {
        clamped * 32768.0
    } else {
        clamped * 32767.0
    };
    scaled as i16
}

/// Quantize and interleave every channel, frame by frame
pub fn interleave_pcm16(buffer: &AudioBuffer) -> MixResult<Vec<i16>> {
    check_dimensions(buffer)?;

    let channels = buffer.channel_count();
    let frames = buffer.frames();
    let mut interleaved = Vec::with_capacity(frames * channels);
    for frame in 0..frames {
        for ch in 0..channels {
            interleaved.push(quantize_sample(buffer.channel(ch)[frame]));
        }
    }
    Ok(interleaved)
}

fn check_dimensions(buffer: &AudioBuffer) -> MixResult<()> {
    if buffer.channel_count() == 0 {
        return Err(MixError::Encode("buffer has no channels".to_string()));
    }
    if buffer.frames() == 0 {
        return Err(MixError::Encode("buffer has no frames".to_string()));
    }
    if buffer.channel_count() > (u16::MAX / BYTES_PER_SAMPLE) as usize {
        return Err(MixError::Encode(format!(
            "{} channels do not fit a WAV header",
            buffer.channel_count()
        )));
    }
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════════
// WAV HEADER
// ═══════════════════════════════════════════════════════════════════════════════

/// Fields of a canonical 16-bit PCM WAV header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavHeader {
    pub channels: u16,
    pub sample_rate: u32,
    pub bits_per_sample: u16,
    /// Byte offset of the sample data
    pub data_offset: usize,
    /// Sample data length in bytes
    pub data_len: usize,
}

impl WavHeader {
    /// Header for `frames` frames of `channels`-channel 16-bit audio
    pub fn pcm16(channels: u16, sample_rate: u32, frames: usize) -> MixResult<Self> {
        check_rates(channels, sample_rate, BITS_PER_SAMPLE)?;
        let data_len = frames
            .checked_mul(channels as usize * BYTES_PER_SAMPLE as usize)
            .filter(|len| *len <= (u32::MAX as usize - WAV_HEADER_LEN))
            .ok_or_else(|| {
                MixError::Encode(format!(
                    "{} frames x {} channels exceed the 4 GiB WAV limit",
                    frames, channels
                ))
            })?;
        Ok(Self {
            channels,
            sample_rate,
            bits_per_sample: BITS_PER_SAMPLE,
            data_offset: WAV_HEADER_LEN,
            data_len,
        })
    }

    /// Bytes per frame
    pub fn block_align(&self) -> u16 {
        self.channels.saturating_mul(self.bits_per_sample / 8)
    }

    /// Bytes per second
    pub fn byte_rate(&self) -> u32 {
        self.sample_rate.saturating_mul(self.block_align() as u32)
    }

    /// Serialize to the 44-byte little-endian header
    pub fn to_bytes(&self) -> [u8; WAV_HEADER_LEN] {
        let total = (WAV_HEADER_LEN + self.data_len) as u32;
        let mut header = [0u8; WAV_HEADER_LEN];

        header[0..4].copy_from_slice(b"RIFF");
        header[4..8].copy_from_slice(&(total - 8).to_le_bytes());
        header[8..12].copy_from_slice(b"WAVE");

        header[12..16].copy_from_slice(b"fmt ");
        header[16..20].copy_from_slice(&16u32.to_le_bytes());
        header[20..22].copy_from_slice(&FORMAT_PCM.to_le_bytes());
        header[22..24].copy_from_slice(&self.channels.to_le_bytes());
        header[24..28].copy_from_slice(&self.sample_rate.to_le_bytes());
        header[28..32].copy_from_slice(&self.byte_rate().to_le_bytes());
        header[32..34].copy_from_slice(&self.block_align().to_le_bytes());
        header[34..36].copy_from_slice(&self.bits_per_sample.to_le_bytes());

        header[36..40].copy_from_slice(b"data");
        header[40..44].copy_from_slice(&(total - WAV_HEADER_LEN as u32).to_le_bytes());

        header
    }

    /// Read a canonical header back from container bytes
    pub fn parse(bytes: &[u8]) -> MixResult<Self> {
        if bytes.len() < WAV_HEADER_LEN {
            return Err(MixError::Encode(format!(
                "WAV container is {} bytes, header needs {}",
                bytes.len(),
                WAV_HEADER_LEN
            )));
        }
        if &bytes[0..4] != b"RIFF" || &bytes[8..12] != b"WAVE" {
            return Err(MixError::Encode("missing RIFF/WAVE signature".to_string()));
        }
        if &bytes[12..16] != b"fmt " || &bytes[36..40] != b"data" {
            return Err(MixError::Encode("not a canonical PCM WAV header".to_string()));
        }

        let u16_at = |at: usize| u16::from_le_bytes([bytes[at], bytes[at + 1]]);
        let u32_at = |at: usize| {
            u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
        };

        let format = u16_at(20);
        let bits_per_sample = u16_at(34);
        if format != FORMAT_PCM || bits_per_sample != BITS_PER_SAMPLE {
            return Err(MixError::Encode(format!(
                "unsupported WAV format {} at {} bits",
                format, bits_per_sample
            )));
        }

        let channels = u16_at(22);
        let sample_rate = u32_at(24);
        check_rates(channels, sample_rate, bits_per_sample)?;

        let data_len = u32_at(40) as usize;
        if WAV_HEADER_LEN + data_len > bytes.len() {
            return Err(MixError::Encode(format!(
                "data chunk claims {} bytes, only {} present",
                data_len,
                bytes.len() - WAV_HEADER_LEN
            )));
        }

        Ok(Self {
            channels,
            sample_rate,
            bits_per_sample,
            data_offset: WAV_HEADER_LEN,
            data_len,
        })
    }
}

/// BlockAlign and ByteRate must fit their 16- and 32-bit header fields
fn check_rates(channels: u16, sample_rate: u32, bits_per_sample: u16) -> MixResult<()> {
    channels
        .checked_mul(bits_per_sample / 8)
        .and_then(|block_align| sample_rate.checked_mul(block_align as u32))
        .map(|_| ())
        .ok_or_else(|| {
            MixError::Encode(format!(
                "{} Hz x {} channels overflows the WAV byte rate field",
                sample_rate, channels
            ))
        })
}

// ═══════════════════════════════════════════════════════════════════════════════
// WAV CONTAINER
// ═══════════════════════════════════════════════════════════════════════════════

/// Complete 16-bit PCM WAV file in memory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WavContainer {
    bytes: Vec<u8>,
}

impl WavContainer {
    /// Wrap existing container bytes after checking the header
    pub fn from_bytes(bytes: Vec<u8>) -> MixResult<Self> {
        WavHeader::parse(&bytes)?;
        Ok(Self { bytes })
    }

    /// Header fields
    pub fn header(&self) -> MixResult<WavHeader> {
        WavHeader::parse(&self.bytes)
    }

    /// Interleaved samples
    pub fn samples(&self) -> MixResult<Vec<i16>> {
        let header = self.header()?;
        let data = &self.bytes[header.data_offset..header.data_offset + header.data_len];
        Ok(data
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
            .collect())
    }

    /// Samples split into one `Vec` per channel
    pub fn deinterleave(&self) -> MixResult<Vec<Vec<i16>>> {
        let header = self.header()?;
        let channels = header.channels as usize;
        if channels == 0 {
            return Err(MixError::Encode("WAV header has no channels".to_string()));
        }

        let samples = self.samples()?;
        let frames = samples.len() / channels;
        let mut planar = vec![Vec::with_capacity(frames); channels];
        for frame in samples.chunks_exact(channels) {
            for (ch, &sample) in frame.iter().enumerate() {
                planar[ch].push(sample);
            }
        }
        Ok(planar)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn mime_type(&self) -> &'static str {
        WAV_MIME_TYPE
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// QUANTIZER
// ═══════════════════════════════════════════════════════════════════════════════

/// Float buffer to 16-bit PCM WAV encoder
pub struct PcmQuantizer;

impl PcmQuantizer {
    /// Quantize `buffer` and frame it as a WAV container
    pub fn encode(buffer: &AudioBuffer) -> MixResult<WavContainer> {
        let pcm = interleave_pcm16(buffer)?;
        let header = WavHeader::pcm16(
            buffer.channel_count() as u16,
            buffer.sample_rate(),
            buffer.frames(),
        )?;

        let mut bytes = Vec::with_capacity(WAV_HEADER_LEN + header.data_len);
        bytes.extend_from_slice(&header.to_bytes());
        for sample in pcm {
            bytes.extend_from_slice(&sample.to_le_bytes());
        }

        log::debug!(
            "Quantized {} frames x {} channels into {} WAV bytes",
            buffer.frames(),
            buffer.channel_count(),
            bytes.len()
        );

        Ok(WavContainer { bytes })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quantize_reference_points() {
        assert_eq!(quantize_sample(0.0), 0);
        assert_eq!(quantize_sample(1.0), 32767);
        assert_eq!(quantize_sample(-1.0), -32768);
        assert_eq!(quantize_sample(0.5), 16383);
    }

    #[test]
    fn test_quantize_clamps() {
        assert_eq!(quantize_sample(1.7), 32767);
        assert_eq!(quantize_sample(-3.0), -32768);
        assert_eq!(quantize_sample(f32::NAN), 0);
    }

    #[test]
    fn test_quantize_truncates() {
        // 0.99998 * 32767 = 32766.34
        assert_eq!(quantize_sample(0.99998), 32766);
        // -0.25 * 32767 = -8191.75, toward zero
        assert_eq!(quantize_sample(-0.25), -8191);
    }

    #[test]
    fn test_quantize_asymmetric_threshold() {
        // Above -0.5 the positive scale applies
        assert_eq!(quantize_sample(-0.5), -16383);
        // Below -0.5 the negative full-scale code applies
        assert_eq!(quantize_sample(-0.75), -24576);
    }

    #[test]
    fn test_interleave_order() {
        let buffer = AudioBuffer::stereo(vec![1.0, 0.0], vec![-1.0, 0.5], 44100).unwrap();
        let pcm = interleave_pcm16(&buffer).unwrap();
        assert_eq!(pcm, vec![32767, -32768, 0, 16383]);
    }

    #[test]
    fn test_header_reference_layout() {
        let buffer = AudioBuffer::silent(2, 10, 44100);
        let wav = PcmQuantizer::encode(&buffer).unwrap();
        let bytes = wav.as_bytes();

        assert_eq!(bytes.len(), 84);
        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(u32::from_le_bytes(bytes[4..8].try_into().unwrap()), 76);
        assert_eq!(&bytes[8..12], b"WAVE");
        assert_eq!(&bytes[12..16], b"fmt ");
        assert_eq!(u32::from_le_bytes(bytes[16..20].try_into().unwrap()), 16);
        assert_eq!(u16::from_le_bytes(bytes[20..22].try_into().unwrap()), 1);
        assert_eq!(u16::from_le_bytes(bytes[22..24].try_into().unwrap()), 2);
        assert_eq!(u32::from_le_bytes(bytes[24..28].try_into().unwrap()), 44100);
        assert_eq!(u32::from_le_bytes(bytes[28..32].try_into().unwrap()), 176400);
        assert_eq!(u16::from_le_bytes(bytes[32..34].try_into().unwrap()), 4);
        assert_eq!(u16::from_le_bytes(bytes[34..36].try_into().unwrap()), 16);
        assert_eq!(&bytes[36..40], b"data");
        assert_eq!(u32::from_le_bytes(bytes[40..44].try_into().unwrap()), 40);
        assert!(bytes[44..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_header_parse_matches_written() {
        let buffer = AudioBuffer::mono(vec![0.25; 7], 22050);
        let wav = PcmQuantizer::encode(&buffer).unwrap();
        let header = wav.header().unwrap();
        assert_eq!(header, WavHeader::pcm16(1, 22050, 7).unwrap());
        assert_eq!(header.data_len, 14);
        assert_eq!(header.byte_rate(), 44100);
    }

    #[test]
    fn test_deinterleave() {
        let buffer =
            AudioBuffer::stereo(vec![0.5, 0.25, 0.0], vec![-0.25, -0.75, 1.0], 44100).unwrap();
        let planar = PcmQuantizer::encode(&buffer).unwrap().deinterleave().unwrap();
        assert_eq!(planar[0], vec![16383, 8191, 0]);
        assert_eq!(planar[1], vec![-8191, -24576, 32767]);
    }

    #[test]
    fn test_empty_buffers_rejected() {
        assert!(matches!(
            PcmQuantizer::encode(&AudioBuffer::silent(0, 10, 44100)),
            Err(MixError::Encode(_))
        ));
        assert!(matches!(
            PcmQuantizer::encode(&AudioBuffer::silent(2, 0, 44100)),
            Err(MixError::Encode(_))
        ));
    }

    #[test]
    fn test_parse_rejects_truncated() {
        let wav = PcmQuantizer::encode(&AudioBuffer::silent(2, 10, 44100)).unwrap();
        let mut bytes = wav.into_bytes();
        bytes.truncate(60);
        assert!(matches!(WavContainer::from_bytes(bytes), Err(MixError::Encode(_))));
        assert!(WavHeader::parse(b"RIFF").is_err());
    }

    #[test]
    fn test_byte_rate_overflow_rejected() {
        // 1.1 GHz x 4 bytes per frame does not fit in u32
        assert!(matches!(
            WavHeader::pcm16(2, 1_100_000_000, 10),
            Err(MixError::Encode(_))
        ));
        assert!(matches!(
            PcmQuantizer::encode(&AudioBuffer::silent(2, 10, 1_100_000_000)),
            Err(MixError::Encode(_))
        ));

        let mono = WavHeader::pcm16(1, 1_100_000_000, 10).unwrap();
        assert_eq!(mono.byte_rate(), 2_200_000_000);

        let mut bytes = PcmQuantizer::encode(&AudioBuffer::silent(2, 10, 44100))
            .unwrap()
            .into_bytes();
        bytes[24..28].copy_from_slice(&1_100_000_000u32.to_le_bytes());
        assert!(matches!(WavHeader::parse(&bytes), Err(MixError::Encode(_))));
    }
}
