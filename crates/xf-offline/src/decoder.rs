//! Source decoding
//!
//! Uses symphonia to turn any supported container (WAV, AIFF, FLAC, MP3,
//! OGG Vorbis, AAC/M4A) into a planar float [`AudioBuffer`]. Only mono and
//! stereo sources are accepted.

use std::fs::File;
use std::path::Path;

use symphonia::core::audio::{AudioBuffer as SymphoniaBuffer, Signal};
use symphonia::core::codecs::{CODEC_TYPE_NULL, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::{MediaSource, MediaSourceStream};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::buffer::AudioBuffer;
use crate::error::{MixError, MixResult};

// ═══════════════════════════════════════════════════════════════════════════════
// DECODER
// ═══════════════════════════════════════════════════════════════════════════════

/// Audio file decoder
pub struct AudioDecoder;

impl AudioDecoder {
    /// Decode a whole file into memory
    pub fn decode(path: &Path) -> MixResult<AudioBuffer> {
        let file = File::open(path)
            .map_err(|e| MixError::Decode(format!("{}: {}", path.display(), e)))?;
        let extension = path.extension().and_then(|e| e.to_str());

        let buffer = Self::decode_reader(file, extension)?;
        log::debug!(
            "Decoded {}: {} frames, {} ch, {} Hz",
            path.display(),
            buffer.frames(),
            buffer.channel_count(),
            buffer.sample_rate()
        );
        Ok(buffer)
    }

    /// Decode from any seekable source, e.g. `Cursor<Vec<u8>>`
    ///
    /// `extension` is only a probe hint; the container is detected from content.
    pub fn decode_reader<S: MediaSource + 'static>(
        source: S,
        extension: Option<&str>,
    ) -> MixResult<AudioBuffer> {
        let mss = MediaSourceStream::new(Box::new(source), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = extension {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
            .map_err(|e| MixError::Decode(format!("Failed to probe format: {}", e)))?;
        let mut format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| MixError::Decode("No audio track found".to_string()))?;
        let track_id = track.id;
        let codec_params = track.codec_params.clone();

        let mut decoder = symphonia::default::get_codecs()
            .make(&codec_params, &DecoderOptions::default())
            .map_err(|e| MixError::Decode(format!("Failed to create decoder: {}", e)))?;

        let mut channels: Vec<Vec<f32>> = Vec::new();
        let mut sample_rate = codec_params.sample_rate.unwrap_or(0);

        loop {
            let packet = match format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(ref e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    break;
                }
                Err(e) => return Err(MixError::Decode(format!("Packet read error: {}", e))),
            };
            if packet.track_id() != track_id {
                continue;
            }

            let decoded = match decoder.decode(&packet) {
                Ok(decoded) => decoded,
                Err(SymphoniaError::DecodeError(e)) => {
                    log::warn!("Skipping undecodable packet: {}", e);
                    continue;
                }
                Err(e) => return Err(MixError::Decode(format!("Decode error: {}", e))),
            };

            let spec = *decoded.spec();
            let count = spec.channels.count();
            if count == 0 || count > 2 {
                return Err(MixError::Decode(format!(
                    "{} channels, only mono and stereo are supported",
                    count
                )));
            }
            if channels.is_empty() {
                channels = vec![Vec::new(); count];
                sample_rate = spec.rate;
            } else if channels.len() != count {
                return Err(MixError::Decode(format!(
                    "channel count changed mid-stream ({} -> {})",
                    channels.len(),
                    count
                )));
            }

            let mut buf = SymphoniaBuffer::<f32>::new(decoded.capacity() as u64, spec);
            decoded.convert(&mut buf);
            for (c, out) in channels.iter_mut().enumerate() {
                out.extend_from_slice(buf.chan(c));
            }
        }

        if channels.first().is_none_or(Vec::is_empty) {
            return Err(MixError::Decode("no audio frames decoded".to_string()));
        }

        AudioBuffer::new(channels, sample_rate)
    }
}
