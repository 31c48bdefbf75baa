//! Planar float audio buffer shared by every stage

use crate::error::{MixError, MixResult};

/// Audio buffer for offline mixing
///
/// Samples are planar: one `Vec` per channel, every channel the same length.
/// Nominal range is [-1.0, 1.0]; rendered sums may exceed it until quantization.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    channels: Vec<Vec<f32>>,
    sample_rate: u32,
}

impl AudioBuffer {
    /// Create buffer from planar channel data
    pub fn new(channels: Vec<Vec<f32>>, sample_rate: u32) -> MixResult<Self> {
        if let Some(first) = channels.first() {
            let frames = first.len();
            if let Some(bad) = channels.iter().position(|ch| ch.len() != frames) {
                return Err(MixError::Decode(format!(
                    "channel {} has {} frames, expected {}",
                    bad,
                    channels[bad].len(),
                    frames
                )));
            }
        }
        Ok(Self {
            channels,
            sample_rate,
        })
    }

    /// Create a silent buffer
    pub fn silent(channel_count: usize, frames: usize, sample_rate: u32) -> Self {
        Self {
            channels: vec![vec![0.0; frames]; channel_count],
            sample_rate,
        }
    }

    /// Create mono buffer
    pub fn mono(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            channels: vec![samples],
            sample_rate,
        }
    }

    /// Create stereo buffer; channels must be equal length
    pub fn stereo(left: Vec<f32>, right: Vec<f32>, sample_rate: u32) -> MixResult<Self> {
        Self::new(vec![left, right], sample_rate)
    }

    /// Number of channels
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Number of frames
    pub fn frames(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    /// Sample rate
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Duration in seconds
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            0.0
        } else {
            self.frames() as f64 / self.sample_rate as f64
        }
    }

    /// Channel samples
    pub fn channel(&self, channel: usize) -> &[f32] {
        self.channels.get(channel).map_or(&[], Vec::as_slice)
    }

    /// All channels
    pub fn channels(&self) -> &[Vec<f32>] {
        &self.channels
    }

    /// Take the channel data
    pub fn into_channels(self) -> Vec<Vec<f32>> {
        self.channels
    }

    /// Peak level (linear)
    pub fn peak(&self) -> f32 {
        self.channels
            .iter()
            .flatten()
            .map(|s| s.abs())
            .fold(0.0, f32::max)
    }

    /// Peak level (dB)
    pub fn peak_db(&self) -> f32 {
        let peak = self.peak();
        if peak <= 0.0 {
            f32::NEG_INFINITY
        } else {
            20.0 * peak.log10()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_dimensions() {
        let buffer = AudioBuffer::stereo(vec![0.5, -0.5, 0.25], vec![0.1, 0.2, 0.3], 44100).unwrap();
        assert_eq!(buffer.channel_count(), 2);
        assert_eq!(buffer.frames(), 3);
        assert_eq!(buffer.channel(1), &[0.1, 0.2, 0.3]);
        assert!(buffer.channel(2).is_empty());
    }

    #[test]
    fn test_ragged_channels_rejected() {
        let result = AudioBuffer::stereo(vec![0.0; 4], vec![0.0; 3], 44100);
        assert!(matches!(result, Err(MixError::Decode(_))));
    }

    #[test]
    fn test_duration() {
        let buffer = AudioBuffer::silent(2, 22050, 44100);
        assert!((buffer.duration() - 0.5).abs() < 1e-9);
        assert_eq!(AudioBuffer::silent(1, 10, 0).duration(), 0.0);
    }

    #[test]
    fn test_peak() {
        let buffer = AudioBuffer::mono(vec![0.5, -0.8, 0.3, -0.2], 44100);
        assert!((buffer.peak() - 0.8).abs() < 1e-6);
        assert_eq!(AudioBuffer::silent(2, 8, 44100).peak_db(), f32::NEG_INFINITY);
    }
}
