//! Configuration types for offline mixdown

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{MixError, MixResult};

/// Sample rate every source is decoded/rendered at
pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;

/// Default constant MP3 bitrate (kbps)
pub const DEFAULT_BITRATE_KBPS: u32 = 128;

/// Longest render the built-in engine accepts: one hour at 44.1kHz
pub const DEFAULT_MAX_RENDER_FRAMES: usize = 44_100 * 60 * 60;

/// Offline mixdown configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MixConfig {
    /// Render sample rate (Hz); both sources must already be at this rate
    pub sample_rate: u32,

    /// Constant MP3 bitrate (kbps)
    pub bitrate_kbps: u32,

    /// LAME algorithm quality
    pub mp3_quality: Mp3Quality,

    /// Maximum render length in frames
    pub max_render_frames: usize,

    /// Worker threads for rendering (0 = auto)
    pub render_threads: usize,
}

impl Default for MixConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            bitrate_kbps: DEFAULT_BITRATE_KBPS,
            mp3_quality: Mp3Quality::default(),
            max_render_frames: DEFAULT_MAX_RENDER_FRAMES,
            render_threads: 0,
        }
    }
}

impl MixConfig {
    /// Config for maximum quality (slower)
    pub fn quality() -> Self {
        Self {
            bitrate_kbps: 320,
            mp3_quality: Mp3Quality::Best,
            ..Default::default()
        }
    }

    /// Config for fastest encoding
    pub fn fast() -> Self {
        Self {
            mp3_quality: Mp3Quality::Fast,
            ..Default::default()
        }
    }

    /// Set MP3 bitrate
    pub fn with_bitrate(mut self, kbps: u32) -> Self {
        self.bitrate_kbps = kbps;
        self
    }

    /// Set render sample rate
    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    /// Set render length limit
    pub fn with_max_render_frames(mut self, frames: usize) -> Self {
        self.max_render_frames = frames;
        self
    }

    /// Set render thread count
    pub fn with_threads(mut self, count: usize) -> Self {
        self.render_threads = count;
        self
    }

    /// Parse config from a JSON string
    pub fn from_json_str(json: &str) -> MixResult<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| MixError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load config from a JSON file
    pub fn from_json_file(path: &Path) -> MixResult<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Check the config for values no run could succeed with
    pub fn validate(&self) -> MixResult<()> {
        if self.sample_rate == 0 {
            return Err(MixError::Config("sample rate must be non-zero".to_string()));
        }
        if self.bitrate_kbps == 0 {
            return Err(MixError::Config("bitrate must be non-zero".to_string()));
        }
        if self.max_render_frames == 0 {
            return Err(MixError::Config(
                "max render frames must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// LAME algorithm quality preset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mp3Quality {
    /// Slowest, best psychoacoustics
    Best,
    /// LAME's recommended default
    Good,
    /// Fast, lower quality
    Fast,
}

impl Default for Mp3Quality {
    fn default() -> Self {
        Self::Good
    }
}
