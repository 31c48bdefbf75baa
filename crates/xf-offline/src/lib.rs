//! XF-Offline: two-source crossfade mixdown
//!
//! Mixes two decoded sources at a single crossfade position and produces a
//! 16-bit PCM WAV container plus an MP3 stream.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                          MixPipeline                             │
//! │                                                                  │
//! │  crossfade ─→ gains() ─┐                                         │
//! │                        ▼                                         │
//! │  ┌─────────┐   ┌────────────────┐   ┌──────────────┐   ┌───────┐ │
//! │  │ Source  │ → │ OfflineRenderer│ → │ PcmQuantizer │ → │  MP3  │ │
//! │  │ A + B   │   │ (gain-sum)     │   │ (WAV 16-bit) │   │ frames│ │
//! │  └─────────┘   └────────────────┘   └──────────────┘   └───────┘ │
//! │                                                                  │
//! │  Idle → Rendering → Quantizing → Mp3Encoding → Done | Failed     │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use xf_offline::{AudioDecoder, MixConfig, MixPipeline};
//!
//! let first = AudioDecoder::decode(Path::new("a.wav"))?;
//! let second = AudioDecoder::decode(Path::new("b.wav"))?;
//!
//! let pipeline = MixPipeline::new(MixConfig::default().with_bitrate(192));
//! let output = pipeline.start(&first, &second, 0.25)?;
//!
//! std::fs::write("mix.mp3", output.mp3.to_bytes())?;
//! ```

mod buffer;
mod config;
mod decoder;
mod encoder;
mod error;
mod gain;
mod pipeline;
mod render;
mod wav;

pub use buffer::*;
pub use config::*;
pub use decoder::*;
pub use encoder::*;
pub use error::*;
pub use gain::*;
pub use pipeline::*;
pub use render::*;
pub use wav::*;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
