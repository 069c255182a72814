//! Engine configuration types
//!
//! Serde-derived settings for sinks and playlists, with the engine defaults
//! attached via `Default` impls.

use crate::audio::AudioFormat;
use serde::{Deserialize, Serialize};

/// Default sink queue capacity, in frames of the sink's output format
pub const DEFAULT_SINK_BUFFER_FRAMES: usize = 8192;

/// When the decode worker stops producing because consumers lag behind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FillMode {
    /// Block only when every attached sink is at or above its fill target
    #[default]
    AllSinksFull,

    /// Block as soon as any attached sink reaches its fill target
    AnySinkFull,
}

/// Configuration for one sink
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkConfig {
    /// Output format this sink wants to receive
    pub format: AudioFormat,

    /// Fixed samples-per-buffer, or 0 to accept variable-size frames
    #[serde(default)]
    pub buffer_sample_count: usize,

    /// Queue fill target in frames of the output format
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,

    /// Deliver the source format untouched instead of converting
    #[serde(default)]
    pub disable_resample: bool,
}

fn default_buffer_size() -> usize {
    DEFAULT_SINK_BUFFER_FRAMES
}

impl SinkConfig {
    /// Sink configuration with the default queue capacity and variable-size
    /// frames
    pub fn new(format: AudioFormat) -> Self {
        Self {
            format,
            buffer_sample_count: 0,
            buffer_size: DEFAULT_SINK_BUFFER_FRAMES,
            disable_resample: false,
        }
    }
}

/// Configuration for a playlist
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaylistConfig {
    /// Initial playlist volume (linear)
    #[serde(default = "default_volume")]
    pub volume: f64,

    /// Backpressure rule
    #[serde(default)]
    pub fill_mode: FillMode,
}

fn default_volume() -> f64 {
    1.0
}

impl Default for PlaylistConfig {
    fn default() -> Self {
        Self {
            volume: 1.0,
            fill_mode: FillMode::default(),
        }
    }
}
