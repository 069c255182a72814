//! Core audio data types
//!
//! Defines the sample format, channel layout, and stream format structures
//! used throughout the decode pipeline. These are plain value types; all
//! byte-rate arithmetic the engine needs lives here.

use serde::{Deserialize, Serialize};

/// PCM sample representation.
///
/// Packed variants interleave channels in a single plane; planar variants
/// carry one plane per channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleFormat {
    /// Unsigned 8-bit, interleaved
    U8,
    /// Signed 16-bit, interleaved
    S16,
    /// Signed 32-bit, interleaved
    S32,
    /// 32-bit float, interleaved
    F32,
    /// 64-bit float, interleaved
    F64,
    /// Unsigned 8-bit, planar
    U8Planar,
    /// Signed 16-bit, planar
    S16Planar,
    /// Signed 32-bit, planar
    S32Planar,
    /// 32-bit float, planar
    F32Planar,
    /// 64-bit float, planar
    F64Planar,
}

impl SampleFormat {
    /// Size of a single sample in bytes
    pub fn bytes_per_sample(self) -> usize {
        match self {
            SampleFormat::U8 | SampleFormat::U8Planar => 1,
            SampleFormat::S16 | SampleFormat::S16Planar => 2,
            SampleFormat::S32 | SampleFormat::S32Planar => 4,
            SampleFormat::F32 | SampleFormat::F32Planar => 4,
            SampleFormat::F64 | SampleFormat::F64Planar => 8,
        }
    }

    /// Whether channels are stored in separate planes
    pub fn is_planar(self) -> bool {
        matches!(
            self,
            SampleFormat::U8Planar
                | SampleFormat::S16Planar
                | SampleFormat::S32Planar
                | SampleFormat::F32Planar
                | SampleFormat::F64Planar
        )
    }
}

/// Channel layout as a speaker-position bitmask.
///
/// One bit per speaker position; the channel count is the popcount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelLayout(pub u64);

impl ChannelLayout {
    pub const FRONT_LEFT: u64 = 0x1;
    pub const FRONT_RIGHT: u64 = 0x2;
    pub const FRONT_CENTER: u64 = 0x4;

    /// Single center channel
    pub const MONO: ChannelLayout = ChannelLayout(Self::FRONT_CENTER);
    /// Front left + front right
    pub const STEREO: ChannelLayout = ChannelLayout(Self::FRONT_LEFT | Self::FRONT_RIGHT);

    /// Number of channels in this layout
    pub fn count(self) -> usize {
        self.0.count_ones() as usize
    }
}

/// Complete description of a PCM stream format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AudioFormat {
    /// Samples per second per channel
    pub sample_rate: u32,

    /// Speaker-position bitmask
    pub channel_layout: ChannelLayout,

    /// Sample representation
    pub sample_format: SampleFormat,
}

impl AudioFormat {
    pub fn new(sample_rate: u32, channel_layout: ChannelLayout, sample_format: SampleFormat) -> Self {
        Self {
            sample_rate,
            channel_layout,
            sample_format,
        }
    }

    /// Number of channels
    pub fn channels(&self) -> usize {
        self.channel_layout.count()
    }

    /// Bytes occupied by one frame (one sample across all channels)
    pub fn bytes_per_frame(&self) -> usize {
        self.channels() * self.sample_format.bytes_per_sample()
    }

    /// Bytes produced by one second of audio in this format
    pub fn bytes_per_sec(&self) -> usize {
        self.bytes_per_frame() * self.sample_rate as usize
    }
}

/// Exact rational number, used for packet timestamp time bases
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rational {
    pub num: i32,
    pub den: i32,
}

impl Rational {
    pub fn new(num: i32, den: i32) -> Self {
        Self { num, den }
    }

    /// Approximate as a float; zero denominator yields 0.0
    pub fn to_f64(self) -> f64 {
        if self.den == 0 {
            0.0
        } else {
            self.num as f64 / self.den as f64
        }
    }
}
