//! Core audio data types shared by the engine and the media framework seam.

pub mod types;

pub use types::{AudioFormat, ChannelLayout, Rational, SampleFormat};
