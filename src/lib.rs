//! # segue
//!
//! Playlist decoder engine: feed it a list of audio sources and it
//! continuously produces decoded, filtered, reference-counted PCM buffers
//! for any number of heterogeneous consumers.
//!
//! **Purpose:** gapless decode of a playlist into bounded per-sink queues,
//! with per-item gain, idempotent play/pause/seek, and backpressure so a
//! fast decoder never outruns slow consumers.
//!
//! **Architecture:** one decode worker per [`Playlist`] drives an external
//! media framework (packets, frame decoding, and a
//! `source -> volume -> split -> format -> terminal` filter graph reached
//! through the traits in [`media`]). Sinks that share an output format are
//! grouped so each distinct format is rendered exactly once; the resulting
//! buffers are shared by reference count across the group's queues.
//!
//! A pure-Rust [`media::SoftwareFramework`] implements the framework
//! contract for tests and for embedders without a native graph library.

pub mod audio;
pub mod config;
pub mod error;
pub mod media;
pub mod playlist;

pub use audio::{AudioFormat, ChannelLayout, Rational, SampleFormat};
pub use config::{FillMode, PlaylistConfig, SinkConfig, DEFAULT_SINK_BUFFER_FRAMES};
pub use error::{Error, Result};
pub use media::{
    File, FilterGraph, Frame, FrameDecoder, MediaFramework, MediaSource, NodeId, Packet, Pull,
    SoftwareFramework, StreamInfo,
};
pub use playlist::{BufferResult, ItemId, PcmBuffer, Playlist, Sink, SinkObserver};
