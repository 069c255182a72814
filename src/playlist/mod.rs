//! Playlist decoding subsystem
//!
//! One decode worker per playlist turns the item list into a stream of
//! reference-counted PCM buffers, fanned out to sinks grouped by output
//! format. See [`engine::Playlist`] for the consumer-facing surface.

pub mod buffer;
pub mod engine;
pub mod filter;
pub mod item;
pub mod queue;
pub mod sink;
pub mod sink_map;
pub mod worker;

pub use buffer::PcmBuffer;
pub use engine::Playlist;
pub use item::ItemId;
pub use sink::{BufferResult, Sink, SinkObserver};
