//! Reference-counted PCM buffers
//!
//! A [`PcmBuffer`] carries one filtered frame together with its provenance:
//! the playlist item it was decoded from and its presentation position.
//! Buffers are immutable after publication and shared between every sink in
//! a format group; the `Arc` holding one is its reference count, and the
//! frame storage is released when the last holder drops.

use crate::audio::AudioFormat;
use crate::media::Frame;
use crate::playlist::item::ItemId;
use std::sync::Arc;

/// One decoded, filtered block of PCM delivered to sinks
#[derive(Debug)]
pub struct PcmBuffer {
    frame: Frame,
    item: ItemId,
    pos: f64,
}

impl PcmBuffer {
    pub(crate) fn new(frame: Frame, item: ItemId, pos: f64) -> Self {
        Self { frame, item, pos }
    }

    /// Channel-planar PCM payload (one plane for packed formats)
    pub fn data(&self) -> &[Vec<u8>] {
        &self.frame.planes
    }

    /// Samples per channel
    pub fn frame_count(&self) -> usize {
        self.frame.frame_count
    }

    pub fn format(&self) -> AudioFormat {
        self.frame.format
    }

    /// Payload size in bytes
    pub fn byte_size(&self) -> usize {
        self.frame.byte_size()
    }

    /// Presentation position in the source item, in seconds
    pub fn pos(&self) -> f64 {
        self.pos
    }

    /// The playlist item this buffer was decoded from. Only meaningful for
    /// identity comparison; the item may have been removed since.
    pub fn item(&self) -> ItemId {
        self.item
    }
}

/// Element of a sink queue.
///
/// End of playlist is a distinguished variant rather than a sentinel
/// buffer, so consumers can tell a drained playlist from an underrun
/// without any aliasing tricks.
#[derive(Debug, Clone)]
pub(crate) enum QueueEntry {
    Pcm(Arc<PcmBuffer>),
    EndOfPlaylist,
}
