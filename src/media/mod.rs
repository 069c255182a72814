//! Media framework seam
//!
//! The engine does not decode, resample, or convert audio itself; it drives
//! an external media framework through the traits in this module. A
//! framework supplies demuxed packets ([`MediaSource`]), frame-level
//! decoding ([`FrameDecoder`]), and a configurable filter graph
//! ([`FilterGraph`]) with `source`, `volume`, `split`, `format`, and
//! `terminal` nodes.
//!
//! [`File`] is the engine-side wrapper around one source/decoder pair. It
//! owns the seek request state, the abort flag, and the running audio clock
//! that the decode worker maintains while packets flow.

pub mod graph;

use crate::audio::{AudioFormat, ChannelLayout, Rational, SampleFormat};
use crate::error::Result;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

pub use graph::SoftwareFramework;

/// Description of the audio stream currently exposed by a source.
///
/// The decode worker compares this against the values the filter graph was
/// built with; any difference forces a graph rebuild.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamInfo {
    /// Index of the audio stream within the container
    pub stream_index: usize,

    pub sample_rate: u32,
    pub channel_layout: ChannelLayout,
    pub sample_format: SampleFormat,

    /// Time base for packet timestamps
    pub time_base: Rational,

    /// Container start offset in `time_base` units, if known
    pub start_time: Option<i64>,
}

impl StreamInfo {
    /// The stream's PCM format
    pub fn format(&self) -> AudioFormat {
        AudioFormat::new(self.sample_rate, self.channel_layout, self.sample_format)
    }
}

/// One compressed packet read from a source.
#[derive(Debug, Clone)]
pub struct Packet {
    /// Container stream this packet belongs to
    pub stream_index: usize,

    /// Presentation timestamp in the stream time base, if present
    pub pts: Option<i64>,

    /// Opaque compressed payload, interpreted by the paired decoder
    pub data: Vec<u8>,
}

/// One decoded (or filtered) block of PCM.
#[derive(Debug, Clone)]
pub struct Frame {
    pub format: AudioFormat,

    /// Number of samples per channel
    pub frame_count: usize,

    /// Channel-planar PCM: one plane for packed formats, one per channel
    /// for planar formats
    pub planes: Vec<Vec<u8>>,

    /// Presentation timestamp in the stream time base, if present
    pub pts: Option<i64>,
}

impl Frame {
    /// Total payload size in bytes
    pub fn byte_size(&self) -> usize {
        self.frame_count * self.format.bytes_per_frame()
    }
}

/// Result of pulling from a filter graph terminal.
#[derive(Debug)]
pub enum Pull {
    /// A filtered frame is available
    Frame(Frame),
    /// Not enough buffered data; feed more input
    Again,
    /// The graph is drained and will produce nothing further
    Eof,
}

/// Handle to a node inside a [`FilterGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub usize);

/// Demuxed packet source for one opaque media file.
///
/// Only the decode worker calls into a source; implementations do not need
/// internal synchronisation beyond `Send`.
pub trait MediaSource: Send {
    /// Current audio stream parameters. May change between packets; the
    /// engine re-reads this every decode step.
    fn stream_info(&self) -> StreamInfo;

    /// Read the next packet. `Ok(None)` is end of file.
    fn read_packet(&mut self) -> Result<Option<Packet>>;

    /// Seek to `ts` in the stream time base.
    fn seek(&mut self, ts: i64) -> Result<()>;

    /// Suspend reading (network sources may drop the connection).
    fn pause(&mut self) {}

    /// Resume reading after [`MediaSource::pause`].
    fn resume(&mut self) {}
}

/// Frame-level audio decoder paired with a [`MediaSource`].
pub trait FrameDecoder: Send {
    /// Decode one packet into zero or more PCM frames.
    fn decode(&mut self, packet: &Packet) -> Result<Vec<Frame>>;

    /// Pull one delayed frame after end of input. Only meaningful when
    /// [`FrameDecoder::has_delay`] reports true.
    fn drain(&mut self) -> Result<Option<Frame>> {
        Ok(None)
    }

    /// Discard internal decoder state (called after a seek).
    fn flush(&mut self);

    /// Whether the codec buffers frames that must be drained at EOF.
    fn has_delay(&self) -> bool {
        false
    }
}

/// A filter graph built once per input format + sink-group configuration.
///
/// The engine always builds the same topology: one source, an optional
/// volume node, an optional split node, and per group an optional format
/// node followed by a terminal.
pub trait FilterGraph: Send {
    fn add_source(&mut self, info: &StreamInfo) -> NodeId;
    fn add_volume(&mut self, gain: f64) -> NodeId;
    fn add_split(&mut self, fan_out: usize) -> NodeId;
    fn add_format(&mut self, target: &AudioFormat) -> NodeId;
    fn add_terminal(&mut self) -> NodeId;

    /// Connect `src` output pad `src_pad` to `dst` input pad `dst_pad`.
    fn link(&mut self, src: NodeId, src_pad: usize, dst: NodeId, dst_pad: usize) -> Result<()>;

    /// Validate and finalise the graph; required before any write or read.
    fn configure(&mut self) -> Result<()>;

    /// Push one decoded frame into the source node.
    fn write_frame(&mut self, source: NodeId, frame: &Frame) -> Result<()>;

    /// Signal end of input; terminals then release buffered remainders.
    fn write_eof(&mut self, source: NodeId) -> Result<()>;

    /// Pull whatever is available from a terminal as one frame.
    fn read_frame(&mut self, terminal: NodeId) -> Result<Pull>;

    /// Pull exactly `sample_count` samples per channel, or report
    /// [`Pull::Again`] until that many are buffered. After EOF a shorter
    /// final frame is returned.
    fn read_samples(&mut self, terminal: NodeId, sample_count: usize) -> Result<Pull>;
}

/// Factory for filter graphs; the engine rebuilds graphs as formats,
/// sink membership, or volume change.
pub trait MediaFramework: Send + Sync {
    fn create_graph(&self) -> Box<dyn FilterGraph>;
}

/// Pending seek request and end-of-file state for one file.
///
/// Mutated by `Playlist::seek`/`insert` and consumed by the decode worker
/// under the same lock.
#[derive(Debug, Default)]
pub(crate) struct SeekState {
    /// Target in stream time base units; `None` when no seek is pending
    pub pos: Option<i64>,

    /// Whether satisfying the seek must also flush every sink queue
    pub flush: bool,

    /// Set when the source reported end of file (or a read error)
    pub eof: bool,
}

/// An opened media file as the engine sees it: a packet source, its
/// decoder, and the per-file state the playlist coordinates on.
///
/// Opening and probing are a framework concern; the engine receives files
/// fully constructed.
pub struct File {
    source: Mutex<Box<dyn MediaSource>>,
    decoder: Mutex<Box<dyn FrameDecoder>>,
    seek: Mutex<SeekState>,
    abort: AtomicBool,

    /// Running presentation clock in seconds, stored as f64 bits so readers
    /// never need the source lock
    clock_bits: AtomicU64,
}

impl File {
    pub fn new(source: Box<dyn MediaSource>, decoder: Box<dyn FrameDecoder>) -> Self {
        Self {
            source: Mutex::new(source),
            decoder: Mutex::new(decoder),
            seek: Mutex::new(SeekState::default()),
            abort: AtomicBool::new(false),
            clock_bits: AtomicU64::new(0.0f64.to_bits()),
        }
    }

    /// Current audio stream parameters
    pub fn stream_info(&self) -> StreamInfo {
        self.source.lock().unwrap().stream_info()
    }

    /// Presentation position of the most recently decoded packet, in seconds
    pub fn audio_clock(&self) -> f64 {
        f64::from_bits(self.clock_bits.load(Ordering::Relaxed))
    }

    /// Request that the decode worker stop consuming this file; the current
    /// item then ends as if the stream had finished.
    pub fn request_abort(&self) {
        self.abort.store(true, Ordering::Release);
    }

    /// Whether an abort has been requested
    pub fn abort_requested(&self) -> bool {
        self.abort.load(Ordering::Acquire)
    }

    pub(crate) fn set_audio_clock(&self, seconds: f64) {
        self.clock_bits.store(seconds.to_bits(), Ordering::Relaxed);
    }

    pub(crate) fn source(&self) -> MutexGuard<'_, Box<dyn MediaSource>> {
        self.source.lock().unwrap()
    }

    pub(crate) fn decoder(&self) -> MutexGuard<'_, Box<dyn FrameDecoder>> {
        self.decoder.lock().unwrap()
    }

    pub(crate) fn seek_state(&self) -> MutexGuard<'_, SeekState> {
        self.seek.lock().unwrap()
    }

    /// Record a pending seek; the decode worker performs it at the start of
    /// its next step for this file.
    pub(crate) fn request_seek(&self, ts: i64, flush: bool) {
        let mut seek = self.seek.lock().unwrap();
        seek.pos = Some(ts);
        seek.flush = flush;
    }

    pub(crate) fn set_eof(&self) {
        self.seek.lock().unwrap().eof = true;
    }

    pub(crate) fn is_eof(&self) -> bool {
        self.seek.lock().unwrap().eof
    }
}

impl std::fmt::Debug for File {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("File")
            .field("audio_clock", &self.audio_clock())
            .field("abort_requested", &self.abort_requested())
            .finish()
    }
}
