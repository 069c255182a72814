//! Shared helpers for integration tests: synthetic media sources, a
//! counting framework wrapper, and consumer-side collection utilities.

#![allow(dead_code)]

use segue::{
    AudioFormat, BufferResult, ChannelLayout, File, FilterGraph, Frame, FrameDecoder, ItemId,
    MediaFramework, MediaSource, Packet, PcmBuffer, Rational, Result, SampleFormat, Sink,
    SoftwareFramework, StreamInfo,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Once};
use std::time::{Duration, Instant};

static TRACING: Once = Once::new();

/// Install a tracing subscriber once for the whole test binary; respects
/// RUST_LOG.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Deterministic sample value for an absolute frame index: a short ramp,
/// identical on every channel so mono mixdowns preserve it.
pub fn ramp_sample(frame_index: u64) -> f32 {
    ((frame_index % 441) as f32) / 441.0 - 0.5
}

/// Synthetic packet source producing a fixed number of deterministic f32
/// frames, split into packets of `packet_frames`.
pub struct ToneSource {
    info: StreamInfo,
    total_frames: u64,
    cursor: u64,
    packet_frames: u64,
    with_pts: bool,
    pub pauses: Arc<AtomicUsize>,
    pub resumes: Arc<AtomicUsize>,
}

impl ToneSource {
    pub fn new(sample_rate: u32, channel_layout: ChannelLayout, seconds: f64) -> Self {
        let info = StreamInfo {
            stream_index: 0,
            sample_rate,
            channel_layout,
            sample_format: SampleFormat::F32,
            time_base: Rational::new(1, sample_rate as i32),
            start_time: None,
        };
        Self {
            info,
            total_frames: (seconds * sample_rate as f64) as u64,
            cursor: 0,
            packet_frames: 1024,
            with_pts: true,
            pauses: Arc::new(AtomicUsize::new(0)),
            resumes: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn without_pts(mut self) -> Self {
        self.with_pts = false;
        self
    }

    pub fn packet_frames(mut self, frames: u64) -> Self {
        self.packet_frames = frames;
        self
    }
}

impl MediaSource for ToneSource {
    fn stream_info(&self) -> StreamInfo {
        self.info
    }

    fn read_packet(&mut self) -> Result<Option<Packet>> {
        if self.cursor >= self.total_frames {
            return Ok(None);
        }
        let frames = self.packet_frames.min(self.total_frames - self.cursor);
        let channels = self.info.channel_layout.count();
        let mut data = Vec::with_capacity(frames as usize * channels * 4);
        for i in 0..frames {
            let sample = ramp_sample(self.cursor + i);
            for _ in 0..channels {
                data.extend_from_slice(&sample.to_le_bytes());
            }
        }
        let pts = self.with_pts.then_some(self.cursor as i64);
        self.cursor += frames;
        Ok(Some(Packet {
            stream_index: 0,
            pts,
            data,
        }))
    }

    fn seek(&mut self, ts: i64) -> Result<()> {
        self.cursor = (ts.max(0) as u64).min(self.total_frames);
        Ok(())
    }

    fn pause(&mut self) {
        self.pauses.fetch_add(1, Ordering::SeqCst);
    }

    fn resume(&mut self) {
        self.resumes.fetch_add(1, Ordering::SeqCst);
    }
}

/// Decoder for ToneSource packets: the payload already is interleaved f32.
pub struct PcmPassthroughDecoder {
    format: AudioFormat,
}

impl PcmPassthroughDecoder {
    pub fn new(format: AudioFormat) -> Self {
        Self { format }
    }
}

impl FrameDecoder for PcmPassthroughDecoder {
    fn decode(&mut self, packet: &Packet) -> Result<Vec<Frame>> {
        let channels = self.format.channels();
        let frame_count = packet.data.len() / (4 * channels);
        Ok(vec![Frame {
            format: self.format,
            frame_count,
            planes: vec![packet.data.clone()],
            pts: packet.pts,
        }])
    }

    fn flush(&mut self) {}
}

/// Build an opened file over a synthetic source.
pub fn tone_file(sample_rate: u32, channel_layout: ChannelLayout, seconds: f64) -> Arc<File> {
    let source = ToneSource::new(sample_rate, channel_layout, seconds);
    let format = source.stream_info().format();
    Arc::new(File::new(
        Box::new(source),
        Box::new(PcmPassthroughDecoder::new(format)),
    ))
}

pub fn tone_file_from(source: ToneSource) -> Arc<File> {
    let format = source.stream_info().format();
    Arc::new(File::new(
        Box::new(source),
        Box::new(PcmPassthroughDecoder::new(format)),
    ))
}

/// Framework wrapper counting graph builds.
pub struct CountingFramework {
    inner: SoftwareFramework,
    pub builds: Arc<AtomicUsize>,
}

impl CountingFramework {
    pub fn new() -> Self {
        Self {
            inner: SoftwareFramework,
            builds: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl MediaFramework for CountingFramework {
    fn create_graph(&self) -> Box<dyn FilterGraph> {
        self.builds.fetch_add(1, Ordering::SeqCst);
        self.inner.create_graph()
    }
}

pub fn software_framework() -> Arc<dyn MediaFramework> {
    Arc::new(SoftwareFramework)
}

/// Poll a sink until end of playlist, collecting every buffer. Panics when
/// the deadline passes first.
pub fn collect_until_end(sink: &Sink, timeout: Duration) -> Vec<Arc<PcmBuffer>> {
    let deadline = Instant::now() + timeout;
    let mut out = Vec::new();
    loop {
        match sink.buffer_get(false) {
            BufferResult::Buffer(buffer) => out.push(buffer),
            BufferResult::EndOfPlaylist => return out,
            BufferResult::NotReady => {
                assert!(
                    Instant::now() < deadline,
                    "timed out after {} buffers",
                    out.len()
                );
                std::thread::sleep(Duration::from_millis(1));
            }
        }
    }
}

/// Poll for one buffer with a deadline; end-of-playlist panics.
pub fn next_buffer(sink: &Sink, timeout: Duration) -> Arc<PcmBuffer> {
    let deadline = Instant::now() + timeout;
    loop {
        match sink.buffer_get(false) {
            BufferResult::Buffer(buffer) => return buffer,
            BufferResult::EndOfPlaylist => panic!("unexpected end of playlist"),
            BufferResult::NotReady => {
                assert!(Instant::now() < deadline, "timed out waiting for a buffer");
                std::thread::sleep(Duration::from_millis(1));
            }
        }
    }
}

/// Wait until `cond` holds, polling; panics at the deadline.
pub fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) {
    let deadline = Instant::now() + timeout;
    while !cond() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        std::thread::sleep(Duration::from_millis(2));
    }
}

/// Total frames across a buffer run
pub fn total_frames(buffers: &[Arc<PcmBuffer>]) -> usize {
    buffers.iter().map(|b| b.frame_count()).sum()
}

/// Total bytes across a buffer run
pub fn total_bytes(buffers: &[Arc<PcmBuffer>]) -> usize {
    buffers.iter().map(|b| b.byte_size()).sum()
}

/// Concatenate the delivered payload (first plane) of a run
pub fn concat_payload(buffers: &[Arc<PcmBuffer>]) -> Vec<u8> {
    let mut out = Vec::new();
    for buffer in buffers {
        for plane in buffer.data() {
            out.extend_from_slice(plane);
        }
    }
    out
}

/// Assert positions are non-decreasing per item within a run
pub fn assert_monotonic_pos(buffers: &[Arc<PcmBuffer>]) {
    let mut last: Option<(ItemId, f64)> = None;
    for buffer in buffers {
        if let Some((item, pos)) = last {
            if item == buffer.item() {
                assert!(
                    buffer.pos() >= pos,
                    "position went backwards within an item: {} -> {}",
                    pos,
                    buffer.pos()
                );
            }
        }
        last = Some((buffer.item(), buffer.pos()));
    }
}
