//! Sink: a consumer handle on a playlist
//!
//! A sink names the output format it wants, how large its buffer backlog
//! may grow, and optionally a fixed samples-per-buffer. Attaching it to a
//! playlist places it in the sink map (grouped with format-equivalent
//! peers) and from then on the decode worker feeds its queue; the consumer
//! thread drains it with [`Sink::buffer_get`].
//!
//! [`Sink`] is a cheap handle over shared state; clones refer to the same
//! sink. The playlist's sink map keeps one clone while attached.
//!
//! Backpressure accounting: every queued buffer adds its byte size to an
//! atomic gauge, and every consumed buffer subtracts it. When consumption
//! drops the gauge below the sink's fill target, the playlist's drain
//! condition is signalled so a blocked worker resumes.

use crate::audio::AudioFormat;
use crate::config::SinkConfig;
use crate::error::{Error, Result};
use crate::playlist::buffer::{PcmBuffer, QueueEntry};
use crate::playlist::engine::{Playlist, Shared};
use crate::playlist::item::ItemId;
use crate::playlist::queue::{BufferQueue, QueueHooks};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};
use tracing::{debug, info};

/// Outcome of reading from a sink
#[derive(Debug, Clone)]
pub enum BufferResult {
    /// A decoded buffer
    Buffer(Arc<PcmBuffer>),

    /// The playlist has fully drained; no further buffers until new items
    /// are inserted
    EndOfPlaylist,

    /// Nothing available (non-blocking read, underrun, or the sink was
    /// detached)
    NotReady,
}

/// Optional callbacks a consumer can install on a sink.
///
/// Callbacks run on engine threads with internal locks held; they must
/// return quickly and must not call back into the playlist or the sink.
pub trait SinkObserver: Send + Sync {
    /// The sink's queue was flushed (seek or detach).
    fn on_flush(&self) {}

    /// A playlist item was removed; any state keyed on it must be dropped.
    fn on_purge(&self, _item: ItemId) {}
}

/// Byte gauge shared between the sink and its queue hooks
struct SinkGauge {
    queued_bytes: AtomicUsize,
    min_queue_bytes: usize,

    /// Set while attached; used to signal the drain condition
    coordinator: Mutex<Weak<Shared>>,
}

struct GaugeHooks {
    gauge: Arc<SinkGauge>,
}

impl QueueHooks for GaugeHooks {
    fn on_put(&self, buffer: &Arc<PcmBuffer>) {
        self.gauge
            .queued_bytes
            .fetch_add(buffer.byte_size(), Ordering::Relaxed);
    }

    fn on_get(&self, buffer: &Arc<PcmBuffer>) {
        let size = buffer.byte_size();
        let prev = self.gauge.queued_bytes.fetch_sub(size, Ordering::Relaxed);
        if prev.saturating_sub(size) < self.gauge.min_queue_bytes {
            if let Some(shared) = self.gauge.coordinator.lock().unwrap().upgrade() {
                shared.drain_cond.notify_one();
            }
        }
    }

    fn on_cleanup(&self, buffer: &Arc<PcmBuffer>) {
        self.gauge
            .queued_bytes
            .fetch_sub(buffer.byte_size(), Ordering::Relaxed);
    }
}

struct SinkInner {
    format: AudioFormat,
    buffer_sample_count: usize,
    buffer_size: usize,
    disable_resample: bool,
    bytes_per_sec: usize,

    gauge: Arc<SinkGauge>,
    queue: BufferQueue,
    observer: Mutex<Option<Arc<dyn SinkObserver>>>,
    attached: Mutex<Option<Weak<Shared>>>,
}

/// A consumer of decoded buffers in one output format
#[derive(Clone)]
pub struct Sink {
    inner: Arc<SinkInner>,
}

impl Sink {
    /// Create a detached sink.
    pub fn new(config: SinkConfig) -> Self {
        let bytes_per_frame = config.format.bytes_per_frame();
        let gauge = Arc::new(SinkGauge {
            queued_bytes: AtomicUsize::new(0),
            min_queue_bytes: config.buffer_size * bytes_per_frame,
            coordinator: Mutex::new(Weak::new()),
        });

        Self {
            inner: Arc::new(SinkInner {
                format: config.format,
                buffer_sample_count: config.buffer_sample_count,
                buffer_size: config.buffer_size,
                disable_resample: config.disable_resample,
                bytes_per_sec: config.format.bytes_per_sec(),
                queue: BufferQueue::new(Arc::new(GaugeHooks {
                    gauge: gauge.clone(),
                })),
                gauge,
                observer: Mutex::new(None),
                attached: Mutex::new(None),
            }),
        }
    }

    /// Install callbacks for flush and purge events. Typically done before
    /// attaching.
    pub fn set_observer(&self, observer: Arc<dyn SinkObserver>) {
        *self.inner.observer.lock().unwrap() = Some(observer);
    }

    pub fn format(&self) -> AudioFormat {
        self.inner.format
    }

    /// Fixed samples-per-buffer, or 0 for variable-size frames
    pub fn buffer_sample_count(&self) -> usize {
        self.inner.buffer_sample_count
    }

    /// Queue fill target in frames
    pub fn buffer_size(&self) -> usize {
        self.inner.buffer_size
    }

    pub fn disable_resample(&self) -> bool {
        self.inner.disable_resample
    }

    /// Byte rate of one second of output in this sink's format
    pub fn bytes_per_sec(&self) -> usize {
        self.inner.bytes_per_sec
    }

    /// Bytes currently queued and unconsumed
    pub fn queued_bytes(&self) -> usize {
        self.inner.gauge.queued_bytes.load(Ordering::Relaxed)
    }

    /// Queue fill target in bytes
    pub fn min_queue_bytes(&self) -> usize {
        self.inner.gauge.min_queue_bytes
    }

    /// Whether two handles refer to the same sink
    pub(crate) fn same_sink(&self, other: &Sink) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Attach this sink to a playlist. The worker starts (or resumes)
    /// rendering this sink's format group immediately.
    pub fn attach(&self, playlist: &Playlist) -> Result<()> {
        let mut attached = self.inner.attached.lock().unwrap();
        if attached.is_some() {
            return Err(Error::SinkAlreadyAttached);
        }

        info!(
            "attaching sink: queue target {} bytes, {} bytes/sec",
            self.inner.gauge.min_queue_bytes, self.inner.bytes_per_sec
        );

        let shared = playlist.shared();
        {
            let mut state = shared.state.lock().unwrap();
            let first_attach = state.sink_map.is_empty();
            state.sink_map.add(self.clone());
            state.rebuild_graph = true;
            // a worker idle because no sink existed (or all were full) must
            // re-evaluate now
            shared.drain_cond.notify_one();
            if first_attach {
                shared.decode_head_cond.notify_one();
            }
        }

        *self.inner.gauge.coordinator.lock().unwrap() = Arc::downgrade(&shared);
        self.inner.queue.reset();
        *attached = Some(Arc::downgrade(&shared));
        Ok(())
    }

    /// Detach from the playlist. The queue is aborted and flushed first so
    /// a blocked consumer observes `NotReady` before the sink leaves the
    /// map.
    pub fn detach(&self) -> Result<()> {
        let mut attached = self.inner.attached.lock().unwrap();
        let shared = attached.take().ok_or(Error::SinkNotAttached)?;

        self.inner.queue.abort();
        self.flush_queue();

        if let Some(shared) = shared.upgrade() {
            let mut state = shared.state.lock().unwrap();
            state.sink_map.remove(self)?;
            state.rebuild_graph = true;
            shared.drain_cond.notify_one();
        }

        *self.inner.gauge.coordinator.lock().unwrap() = Weak::new();
        debug!("sink detached");
        Ok(())
    }

    /// Dequeue one buffer. With `blocking`, waits until a buffer arrives,
    /// the playlist drains, or the sink is detached.
    pub fn buffer_get(&self, blocking: bool) -> BufferResult {
        match self.inner.queue.get(blocking) {
            Some(QueueEntry::Pcm(buffer)) => BufferResult::Buffer(buffer),
            Some(QueueEntry::EndOfPlaylist) => BufferResult::EndOfPlaylist,
            None => BufferResult::NotReady,
        }
    }

    /// Report availability without consuming.
    pub fn buffer_peek(&self, blocking: bool) -> bool {
        self.inner.queue.peek(blocking)
    }

    pub(crate) fn enqueue(&self, entry: QueueEntry) -> Result<()> {
        self.inner.queue.put(entry)
    }

    pub(crate) fn signal_end(&self) {
        // ignore failure: an aborted queue belongs to a detaching sink
        let _ = self.inner.queue.put(QueueEntry::EndOfPlaylist);
    }

    /// Queue full relative to the fill target
    pub(crate) fn is_full(&self) -> bool {
        self.queued_bytes() >= self.inner.gauge.min_queue_bytes
    }

    pub(crate) fn flush_queue(&self) {
        self.inner.queue.flush();
        if let Some(observer) = self.inner.observer.lock().unwrap().clone() {
            observer.on_flush();
        }
    }

    /// Drop every queued buffer decoded from `item`, then notify the
    /// observer.
    pub(crate) fn purge_item(&self, item: ItemId) {
        self.inner.queue.purge(|buffer| buffer.item() == item);
        if let Some(observer) = self.inner.observer.lock().unwrap().clone() {
            observer.on_purge(item);
        }
    }
}

impl std::fmt::Debug for Sink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sink")
            .field("format", &self.inner.format)
            .field("buffer_size", &self.inner.buffer_size)
            .field("buffer_sample_count", &self.inner.buffer_sample_count)
            .field("disable_resample", &self.inner.disable_resample)
            .field("queued_bytes", &self.queued_bytes())
            .finish()
    }
}
