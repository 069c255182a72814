//! Playlist: the consumer-facing engine handle
//!
//! A playlist owns a doubly-linked list of items, the sink map, and the
//! decode worker thread. All list and sink-map mutation happens under one
//! coordinator mutex with two conditions on it: `decode_head_cond` wakes
//! the worker when there is something to decode again, `drain_cond` wakes
//! it when backpressure lifts.
//!
//! Lock order: coordinator, then a file's seek state, then (producer side
//! only) a sink queue. A queue never takes the coordinator mutex; queue
//! hooks signal `drain_cond` without locking it.

use crate::config::{FillMode, PlaylistConfig};
use crate::error::{Error, Result};
use crate::media::{File, MediaFramework};
use crate::playlist::item::{ItemId, ItemList};
use crate::playlist::sink_map::SinkMap;
use crate::playlist::worker;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use tracing::debug;

/// Everything guarded by the coordinator mutex
pub(crate) struct State {
    pub items: ItemList,

    /// Next item to decode from; `None` means the playlist has drained
    pub decode_head: Option<ItemId>,

    /// Playlist-wide volume (linear)
    pub volume: f64,

    /// `volume` multiplied by the decode head's gain; what the volume node
    /// is built from
    pub effective_volume: f64,

    pub fill_mode: FillMode,
    pub sink_map: SinkMap,

    /// Forces the next decode step to rebuild the filter graph
    pub rebuild_graph: bool,

    /// Whether the end-of-queue marker has been sent for the current drain
    pub sent_end_of_q: bool,
}

/// Coordinator shared between the playlist handle, the worker, and sinks
pub(crate) struct Shared {
    pub state: Mutex<State>,

    /// Signalled when the decode head becomes decodable again: insert into
    /// an empty list, seek, first sink attach, destruction
    pub decode_head_cond: Condvar,

    /// Signalled when a sink drains below its fill target, on attach, on
    /// remove, and at destruction
    pub drain_cond: Condvar,

    /// Sampled once per worker iteration; no lock required
    pub paused: AtomicBool,

    pub abort: AtomicBool,
}

/// The playlist decoder engine.
///
/// Dropping a playlist clears it, stops the decode worker, and detaches
/// every sink (their blocked consumers observe `NotReady`).
pub struct Playlist {
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
}

impl Playlist {
    /// Create an empty playlist with default configuration and start its
    /// decode worker.
    pub fn new(framework: Arc<dyn MediaFramework>) -> Result<Self> {
        Self::with_config(framework, PlaylistConfig::default())
    }

    pub fn with_config(framework: Arc<dyn MediaFramework>, config: PlaylistConfig) -> Result<Self> {
        let shared = Arc::new(Shared {
            state: Mutex::new(State {
                items: ItemList::new(),
                decode_head: None,
                volume: config.volume,
                effective_volume: config.volume,
                fill_mode: config.fill_mode,
                sink_map: SinkMap::new(),
                rebuild_graph: false,
                // starts true so an empty playlist does not race an
                // end-of-queue marker into a sink attached moments later
                sent_end_of_q: true,
            }),
            decode_head_cond: Condvar::new(),
            drain_cond: Condvar::new(),
            paused: AtomicBool::new(false),
            abort: AtomicBool::new(false),
        });

        let worker = std::thread::Builder::new()
            .name("segue-decode".into())
            .spawn({
                let shared = shared.clone();
                move || worker::run(shared, framework)
            })?;

        Ok(Self {
            shared,
            worker: Some(worker),
        })
    }

    pub(crate) fn shared(&self) -> Arc<Shared> {
        self.shared.clone()
    }

    /// Insert a file before `before`, or append when `before` is `None`
    /// (or no longer in the playlist). Inserting into an empty playlist
    /// starts decoding from the new item's beginning.
    pub fn insert(&self, file: Arc<File>, gain: f64, before: Option<ItemId>) -> ItemId {
        let mut state = self.shared.state.lock().unwrap();
        let was_empty = state.items.is_empty();
        let id = state.items.insert_before(file.clone(), gain, before);
        if was_empty {
            file.request_seek(0, false);
            state.decode_head = Some(id);
            self.shared.decode_head_cond.notify_one();
        }
        id
    }

    /// Remove an item. On return, no sink queue holds any buffer decoded
    /// from it.
    pub fn remove(&self, item: ItemId) -> Result<()> {
        let mut state = self.shared.state.lock().unwrap();
        if state.items.get(item).is_none() {
            return Err(Error::ItemNotFound);
        }

        // a removed decode head hands over to its successor
        if state.decode_head == Some(item) {
            state.decode_head = state.items.next(item);
        }

        let node = state.items.unlink(item);

        // every queue must be rid of references to the item before the
        // node is dropped; new buffers cannot appear while we hold the lock
        state.sink_map.for_each_sink(|sink| sink.purge_item(item));

        self.shared.drain_cond.notify_one();
        drop(state);
        drop(node);
        debug!("removed item {}", item);
        Ok(())
    }

    /// Remove every item.
    pub fn clear(&self) {
        loop {
            let head = self.shared.state.lock().unwrap().items.head();
            match head {
                Some(id) => {
                    let _ = self.remove(id);
                }
                None => break,
            }
        }
    }

    /// Number of items currently in the playlist
    pub fn count(&self) -> usize {
        self.shared.state.lock().unwrap().items.len()
    }

    /// Jump playback to `seconds` inside `item`. Queued buffers the
    /// consumers have not read yet are flushed when the seek is honoured.
    pub fn seek(&self, item: ItemId, seconds: f64) -> Result<()> {
        let mut state = self.shared.state.lock().unwrap();
        let node = state.items.get(item).ok_or(Error::ItemNotFound)?;

        let info = node.file.stream_info();
        if info.time_base.num == 0 {
            return Err(Error::Seek("stream has no time base".into()));
        }
        let mut ts = (seconds * info.time_base.den as f64 / info.time_base.num as f64) as i64;
        if let Some(start) = info.start_time {
            ts += start;
        }
        node.file.request_seek(ts, true);

        state.decode_head = Some(item);
        self.shared.decode_head_cond.notify_one();
        Ok(())
    }

    /// Resume decoding reads. Idempotent.
    pub fn play(&self) {
        self.shared.paused.store(false, Ordering::Relaxed);
    }

    /// Suspend decoding reads. Idempotent; queued buffers stay available.
    pub fn pause(&self) {
        self.shared.paused.store(true, Ordering::Relaxed);
    }

    pub fn playing(&self) -> bool {
        !self.shared.paused.load(Ordering::Relaxed)
    }

    /// Set one item's gain (linear). Takes effect from the next decoded
    /// frame when the item is currently playing.
    pub fn set_gain(&self, item: ItemId, gain: f64) -> Result<()> {
        let mut state = self.shared.state.lock().unwrap();
        let node = state.items.get_mut(item).ok_or(Error::ItemNotFound)?;
        node.gain = gain;
        if state.decode_head == Some(item) {
            state.effective_volume = state.volume * gain;
        }
        Ok(())
    }

    pub fn gain(&self, item: ItemId) -> Result<f64> {
        let state = self.shared.state.lock().unwrap();
        state
            .items
            .get(item)
            .map(|node| node.gain)
            .ok_or(Error::ItemNotFound)
    }

    /// Set the playlist-wide volume (linear).
    pub fn set_volume(&self, volume: f64) {
        let mut state = self.shared.state.lock().unwrap();
        state.volume = volume;
        state.effective_volume = match state.decode_head.and_then(|id| state.items.get(id)) {
            Some(node) => volume * node.gain,
            None => volume,
        };
    }

    pub fn volume(&self) -> f64 {
        self.shared.state.lock().unwrap().volume
    }

    /// Choose when the worker blocks on saturated consumers.
    pub fn set_fill_mode(&self, mode: FillMode) {
        let mut state = self.shared.state.lock().unwrap();
        state.fill_mode = mode;
        // a worker blocked under the old rule must re-evaluate
        self.shared.drain_cond.notify_one();
    }

    pub fn fill_mode(&self) -> FillMode {
        self.shared.state.lock().unwrap().fill_mode
    }

    /// The item being decoded and its position in seconds.
    pub fn position(&self) -> (Option<ItemId>, f64) {
        let state = self.shared.state.lock().unwrap();
        match state.decode_head {
            Some(id) => {
                let seconds = state
                    .items
                    .get(id)
                    .map(|node| node.file.audio_clock())
                    .unwrap_or(0.0);
                (Some(id), seconds)
            }
            None => (None, 0.0),
        }
    }

    /// First item, for traversal
    pub fn first(&self) -> Option<ItemId> {
        self.shared.state.lock().unwrap().items.head()
    }

    /// Successor of `item`, for traversal
    pub fn next_item(&self, item: ItemId) -> Option<ItemId> {
        self.shared.state.lock().unwrap().items.next(item)
    }
}

impl Drop for Playlist {
    fn drop(&mut self) {
        self.clear();

        // setting abort under the lock pairs with the worker's re-check
        // after acquiring it, so no wakeup is lost
        {
            let _state = self.shared.state.lock().unwrap();
            self.shared.abort.store(true, Ordering::Release);
            self.shared.decode_head_cond.notify_all();
            self.shared.drain_cond.notify_all();
        }

        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }

        let sinks = self.shared.state.lock().unwrap().sink_map.all_sinks();
        for sink in sinks {
            let _ = sink.detach();
        }
    }
}

impl std::fmt::Debug for Playlist {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.state.lock().unwrap();
        f.debug_struct("Playlist")
            .field("items", &state.items.len())
            .field("decode_head", &state.decode_head)
            .field("volume", &state.volume)
            .field("groups", &state.sink_map.group_count())
            .field("playing", &!self.shared.paused.load(Ordering::Relaxed))
            .finish()
    }
}
