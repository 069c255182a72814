//! Blocking sink queue
//!
//! A FIFO of [`QueueEntry`] values with the small lifecycle protocol the
//! engine needs: abort unblocks waiters and rejects traffic until `reset`,
//! `flush` drains everything, and `purge` removes entries matching a
//! predicate. A hooks capability observes elements entering and leaving so
//! the owning sink can account queued bytes and signal backpressure relief.
//!
//! Hook rules: `on_put` and `on_get` run under the queue lock exactly once
//! per buffer; `on_cleanup` runs exactly once for every buffer that leaves
//! through `flush` or `purge` instead of `get`. End-of-playlist entries
//! bypass the hooks entirely.

use crate::error::{Error, Result};
use crate::playlist::buffer::{PcmBuffer, QueueEntry};
use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};

/// Callbacks a queue owner provides to observe element traffic.
pub(crate) trait QueueHooks: Send + Sync {
    fn on_put(&self, buffer: &Arc<PcmBuffer>);
    fn on_get(&self, buffer: &Arc<PcmBuffer>);
    fn on_cleanup(&self, buffer: &Arc<PcmBuffer>);
}

struct Inner {
    entries: VecDeque<QueueEntry>,
    aborted: bool,
}

/// Unbounded-in-elements FIFO with blocking get/peek. Byte-level capacity
/// is a policy of the producer, enforced through the owner's hooks.
pub(crate) struct BufferQueue {
    inner: Mutex<Inner>,
    readable: Condvar,
    hooks: Arc<dyn QueueHooks>,
}

impl BufferQueue {
    pub fn new(hooks: Arc<dyn QueueHooks>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: VecDeque::new(),
                aborted: false,
            }),
            readable: Condvar::new(),
            hooks,
        }
    }

    /// Enqueue one entry. Fails once the queue is aborted.
    pub fn put(&self, entry: QueueEntry) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.aborted {
            return Err(Error::QueueAborted);
        }
        if let QueueEntry::Pcm(buffer) = &entry {
            self.hooks.on_put(buffer);
        }
        inner.entries.push_back(entry);
        self.readable.notify_one();
        Ok(())
    }

    /// Dequeue one entry. `None` means the queue is empty (non-blocking) or
    /// aborted; an aborted queue stops delivering even if entries remain.
    pub fn get(&self, blocking: bool) -> Option<QueueEntry> {
        let mut inner = self.inner.lock().unwrap();
        loop {
            if inner.aborted {
                return None;
            }
            if let Some(entry) = inner.entries.pop_front() {
                if let QueueEntry::Pcm(buffer) = &entry {
                    self.hooks.on_get(buffer);
                }
                return Some(entry);
            }
            if !blocking {
                return None;
            }
            inner = self.readable.wait(inner).unwrap();
        }
    }

    /// Report whether an entry is available without dequeuing it.
    pub fn peek(&self, blocking: bool) -> bool {
        let mut inner = self.inner.lock().unwrap();
        loop {
            if inner.aborted {
                return false;
            }
            if !inner.entries.is_empty() {
                return true;
            }
            if !blocking {
                return false;
            }
            inner = self.readable.wait(inner).unwrap();
        }
    }

    /// Drain every entry, running cleanup for each buffer.
    pub fn flush(&self) {
        let mut inner = self.inner.lock().unwrap();
        for entry in inner.entries.drain(..) {
            if let QueueEntry::Pcm(buffer) = &entry {
                self.hooks.on_cleanup(buffer);
            }
        }
    }

    /// Unblock all waiters; subsequent puts and gets fail until `reset`.
    pub fn abort(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.aborted = true;
        self.readable.notify_all();
    }

    /// Clear the abort state.
    pub fn reset(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.aborted = false;
    }

    /// Remove every buffer the predicate matches, running cleanup for each.
    /// End-of-playlist entries are never offered to the predicate.
    pub fn purge<F>(&self, pred: F)
    where
        F: Fn(&Arc<PcmBuffer>) -> bool,
    {
        let mut inner = self.inner.lock().unwrap();
        let mut kept = VecDeque::with_capacity(inner.entries.len());
        for entry in inner.entries.drain(..) {
            match entry {
                QueueEntry::Pcm(buffer) if pred(&buffer) => {
                    self.hooks.on_cleanup(&buffer);
                }
                other => kept.push_back(other),
            }
        }
        inner.entries = kept;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{AudioFormat, ChannelLayout, SampleFormat};
    use crate::media::Frame;
    use crate::playlist::item::ItemId;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Hooks implementation that observes nothing
    struct NoHooks;

    impl QueueHooks for NoHooks {
        fn on_put(&self, _buffer: &Arc<PcmBuffer>) {}
        fn on_get(&self, _buffer: &Arc<PcmBuffer>) {}
        fn on_cleanup(&self, _buffer: &Arc<PcmBuffer>) {}
    }

    fn buffer(bytes: usize) -> Arc<PcmBuffer> {
        let format = AudioFormat::new(44100, ChannelLayout::MONO, SampleFormat::U8);
        let frame = Frame {
            format,
            frame_count: bytes,
            planes: vec![vec![0u8; bytes]],
            pts: None,
        };
        Arc::new(PcmBuffer::new(frame, test_item(), 0.0))
    }

    fn test_item() -> ItemId {
        // round-trip through a throwaway list to mint an id
        use crate::playlist::item::ItemList;
        use crate::media::{File, FrameDecoder, MediaSource, Packet, StreamInfo};
        use crate::audio::Rational;
        use crate::error::Result;

        struct S;
        impl MediaSource for S {
            fn stream_info(&self) -> StreamInfo {
                StreamInfo {
                    stream_index: 0,
                    sample_rate: 44100,
                    channel_layout: ChannelLayout::MONO,
                    sample_format: SampleFormat::U8,
                    time_base: Rational::new(1, 44100),
                    start_time: None,
                }
            }
            fn read_packet(&mut self) -> Result<Option<Packet>> {
                Ok(None)
            }
            fn seek(&mut self, _ts: i64) -> Result<()> {
                Ok(())
            }
        }
        struct D;
        impl FrameDecoder for D {
            fn decode(&mut self, _packet: &Packet) -> Result<Vec<Frame>> {
                Ok(Vec::new())
            }
            fn flush(&mut self) {}
        }

        let mut list = ItemList::new();
        list.insert_before(Arc::new(File::new(Box::new(S), Box::new(D))), 1.0, None)
    }

    #[derive(Default)]
    struct Counting {
        puts: AtomicUsize,
        gets: AtomicUsize,
        cleanups: AtomicUsize,
    }

    impl QueueHooks for Counting {
        fn on_put(&self, _b: &Arc<PcmBuffer>) {
            self.puts.fetch_add(1, Ordering::SeqCst);
        }
        fn on_get(&self, _b: &Arc<PcmBuffer>) {
            self.gets.fetch_add(1, Ordering::SeqCst);
        }
        fn on_cleanup(&self, _b: &Arc<PcmBuffer>) {
            self.cleanups.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_fifo_order_and_hooks() {
        let hooks = Arc::new(Counting::default());
        let q = BufferQueue::new(hooks.clone());

        q.put(QueueEntry::Pcm(buffer(10))).unwrap();
        q.put(QueueEntry::Pcm(buffer(20))).unwrap();
        assert_eq!(hooks.puts.load(Ordering::SeqCst), 2);

        let first = q.get(false).unwrap();
        match first {
            QueueEntry::Pcm(b) => assert_eq!(b.byte_size(), 10),
            _ => panic!("expected buffer"),
        }
        assert_eq!(hooks.gets.load(Ordering::SeqCst), 1);

        q.get(false).unwrap();
        assert!(q.get(false).is_none());
        assert_eq!(hooks.gets.load(Ordering::SeqCst), 2);
        assert_eq!(hooks.cleanups.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_sentinel_bypasses_hooks() {
        let hooks = Arc::new(Counting::default());
        let q = BufferQueue::new(hooks.clone());

        q.put(QueueEntry::EndOfPlaylist).unwrap();
        assert!(matches!(q.get(false), Some(QueueEntry::EndOfPlaylist)));
        assert_eq!(hooks.puts.load(Ordering::SeqCst), 0);
        assert_eq!(hooks.gets.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_flush_runs_cleanup_once_per_buffer() {
        let hooks = Arc::new(Counting::default());
        let q = BufferQueue::new(hooks.clone());

        q.put(QueueEntry::Pcm(buffer(1))).unwrap();
        q.put(QueueEntry::EndOfPlaylist).unwrap();
        q.put(QueueEntry::Pcm(buffer(2))).unwrap();
        q.flush();

        assert_eq!(hooks.cleanups.load(Ordering::SeqCst), 2);
        assert!(q.get(false).is_none());
    }

    #[test]
    fn test_abort_rejects_and_unblocks() {
        let q = Arc::new(BufferQueue::new(Arc::new(NoHooks)));
        let q2 = q.clone();

        let waiter = std::thread::spawn(move || q2.get(true));
        std::thread::sleep(Duration::from_millis(50));
        q.abort();
        assert!(waiter.join().unwrap().is_none());

        assert!(matches!(
            q.put(QueueEntry::Pcm(buffer(1))),
            Err(Error::QueueAborted)
        ));

        q.reset();
        q.put(QueueEntry::Pcm(buffer(1))).unwrap();
        assert!(q.get(false).is_some());
    }

    #[test]
    fn test_aborted_queue_withholds_residual_entries() {
        let q = BufferQueue::new(Arc::new(NoHooks));
        q.put(QueueEntry::Pcm(buffer(1))).unwrap();
        q.abort();
        assert!(q.get(false).is_none());
        assert!(!q.peek(false));
    }

    #[test]
    fn test_purge_matches_predicate_only() {
        let hooks = Arc::new(Counting::default());
        let q = BufferQueue::new(hooks.clone());

        q.put(QueueEntry::Pcm(buffer(5))).unwrap();
        q.put(QueueEntry::Pcm(buffer(50))).unwrap();
        q.put(QueueEntry::EndOfPlaylist).unwrap();

        q.purge(|b| b.byte_size() >= 50);
        assert_eq!(hooks.cleanups.load(Ordering::SeqCst), 1);

        match q.get(false).unwrap() {
            QueueEntry::Pcm(b) => assert_eq!(b.byte_size(), 5),
            _ => panic!("expected the small buffer to survive"),
        }
        assert!(matches!(q.get(false), Some(QueueEntry::EndOfPlaylist)));
    }

    #[test]
    fn test_blocking_get_wakes_on_put() {
        let q = Arc::new(BufferQueue::new(Arc::new(NoHooks)));
        let q2 = q.clone();

        let waiter = std::thread::spawn(move || q2.get(true));
        std::thread::sleep(Duration::from_millis(20));
        q.put(QueueEntry::Pcm(buffer(7))).unwrap();

        match waiter.join().unwrap() {
            Some(QueueEntry::Pcm(b)) => assert_eq!(b.byte_size(), 7),
            other => panic!("expected buffer, got {:?}", other),
        }
    }
}
