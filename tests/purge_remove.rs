//! Removing an item purges every queued buffer that references it.

mod common;

use common::*;
use segue::{
    AudioFormat, BufferResult, ChannelLayout, ItemId, Playlist, SampleFormat, Sink, SinkConfig,
    SinkObserver,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
struct RecordingObserver {
    purged: Mutex<Vec<ItemId>>,
}

impl SinkObserver for RecordingObserver {
    fn on_purge(&self, item: ItemId) {
        self.purged.lock().unwrap().push(item);
    }
}

#[test]
fn remove_current_item_purges_and_advances() {
    init_tracing();

    let playlist = Playlist::new(software_framework()).unwrap();

    let mut config = SinkConfig::new(AudioFormat::new(
        44100,
        ChannelLayout::STEREO,
        SampleFormat::F32,
    ));
    config.buffer_size = 2048;
    let sink = Sink::new(config);
    let observer = Arc::new(RecordingObserver::default());
    sink.set_observer(observer.clone());
    sink.attach(&playlist).unwrap();

    let a = playlist.insert(tone_file(44100, ChannelLayout::STEREO, 2.0), 1.0, None);
    let b = playlist.insert(tone_file(44100, ChannelLayout::STEREO, 0.5), 1.0, None);

    // let the worker fill the queue with buffers from item A, unconsumed
    wait_until(Duration::from_secs(5), || {
        sink.queued_bytes() >= sink.min_queue_bytes()
    });

    playlist.remove(a).unwrap();

    // the purge guarantee: nothing referencing A survives the call
    assert_eq!(observer.purged.lock().unwrap().as_slice(), &[a]);
    let buffers = collect_until_end(&sink, Duration::from_secs(10));
    assert!(
        buffers.iter().all(|buf| buf.item() == b),
        "a buffer from the removed item survived the purge"
    );

    // decoding moved on to B from its beginning
    assert!(buffers.first().unwrap().pos() < 0.05);
    assert_eq!(playlist.count(), 1);
}

#[test]
fn remove_pending_item_leaves_playback_untouched() {
    init_tracing();

    let playlist = Playlist::new(software_framework()).unwrap();

    let sink = Sink::new(SinkConfig::new(AudioFormat::new(
        44100,
        ChannelLayout::STEREO,
        SampleFormat::F32,
    )));
    sink.attach(&playlist).unwrap();

    let a = playlist.insert(tone_file(44100, ChannelLayout::STEREO, 0.25), 1.0, None);
    let b = playlist.insert(tone_file(44100, ChannelLayout::STEREO, 2.0), 1.0, None);

    playlist.remove(b).unwrap();

    let buffers = collect_until_end(&sink, Duration::from_secs(10));
    assert!(buffers.iter().all(|buf| buf.item() == a));
    assert_eq!(total_frames(&buffers), (0.25 * 44100.0) as usize);
}

#[test]
fn clear_delivers_one_end_marker() {
    init_tracing();

    let playlist = Playlist::new(software_framework()).unwrap();

    let sink = Sink::new(SinkConfig::new(AudioFormat::new(
        44100,
        ChannelLayout::STEREO,
        SampleFormat::F32,
    )));
    sink.attach(&playlist).unwrap();

    playlist.insert(tone_file(44100, ChannelLayout::STEREO, 2.0), 1.0, None);
    playlist.insert(tone_file(44100, ChannelLayout::STEREO, 2.0), 1.0, None);

    // wait for decoding to be underway, then wipe the playlist
    let _ = next_buffer(&sink, Duration::from_secs(5));
    playlist.clear();
    assert_eq!(playlist.count(), 0);

    // drain whatever was left: the marker arrives exactly once, with no
    // further buffers behind it
    let _ = collect_until_end(&sink, Duration::from_secs(10));
    std::thread::sleep(Duration::from_millis(100));
    assert!(matches!(sink.buffer_get(false), BufferResult::NotReady));

    // a new insert restarts delivery
    playlist.insert(tone_file(44100, ChannelLayout::STEREO, 0.1), 1.0, None);
    let buffers = collect_until_end(&sink, Duration::from_secs(10));
    assert!(!buffers.is_empty());
}

#[test]
fn remove_missing_item_errors() {
    init_tracing();

    let playlist = Playlist::new(software_framework()).unwrap();
    let other = Playlist::new(software_framework()).unwrap();
    let foreign = other.insert(tone_file(44100, ChannelLayout::STEREO, 0.1), 1.0, None);

    assert!(playlist.remove(foreign).is_err());
}
