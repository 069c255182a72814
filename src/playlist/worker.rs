//! Decode worker
//!
//! The sole producer thread of a playlist. Each iteration holds the
//! coordinator lock for one bounded decode step: wait while idle or
//! backpressured, keep the filter graph current, decode one packet, and fan
//! the filtered buffers out to every sink queue.
//!
//! The worker blocks in exactly two places: on the decode-head condition
//! when there is nothing to decode (after broadcasting the end-of-playlist
//! marker once), and on the drain condition when the fill rule says every
//! consumer is saturated.

use crate::config::FillMode;
use crate::media::{File, MediaFramework, Pull};
use crate::playlist::buffer::{PcmBuffer, QueueEntry};
use crate::playlist::engine::{Shared, State};
use crate::playlist::filter::FilterChain;
use crate::playlist::item::ItemId;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{debug, error, trace, warn};

/// Outcome of one decode step
enum Step {
    /// More data may follow from the current item
    Continue,

    /// The current item is finished (EOF, abort, or an unrecoverable error)
    EndOfItem,
}

pub(crate) fn run(shared: Arc<Shared>, framework: Arc<dyn MediaFramework>) {
    debug!("decode worker started");
    let mut chain = FilterChain::new(framework);
    let mut last_paused = false;

    while !shared.abort.load(Ordering::Acquire) {
        let mut state = shared.state.lock().unwrap();
        if shared.abort.load(Ordering::Acquire) {
            break;
        }

        // nothing to decode: mark the end of the playlist once, then sleep
        let Some(head) = state.decode_head else {
            if !state.sent_end_of_q {
                state.sent_end_of_q = true;
                debug!("playlist drained, marking end of queue on every sink");
                state.sink_map.for_each_sink(|sink| sink.signal_end());
            }
            let _unused = shared.decode_head_cond.wait(state).unwrap();
            continue;
        };
        state.sent_end_of_q = false;

        if sinks_full(&state) {
            let _unused = shared.drain_cond.wait(state).unwrap();
            continue;
        }

        let (file, gain) = match state.items.get(head) {
            Some(node) => (node.file.clone(), node.gain),
            None => {
                debug_assert!(false, "decode head references a removed item");
                state.decode_head = None;
                continue;
            }
        };
        state.effective_volume = state.volume * gain;

        let step = decode_one_frame(&mut state, &shared, &mut chain, head, &file, &mut last_paused);

        if matches!(step, Step::EndOfItem) {
            let next = state.items.next(head);
            state.decode_head = next;
            match next {
                Some(next_id) => {
                    trace!("advancing to next item {}", next_id);
                    if let Some(next_node) = state.items.get(next_id) {
                        // gapless: start the next file from its beginning,
                        // without flushing what consumers have not read yet
                        next_node.file.request_seek(0, false);
                    }
                }
                None => {
                    // last item: release the remainders buffered in the
                    // graph tails, then force a rebuild before new input
                    flush_graph_tails(&state, &mut chain, head, &file);
                    state.rebuild_graph = true;
                }
            }
        }
    }
    debug!("decode worker stopped");
}

/// Apply the fill rule. With no sinks attached there is nowhere to deliver,
/// which counts as full; attach signals the drain condition.
fn sinks_full(state: &State) -> bool {
    if state.sink_map.is_empty() {
        return true;
    }
    let mut all = true;
    let mut any = false;
    state.sink_map.for_each_sink(|sink| {
        if sink.is_full() {
            any = true;
        } else {
            all = false;
        }
    });
    match state.fill_mode {
        FillMode::AllSinksFull => all,
        FillMode::AnySinkFull => any,
    }
}

/// One bounded decode step for the current item.
fn decode_one_frame(
    state: &mut State,
    shared: &Shared,
    chain: &mut FilterChain,
    head: ItemId,
    file: &Arc<File>,
    last_paused: &mut bool,
) -> Step {
    // the graph may need a rebuild before this frame flows through it
    if let Err(e) = chain.ensure(state, file) {
        error!("cannot build filter graph: {}", e);
        return Step::EndOfItem;
    }

    // the file is being torn down
    if file.abort_requested() {
        return Step::EndOfItem;
    }

    // forward pause transitions to the source reader, sampling the flag once
    let paused = shared.paused.load(Ordering::Relaxed);
    if paused != *last_paused {
        *last_paused = paused;
        let mut source = file.source();
        if paused {
            source.pause();
        } else {
            source.resume();
        }
    }

    // pending seek requests
    {
        let mut seek = file.seek_state();
        if let Some(ts) = seek.pos.take() {
            match file.source().seek(ts) {
                Ok(()) => {
                    if seek.flush {
                        flush_every_sink(state);
                    }
                }
                Err(e) => warn!("error while seeking: {}", e),
            }
            file.decoder().flush();
            seek.eof = false;
        }
    }

    if file.is_eof() {
        if file.decoder().has_delay() {
            // drain one delayed frame; when none comes out the item is done
            match file.decoder().drain() {
                Ok(Some(frame)) => {
                    let (bytes, adjustment) = push_frame(state, chain, head, file, &frame);
                    if bytes > 0 {
                        file.set_audio_clock(file.audio_clock() + adjustment);
                    }
                    return Step::Continue;
                }
                Ok(None) => {}
                Err(e) => warn!("error draining decoder: {}", e),
            }
        }
        return Step::EndOfItem;
    }

    let packet = match file.source().read_packet() {
        Ok(Some(packet)) => packet,
        Ok(None) => {
            file.set_eof();
            return Step::Continue;
        }
        Err(e) => {
            // read errors end the item like EOF, but are worth a log line
            warn!("error reading frames: {}", e);
            file.set_eof();
            return Step::Continue;
        }
    };

    let info = file.stream_info();
    if packet.stream_index != info.stream_index {
        // only the audio stream is interesting
        return Step::Continue;
    }

    // keep the audio clock on packet timestamps when the container has them
    if let Some(pts) = packet.pts {
        file.set_audio_clock(pts as f64 * info.time_base.to_f64());
    }

    let frames = match file.decoder().decode(&packet) {
        Ok(frames) => frames,
        Err(e) => {
            // skip the frame, the packet is consumed
            debug!("decode error, skipping frame: {}", e);
            return Step::Continue;
        }
    };

    let mut produced = 0usize;
    let mut clock_adjustment = 0f64;
    for frame in &frames {
        let (bytes, adjustment) = push_frame(state, chain, head, file, frame);
        produced += bytes;
        clock_adjustment += adjustment;
    }
    // without timestamps, estimate clock progress from the bytes emitted by
    // the group producing the most data
    if packet.pts.is_none() && produced > 0 {
        file.set_audio_clock(file.audio_clock() + clock_adjustment);
    }
    Step::Continue
}

/// Feed one decoded frame into the graph and distribute the filtered
/// output. Returns the byte count of the largest-producing group and the
/// matching clock advance.
fn push_frame(
    state: &State,
    chain: &mut FilterChain,
    item: ItemId,
    file: &Arc<File>,
    frame: &crate::media::Frame,
) -> (usize, f64) {
    if let Err(e) = chain.write(frame) {
        error!("error writing frame to graph source: {}", e);
        return (0, 0.0);
    }
    distribute(state, chain, item, file)
}

/// Pull everything the graph tails currently offer and fan each buffer out
/// to its group's sinks by reference count.
fn distribute(
    state: &State,
    chain: &mut FilterChain,
    item: ItemId,
    file: &Arc<File>,
) -> (usize, f64) {
    let mut max_bytes = 0usize;
    let mut adjustment = 0f64;

    for (group_index, group) in state.sink_map.groups().iter().enumerate() {
        let representative = group.representative();
        let sample_count = representative.buffer_sample_count();
        let mut group_bytes = 0usize;

        loop {
            let frame = match chain.read(group_index, sample_count) {
                Ok(Pull::Frame(frame)) => frame,
                Ok(Pull::Again) | Ok(Pull::Eof) => break,
                Err(e) => {
                    error!("error reading from graph tail: {}", e);
                    break;
                }
            };

            let buffer = Arc::new(PcmBuffer::new(frame, item, file.audio_clock()));
            group_bytes += buffer.byte_size();

            for sink in group.sinks() {
                // each queue takes its own reference; a failed put drops it
                if sink.enqueue(QueueEntry::Pcm(buffer.clone())).is_err() {
                    trace!("dropping buffer for aborted sink queue");
                }
            }
        }

        if group_bytes > max_bytes {
            max_bytes = group_bytes;
            adjustment = group_bytes as f64 / representative.bytes_per_sec() as f64;
        }
    }

    (max_bytes, adjustment)
}

/// Flush the queue of every attached sink (pending seek with flush, or
/// detach).
fn flush_every_sink(state: &State) {
    state.sink_map.for_each_sink(|sink| sink.flush_queue());
}

/// At the end of the playlist, push EOF into the graph so the tails release
/// the samples they still buffer, and deliver them.
fn flush_graph_tails(state: &State, chain: &mut FilterChain, item: ItemId, file: &Arc<File>) {
    if !chain.is_built() {
        return;
    }
    if let Err(e) = chain.write_eof() {
        debug!("error signalling EOF to graph: {}", e);
        return;
    }
    let (bytes, adjustment) = distribute(state, chain, item, file);
    if bytes > 0 {
        file.set_audio_clock(file.audio_clock() + adjustment);
    }
}
