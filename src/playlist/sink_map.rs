//! Sink map: grouping sinks by equivalent output format
//!
//! Sinks that would receive byte-identical output share one filter graph
//! tail, so the engine renders each distinct format exactly once and fans
//! the buffers out by reference count. Each group is a stack of sinks; the
//! stack head is the representative whose format parameterises the group's
//! tail.

use crate::error::{Error, Result};
use crate::playlist::sink::Sink;

/// Two sinks belong in one group iff they ask for the same fixed buffer
/// size and either both bypass conversion or both name the exact same
/// output triple.
fn formats_equivalent(a: &Sink, b: &Sink) -> bool {
    if a.buffer_sample_count() != b.buffer_sample_count() {
        return false;
    }
    if a.disable_resample() {
        return b.disable_resample();
    }
    if b.disable_resample() {
        return false;
    }
    let (fa, fb) = (a.format(), b.format());
    fa.sample_rate == fb.sample_rate
        && fa.channel_layout == fb.channel_layout
        && fa.sample_format == fb.sample_format
}

/// A non-empty stack of format-equivalent sinks
pub(crate) struct SinkGroup {
    sinks: Vec<Sink>,
}

impl SinkGroup {
    /// The stack head; its format determines the group's graph tail.
    pub fn representative(&self) -> &Sink {
        &self.sinks[0]
    }

    pub fn sinks(&self) -> &[Sink] {
        &self.sinks
    }
}

/// All attached sinks, partitioned into format groups
#[derive(Default)]
pub(crate) struct SinkMap {
    groups: Vec<SinkGroup>,
}

impl SinkMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Place a sink into its format group, creating one if no existing
    /// group matches.
    pub fn add(&mut self, sink: Sink) {
        for group in &mut self.groups {
            if formats_equivalent(group.representative(), &sink) {
                group.sinks.insert(0, sink);
                return;
            }
        }
        self.groups.push(SinkGroup { sinks: vec![sink] });
    }

    /// Remove a sink by identity; a group emptied by the removal is
    /// dropped.
    pub fn remove(&mut self, sink: &Sink) -> Result<()> {
        for (gi, group) in self.groups.iter_mut().enumerate() {
            if let Some(si) = group.sinks.iter().position(|s| s.same_sink(sink)) {
                group.sinks.remove(si);
                if group.sinks.is_empty() {
                    self.groups.remove(gi);
                }
                return Ok(());
            }
        }
        Err(Error::SinkNotFound)
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    pub fn groups(&self) -> &[SinkGroup] {
        &self.groups
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Visit every attached sink across all groups.
    pub fn for_each_sink(&self, mut f: impl FnMut(&Sink)) {
        for group in &self.groups {
            for sink in &group.sinks {
                f(sink);
            }
        }
    }

    /// Snapshot of every attached sink.
    pub fn all_sinks(&self) -> Vec<Sink> {
        let mut out = Vec::new();
        self.for_each_sink(|s| out.push(s.clone()));
        out
    }
}
