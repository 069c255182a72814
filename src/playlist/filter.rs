//! Filter chain lifecycle
//!
//! Owns the framework graph the decode worker pushes frames through and
//! decides when it must be torn down and rebuilt: on the first frame, when
//! sink membership changes, when the source's stream format or time base
//! changes, and when the effective volume moves away from the value the
//! graph was built with.
//!
//! Topology per build: `source -> volume? -> split? -> per group
//! (format? -> terminal)`. The volume node only exists when the effective
//! volume is not 1.0, the split only when two or more groups exist, and a
//! group's format node is omitted when its representative asks for the
//! source format untouched.

use crate::audio::Rational;
use crate::error::{Error, Result};
use crate::media::{File, FilterGraph, MediaFramework, NodeId, Pull, StreamInfo};
use std::sync::Arc;
use tracing::info;

/// Input parameters the current graph was built for
#[derive(Debug, Clone, Copy, PartialEq)]
struct CachedInput {
    sample_rate: u32,
    channel_layout: u64,
    sample_format: crate::audio::SampleFormat,
    time_base: Rational,
}

impl CachedInput {
    fn of(info: &StreamInfo) -> Self {
        Self {
            sample_rate: info.sample_rate,
            channel_layout: info.channel_layout.0,
            sample_format: info.sample_format,
            time_base: info.time_base,
        }
    }
}

/// Adapter between the decode worker and the framework's filter graph
pub(crate) struct FilterChain {
    framework: Arc<dyn MediaFramework>,
    graph: Option<Box<dyn FilterGraph>>,
    source: Option<NodeId>,

    /// Terminal node per sink group, in sink map order
    terminals: Vec<NodeId>,

    cached: Option<CachedInput>,

    /// Effective volume the graph was built with
    filter_volume: f64,
}

impl FilterChain {
    pub fn new(framework: Arc<dyn MediaFramework>) -> Self {
        Self {
            framework,
            graph: None,
            source: None,
            terminals: Vec::new(),
            cached: None,
            filter_volume: 1.0,
        }
    }

    /// Rebuild the graph if anything it depends on has changed.
    pub fn ensure(&mut self, state: &mut crate::playlist::engine::State, file: &File) -> Result<()> {
        let info = file.stream_info();
        let up_to_date = self.graph.is_some()
            && !state.rebuild_graph
            && self.cached == Some(CachedInput::of(&info))
            && state.effective_volume == self.filter_volume;
        if up_to_date {
            return Ok(());
        }
        self.rebuild(state, &info)
    }

    fn rebuild(
        &mut self,
        state: &mut crate::playlist::engine::State,
        info: &StreamInfo,
    ) -> Result<()> {
        // drop the old graph first; a failed build leaves the chain empty
        self.graph = None;
        self.source = None;
        self.terminals.clear();

        let mut graph = self.framework.create_graph();

        info!(
            "building filter graph: sample_rate={} channel_layout={:#x} sample_format={:?} time_base={}/{}",
            info.sample_rate,
            info.channel_layout.0,
            info.sample_format,
            info.time_base.num,
            info.time_base.den
        );

        let source = graph.add_source(info);
        let mut cursor = source;

        // the volume the graph encodes; compared on later ensure() calls
        self.filter_volume = state.effective_volume;
        let volume = state.effective_volume.clamp(0.0, 1.0);
        if volume != 1.0 {
            info!("volume node: {}", volume);
            let node = graph.add_volume(volume);
            graph.link(cursor, 0, node, 0)?;
            cursor = node;
        }

        let group_count = state.sink_map.group_count();
        let split = if group_count >= 2 {
            info!("split node: fan_out={}", group_count);
            let node = graph.add_split(group_count);
            graph.link(cursor, 0, node, 0)?;
            Some(node)
        } else {
            None
        };

        for (pad, group) in state.sink_map.groups().iter().enumerate() {
            let representative = group.representative();
            let (mut from, mut from_pad) = match split {
                Some(node) => (node, pad),
                None => (cursor, 0),
            };

            if !representative.disable_resample() {
                let target = representative.format();
                info!(
                    "format node: sample_rate={} channel_layout={:#x} sample_format={:?}",
                    target.sample_rate, target.channel_layout.0, target.sample_format
                );
                let node = graph.add_format(&target);
                graph.link(from, from_pad, node, 0)?;
                from = node;
                from_pad = 0;
            }

            let terminal = graph.add_terminal();
            graph.link(from, from_pad, terminal, 0)?;
            self.terminals.push(terminal);
        }

        graph.configure()?;

        self.cached = Some(CachedInput::of(info));
        self.source = Some(source);
        self.graph = Some(graph);
        state.rebuild_graph = false;
        Ok(())
    }

    /// Push one decoded frame into the graph source.
    pub fn write(&mut self, frame: &crate::media::Frame) -> Result<()> {
        let source = self
            .source
            .ok_or_else(|| Error::InvalidState("no filter graph".into()))?;
        self.graph
            .as_mut()
            .ok_or_else(|| Error::InvalidState("no filter graph".into()))?
            .write_frame(source, frame)
    }

    /// Whether a graph is currently built and configured.
    pub fn is_built(&self) -> bool {
        self.graph.is_some()
    }

    /// Signal end of input so the tails release buffered remainders. A
    /// chain without a graph ignores this.
    pub fn write_eof(&mut self) -> Result<()> {
        let (Some(source), Some(graph)) = (self.source, self.graph.as_mut()) else {
            return Ok(());
        };
        graph.write_eof(source)
    }

    /// Pull from the tail serving sink group `group_index`; `sample_count`
    /// of 0 pulls whatever is available as one frame.
    pub fn read(&mut self, group_index: usize, sample_count: usize) -> Result<Pull> {
        let terminal = *self
            .terminals
            .get(group_index)
            .ok_or_else(|| Error::InvalidState("group has no graph tail".into()))?;
        let graph = self
            .graph
            .as_mut()
            .ok_or_else(|| Error::InvalidState("no filter graph".into()))?;
        if sample_count > 0 {
            graph.read_samples(terminal, sample_count)
        } else {
            graph.read_frame(terminal)
        }
    }
}
