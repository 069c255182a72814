//! Software filter graph
//!
//! A pure-Rust implementation of the [`FilterGraph`] contract, suitable for
//! tests and for embedders without a native media library. It supports the
//! topology the engine builds: `source -> volume? -> split? -> per terminal
//! (format? -> terminal)`, with per-terminal channel remixing, sample format
//! conversion, and rubato-based resampling (pass-through when rates match).
//!
//! Terminals buffer converted samples planar as f32 and release them either
//! as whole frames or in fixed-size blocks with carry-over, returning a
//! shorter final block only after end of input is signalled.

use crate::audio::{AudioFormat, SampleFormat};
use crate::error::{Error, Result};
use crate::media::{FilterGraph, Frame, MediaFramework, NodeId, Pull, StreamInfo};
use rubato::{FastFixedIn, PolynomialDegree, Resampler};
use std::collections::VecDeque;
use tracing::debug;

/// Input block size for the stateful resampler, in frames
const RESAMPLE_CHUNK_FRAMES: usize = 1024;

/// Factory for [`SoftwareGraph`] instances
#[derive(Debug, Default)]
pub struct SoftwareFramework;

impl MediaFramework for SoftwareFramework {
    fn create_graph(&self) -> Box<dyn FilterGraph> {
        Box::new(SoftwareGraph::new())
    }
}

#[derive(Debug, Clone)]
enum NodeKind {
    Source(StreamInfo),
    Volume(f64),
    Split(usize),
    Format(AudioFormat),
    Terminal,
}

/// One configured path from the source to a terminal
struct Chain {
    terminal: NodeId,

    /// Product of volume nodes on the path
    gain: f64,

    /// Format delivered at the terminal
    output: AudioFormat,

    /// Present when input and output sample rates differ
    resampler: Option<ChunkResampler>,

    /// Converted samples waiting to be read, planar f32
    fifo: Vec<VecDeque<f32>>,
}

/// In-process implementation of the engine's filter graph topology
pub struct SoftwareGraph {
    nodes: Vec<NodeKind>,
    links: Vec<(NodeId, usize, NodeId, usize)>,
    source: Option<NodeId>,
    chains: Vec<Chain>,
    configured: bool,
    eof: bool,
}

impl SoftwareGraph {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            links: Vec::new(),
            source: None,
            chains: Vec::new(),
            configured: false,
            eof: false,
        }
    }

    fn push_node(&mut self, kind: NodeKind) -> NodeId {
        self.nodes.push(kind);
        NodeId(self.nodes.len() - 1)
    }

    fn node(&self, id: NodeId) -> Option<&NodeKind> {
        self.nodes.get(id.0)
    }

    /// Walk from a terminal back to the source, collecting the volume
    /// product and the target format on the way.
    fn trace_chain(&self, terminal: NodeId, info: &StreamInfo) -> Result<Chain> {
        let mut gain = 1.0f64;
        let mut target: Option<AudioFormat> = None;
        let mut cursor = terminal;

        loop {
            let Some(&(src, _, _, _)) = self
                .links
                .iter()
                .find(|&&(_, _, dst, _)| dst == cursor)
            else {
                return Err(Error::GraphBuild(format!(
                    "terminal {:?} is not connected to the source",
                    terminal
                )));
            };
            match self.node(src) {
                Some(NodeKind::Source(_)) => break,
                Some(NodeKind::Volume(v)) => gain *= v,
                Some(NodeKind::Split(_)) => {}
                Some(NodeKind::Format(fmt)) => {
                    if target.is_some() {
                        return Err(Error::GraphBuild(
                            "multiple format nodes on one chain".into(),
                        ));
                    }
                    target = Some(*fmt);
                }
                Some(NodeKind::Terminal) | None => {
                    return Err(Error::GraphBuild("malformed chain topology".into()))
                }
            }
            cursor = src;
        }

        let output = target.unwrap_or_else(|| info.format());
        let resampler = if output.sample_rate != info.sample_rate {
            Some(ChunkResampler::new(
                info.sample_rate,
                output.sample_rate,
                output.channels(),
            )?)
        } else {
            None
        };

        Ok(Chain {
            terminal,
            gain,
            output,
            resampler,
            fifo: vec![VecDeque::new(); output.channels()],
        })
    }

    fn chain_mut(&mut self, terminal: NodeId) -> Result<&mut Chain> {
        self.chains
            .iter_mut()
            .find(|c| c.terminal == terminal)
            .ok_or_else(|| Error::GraphBuild(format!("unknown terminal {:?}", terminal)))
    }

    /// Pop `frames` samples per channel from a chain's fifo and pack them
    /// into an output frame.
    fn pop_frame(chain: &mut Chain, frames: usize) -> Frame {
        let planar: Vec<Vec<f32>> = chain
            .fifo
            .iter_mut()
            .map(|ch| ch.drain(..frames).collect())
            .collect();
        pack_planar(&planar, chain.output)
    }
}

impl Default for SoftwareGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl FilterGraph for SoftwareGraph {
    fn add_source(&mut self, info: &StreamInfo) -> NodeId {
        let id = self.push_node(NodeKind::Source(*info));
        self.source = Some(id);
        id
    }

    fn add_volume(&mut self, gain: f64) -> NodeId {
        self.push_node(NodeKind::Volume(gain))
    }

    fn add_split(&mut self, fan_out: usize) -> NodeId {
        self.push_node(NodeKind::Split(fan_out))
    }

    fn add_format(&mut self, target: &AudioFormat) -> NodeId {
        self.push_node(NodeKind::Format(*target))
    }

    fn add_terminal(&mut self) -> NodeId {
        self.push_node(NodeKind::Terminal)
    }

    fn link(&mut self, src: NodeId, src_pad: usize, dst: NodeId, dst_pad: usize) -> Result<()> {
        if self.node(src).is_none() || self.node(dst).is_none() {
            return Err(Error::GraphBuild("link references unknown node".into()));
        }
        self.links.push((src, src_pad, dst, dst_pad));
        Ok(())
    }

    fn configure(&mut self) -> Result<()> {
        let source = self
            .source
            .ok_or_else(|| Error::GraphBuild("graph has no source node".into()))?;
        let info = match self.node(source) {
            Some(NodeKind::Source(info)) => *info,
            _ => return Err(Error::GraphBuild("source node is malformed".into())),
        };

        let terminals: Vec<NodeId> = self
            .nodes
            .iter()
            .enumerate()
            .filter(|(_, kind)| matches!(kind, NodeKind::Terminal))
            .map(|(i, _)| NodeId(i))
            .collect();

        let mut chains = Vec::with_capacity(terminals.len());
        for terminal in terminals {
            chains.push(self.trace_chain(terminal, &info)?);
        }
        self.chains = chains;

        debug!(
            "software graph configured: {} chains from {}Hz input",
            self.chains.len(),
            info.sample_rate
        );
        self.configured = true;
        self.eof = false;
        Ok(())
    }

    fn write_frame(&mut self, source: NodeId, frame: &Frame) -> Result<()> {
        if !self.configured {
            return Err(Error::InvalidState("graph is not configured".into()));
        }
        if Some(source) != self.source {
            return Err(Error::GraphBuild("write to a non-source node".into()));
        }
        if self.eof {
            return Err(Error::InvalidState("graph already received EOF".into()));
        }

        let input = unpack_planar(frame);
        for chain in &mut self.chains {
            let mut samples = input.clone();
            if chain.gain != 1.0 {
                let gain = chain.gain as f32;
                for plane in &mut samples {
                    for s in plane.iter_mut() {
                        *s *= gain;
                    }
                }
            }
            let samples = remix(samples, chain.output.channels());
            let samples = match &mut chain.resampler {
                Some(rs) => rs.push(samples)?,
                None => samples,
            };
            for (ch, plane) in samples.into_iter().enumerate() {
                chain.fifo[ch].extend(plane);
            }
        }
        Ok(())
    }

    fn write_eof(&mut self, source: NodeId) -> Result<()> {
        if Some(source) != self.source {
            return Err(Error::GraphBuild("EOF on a non-source node".into()));
        }
        if self.eof {
            return Ok(());
        }
        self.eof = true;
        for chain in &mut self.chains {
            if let Some(rs) = &mut chain.resampler {
                for (ch, plane) in rs.finish()?.into_iter().enumerate() {
                    chain.fifo[ch].extend(plane);
                }
            }
        }
        Ok(())
    }

    fn read_frame(&mut self, terminal: NodeId) -> Result<Pull> {
        let eof = self.eof;
        let chain = self.chain_mut(terminal)?;
        let available = chain.fifo.first().map_or(0, |ch| ch.len());
        if available == 0 {
            return Ok(if eof { Pull::Eof } else { Pull::Again });
        }
        Ok(Pull::Frame(Self::pop_frame(chain, available)))
    }

    fn read_samples(&mut self, terminal: NodeId, sample_count: usize) -> Result<Pull> {
        let eof = self.eof;
        let chain = self.chain_mut(terminal)?;
        let available = chain.fifo.first().map_or(0, |ch| ch.len());
        if available >= sample_count {
            return Ok(Pull::Frame(Self::pop_frame(chain, sample_count)));
        }
        if !eof {
            return Ok(Pull::Again);
        }
        if available > 0 {
            // final short block after end of input
            return Ok(Pull::Frame(Self::pop_frame(chain, available)));
        }
        Ok(Pull::Eof)
    }
}

/// Streaming resampler with fixed-size input blocks and carry-over
struct ChunkResampler {
    inner: FastFixedIn<f32>,
    pending: Vec<Vec<f32>>,
    chunk: usize,
}

impl ChunkResampler {
    fn new(in_rate: u32, out_rate: u32, channels: usize) -> Result<Self> {
        let inner = FastFixedIn::<f32>::new(
            out_rate as f64 / in_rate as f64,
            1.0,
            PolynomialDegree::Septic,
            RESAMPLE_CHUNK_FRAMES,
            channels,
        )
        .map_err(|e| Error::GraphBuild(format!("failed to create resampler: {}", e)))?;

        Ok(Self {
            inner,
            pending: vec![Vec::new(); channels],
            chunk: RESAMPLE_CHUNK_FRAMES,
        })
    }

    /// Queue input frames, processing every complete block.
    fn push(&mut self, input: Vec<Vec<f32>>) -> Result<Vec<Vec<f32>>> {
        let channels = self.pending.len();
        for (ch, plane) in input.into_iter().enumerate().take(channels) {
            self.pending[ch].extend(plane);
        }

        let mut out: Vec<Vec<f32>> = vec![Vec::new(); channels];
        while self.pending[0].len() >= self.chunk {
            let chunk = self.chunk;
            let block: Vec<Vec<f32>> = self
                .pending
                .iter_mut()
                .map(|ch| ch.drain(..chunk).collect())
                .collect();
            let processed = self
                .inner
                .process(&block, None)
                .map_err(|e| Error::Decode(format!("resampling failed: {}", e)))?;
            for (ch, plane) in processed.into_iter().enumerate() {
                out[ch].extend(plane);
            }
        }
        Ok(out)
    }

    /// Process the incomplete trailing block and drain the resampler.
    fn finish(&mut self) -> Result<Vec<Vec<f32>>> {
        let channels = self.pending.len();
        let mut out: Vec<Vec<f32>> = vec![Vec::new(); channels];

        if !self.pending[0].is_empty() {
            let block: Vec<Vec<f32>> = self.pending.iter_mut().map(std::mem::take).collect();
            let processed = self
                .inner
                .process_partial(Some(block.as_slice()), None)
                .map_err(|e| Error::Decode(format!("resampling failed: {}", e)))?;
            for (ch, plane) in processed.into_iter().enumerate() {
                out[ch].extend(plane);
            }
        }

        let tail = self
            .inner
            .process_partial(None::<&[Vec<f32>]>, None)
            .map_err(|e| Error::Decode(format!("resampling failed: {}", e)))?;
        for (ch, plane) in tail.into_iter().enumerate() {
            out[ch].extend(plane);
        }
        Ok(out)
    }
}

/// Decode a frame's byte planes into planar f32 samples.
fn unpack_planar(frame: &Frame) -> Vec<Vec<f32>> {
    let channels = frame.format.channels();
    let fmt = frame.format.sample_format;

    if fmt.is_planar() {
        frame
            .planes
            .iter()
            .take(channels)
            .map(|plane| decode_samples(plane, fmt))
            .collect()
    } else {
        let interleaved = frame
            .planes
            .first()
            .map(|plane| decode_samples(plane, fmt))
            .unwrap_or_default();
        let mut planar = vec![Vec::with_capacity(frame.frame_count); channels];
        for (i, sample) in interleaved.into_iter().enumerate() {
            planar[i % channels].push(sample);
        }
        planar
    }
}

/// Pack planar f32 samples into a frame in the requested output format.
fn pack_planar(planar: &[Vec<f32>], format: AudioFormat) -> Frame {
    let frame_count = planar.first().map_or(0, |ch| ch.len());
    let fmt = format.sample_format;

    let planes = if fmt.is_planar() {
        planar.iter().map(|ch| encode_samples(ch, fmt)).collect()
    } else {
        let channels = planar.len();
        let mut interleaved = Vec::with_capacity(frame_count * channels);
        for i in 0..frame_count {
            for ch in planar {
                interleaved.push(ch[i]);
            }
        }
        vec![encode_samples(&interleaved, fmt)]
    };

    Frame {
        format,
        frame_count,
        planes,
        pts: None,
    }
}

fn decode_samples(bytes: &[u8], fmt: SampleFormat) -> Vec<f32> {
    match fmt {
        SampleFormat::U8 | SampleFormat::U8Planar => bytes
            .iter()
            .map(|&b| (b as f32 - 128.0) / 128.0)
            .collect(),
        SampleFormat::S16 | SampleFormat::S16Planar => bytes
            .chunks_exact(2)
            .map(|c| i16::from_le_bytes([c[0], c[1]]) as f32 / 32768.0)
            .collect(),
        SampleFormat::S32 | SampleFormat::S32Planar => bytes
            .chunks_exact(4)
            .map(|c| i32::from_le_bytes([c[0], c[1], c[2], c[3]]) as f32 / 2147483648.0)
            .collect(),
        SampleFormat::F32 | SampleFormat::F32Planar => bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect(),
        SampleFormat::F64 | SampleFormat::F64Planar => bytes
            .chunks_exact(8)
            .map(|c| {
                f64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]) as f32
            })
            .collect(),
    }
}

fn encode_samples(samples: &[f32], fmt: SampleFormat) -> Vec<u8> {
    match fmt {
        SampleFormat::U8 | SampleFormat::U8Planar => samples
            .iter()
            .map(|&s| ((s.clamp(-1.0, 1.0) * 127.0).round() as i32 + 128).clamp(0, 255) as u8)
            .collect(),
        SampleFormat::S16 | SampleFormat::S16Planar => samples
            .iter()
            .flat_map(|&s| ((s.clamp(-1.0, 1.0) * 32767.0).round() as i16).to_le_bytes())
            .collect(),
        SampleFormat::S32 | SampleFormat::S32Planar => samples
            .iter()
            .flat_map(|&s| ((s.clamp(-1.0, 1.0) as f64 * 2147483647.0).round() as i32).to_le_bytes())
            .collect(),
        SampleFormat::F32 | SampleFormat::F32Planar => samples
            .iter()
            .flat_map(|&s| s.to_le_bytes())
            .collect(),
        SampleFormat::F64 | SampleFormat::F64Planar => samples
            .iter()
            .flat_map(|&s| (s as f64).to_le_bytes())
            .collect(),
    }
}

/// Map input channels onto `target` output channels: duplicate mono up,
/// average down to mono, otherwise copy what fits and zero-fill.
fn remix(input: Vec<Vec<f32>>, target: usize) -> Vec<Vec<f32>> {
    let src = input.len();
    if src == target {
        return input;
    }
    if src == 1 {
        return vec![input[0].clone(); target];
    }
    if target == 1 {
        let frames = input[0].len();
        let mut mixed = vec![0.0f32; frames];
        for plane in &input {
            for (i, s) in plane.iter().enumerate() {
                mixed[i] += s;
            }
        }
        let scale = 1.0 / src as f32;
        for s in mixed.iter_mut() {
            *s *= scale;
        }
        return vec![mixed];
    }
    let frames = input[0].len();
    let mut out = input;
    out.truncate(target);
    while out.len() < target {
        out.push(vec![0.0f32; frames]);
    }
    out
}
