//! Codec engine contract.
//!
//! The orchestrators never synthesize audio themselves. They hand packets to
//! a [`PacketDecoder`] opened by a [`CodecEngine`], then drain its pending
//! planar float output in passes, acknowledging what each pass consumed.

pub mod ogg_file;
pub mod vorbis;

use oggfeed_core::Result;

use crate::header::StreamHeaders;
use crate::ogg::Packet;

pub use ogg_file::OggFile;
pub use vorbis::{VorbisEngine, VorbisPacketDecoder};

/// Creates per-stream decoders from validated headers.
pub trait CodecEngine {
    type Decoder: PacketDecoder;

    /// Initialize decode state for one logical stream.
    fn open(&mut self, headers: &StreamHeaders) -> Result<Self::Decoder>;
}

/// Decode state for one logical stream.
pub trait PacketDecoder {
    /// Decode one audio packet, appending its output to the pending samples.
    fn decode(&mut self, packet: &Packet) -> Result<()>;

    /// Samples decoded but not yet acknowledged, if any.
    fn pending(&self) -> Option<DecodedBlock<'_>>;

    /// Mark the first `frames` pending frames as consumed.
    fn acknowledge_consumed(&mut self, frames: usize);
}

/// Borrowed planar view of decoded audio: one slice per channel, equal lengths.
#[derive(Debug, Clone, Copy)]
pub struct DecodedBlock<'a> {
    planes: &'a [Vec<f32>],
    start: usize,
    frames: usize,
}

impl<'a> DecodedBlock<'a> {
    pub fn channels(&self) -> usize {
        self.planes.len()
    }

    pub const fn frames(&self) -> usize {
        self.frames
    }

    /// Samples of channel `index`.
    pub fn channel(&self, index: usize) -> &'a [f32] {
        &self.planes[index][self.start..self.start + self.frames]
    }

    /// The first `frames` frames of this block.
    #[must_use]
    pub fn truncated(self, frames: usize) -> Self {
        Self {
            frames: self.frames.min(frames),
            ..self
        }
    }

    /// This block without its first `frames` frames.
    #[must_use]
    pub fn skipped(self, frames: usize) -> Self {
        let n = self.frames.min(frames);
        Self {
            start: self.start + n,
            frames: self.frames - n,
            ..self
        }
    }
}

/// Growable planar sample store with a consume cursor.
#[derive(Debug, Default)]
pub struct PlanarBuffer {
    planes: Vec<Vec<f32>>,
    cursor: usize,
}

impl PlanarBuffer {
    pub fn new(channels: usize) -> Self {
        Self {
            planes: vec![Vec::new(); channels],
            cursor: 0,
        }
    }

    pub fn channels(&self) -> usize {
        self.planes.len()
    }

    /// Frames appended but not yet consumed.
    pub fn available(&self) -> usize {
        self.planes
            .first()
            .map_or(0, |plane| plane.len() - self.cursor)
    }

    /// Append one slice per channel. Extra planes are ignored; missing ones
    /// are filled with silence.
    pub fn extend_planes<'p, I>(&mut self, planes: I)
    where
        I: IntoIterator<Item = &'p [f32]>,
    {
        self.compact();
        for (dst, src) in self.planes.iter_mut().zip(planes) {
            dst.extend_from_slice(src);
        }
        // Keep every plane the same length.
        let len = self.planes.iter().map(Vec::len).max().unwrap_or(0);
        for plane in &mut self.planes {
            plane.resize(len, 0.0);
        }
    }

    pub fn view(&self) -> Option<DecodedBlock<'_>> {
        let frames = self.available();
        (frames > 0).then_some(DecodedBlock {
            planes: &self.planes,
            start: self.cursor,
            frames,
        })
    }

    pub fn consume(&mut self, frames: usize) {
        self.cursor = (self.cursor + frames).min(self.cursor + self.available());
        if self.available() == 0 {
            self.clear();
        }
    }

    pub fn clear(&mut self) {
        for plane in &mut self.planes {
            plane.clear();
        }
        self.cursor = 0;
    }

    fn compact(&mut self) {
        if self.cursor == 0 {
            return;
        }
        for plane in &mut self.planes {
            plane.drain(..self.cursor);
        }
        self.cursor = 0;
    }
}
