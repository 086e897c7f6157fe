//! Test fixtures: Ogg page and Vorbis header builders, a codec engine whose
//! output is a pure function of packet bytes, and a writer for genuine
//! (silent) Vorbis I streams that symphonia decodes.

#![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use oggfeed_core::{Error, Result, StreamInfo};

use crate::codec::{CodecEngine, DecodedBlock, PacketDecoder, PlanarBuffer};
use crate::convert::to_i16;
use crate::feed::{ByteSource, DecodeListener};
use crate::header::StreamHeaders;
use crate::ogg::{crc, page, Packet, Page};

pub const VENDOR: &str = "oggfeed test encoder";

/// Builder for one encoded page.
#[derive(Debug, Clone)]
pub struct PageSpec {
    serial: u32,
    sequence: u32,
    flags: u8,
    granule: i64,
    version: u8,
    lacing: Vec<u8>,
    body: Vec<u8>,
}

impl PageSpec {
    pub fn new(serial: u32, sequence: u32) -> Self {
        Self {
            serial,
            sequence,
            flags: 0,
            granule: 0,
            version: 0,
            lacing: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn continued(mut self) -> Self {
        self.flags |= 0x01;
        self
    }

    pub fn bos(mut self) -> Self {
        self.flags |= 0x02;
        self
    }

    pub fn eos(mut self) -> Self {
        self.flags |= 0x04;
        self
    }

    pub fn granule(mut self, granule: i64) -> Self {
        self.granule = granule;
        self
    }

    pub fn version(mut self, version: u8) -> Self {
        self.version = version;
        self
    }

    /// Append a whole packet.
    pub fn packet(mut self, data: &[u8]) -> Self {
        self.lacing
            .extend(std::iter::repeat(255).take(data.len() / 255));
        self.lacing.push(u8::try_from(data.len() % 255).unwrap());
        self.body.extend_from_slice(data);
        self
    }

    /// Append the start of a packet that continues on the next page.
    pub fn partial(mut self, data: &[u8]) -> Self {
        assert_eq!(data.len() % 255, 0, "partial packets fill whole segments");
        self.lacing
            .extend(std::iter::repeat(255).take(data.len() / 255));
        self.body.extend_from_slice(data);
        self
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(page::HEADER_LEN + self.lacing.len() + self.body.len());
        out.extend_from_slice(page::CAPTURE_PATTERN);
        out.push(self.version);
        out.push(self.flags);
        out.extend_from_slice(&self.granule.to_le_bytes());
        out.extend_from_slice(&self.serial.to_le_bytes());
        out.extend_from_slice(&self.sequence.to_le_bytes());
        out.extend_from_slice(&[0; 4]);
        out.push(u8::try_from(self.lacing.len()).unwrap());
        out.extend_from_slice(&self.lacing);
        out.extend_from_slice(&self.body);

        let checksum = crc::checksum(&out);
        out[22..26].copy_from_slice(&checksum.to_le_bytes());
        out
    }
}

/// Frame an encoded page spec.
pub fn page(spec: PageSpec) -> Page {
    let bytes = spec.encode();
    assert_eq!(page::frame(&bytes), page::Framing::Complete(bytes.len()));
    Page::from_framed(Bytes::from(bytes))
}

pub fn ident_packet(sample_rate: u32, channels: u8) -> Vec<u8> {
    let mut out = vec![1];
    out.extend_from_slice(b"vorbis");
    out.extend_from_slice(&0u32.to_le_bytes());
    out.push(channels);
    out.extend_from_slice(&sample_rate.to_le_bytes());
    out.extend_from_slice(&0i32.to_le_bytes());
    out.extend_from_slice(&128_000i32.to_le_bytes());
    out.extend_from_slice(&0i32.to_le_bytes());
    // 256 / 2048 sample blocks.
    out.push(0xb8);
    out.push(1);
    out
}

pub fn comment_packet(vendor: &str, comments: &[&str]) -> Vec<u8> {
    fn push_string(out: &mut Vec<u8>, s: &str) {
        out.extend_from_slice(&u32::try_from(s.len()).unwrap().to_le_bytes());
        out.extend_from_slice(s.as_bytes());
    }

    let mut out = vec![3];
    out.extend_from_slice(b"vorbis");
    push_string(&mut out, vendor);
    let count = u32::try_from(comments.len()).unwrap();
    out.extend_from_slice(&count.to_le_bytes());
    for comment in comments {
        push_string(&mut out, comment);
    }
    out.push(1);
    out
}

pub fn setup_packet() -> Vec<u8> {
    let mut out = vec![5];
    out.extend_from_slice(b"vorbis");
    out.extend_from_slice(&[0x00, 0x42, 0x43, 0x56, 0x01]);
    out
}

/// Frames a Vorbis decoder emits for each audio packet after the first, with
/// 256 sample short and long blocks.
pub const VORBIS_FRAMES_PER_PACKET: u64 = 128;

/// LSB-first bit packer, as Vorbis setup headers are written.
#[derive(Debug, Default)]
struct BitWriter {
    bytes: Vec<u8>,
    bits: usize,
}

impl BitWriter {
    fn put(&mut self, value: u32, width: u32) -> &mut Self {
        for i in 0..width {
            if self.bits % 8 == 0 {
                self.bytes.push(0);
            }
            if (value >> i) & 1 == 1 {
                *self.bytes.last_mut().unwrap() |= 1 << (self.bits % 8);
            }
            self.bits += 1;
        }
        self
    }
}

/// A complete Vorbis I setup header: one two-entry codebook, one floor 1
/// without partitions, one empty type 0 residue, one mapping and one short
/// block mode. Audio packets that mark every floor unused decode to silence.
pub fn silent_setup_packet() -> Vec<u8> {
    let mut w = BitWriter::default();
    // Codebooks: count, sync, dimensions, entries, unordered dense lengths of
    // one bit each, no lookup table.
    w.put(0, 8).put(0x56_4342, 24).put(1, 16).put(2, 24);
    w.put(0, 1).put(0, 1).put(0, 5).put(0, 5).put(0, 4);
    // Time domain transforms.
    w.put(0, 6).put(0, 16);
    // Floors: type 1, no partitions, multiplier 2, 7 range bits.
    w.put(0, 6).put(1, 16).put(0, 5).put(1, 2).put(7, 4);
    // Residues: type 0, empty range, one classification without books.
    w.put(0, 6).put(0, 16).put(0, 24).put(0, 24).put(0, 24);
    w.put(0, 6).put(0, 8).put(0, 3).put(0, 1);
    // Mappings: one submap on floor 0 and residue 0, no coupling.
    w.put(0, 6).put(0, 16).put(0, 1).put(0, 1).put(0, 2);
    w.put(0, 8).put(0, 8).put(0, 8);
    // Modes: short blocks, mapping 0.
    w.put(0, 6).put(0, 1).put(0, 16).put(0, 16).put(0, 8);
    // Framing.
    w.put(1, 1);

    let mut out = vec![5];
    out.extend_from_slice(b"vorbis");
    out.extend(w.bytes);
    out
}

/// One logical Vorbis stream of `packets` silent audio packets, 16 to a
/// page, with granule positions matching what a decoder outputs.
pub fn silent_vorbis(serial: u32, sample_rate: u32, channels: u8, packets: usize) -> Vec<u8> {
    let mut ident = ident_packet(sample_rate, channels);
    // 256 / 256 sample blocks.
    ident[28] = 0x88;

    let mut out = PageSpec::new(serial, 0).bos().packet(&ident).encode();
    out.extend(
        PageSpec::new(serial, 1)
            .packet(&comment_packet(VENDOR, &["TITLE=silence"]))
            .packet(&silent_setup_packet())
            .encode(),
    );

    let pages = packets.div_ceil(16);
    for page_no in 0..pages {
        let first = page_no * 16;
        let last = (first + 16).min(packets) - 1;
        let granule = last as u64 * VORBIS_FRAMES_PER_PACKET;
        let mut spec = PageSpec::new(serial, u32::try_from(page_no + 2).unwrap())
            .granule(i64::try_from(granule).unwrap());
        for _ in first..=last {
            // Audio packet, mode 0, floors unused.
            spec = spec.packet(&[0]);
        }
        if page_no + 1 == pages {
            spec = spec.eos();
        }
        out.extend(spec.encode());
    }
    out
}

/// Builds a complete logical stream: two header pages, then one page per
/// audio packet with granule positions counted in fake-engine frames.
#[derive(Debug, Clone)]
pub struct OggStreamBuilder {
    serial: u32,
    sample_rate: u32,
    channels: u8,
    vendor: String,
    audio: Vec<Vec<u8>>,
    eos: bool,
}

impl OggStreamBuilder {
    pub fn new(serial: u32) -> Self {
        Self {
            serial,
            sample_rate: 8000,
            channels: 1,
            vendor: VENDOR.to_string(),
            audio: Vec::new(),
            eos: true,
        }
    }

    pub fn sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    pub fn channels(mut self, channels: u8) -> Self {
        self.channels = channels;
        self
    }

    pub fn vendor(mut self, vendor: &str) -> Self {
        self.vendor = vendor.to_string();
        self
    }

    pub fn audio(mut self, packets: &[&[u8]]) -> Self {
        self.audio.extend(packets.iter().map(|p| p.to_vec()));
        self
    }

    pub fn without_eos(mut self) -> Self {
        self.eos = false;
        self
    }

    pub fn info(&self) -> StreamInfo {
        StreamInfo::new(self.sample_rate, u16::from(self.channels), self.vendor.clone())
    }

    fn header_pages(&self) -> (Vec<u8>, PageSpec) {
        let first = PageSpec::new(self.serial, 0)
            .bos()
            .packet(&ident_packet(self.sample_rate, self.channels))
            .encode();
        let second = PageSpec::new(self.serial, 1)
            .packet(&comment_packet(&self.vendor, &["TITLE=fixture"]))
            .packet(&setup_packet());
        (first, second)
    }

    /// Encoded length of the two header pages.
    pub fn header_len(&self) -> usize {
        let (first, second) = self.header_pages();
        first.len() + second.encode().len()
    }

    pub fn encode(&self) -> Vec<u8> {
        let (mut out, mut second) = self.header_pages();
        if self.audio.is_empty() && self.eos {
            second = second.eos();
        }
        out.extend(second.encode());

        let mut granule = 0i64;
        for (i, packet) in self.audio.iter().enumerate() {
            granule += i64::try_from(packet.len()).unwrap();
            let sequence = u32::try_from(i + 2).unwrap();
            let mut spec = PageSpec::new(self.serial, sequence)
                .granule(granule)
                .packet(packet);
            if self.eos && i + 1 == self.audio.len() {
                spec = spec.eos();
            }
            out.extend(spec.encode());
        }
        out
    }

    /// Interleaved PCM the fake engine and converter produce for this stream.
    pub fn expected_pcm(&self) -> Vec<i16> {
        let channels = usize::from(self.channels);
        self.audio
            .iter()
            .filter(|p| p.first() != Some(&CORRUPT_MARKER))
            .flat_map(|p| p.iter())
            .flat_map(|&byte| (0..channels).map(move |ch| to_i16(fake_sample(byte, ch)).0))
            .collect()
    }
}

/// Byte source that serves a buffer in fixed-size chunks.
#[derive(Debug)]
pub struct ChunkedSource {
    data: Vec<u8>,
    pos: usize,
    chunk: usize,
    pub reads: usize,
}

impl ByteSource for ChunkedSource {
    fn read(&mut self, buf: &mut [u8]) -> usize {
        self.reads += 1;
        let n = self.chunk.min(buf.len()).min(self.data.len() - self.pos);
        buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
        self.pos += n;
        n
    }
}

pub fn chunked(data: Vec<u8>, chunk: usize) -> ChunkedSource {
    ChunkedSource {
        data,
        pos: 0,
        chunk: chunk.max(1),
        reads: 0,
    }
}

/// Audio packets starting with this byte fail to decode.
pub const CORRUPT_MARKER: u8 = 0xff;

/// Sample the fake engine emits for `byte` on `channel`.
pub fn fake_sample(byte: u8, channel: usize) -> f32 {
    let base = (f32::from(byte) - 128.0) / 128.0;
    if channel % 2 == 0 {
        base
    } else {
        -base
    }
}

/// Codec engine producing one frame per packet byte.
#[derive(Debug, Clone, Default)]
pub struct FakeEngine {
    pub refuse: bool,
    pub opened: Arc<AtomicUsize>,
    pub frames: Arc<AtomicU64>,
}

impl CodecEngine for FakeEngine {
    type Decoder = FakeDecoder;

    fn open(&mut self, headers: &StreamHeaders) -> Result<FakeDecoder> {
        if self.refuse {
            return Err(Error::Codec("codebooks refused".into()));
        }
        self.opened.fetch_add(1, Ordering::Relaxed);
        let channels = usize::from(headers.identification.channels);
        Ok(FakeDecoder {
            channels,
            pending: PlanarBuffer::new(channels),
            frames: Arc::clone(&self.frames),
        })
    }
}

pub struct FakeDecoder {
    channels: usize,
    pending: PlanarBuffer,
    frames: Arc<AtomicU64>,
}

impl PacketDecoder for FakeDecoder {
    fn decode(&mut self, packet: &Packet) -> Result<()> {
        if packet.data.first() == Some(&CORRUPT_MARKER) {
            return Err(Error::Codec("undecodable packet".into()));
        }
        let planes: Vec<Vec<f32>> = (0..self.channels)
            .map(|ch| packet.data.iter().map(|&b| fake_sample(b, ch)).collect())
            .collect();
        self.pending.extend_planes(planes.iter().map(Vec::as_slice));
        self.frames
            .fetch_add(packet.data.len() as u64, Ordering::Relaxed);
        Ok(())
    }

    fn pending(&self) -> Option<DecodedBlock<'_>> {
        self.pending.view()
    }

    fn acknowledge_consumed(&mut self, frames: usize) {
        self.pending.consume(frames);
    }
}

/// Listener notification, in call order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    HeaderStart,
    StreamStart(StreamInfo),
    Elapsed(u64),
    Stop,
}

#[derive(Debug, Default)]
pub struct Recorder {
    pub events: Vec<Event>,
}

impl Recorder {
    pub fn stream_starts(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e, Event::StreamStart(_)))
            .count()
    }

    pub fn elapsed(&self) -> Vec<u64> {
        self.events
            .iter()
            .filter_map(|e| match e {
                Event::Elapsed(s) => Some(*s),
                _ => None,
            })
            .collect()
    }
}

impl DecodeListener for Recorder {
    fn on_header_start(&mut self) {
        self.events.push(Event::HeaderStart);
    }

    fn on_stream_start(&mut self, info: &StreamInfo) {
        self.events.push(Event::StreamStart(info.clone()));
    }

    fn on_elapsed_seconds(&mut self, seconds: u64) {
        self.events.push(Event::Elapsed(seconds));
    }

    fn on_stop(&mut self) {
        self.events.push(Event::Stop);
    }
}
