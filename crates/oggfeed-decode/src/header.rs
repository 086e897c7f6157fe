//! Vorbis header validation.
//!
//! A Vorbis logical stream opens with three header packets in fixed order:
//! identification, comment, and setup (codebooks). [`HeaderValidator`] checks
//! each as it arrives; [`acquire_headers`] drives it from a page reader and
//! classifies failures into the decode failure taxonomy.

use bytes::Bytes;
use oggfeed_core::{DecodeError, StreamInfo};
use thiserror::Error;
use tracing::{debug, error, trace};

use crate::feed::ByteSource;
use crate::ogg::{LogicalStream, Packet, PacketOutcome, Page, PageFetch, PageReader};

const SIGNATURE: &[u8; 6] = b"vorbis";

const TYPE_IDENTIFICATION: u8 = 1;
const TYPE_COMMENT: u8 = 3;
const TYPE_SETUP: u8 = 5;

const IDENTIFICATION_LEN: usize = 30;
const MIN_BLOCKSIZE_EXP: u8 = 6;
const MAX_BLOCKSIZE_EXP: u8 = 13;

/// Reasons a header packet is refused.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HeaderError {
    #[error("{0} header is truncated")]
    Truncated(&'static str),

    #[error("expected header type {expected}, found {found}")]
    WrongType { expected: u8, found: u8 },

    #[error("missing vorbis signature")]
    Signature,

    #[error("unsupported vorbis version {0}")]
    Version(u32),

    #[error("stream declares no channels")]
    NoChannels,

    #[error("stream declares a zero sample rate")]
    NoSampleRate,

    #[error("invalid block sizes {short}/{long}")]
    BlockSizes { short: u16, long: u16 },

    #[error("{0} header framing bit not set")]
    Framing(&'static str),

    #[error("identification header does not start a stream")]
    NotStreamStart,

    #[error("all headers already received")]
    AlreadyComplete,
}

/// Identification header fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identification {
    pub channels: u8,
    pub sample_rate: u32,
    pub bitrate_maximum: i32,
    pub bitrate_nominal: i32,
    pub bitrate_minimum: i32,
    pub blocksize_short: u16,
    pub blocksize_long: u16,
}

impl Identification {
    #[allow(clippy::cast_possible_wrap)]
    pub fn parse(data: &[u8]) -> Result<Self, HeaderError> {
        check_preamble(data, TYPE_IDENTIFICATION)?;
        if data.len() < IDENTIFICATION_LEN {
            return Err(HeaderError::Truncated("identification"));
        }

        let version = le_u32(data, 7);
        if version != 0 {
            return Err(HeaderError::Version(version));
        }

        let channels = data[11];
        if channels == 0 {
            return Err(HeaderError::NoChannels);
        }
        let sample_rate = le_u32(data, 12);
        if sample_rate == 0 {
            return Err(HeaderError::NoSampleRate);
        }

        let short_exp = data[28] & 0x0f;
        let long_exp = data[28] >> 4;
        let blocksize_short = 1u16 << short_exp.min(15);
        let blocksize_long = 1u16 << long_exp.min(15);
        let valid = |exp: u8| (MIN_BLOCKSIZE_EXP..=MAX_BLOCKSIZE_EXP).contains(&exp);
        if !valid(short_exp) || !valid(long_exp) || short_exp > long_exp {
            return Err(HeaderError::BlockSizes {
                short: blocksize_short,
                long: blocksize_long,
            });
        }

        if data[29] & 1 == 0 {
            return Err(HeaderError::Framing("identification"));
        }

        Ok(Self {
            channels,
            sample_rate,
            bitrate_maximum: le_u32(data, 16) as i32,
            bitrate_nominal: le_u32(data, 20) as i32,
            bitrate_minimum: le_u32(data, 24) as i32,
            blocksize_short,
            blocksize_long,
        })
    }
}

/// Comment header: vendor string plus `KEY=value` user comments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Comment {
    pub vendor: String,
    pub user_comments: Vec<String>,
}

impl Comment {
    pub fn parse(data: &[u8]) -> Result<Self, HeaderError> {
        const WHAT: &str = "comment";

        check_preamble(data, TYPE_COMMENT)?;
        let mut cursor = Cursor { data, pos: 7 };

        let vendor = cursor.string().ok_or(HeaderError::Truncated(WHAT))?;
        let count = cursor.u32().ok_or(HeaderError::Truncated(WHAT))?;
        // Each comment takes at least its 4-byte length.
        if count as usize > cursor.remaining() / 4 {
            return Err(HeaderError::Truncated(WHAT));
        }
        let user_comments = (0..count)
            .map(|_| cursor.string())
            .collect::<Option<Vec<_>>>()
            .ok_or(HeaderError::Truncated(WHAT))?;

        let framing = cursor.byte().ok_or(HeaderError::Truncated(WHAT))?;
        if framing & 1 == 0 {
            return Err(HeaderError::Framing(WHAT));
        }

        Ok(Self {
            vendor,
            user_comments,
        })
    }

    /// Values of the user comments whose key matches `key`, ignoring case.
    pub fn get<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.user_comments.iter().filter_map(move |entry| {
            let (k, v) = entry.split_once('=')?;
            k.eq_ignore_ascii_case(key).then_some(v)
        })
    }
}

/// Progress through the three header packets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HeaderState {
    #[default]
    AwaitingIdentification,
    AwaitingComment,
    AwaitingCodebook,
    Ready,
}

/// Validated headers of one logical stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamHeaders {
    pub identification: Identification,
    pub comment: Comment,
    /// Raw identification, comment and setup packets, in order.
    pub packets: [Bytes; 3],
}

impl StreamHeaders {
    /// Stream parameters as published to the host. Duration is unknown here.
    pub fn info(&self) -> StreamInfo {
        StreamInfo::new(
            self.identification.sample_rate,
            u16::from(self.identification.channels),
            self.comment.vendor.clone(),
        )
    }
}

/// Checks header packets in order.
#[derive(Debug, Default)]
pub struct HeaderValidator {
    state: HeaderState,
    identification: Option<Identification>,
    comment: Option<Comment>,
    packets: Vec<Bytes>,
}

impl HeaderValidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub const fn state(&self) -> HeaderState {
        self.state
    }

    /// Check the next header packet and advance.
    pub fn submit(&mut self, packet: &Packet) -> Result<HeaderState, HeaderError> {
        match self.state {
            HeaderState::AwaitingIdentification => {
                if !packet.bos {
                    return Err(HeaderError::NotStreamStart);
                }
                self.identification = Some(Identification::parse(&packet.data)?);
                self.state = HeaderState::AwaitingComment;
            }
            HeaderState::AwaitingComment => {
                self.comment = Some(Comment::parse(&packet.data)?);
                self.state = HeaderState::AwaitingCodebook;
            }
            HeaderState::AwaitingCodebook => {
                check_preamble(&packet.data, TYPE_SETUP)?;
                self.state = HeaderState::Ready;
            }
            HeaderState::Ready => return Err(HeaderError::AlreadyComplete),
        }

        self.packets.push(packet.data.clone());
        trace!("Header packet {} accepted", self.packets.len());
        Ok(self.state)
    }

    /// The validated headers, once all three have been accepted.
    pub fn finish(self) -> Option<StreamHeaders> {
        let packets: [Bytes; 3] = self.packets.try_into().ok()?;
        Some(StreamHeaders {
            identification: self.identification?,
            comment: self.comment?,
            packets,
        })
    }
}

/// Read the three header packets of the stream that `first_page` starts.
///
/// Pages belonging to other multiplexed streams are ignored. On success the
/// returned stream may already hold audio packets that shared a page with the
/// setup header.
pub fn acquire_headers<S: ByteSource>(
    reader: &mut PageReader<S>,
    first_page: &Page,
) -> Result<(LogicalStream, StreamHeaders), DecodeError> {
    let mut stream = LogicalStream::new(first_page.serial());
    if let Err(e) = stream.feed_page(first_page) {
        error!("First page rejected: {e}");
        return Err(DecodeError::ErrorReadingFirstPage);
    }

    let PacketOutcome::Packet(first) = stream.extract_packet() else {
        error!("First page carries no complete packet");
        return Err(DecodeError::ErrorReadingInitialHeaderPacket);
    };

    let mut validator = HeaderValidator::new();
    if let Err(e) = validator.submit(&first) {
        error!("Not a Vorbis stream: {e}");
        return Err(DecodeError::NotVorbisHeader);
    }

    while validator.state() != HeaderState::Ready {
        match stream.extract_packet() {
            PacketOutcome::Packet(packet) => {
                if let Err(e) = validator.submit(&packet) {
                    error!("Secondary header rejected: {e}");
                    return Err(DecodeError::CorruptSecondaryHeader);
                }
            }
            PacketOutcome::Corrupt => {
                error!("Secondary header data missing");
                return Err(DecodeError::CorruptSecondaryHeader);
            }
            PacketOutcome::NeedMorePages => match reader.next_page() {
                PageFetch::Page(page) => {
                    if let Err(e) = stream.feed_page(&page) {
                        trace!("Ignoring page while reading headers: {e}");
                    }
                }
                PageFetch::Corrupt => {
                    error!("Lost sync while reading headers");
                    return Err(DecodeError::CorruptSecondaryHeader);
                }
                PageFetch::Exhausted => {
                    error!("Input ended before the headers were complete");
                    return Err(DecodeError::PrematureEndOfFile);
                }
            },
        }
    }

    let headers = validator
        .finish()
        .ok_or(DecodeError::CorruptSecondaryHeader)?;
    debug!(
        "Stream {:#x}: {} channel(s), {} Hz, vendor \"{}\"",
        stream.serial(),
        headers.identification.channels,
        headers.identification.sample_rate,
        headers.comment.vendor
    );
    debug!("User comments: {:?}", headers.comment.user_comments);
    Ok((stream, headers))
}

fn check_preamble(data: &[u8], expected: u8) -> Result<(), HeaderError> {
    let Some(&found) = data.first() else {
        return Err(HeaderError::Truncated("empty"));
    };
    if found != expected {
        return Err(HeaderError::WrongType { expected, found });
    }
    if data.get(1..7) != Some(SIGNATURE.as_slice()) {
        return Err(HeaderError::Signature);
    }
    Ok(())
}

fn le_u32(buf: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}

struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl Cursor<'_> {
    fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    fn byte(&mut self) -> Option<u8> {
        let b = *self.data.get(self.pos)?;
        self.pos += 1;
        Some(b)
    }

    fn u32(&mut self) -> Option<u32> {
        let raw = self.data.get(self.pos..self.pos + 4)?;
        self.pos += 4;
        Some(le_u32(raw, 0))
    }

    fn string(&mut self) -> Option<String> {
        let len = self.u32()? as usize;
        if len > self.remaining() {
            return None;
        }
        let raw = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Some(String::from_utf8_lossy(raw).into_owned())
    }
}
