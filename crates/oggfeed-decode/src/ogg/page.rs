//! Ogg page framing.

use bytes::Bytes;

use super::crc;

/// Every page starts with this capture pattern.
pub const CAPTURE_PATTERN: &[u8; 4] = b"OggS";

/// Length of the fixed part of a page header.
pub const HEADER_LEN: usize = 27;

const FLAG_CONTINUED: u8 = 0x01;
const FLAG_BOS: u8 = 0x02;
const FLAG_EOS: u8 = 0x04;

const CRC_OFFSET: usize = 22;

/// Result of looking for a page at the start of a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Framing {
    /// A checksummed page of this many bytes starts the buffer.
    Complete(usize),
    /// The buffer holds the start of a page (or too little to tell).
    Incomplete,
    /// The buffer does not start with a valid page.
    Invalid,
}

/// Check whether `buf` starts with a complete, checksummed page.
pub(crate) fn frame(buf: &[u8]) -> Framing {
    if buf.len() < HEADER_LEN {
        return Framing::Incomplete;
    }
    if &buf[..4] != CAPTURE_PATTERN {
        return Framing::Invalid;
    }

    let header_len = HEADER_LEN + usize::from(buf[HEADER_LEN - 1]);
    if buf.len() < header_len {
        return Framing::Incomplete;
    }

    let body_len: usize = buf[HEADER_LEN..header_len]
        .iter()
        .map(|&lacing| usize::from(lacing))
        .sum();
    let total = header_len + body_len;
    if buf.len() < total {
        return Framing::Incomplete;
    }

    let stored = le_u32(buf, CRC_OFFSET);
    let mut computed = crc::update(0, &buf[..CRC_OFFSET]);
    computed = crc::update(computed, &[0; 4]);
    computed = crc::update(computed, &buf[CRC_OFFSET + 4..total]);
    if computed != stored {
        return Framing::Invalid;
    }

    Framing::Complete(total)
}

/// One framed Ogg page: header fields, segment table, and body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    header: Bytes,
    body: Bytes,
}

impl Page {
    /// Wrap the bytes of a page that [`frame`] reported complete.
    pub(crate) fn from_framed(data: Bytes) -> Self {
        let header_len = HEADER_LEN + usize::from(data[HEADER_LEN - 1]);
        let body = data.slice(header_len..);
        let header = data.slice(..header_len);
        Self { header, body }
    }

    /// Stream structure version. Only version 0 exists.
    pub fn version(&self) -> u8 {
        self.header[4]
    }

    /// The page starts with the continuation of a packet from the previous page.
    pub fn is_continued(&self) -> bool {
        self.header[5] & FLAG_CONTINUED != 0
    }

    /// First page of a logical stream.
    pub fn is_bos(&self) -> bool {
        self.header[5] & FLAG_BOS != 0
    }

    /// Last page of a logical stream.
    pub fn is_eos(&self) -> bool {
        self.header[5] & FLAG_EOS != 0
    }

    /// Codec-defined position of the last packet completed on this page,
    /// `-1` when no packet completes here.
    pub fn granule_position(&self) -> i64 {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&self.header[6..14]);
        i64::from_le_bytes(raw)
    }

    /// Serial number of the logical stream this page belongs to.
    pub fn serial(&self) -> u32 {
        le_u32(&self.header, 14)
    }

    /// Page sequence number within its logical stream.
    pub fn sequence(&self) -> u32 {
        le_u32(&self.header, 18)
    }

    /// The segment table.
    pub fn lacing(&self) -> &[u8] {
        &self.header[HEADER_LEN..]
    }

    /// Page payload.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Total framed length in bytes.
    pub fn framed_len(&self) -> usize {
        self.header.len() + self.body.len()
    }

    /// Number of packets that end on this page.
    pub fn completed_packets(&self) -> usize {
        self.lacing().iter().filter(|&&l| l < 255).count()
    }

    /// Payload fragments in order, each a run of segments ending either at a
    /// packet boundary or at the end of the page.
    pub fn fragments(&self) -> Fragments<'_> {
        Fragments {
            page: self,
            segment: 0,
            offset: 0,
        }
    }
}

/// Piece of a packet carried by one page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    pub data: Bytes,
    /// The packet ends with this fragment.
    pub complete: bool,
}

/// Iterator over the fragments of a page.
pub struct Fragments<'a> {
    page: &'a Page,
    segment: usize,
    offset: usize,
}

impl Iterator for Fragments<'_> {
    type Item = Fragment;

    fn next(&mut self) -> Option<Self::Item> {
        let lacing = self.page.lacing();
        if self.segment >= lacing.len() {
            return None;
        }

        let start = self.offset;
        let mut complete = false;
        while self.segment < lacing.len() {
            let value = lacing[self.segment];
            self.offset += usize::from(value);
            self.segment += 1;
            if value < 255 {
                complete = true;
                break;
            }
        }

        Some(Fragment {
            data: self.page.body.slice(start..self.offset),
            complete,
        })
    }
}

fn le_u32(buf: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}
