//! Logical stream demultiplexing: pages of one serial in, packets out.

use std::collections::VecDeque;

use bytes::{Bytes, BytesMut};
use thiserror::Error;
use tracing::{debug, trace};

use super::page::Page;

/// One reassembled packet of a logical stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub data: Bytes,
    /// Ordinal of this packet within its logical stream.
    pub packet_no: u64,
    /// Granule position of the page this packet completed on, if it was the
    /// last packet to complete there.
    pub granule_position: Option<i64>,
    /// First packet of the logical stream.
    pub bos: bool,
    /// Last packet of the logical stream.
    pub eos: bool,
}

/// Outcome of asking a logical stream for its next packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PacketOutcome {
    Packet(Packet),
    /// No complete packet is buffered; feed more pages.
    NeedMorePages,
    /// Data was lost between pages. Reported once per gap.
    Corrupt,
}

/// Reasons a page is refused by a logical stream.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedError {
    #[error("page serial {found:#x} does not belong to stream {expected:#x}")]
    SerialMismatch { expected: u32, found: u32 },

    #[error("unsupported page version {0}")]
    UnsupportedVersion(u8),
}

#[derive(Debug)]
enum Queued {
    Packet(Packet),
    Gap,
}

#[derive(Debug)]
struct Partial {
    data: BytesMut,
    bos: bool,
}

/// Packet reassembly state for a single logical stream.
#[derive(Debug)]
pub struct LogicalStream {
    serial: u32,
    next_sequence: Option<u32>,
    partial: Option<Partial>,
    queue: VecDeque<Queued>,
    packet_no: u64,
    eos: bool,
    pages: u64,
}

impl LogicalStream {
    pub fn new(serial: u32) -> Self {
        Self {
            serial,
            next_sequence: None,
            partial: None,
            queue: VecDeque::new(),
            packet_no: 0,
            eos: false,
            pages: 0,
        }
    }

    pub const fn serial(&self) -> u32 {
        self.serial
    }

    /// Number of pages accepted so far.
    pub const fn pages(&self) -> u64 {
        self.pages
    }

    /// An end-of-stream page has been accepted.
    pub const fn eos_seen(&self) -> bool {
        self.eos
    }

    /// Accept the next page of this stream.
    ///
    /// Sequence gaps are not an error here: they surface as a
    /// [`PacketOutcome::Corrupt`] at the position of the lost data.
    pub fn feed_page(&mut self, page: &Page) -> Result<(), FeedError> {
        if page.version() != 0 {
            return Err(FeedError::UnsupportedVersion(page.version()));
        }
        if page.serial() != self.serial {
            return Err(FeedError::SerialMismatch {
                expected: self.serial,
                found: page.serial(),
            });
        }

        if let Some(expected) = self.next_sequence {
            if page.sequence() != expected {
                debug!(
                    "Stream {:#x}: expected page {expected}, got {}",
                    self.serial,
                    page.sequence()
                );
                self.partial = None;
                self.queue.push_back(Queued::Gap);
            }
        }
        self.next_sequence = Some(page.sequence().wrapping_add(1));

        if !page.is_continued() && self.partial.take().is_some() {
            debug!("Stream {:#x}: unterminated packet dropped", self.serial);
            self.queue.push_back(Queued::Gap);
        }
        let skip_first = page.is_continued() && self.partial.is_none();

        let mut bos = page.is_bos() && !page.is_continued();
        let first_new = self.queue.len();
        for (index, fragment) in page.fragments().enumerate() {
            if index == 0 && skip_first {
                trace!("Stream {:#x}: skipping orphaned continuation", self.serial);
                continue;
            }

            let (data, packet_bos) = match self.partial.take() {
                Some(mut partial) => {
                    partial.data.extend_from_slice(&fragment.data);
                    (partial.data.freeze(), partial.bos)
                }
                None => {
                    let started_bos = bos;
                    bos = false;
                    (fragment.data, started_bos)
                }
            };

            if fragment.complete {
                self.queue.push_back(Queued::Packet(Packet {
                    data,
                    packet_no: self.packet_no,
                    granule_position: None,
                    bos: packet_bos,
                    eos: false,
                }));
                self.packet_no += 1;
            } else {
                self.partial = Some(Partial {
                    data: BytesMut::from(data.as_ref()),
                    bos: packet_bos,
                });
            }
        }

        let completed_here = self.queue.len() > first_new && page.completed_packets() > 0;
        if completed_here {
            if let Some(Queued::Packet(last)) = self.queue.back_mut() {
                last.granule_position = Some(page.granule_position());
                last.eos = page.is_eos();
            }
        }

        if page.is_eos() {
            self.eos = true;
        }
        self.pages += 1;
        Ok(())
    }

    /// Take the next packet in arrival order.
    pub fn extract_packet(&mut self) -> PacketOutcome {
        match self.queue.pop_front() {
            Some(Queued::Packet(packet)) => PacketOutcome::Packet(packet),
            Some(Queued::Gap) => PacketOutcome::Corrupt,
            None => PacketOutcome::NeedMorePages,
        }
    }
}
