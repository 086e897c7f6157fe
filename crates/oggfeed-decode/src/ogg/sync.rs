//! Stream synchronizer: turns arbitrarily chunked bytes into whole pages.

use bytes::{Buf, BytesMut};
use tracing::trace;

use super::page::{self, Framing, Page};

/// Outcome of asking the synchronizer for the next page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// A complete, checksummed page.
    Page(Page),
    /// The buffered bytes do not yet hold a complete page.
    NeedMoreData,
    /// Framing was lost; `skipped` bytes were discarded while looking for the
    /// next capture pattern. Calling again resumes the search.
    Corrupt { skipped: usize },
}

/// Accumulates submitted bytes and extracts pages in arrival order.
///
/// Loss of sync is reported once; bytes skipped afterwards while hunting for
/// the next page are dropped silently until a page frames cleanly again.
#[derive(Debug, Default)]
pub struct Synchronizer {
    buffer: BytesMut,
    unsynced: bool,
    pages: u64,
}

impl Synchronizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a synchronizer whose buffer starts with room for `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(capacity),
            ..Self::default()
        }
    }

    /// Append bytes read from the source.
    pub fn submit(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Number of submitted bytes not yet returned as part of a page.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Number of pages extracted so far.
    pub const fn pages(&self) -> u64 {
        self.pages
    }

    /// Extract the next page from the buffered bytes.
    pub fn extract_page(&mut self) -> SyncOutcome {
        loop {
            match page::frame(&self.buffer) {
                Framing::Complete(len) => {
                    let data = self.buffer.split_to(len).freeze();
                    let page = Page::from_framed(data);
                    self.unsynced = false;
                    self.pages += 1;
                    trace!(
                        "Page {}: serial={:#x} seq={} len={}",
                        self.pages,
                        page.serial(),
                        page.sequence(),
                        len
                    );
                    return SyncOutcome::Page(page);
                }
                Framing::Incomplete => return SyncOutcome::NeedMoreData,
                Framing::Invalid => {
                    let skipped = self.next_candidate();
                    self.buffer.advance(skipped);
                    if !self.unsynced {
                        self.unsynced = true;
                        return SyncOutcome::Corrupt { skipped };
                    }
                }
            }
        }
    }

    /// Drop all buffered bytes and forget any loss of sync.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.unsynced = false;
    }

    /// Offset of the next byte that could start a capture pattern.
    fn next_candidate(&self) -> usize {
        self.buffer
            .iter()
            .skip(1)
            .position(|&b| b == page::CAPTURE_PATTERN[0])
            .map_or(self.buffer.len(), |pos| pos + 1)
    }
}
