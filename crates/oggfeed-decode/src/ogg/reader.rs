//! Pull-driven page reader over a byte source.

use tracing::{debug, warn};

use super::page::Page;
use super::sync::{SyncOutcome, Synchronizer};
use crate::feed::ByteSource;

/// Result of asking the reader for its next page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageFetch {
    Page(Page),
    /// Framing was lost. Asking again continues the search.
    Corrupt,
    /// The source is exhausted and no further page can be framed.
    Exhausted,
}

/// Feeds a [`Synchronizer`] from a [`ByteSource`] one chunk at a time.
///
/// Once the source returns zero bytes it is never read again.
pub struct PageReader<S> {
    source: S,
    sync: Synchronizer,
    chunk: Vec<u8>,
    exhausted: bool,
    pending: Option<Page>,
    bytes_read: u64,
}

impl<S: ByteSource> PageReader<S> {
    pub fn new(source: S, chunk_size: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            source,
            sync: Synchronizer::with_capacity(chunk_size * 2),
            chunk: vec![0; chunk_size],
            exhausted: false,
            pending: None,
            bytes_read: 0,
        }
    }

    /// Next page in arrival order, reading from the source as needed.
    pub fn next_page(&mut self) -> PageFetch {
        if let Some(page) = self.pending.take() {
            return PageFetch::Page(page);
        }

        loop {
            match self.sync.extract_page() {
                SyncOutcome::Page(page) => return PageFetch::Page(page),
                SyncOutcome::Corrupt { skipped } => {
                    debug!("Lost sync, skipped {skipped} bytes");
                    return PageFetch::Corrupt;
                }
                SyncOutcome::NeedMoreData => {
                    if !self.pull() {
                        return PageFetch::Exhausted;
                    }
                }
            }
        }
    }

    /// Return a page so the next [`next_page`](Self::next_page) yields it again.
    pub fn push_back(&mut self, page: Page) {
        self.pending = Some(page);
    }

    /// Bytes received from the source but not yet framed into a page.
    pub fn buffered(&self) -> usize {
        self.sync.buffered() + self.pending.as_ref().map_or(0, Page::framed_len)
    }

    pub const fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Total bytes received from the source.
    pub const fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    /// Read one chunk into the synchronizer. Returns `false` at end of input.
    fn pull(&mut self) -> bool {
        if self.exhausted {
            return false;
        }

        let mut n = self.source.read(&mut self.chunk);
        if n > self.chunk.len() {
            warn!(
                "Source reported {n} bytes for a {} byte buffer",
                self.chunk.len()
            );
            n = self.chunk.len();
        }
        if n == 0 {
            debug!("Source exhausted after {} bytes", self.bytes_read);
            self.exhausted = true;
            return false;
        }

        self.sync.submit(&self.chunk[..n]);
        self.bytes_read += n as u64;
        true
    }
}
