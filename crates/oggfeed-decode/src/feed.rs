//! Host capabilities consumed by a decode invocation.
//!
//! A decode pulls compressed bytes from a [`ByteSource`], pushes interleaved
//! 16-bit PCM into a [`PcmSink`], and reports progress to a
//! [`DecodeListener`]. All calls happen synchronously on the decoding thread.

use std::io::{ErrorKind, Read};

use oggfeed_core::StreamInfo;
use tracing::warn;

/// Supplies compressed input.
pub trait ByteSource {
    /// Fill up to `buf.len()` bytes and return how many were written.
    /// Returning `0` signals end of input.
    fn read(&mut self, buf: &mut [u8]) -> usize;
}

impl<F> ByteSource for F
where
    F: FnMut(&mut [u8]) -> usize,
{
    fn read(&mut self, buf: &mut [u8]) -> usize {
        self(buf)
    }
}

/// Adapts any [`Read`] into a [`ByteSource`].
///
/// I/O errors end the input; they are logged, not propagated.
#[derive(Debug)]
pub struct ReaderSource<R> {
    inner: R,
}

impl<R: Read> ReaderSource<R> {
    pub const fn new(inner: R) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read> ByteSource for ReaderSource<R> {
    fn read(&mut self, buf: &mut [u8]) -> usize {
        loop {
            match self.inner.read(buf) {
                Ok(n) => return n,
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => {
                    warn!("Source read failed, treating as end of input: {e}");
                    return 0;
                }
            }
        }
    }
}

/// Receives decoded PCM.
pub trait PcmSink {
    /// Accept interleaved samples. Returning `false` aborts the invocation.
    fn write(&mut self, samples: &[i16]) -> bool;

    /// Position the host wants playback moved to, in whole seconds.
    ///
    /// Only consulted by the file decoder. A new target is acted on once;
    /// `None` means no seek is wanted.
    fn seek_request(&mut self) -> Option<u64> {
        None
    }
}

impl<F> PcmSink for F
where
    F: FnMut(&[i16]) -> bool,
{
    fn write(&mut self, samples: &[i16]) -> bool {
        self(samples)
    }
}

/// Progress notifications from a decode invocation.
pub trait DecodeListener {
    /// Header reading is about to begin.
    fn on_header_start(&mut self) {}

    /// A logical stream's headers were accepted.
    fn on_stream_start(&mut self, _info: &StreamInfo) {}

    /// Whole seconds of audio delivered (or the playback position, for the
    /// file decoder) changed.
    fn on_elapsed_seconds(&mut self, _seconds: u64) {}

    /// The invocation is about to return. Called on every exit path.
    fn on_stop(&mut self) {}
}

impl DecodeListener for () {}
