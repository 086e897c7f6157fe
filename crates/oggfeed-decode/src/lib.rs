//! # oggfeed-decode
//!
//! Streaming Ogg Vorbis decoding driven by host capabilities.
//!
//! A decode invocation pulls compressed bytes from a [`ByteSource`], frames
//! them into Ogg pages, reassembles packets per logical stream, validates the
//! three Vorbis headers, hands audio packets to a [`CodecEngine`], and
//! pushes interleaved 16-bit PCM to a [`PcmSink`] while reporting progress to
//! a [`DecodeListener`]. Chained streams are decoded back to back in one
//! invocation.
//!
//! Features:
//! - Bounded working memory: one read buffer, one conversion buffer
//! - Corrupt data mid-stream is logged and skipped
//! - Seekable file decoding with a host-driven seek bridge
//! - Threaded player over a lock-free PCM ring, with optional cpal output

pub mod buffer;
pub mod codec;
pub mod convert;
pub mod decoder;
pub mod elapsed;
pub mod feed;
pub mod header;
pub mod metadata;
pub mod ogg;
#[cfg(feature = "playback")]
pub mod output;
pub mod player;

#[cfg(test)]
pub(crate) mod testing;

pub use codec::{CodecEngine, DecodedBlock, OggFile, PacketDecoder, VorbisEngine};
pub use decoder::{
    decode_file, decode_stream, run_file_decoder, FileDecoder, FileRead, StreamDecoder,
};
pub use feed::{ByteSource, DecodeListener, PcmSink, ReaderSource};
pub use header::{HeaderState, HeaderValidator, StreamHeaders};
pub use metadata::{read_file_info, read_stream_info};
pub use player::{PlaybackState, PlayerEvent, VorbisPlayer};
