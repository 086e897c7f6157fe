//! Error types for oggfeed.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using oggfeed's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Outcome of one decode invocation.
///
/// `Ok(())` covers normal completion, a sink-requested abort, and an input
/// that ended cleanly before any stream started.
pub type DecodeResult = std::result::Result<(), DecodeError>;

/// Status code reported to hosts for a successful decode invocation.
pub const SUCCESS_CODE: i32 = 0;

/// Main error type for oggfeed.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Decode failed: {0}")]
    Decode(#[from] DecodeError),

    #[error("Codec error: {0}")]
    Codec(String),

    #[error("Audio output error: {0}")]
    AudioOutput(String),

    #[error("Unsupported audio format: {0}")]
    UnsupportedFormat(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// The decode failure kind behind this error, if any.
    pub const fn decode_kind(&self) -> Option<DecodeError> {
        match self {
            Self::Decode(kind) => Some(*kind),
            _ => None,
        }
    }
}

/// Fatal failure kinds of a decode invocation.
///
/// The set is closed: hosts branch on these (or on [`DecodeError::code`]),
/// so variants are never added for steady-state problems, which are logged
/// and skipped instead.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DecodeError {
    /// Bytes were delivered but no Ogg page could be framed from them.
    #[error("input is not an Ogg bitstream")]
    InvalidOggBitstream,

    /// The first page could not be associated with a logical stream.
    #[error("failed to read the first page of the logical stream")]
    ErrorReadingFirstPage,

    /// The first page did not yield a complete packet.
    #[error("failed to read the initial header packet")]
    ErrorReadingInitialHeaderPacket,

    /// The first packet is not a Vorbis identification header.
    #[error("bitstream does not contain Vorbis audio data")]
    NotVorbisHeader,

    /// The comment or codebook header is missing or invalid.
    #[error("corrupt secondary header")]
    CorruptSecondaryHeader,

    /// The byte source ended before all three headers were read.
    #[error("end of file before finding all Vorbis headers")]
    PrematureEndOfFile,
}

impl DecodeError {
    pub const ALL: [Self; 6] = [
        Self::InvalidOggBitstream,
        Self::ErrorReadingFirstPage,
        Self::ErrorReadingInitialHeaderPacket,
        Self::NotVorbisHeader,
        Self::CorruptSecondaryHeader,
        Self::PrematureEndOfFile,
    ];

    /// Stable integer status code for this failure kind.
    pub const fn code(self) -> i32 {
        match self {
            Self::InvalidOggBitstream => -21,
            Self::ErrorReadingFirstPage => -22,
            Self::ErrorReadingInitialHeaderPacket => -23,
            Self::NotVorbisHeader => -24,
            Self::CorruptSecondaryHeader => -25,
            Self::PrematureEndOfFile => -26,
        }
    }

    /// Look up a failure kind by status code.
    pub fn from_code(code: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.code() == code)
    }
}

/// Collapse a decode result into the host-facing status code.
pub const fn status_code(result: DecodeResult) -> i32 {
    match result {
        Ok(()) => SUCCESS_CODE,
        Err(kind) => kind.code(),
    }
}
