//! Decode orchestrators.
//!
//! [`StreamDecoder`] pulls an Ogg bitstream from a byte source and drives
//! framing, header validation, chaining and decoding itself. The file
//! variant ([`decode_file`]) hands all of that to a seekable
//! [`FileDecoder`] and adds conversion, position reporting and a seek bridge.

mod file;
mod stream;

pub(crate) use file::open_and_run;
pub use file::{decode_file, run_file_decoder, FileDecoder, FileRead};
pub use stream::{decode_stream, StreamDecoder};
