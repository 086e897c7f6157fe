//! Core domain types for oggfeed.

pub mod stream;
pub mod time;

pub use stream::StreamInfo;
pub use time::Seconds;
