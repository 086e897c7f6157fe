//! Ogg container layer: page framing, synchronization, and per-stream packet
//! reassembly.

pub(crate) mod crc;
pub mod page;
pub mod reader;
pub mod stream;
pub mod sync;

pub use page::{Fragment, Page};
pub use reader::{PageFetch, PageReader};
pub use stream::{FeedError, LogicalStream, Packet, PacketOutcome};
pub use sync::{SyncOutcome, Synchronizer};
