//! Lock-free buffers between the decode thread and PCM consumers.

pub mod ring;

pub use ring::{shared_ring_buffer, RingBuffer, SharedRingBuffer};
