//! Lock-free PCM ring buffer.
//!
//! Single producer, single consumer: a decode thread writes interleaved
//! 16-bit samples and an audio callback (or any other consumer) reads them.
//! A third party may ask for the unread samples to be dropped; the consumer
//! applies the request on its next read.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Lock-free single-producer, single-consumer ring of `i16` samples.
///
/// Positions are free-running counters; the slot index is `pos & mask`.
/// Allocation happens once, in [`RingBuffer::new`].
pub struct RingBuffer {
    slots: Box<[UnsafeCell<i16>]>,
    read_pos: AtomicUsize,
    write_pos: AtomicUsize,
    /// Write position captured by the last [`RingBuffer::clear`].
    clear_to: AtomicUsize,
    clear_pending: AtomicBool,
    /// Power of two.
    capacity: usize,
    mask: usize,
}

// SAFETY: slots in [read_pos, write_pos) belong to the consumer and the rest
// to the producer. Only the consumer stores read_pos, clears included. Each
// side publishes a handoff with a Release store of its position and observes
// the other side's with an Acquire load, so no slot is accessed from both
// sides at once.
#[allow(unsafe_code)]
unsafe impl Sync for RingBuffer {}

impl RingBuffer {
    /// Create a ring holding at least `capacity` samples, rounded up to the
    /// next power of two.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1).next_power_of_two();
        let slots = (0..capacity).map(|_| UnsafeCell::new(0)).collect();

        Self {
            slots,
            read_pos: AtomicUsize::new(0),
            write_pos: AtomicUsize::new(0),
            clear_to: AtomicUsize::new(0),
            clear_pending: AtomicBool::new(false),
            capacity,
            mask: capacity - 1,
        }
    }

    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Samples ready for the consumer, not counting any that a pending
    /// clear will drop.
    pub fn available(&self) -> usize {
        let write = self.write_pos.load(Ordering::Acquire);
        let read = self.read_pos.load(Ordering::Acquire);
        write.wrapping_sub(self.cleared_read_pos(read))
    }

    /// Slots free for the producer. Slots held by samples awaiting a pending
    /// clear stay occupied until the consumer applies it.
    pub fn free(&self) -> usize {
        let write = self.write_pos.load(Ordering::Acquire);
        let read = self.read_pos.load(Ordering::Acquire);
        self.capacity - write.wrapping_sub(read)
    }

    pub fn is_empty(&self) -> bool {
        self.available() == 0
    }

    /// Copy as many of `samples` as fit. Producer side only.
    ///
    /// Returns the number of samples written.
    pub fn write(&self, samples: &[i16]) -> usize {
        let write_pos = self.write_pos.load(Ordering::Relaxed);
        let read_pos = self.read_pos.load(Ordering::Acquire);

        let space = self.capacity - write_pos.wrapping_sub(read_pos);
        let n = samples.len().min(space);

        for (offset, &sample) in samples[..n].iter().enumerate() {
            let slot = &self.slots[write_pos.wrapping_add(offset) & self.mask];
            // SAFETY: the slot lies outside [read_pos, write_pos), so the
            // consumer does not touch it until the store below publishes it.
            #[allow(unsafe_code)]
            unsafe {
                *slot.get() = sample;
            }
        }

        if n > 0 {
            self.write_pos
                .store(write_pos.wrapping_add(n), Ordering::Release);
        }
        n
    }

    /// Move up to `output.len()` samples out of the ring. Consumer side only.
    ///
    /// Returns the number of samples read.
    pub fn read(&self, output: &mut [i16]) -> usize {
        self.apply_clear();
        let read_pos = self.read_pos.load(Ordering::Relaxed);
        let write_pos = self.write_pos.load(Ordering::Acquire);

        let n = output.len().min(write_pos.wrapping_sub(read_pos));

        for (offset, out) in output[..n].iter_mut().enumerate() {
            let slot = &self.slots[read_pos.wrapping_add(offset) & self.mask];
            // SAFETY: the slot lies inside [read_pos, write_pos), published by
            // the producer's Release store and not reused until read_pos moves.
            #[allow(unsafe_code)]
            unsafe {
                *out = *slot.get();
            }
        }

        if n > 0 {
            self.read_pos
                .store(read_pos.wrapping_add(n), Ordering::Release);
        }
        n
    }

    /// Drop every sample written so far. Safe from any thread; the consumer
    /// skips the dropped samples on its next [`read`](Self::read).
    pub fn clear(&self) {
        let write_pos = self.write_pos.load(Ordering::Acquire);
        self.clear_to.store(write_pos, Ordering::Relaxed);
        self.clear_pending.store(true, Ordering::Release);
    }

    /// Where the consumer will resume once a pending clear is applied.
    fn cleared_read_pos(&self, read_pos: usize) -> usize {
        if !self.clear_pending.load(Ordering::Acquire) {
            return read_pos;
        }
        let clear_to = self.clear_to.load(Ordering::Relaxed);
        // The consumer may already be past the captured position.
        if clear_to.wrapping_sub(read_pos) <= self.capacity {
            clear_to
        } else {
            read_pos
        }
    }

    /// Consumer side: move the read position past cleared samples.
    fn apply_clear(&self) {
        if !self.clear_pending.swap(false, Ordering::Acquire) {
            return;
        }
        let read_pos = self.read_pos.load(Ordering::Relaxed);
        let clear_to = self.clear_to.load(Ordering::Relaxed);
        if clear_to.wrapping_sub(read_pos) <= self.capacity {
            self.read_pos.store(clear_to, Ordering::Release);
        }
    }
}

/// Thread-safe handle to a ring buffer.
pub type SharedRingBuffer = Arc<RingBuffer>;

pub fn shared_ring_buffer(capacity: usize) -> SharedRingBuffer {
    Arc::new(RingBuffer::new(capacity))
}
