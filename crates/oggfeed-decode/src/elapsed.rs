//! Whole-second playback position tracking.

/// Derives elapsed seconds from the number of frames delivered.
#[derive(Debug, Clone, Copy)]
pub struct SampleClock {
    rate: u64,
    accumulated: u64,
    elapsed: u64,
}

impl SampleClock {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            rate: u64::from(sample_rate.max(1)),
            accumulated: 0,
            elapsed: 0,
        }
    }

    /// Count `frames` more frames. Returns the new elapsed value when it
    /// advanced.
    ///
    /// Seconds are carried out of the accumulator only once it holds more
    /// than a full second of frames.
    pub fn advance(&mut self, frames: usize) -> Option<u64> {
        self.accumulated += frames as u64;
        if self.accumulated <= self.rate {
            return None;
        }
        self.elapsed += self.accumulated / self.rate;
        self.accumulated %= self.rate;
        Some(self.elapsed)
    }

    pub const fn elapsed(&self) -> u64 {
        self.elapsed
    }
}

/// Reports a queried position only when its whole-second value changes.
#[derive(Debug, Clone, Copy, Default)]
pub struct PositionTracker {
    last: u64,
}

impl PositionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, seconds: u64) -> Option<u64> {
        if seconds == self.last {
            return None;
        }
        self.last = seconds;
        Some(seconds)
    }
}
