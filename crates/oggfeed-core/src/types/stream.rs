//! Stream parameter types.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::time::Seconds;

/// Parameters of a logical stream, published once its headers are read.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StreamInfo {
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Number of audio channels.
    pub channels: u16,
    /// Encoder vendor string from the comment header.
    pub vendor: String,
    /// Total play time, when the source can tell.
    pub duration: Option<Seconds>,
}

impl StreamInfo {
    pub fn new(sample_rate: u32, channels: u16, vendor: impl Into<String>) -> Self {
        Self {
            sample_rate,
            channels,
            vendor: vendor.into(),
            duration: None,
        }
    }

    #[must_use]
    pub fn with_duration(mut self, duration: Option<Seconds>) -> Self {
        self.duration = duration;
        self
    }

    /// Duration as the signed runtime value hosts expect, `-1` when unknown.
    #[allow(clippy::cast_possible_wrap)]
    pub fn runtime_seconds(&self) -> i64 {
        self.duration.map_or(-1, |d| d.as_secs() as i64)
    }
}

impl fmt::Display for StreamInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} Hz, {} channel(s), vendor \"{}\"",
            self.sample_rate, self.channels, self.vendor
        )?;
        match self.duration {
            Some(d) => write!(f, ", {}", d.format()),
            None => write!(f, ", duration unknown"),
        }
    }
}
