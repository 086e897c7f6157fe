//! Decode configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Largest channel count a Vorbis identification header can declare.
pub const MAX_CHANNELS: usize = 255;

/// Default number of bytes requested from a byte source per read.
pub const DEFAULT_READ_CHUNK_SIZE: usize = 4096;

/// Default interleaved capacity of the conversion buffer, in samples.
pub const DEFAULT_CONVERSION_CAPACITY: usize = 4096;

/// Buffer sizing for one decode invocation.
///
/// Both buffers are allocated once per invocation and reused, so these values
/// bound the decoder's working memory independent of stream length.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DecodeConfig {
    /// Maximum number of bytes requested from the source per read.
    pub read_chunk_size: usize,
    /// Interleaved sample capacity of the conversion buffer.
    pub conversion_capacity: usize,
}

impl Default for DecodeConfig {
    fn default() -> Self {
        Self {
            read_chunk_size: DEFAULT_READ_CHUNK_SIZE,
            conversion_capacity: DEFAULT_CONVERSION_CAPACITY,
        }
    }
}

impl DecodeConfig {
    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Check that every invocation using this configuration can make progress.
    pub fn validate(&self) -> Result<()> {
        if self.read_chunk_size == 0 {
            return Err(Error::Config("read_chunk_size must be non-zero".into()));
        }
        if self.conversion_capacity < MAX_CHANNELS {
            return Err(Error::Config(format!(
                "conversion_capacity must be at least {MAX_CHANNELS} samples, got {}",
                self.conversion_capacity
            )));
        }
        Ok(())
    }

    /// Frames converted per pass for a stream with `channels` channels.
    pub const fn frames_per_pass(&self, channels: usize) -> usize {
        if channels == 0 {
            return 0;
        }
        self.conversion_capacity / channels
    }
}
