//! WAV output for decoded PCM.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use anyhow::{Context, Result};
use oggfeed_core::StreamInfo;
use oggfeed_decode::{DecodeListener, PcmSink};
use tracing::{debug, info, warn};

/// Writes every sample it receives into a 16-bit WAV file.
pub struct WavSink {
    writer: Option<hound::WavWriter<BufWriter<File>>>,
    samples: u64,
    seek: Option<u64>,
    error: Option<hound::Error>,
}

impl WavSink {
    pub fn create(path: &Path, info: &StreamInfo) -> Result<Self> {
        let spec = hound::WavSpec {
            channels: info.channels,
            sample_rate: info.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let writer = hound::WavWriter::create(path, spec)
            .with_context(|| format!("Failed to create WAV file {}", path.display()))?;

        Ok(Self {
            writer: Some(writer),
            samples: 0,
            seek: None,
            error: None,
        })
    }

    /// Ask the file decoder to start at `seconds`.
    pub fn with_seek(mut self, seconds: Option<u64>) -> Self {
        self.seek = seconds;
        self
    }

    /// Flush the header and return the number of samples written.
    pub fn finish(mut self) -> Result<u64> {
        if let Some(e) = self.error.take() {
            return Err(e).context("Failed to write sample");
        }
        if let Some(writer) = self.writer.take() {
            writer.finalize().context("Failed to finalize WAV file")?;
        }
        Ok(self.samples)
    }
}

impl PcmSink for WavSink {
    fn write(&mut self, samples: &[i16]) -> bool {
        let Some(writer) = self.writer.as_mut() else {
            return false;
        };
        for &sample in samples {
            if let Err(e) = writer.write_sample(sample) {
                self.error = Some(e);
                return false;
            }
        }
        self.samples += samples.len() as u64;
        true
    }

    fn seek_request(&mut self) -> Option<u64> {
        self.seek
    }
}

/// Logs decode progress and flags chained streams whose parameters differ
/// from the WAV header.
pub struct ProgressListener {
    expected: StreamInfo,
    streams: usize,
}

impl ProgressListener {
    pub const fn new(expected: StreamInfo) -> Self {
        Self {
            expected,
            streams: 0,
        }
    }

    pub const fn streams(&self) -> usize {
        self.streams
    }
}

impl DecodeListener for ProgressListener {
    fn on_stream_start(&mut self, info: &StreamInfo) {
        self.streams += 1;
        info!("Stream {}: {info}", self.streams);
        if info.sample_rate != self.expected.sample_rate || info.channels != self.expected.channels
        {
            warn!(
                "Stream {} is {} Hz / {} channel(s) but the WAV header says {} Hz / {}",
                self.streams,
                info.sample_rate,
                info.channels,
                self.expected.sample_rate,
                self.expected.channels
            );
        }
    }

    fn on_elapsed_seconds(&mut self, seconds: u64) {
        debug!("{seconds}s decoded");
    }
}
