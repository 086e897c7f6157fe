//! Audio output of the player's ring buffer using cpal.

use std::sync::Arc;

use cpal::{
    traits::{DeviceTrait, HostTrait, StreamTrait},
    BufferSize, Device, SampleFormat, SampleRate, Stream, StreamConfig,
};
use oggfeed_core::{Error, Result, StreamInfo};
use tracing::{debug, error, info, warn};

use crate::buffer::SharedRingBuffer;
use crate::player::{PlaybackState, Shared, VorbisPlayer};

/// Audio output stream wrapper.
///
/// The device is opened at the stream's own rate and channel count; PCM is
/// played as decoded, with no resampling. Output is silent while paused and
/// keeps draining the ring after the decode finishes.
pub struct AudioOutput {
    _stream: Stream,
    device_name: String,
    sample_rate: u32,
    channels: u16,
}

impl AudioOutput {
    /// Play `player`'s ring on the default output device.
    pub fn for_player(player: &VorbisPlayer, info: &StreamInfo) -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| Error::AudioOutput("No output device found".to_string()))?;
        Self::with_device(&device, player.ring(), player.shared(), info)
    }

    fn with_device(
        device: &Device,
        ring: SharedRingBuffer,
        shared: Arc<Shared>,
        info: &StreamInfo,
    ) -> Result<Self> {
        let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        info!("Using audio output device: {device_name}");

        let supported = device
            .default_output_config()
            .map_err(|e| Error::AudioOutput(format!("Failed to get output config: {e}")))?;
        debug!("Default output config: {supported:?}");

        let config = StreamConfig {
            channels: info.channels,
            sample_rate: SampleRate(info.sample_rate),
            buffer_size: BufferSize::Default,
        };

        let stream = match supported.sample_format() {
            SampleFormat::I16 => build_stream::<i16>(device, &config, ring, shared)?,
            SampleFormat::F32 => build_stream::<f32>(device, &config, ring, shared)?,
            SampleFormat::U16 => build_stream::<u16>(device, &config, ring, shared)?,
            format => {
                return Err(Error::AudioOutput(format!(
                    "Unsupported sample format: {format:?}"
                )));
            }
        };
        stream
            .play()
            .map_err(|e| Error::AudioOutput(format!("Failed to start stream: {e}")))?;

        Ok(Self {
            _stream: stream,
            device_name,
            sample_rate: info.sample_rate,
            channels: info.channels,
        })
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    pub const fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub const fn channels(&self) -> u16 {
        self.channels
    }
}

fn build_stream<T>(
    device: &Device,
    config: &StreamConfig,
    ring: SharedRingBuffer,
    shared: Arc<Shared>,
) -> Result<Stream>
where
    T: cpal::SizedSample + cpal::FromSample<f32>,
{
    let mut scratch: Vec<i16> = Vec::new();

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                if *shared.state.read() == PlaybackState::Paused {
                    data.fill(T::from_sample(0.0f32));
                    return;
                }

                if scratch.len() < data.len() {
                    scratch.resize(data.len(), 0);
                }
                let read = ring.read(&mut scratch[..data.len()]);
                let volume = *shared.volume.lock();

                for (i, out) in data.iter_mut().enumerate() {
                    let sample = if i < read {
                        f32::from(scratch[i]) / 32768.0 * volume
                    } else {
                        0.0
                    };
                    *out = T::from_sample(sample);
                }

                if read > 0 && read < data.len() {
                    warn!("Buffer underrun: needed {}, got {read}", data.len());
                }
            },
            |err| error!("Audio stream error: {err}"),
            None,
        )
        .map_err(|e| Error::AudioOutput(format!("Failed to build stream: {e}")))
}

/// Names of the available output devices.
pub fn list_output_devices() -> Result<Vec<String>> {
    let host = cpal::default_host();
    let devices = host
        .output_devices()
        .map_err(|e| Error::AudioOutput(format!("Failed to list devices: {e}")))?
        .filter_map(|d| d.name().ok())
        .collect();
    Ok(devices)
}
