//! Seekable Ogg Vorbis file decoding through symphonia's format reader.

use std::fs::File;
use std::io::ErrorKind;
use std::path::Path;

use oggfeed_core::{Error, Result, StreamInfo};
use symphonia::core::{
    audio::AudioBuffer,
    codecs::{Decoder, DecoderOptions, CODEC_TYPE_VORBIS},
    errors::Error as SymphoniaError,
    formats::{FormatOptions, FormatReader, SeekMode, SeekTo},
    io::{MediaSourceStream, MediaSourceStreamOptions},
    meta::MetadataOptions,
    probe::Hint,
    units::Time,
};
use tracing::{debug, info, trace, warn};

use super::vorbis::append_planar;
use super::PlanarBuffer;
use crate::decoder::{FileDecoder, FileRead};
use crate::metadata::read_file_info;

/// An opened Ogg Vorbis file.
///
/// Stream parameters and duration come from a header scan of the file;
/// decoding and seeking go through symphonia.
pub struct OggFile {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    info: StreamInfo,
    pending: PlanarBuffer,
    scratch: Option<AudioBuffer<f32>>,
    /// Timestamp, in frames, of the first pending frame.
    position: u64,
    /// Frames handed out by the last read, consumed on the next.
    served: usize,
    /// Frames before this timestamp are dropped after an accurate seek.
    seek_target: Option<u64>,
}

impl OggFile {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let info = read_file_info(path)?;

        let file = File::open(path)?;
        let mss = MediaSourceStream::new(Box::new(file), MediaSourceStreamOptions::default());

        let mut hint = Hint::new();
        hint.with_extension("ogg");

        let format_opts = FormatOptions {
            enable_gapless: true,
            ..Default::default()
        };
        let opened = symphonia::default::get_probe()
            .format(&hint, mss, &format_opts, &MetadataOptions::default())
            .map_err(|e| Error::UnsupportedFormat(format!("Failed to open format: {e}")))?;

        let format = opened.format;
        let (track_id, decoder, channels) = bind_track(format.as_ref())?;
        let channels = channels.unwrap_or(usize::from(info.channels));

        info!("Opened {}: {info}", path.display());
        Ok(Self {
            format,
            decoder,
            track_id,
            info,
            pending: PlanarBuffer::new(channels),
            scratch: None,
            position: 0,
            served: 0,
            seek_target: None,
        })
    }

    /// Rebind the decoder after the format reader's track list changed.
    fn reselect_track(&mut self) -> Result<()> {
        let (track_id, decoder, channels) = bind_track(self.format.as_ref())?;
        self.track_id = track_id;
        self.decoder = decoder;
        self.pending = PlanarBuffer::new(channels.unwrap_or(self.pending.channels()));
        self.seek_target = None;
        debug!("Decoding track {track_id}");
        Ok(())
    }

    fn rate(&self) -> u64 {
        u64::from(self.info.sample_rate.max(1))
    }

    /// Drop pending frames that precede the last seek target.
    fn skip_to_target(&mut self) {
        let Some(target) = self.seek_target else {
            return;
        };
        let behind = usize::try_from(target.saturating_sub(self.position)).unwrap_or(usize::MAX);
        let n = behind.min(self.pending.available());
        self.pending.consume(n);
        self.position += n as u64;
        if self.pending.available() > 0 {
            self.seek_target = None;
        }
    }
}

impl FileDecoder for OggFile {
    fn info(&self) -> StreamInfo {
        self.info.clone()
    }

    fn read(&mut self, max_frames: usize) -> FileRead<'_> {
        self.pending.consume(self.served);
        self.position += self.served as u64;
        self.served = 0;

        while self.pending.available() == 0 {
            let packet = match self.format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::ResetRequired) => {
                    debug!("Track list changed, reselecting");
                    if let Err(e) = self.reselect_track() {
                        warn!("Cannot continue after stream change: {e}");
                        return FileRead::End;
                    }
                    continue;
                }
                Err(SymphoniaError::IoError(e)) if e.kind() == ErrorKind::UnexpectedEof => {
                    return FileRead::End;
                }
                Err(e) => {
                    warn!("Failed to read packet: {e}");
                    return FileRead::End;
                }
            };

            if packet.track_id() != self.track_id {
                continue;
            }

            match self.decoder.decode(&packet) {
                Ok(decoded) => {
                    self.position = packet.ts();
                    append_planar(&decoded, &mut self.pending, &mut self.scratch);
                    trace!("Packet at {} decoded", packet.ts());
                }
                Err(e) => {
                    warn!("Skipping undecodable packet at {}: {e}", packet.ts());
                    return FileRead::Hole;
                }
            }
            self.skip_to_target();
        }

        match self.pending.view() {
            Some(block) => {
                let block = block.truncated(max_frames);
                self.served = block.frames();
                FileRead::Block(block)
            }
            None => FileRead::End,
        }
    }

    fn position_secs(&self) -> u64 {
        (self.position + self.served as u64) / self.rate()
    }

    fn seek_secs(&mut self, seconds: u64) -> Result<()> {
        let seeked = self
            .format
            .seek(
                SeekMode::Accurate,
                SeekTo::Time {
                    time: Time::new(seconds, 0.0),
                    track_id: Some(self.track_id),
                },
            )
            .map_err(|e| Error::Codec(format!("Seek to {seconds}s failed: {e}")))?;

        self.decoder.reset();
        self.pending.clear();
        self.served = 0;
        self.position = seeked.actual_ts;
        self.seek_target = Some(seeked.required_ts);
        debug!(
            "Seeked to {seconds}s (required ts {}, actual ts {})",
            seeked.required_ts, seeked.actual_ts
        );
        Ok(())
    }
}

/// Find the first Vorbis track and create a decoder for it.
fn bind_track(format: &dyn FormatReader) -> Result<(u32, Box<dyn Decoder>, Option<usize>)> {
    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec == CODEC_TYPE_VORBIS)
        .ok_or_else(|| Error::UnsupportedFormat("No Vorbis track found".to_string()))?;

    let decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| Error::Codec(format!("Failed to create decoder: {e}")))?;
    let channels = track.codec_params.channels.map(|c| c.count());
    Ok((track.id, decoder, channels))
}
