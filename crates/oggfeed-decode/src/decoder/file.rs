//! File decode orchestrator with a host-driven seek bridge.

use std::path::Path;

use oggfeed_core::{DecodeConfig, DecodeError, DecodeResult, Result, StreamInfo};
use tracing::{debug, error, info, warn};

use crate::codec::{DecodedBlock, OggFile};
use crate::convert::SampleConverter;
use crate::elapsed::PositionTracker;
use crate::feed::{DecodeListener, PcmSink};

/// Result of one [`FileDecoder::read`].
#[derive(Debug)]
pub enum FileRead<'a> {
    /// Decoded frames. Valid until the next call on the decoder.
    Block(DecodedBlock<'a>),
    /// A damaged region was skipped; call again.
    Hole,
    /// No more audio.
    End,
}

/// A seekable decoder that handles framing and chaining itself.
pub trait FileDecoder {
    fn info(&self) -> StreamInfo;

    /// Decode up to `max_frames` frames.
    fn read(&mut self, max_frames: usize) -> FileRead<'_>;

    /// Current playback position in whole seconds.
    fn position_secs(&self) -> u64;

    fn seek_secs(&mut self, seconds: u64) -> Result<()>;
}

/// Open `path` and decode it into `sink`.
///
/// An unusable `config` is refused before the file is touched. Otherwise the
/// invocation's outcome is returned: a file that cannot be opened as Ogg
/// Vorbis fails with [`DecodeError::NotVorbisHeader`] and the listener still
/// gets `on_stop`.
pub fn decode_file<K, L>(
    path: impl AsRef<Path>,
    sink: &mut K,
    listener: &mut L,
    config: &DecodeConfig,
) -> Result<DecodeResult>
where
    K: PcmSink + ?Sized,
    L: DecodeListener + ?Sized,
{
    config.validate()?;
    Ok(open_and_run(path.as_ref(), sink, listener, config))
}

/// [`decode_file`] for a configuration that has already been validated.
pub(crate) fn open_and_run<K, L>(
    path: &Path,
    sink: &mut K,
    listener: &mut L,
    config: &DecodeConfig,
) -> DecodeResult
where
    K: PcmSink + ?Sized,
    L: DecodeListener + ?Sized,
{
    match OggFile::open(path) {
        Ok(mut file) => run(&mut file, sink, listener, config),
        Err(e) => {
            error!("Cannot open {} as Ogg Vorbis: {e}", path.display());
            listener.on_stop();
            Err(DecodeError::NotVorbisHeader)
        }
    }
}

/// Drive an opened [`FileDecoder`] to the end of its audio.
///
/// After every block the sink's seek request is polled; a changed request is
/// forwarded to the decoder once.
pub fn run_file_decoder<F, K, L>(
    file: &mut F,
    sink: &mut K,
    listener: &mut L,
    config: &DecodeConfig,
) -> Result<DecodeResult>
where
    F: FileDecoder + ?Sized,
    K: PcmSink + ?Sized,
    L: DecodeListener + ?Sized,
{
    config.validate()?;
    Ok(run(file, sink, listener, config))
}

fn run<F, K, L>(file: &mut F, sink: &mut K, listener: &mut L, config: &DecodeConfig) -> DecodeResult
where
    F: FileDecoder + ?Sized,
    K: PcmSink + ?Sized,
    L: DecodeListener + ?Sized,
{
    listener.on_header_start();
    let info = file.info();
    info!("Decoding file: {info}");
    listener.on_stream_start(&info);

    let max_frames = config.frames_per_pass(usize::from(info.channels)).max(1);
    let mut converter = SampleConverter::new(config.conversion_capacity);
    let mut tracker = PositionTracker::new();
    let mut last_seek: Option<u64> = None;

    loop {
        let aborted = match file.read(max_frames) {
            FileRead::Block(block) => !drain_block(block, &mut converter, sink),
            FileRead::Hole => {
                warn!("Corrupt or missing data in bitstream; continuing");
                continue;
            }
            FileRead::End => break,
        };

        if let Some(seconds) = tracker.update(file.position_secs()) {
            listener.on_elapsed_seconds(seconds);
        }

        if aborted {
            info!("Sink aborted the decode");
            break;
        }

        let request = sink.seek_request();
        if request != last_seek {
            last_seek = request;
            if let Some(target) = request {
                debug!("Seek requested to {target}s");
                if let Err(e) = file.seek_secs(target) {
                    warn!("{e}");
                }
            }
        }
    }

    listener.on_stop();
    Ok(())
}

/// Convert and write `block` in as many passes as it takes. A link with more
/// channels than the first one yields blocks larger than a single pass.
///
/// Returns false once the sink refuses samples.
fn drain_block<K>(
    mut block: DecodedBlock<'_>,
    converter: &mut SampleConverter,
    sink: &mut K,
) -> bool
where
    K: PcmSink + ?Sized,
{
    while block.frames() > 0 {
        let pass = converter.convert(&block);
        if pass.frames == 0 {
            // A validated capacity holds at least one frame of any stream.
            warn!("{} channel block does not fit the conversion buffer", block.channels());
            break;
        }
        if !sink.write(converter.output()) {
            return false;
        }
        block = block.skipped(pass.frames);
    }
    true
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

    use super::*;
    use crate::codec::PlanarBuffer;
    use crate::testing::{Event, Recorder};
    use oggfeed_core::Error;

    /// One frame per tenth of a second, each frame's sample carrying its index.
    struct FakeFile {
        frames: u64,
        position: u64,
        holes: Vec<u64>,
        buffer: PlanarBuffer,
        seeks: Vec<u64>,
    }

    impl FakeFile {
        const RATE: u64 = 10;

        fn new(frames: u64) -> Self {
            Self {
                frames,
                position: 0,
                holes: Vec::new(),
                buffer: PlanarBuffer::new(1),
                seeks: Vec::new(),
            }
        }
    }

    impl FileDecoder for FakeFile {
        fn info(&self) -> StreamInfo {
            StreamInfo::new(10, 1, "fake")
        }

        fn read(&mut self, max_frames: usize) -> FileRead<'_> {
            if let Some(i) = self.holes.iter().position(|&h| h == self.position) {
                self.holes.remove(i);
                self.position += 1;
                return FileRead::Hole;
            }
            if self.position >= self.frames {
                return FileRead::End;
            }
            let n = (max_frames as u64).min(self.frames - self.position);
            let plane: Vec<f32> = (self.position..self.position + n)
                .map(|i| i as f32 / 32767.0)
                .collect();
            self.position += n;
            self.buffer.clear();
            self.buffer.extend_planes([plane.as_slice()]);
            FileRead::Block(self.buffer.view().unwrap())
        }

        fn position_secs(&self) -> u64 {
            self.position / Self::RATE
        }

        fn seek_secs(&mut self, seconds: u64) -> Result<()> {
            if seconds * Self::RATE > self.frames {
                return Err(Error::Codec(format!("{seconds}s is past the end")));
            }
            self.seeks.push(seconds);
            self.position = seconds * Self::RATE;
            Ok(())
        }
    }

    /// Sink that records samples and reports a fixed seek request after a
    /// given number of writes.
    struct SeekingSink {
        samples: Vec<i16>,
        writes: usize,
        seek_after: usize,
        target: u64,
        limit: usize,
    }

    impl PcmSink for SeekingSink {
        fn write(&mut self, samples: &[i16]) -> bool {
            self.samples.extend_from_slice(samples);
            self.writes += 1;
            self.writes < self.limit
        }

        fn seek_request(&mut self) -> Option<u64> {
            (self.writes >= self.seek_after).then_some(self.target)
        }
    }

    fn small_config() -> DecodeConfig {
        DecodeConfig {
            conversion_capacity: 256,
            ..DecodeConfig::default()
        }
    }

    #[test]
    fn test_reads_until_end() {
        let mut file = FakeFile::new(1000);
        let mut samples = Vec::new();
        let mut sink = |s: &[i16]| {
            samples.extend_from_slice(s);
            true
        };
        let mut recorder = Recorder::default();

        let result =
            run_file_decoder(&mut file, &mut sink, &mut recorder, &small_config()).unwrap();
        assert_eq!(result, Ok(()));
        assert_eq!(samples.len(), 1000);
        assert_eq!(samples[999], 999);

        assert_eq!(recorder.events[0], Event::HeaderStart);
        assert_eq!(recorder.stream_starts(), 1);
        // 256 frames per read at 10 frames per second.
        assert_eq!(recorder.elapsed(), vec![25, 51, 76, 100]);
        assert_eq!(recorder.events.last(), Some(&Event::Stop));
    }

    #[test]
    fn test_seek_issued_once_per_request() {
        let mut file = FakeFile::new(2000);
        let mut sink = SeekingSink {
            samples: Vec::new(),
            writes: 0,
            seek_after: 2,
            target: 150,
            limit: usize::MAX,
        };
        let mut recorder = Recorder::default();

        let result =
            run_file_decoder(&mut file, &mut sink, &mut recorder, &small_config()).unwrap();
        assert_eq!(result, Ok(()));
        assert_eq!(file.seeks, vec![150]);
        // Two reads of 256, then from frame 1500 to the end.
        assert_eq!(sink.samples.len(), 512 + 500);
        assert_eq!(sink.samples[512], 1500);
    }

    #[test]
    fn test_failed_seek_keeps_decoding() {
        let mut file = FakeFile::new(300);
        let mut sink = SeekingSink {
            samples: Vec::new(),
            writes: 0,
            seek_after: 1,
            target: 999,
            limit: usize::MAX,
        };
        let result = run_file_decoder(&mut file, &mut sink, &mut (), &small_config()).unwrap();
        assert_eq!(result, Ok(()));
        assert!(file.seeks.is_empty());
        assert_eq!(sink.samples.len(), 300);
    }

    #[test]
    fn test_holes_are_skipped() {
        let mut file = FakeFile::new(100);
        file.holes = vec![0];
        let mut samples = Vec::new();
        let mut sink = |s: &[i16]| {
            samples.extend_from_slice(s);
            true
        };

        let config = DecodeConfig {
            conversion_capacity: 255,
            ..DecodeConfig::default()
        };
        let result = run_file_decoder(&mut file, &mut sink, &mut (), &config).unwrap();
        assert_eq!(result, Ok(()));
        assert_eq!(samples.len(), 99);
        assert_eq!(samples[0], 1);
    }

    #[test]
    fn test_sink_abort_stops() {
        let mut file = FakeFile::new(5000);
        let mut sink = SeekingSink {
            samples: Vec::new(),
            writes: 0,
            seek_after: usize::MAX,
            target: 0,
            limit: 3,
        };
        let mut recorder = Recorder::default();

        let result =
            run_file_decoder(&mut file, &mut sink, &mut recorder, &small_config()).unwrap();
        assert_eq!(result, Ok(()));
        assert_eq!(sink.writes, 3);
        assert_eq!(recorder.events.last(), Some(&Event::Stop));
    }

    #[test]
    fn test_unopenable_file_is_not_vorbis() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, b"plain text, not audio").unwrap();

        let mut recorder = Recorder::default();
        let mut sink = |_: &[i16]| true;
        let result = decode_file(file.path(), &mut sink, &mut recorder, &DecodeConfig::default())
            .unwrap();

        assert_eq!(result, Err(DecodeError::NotVorbisHeader));
        assert_eq!(recorder.events, vec![Event::Stop]);
    }

    /// Mono link followed by a stereo link, one full block each.
    struct ChannelSwitch {
        links: Vec<usize>,
        buffer: PlanarBuffer,
        served: usize,
    }

    impl FileDecoder for ChannelSwitch {
        fn info(&self) -> StreamInfo {
            StreamInfo::new(8000, 1, "switch")
        }

        fn read(&mut self, max_frames: usize) -> FileRead<'_> {
            if self.links.is_empty() {
                return FileRead::End;
            }
            let channels = self.links.remove(0);
            let planes: Vec<Vec<f32>> = (0..channels)
                .map(|ch| vec![0.25 * (ch + 1) as f32; max_frames])
                .collect();
            self.buffer = PlanarBuffer::new(channels);
            self.buffer.extend_planes(planes.iter().map(Vec::as_slice));
            self.served += max_frames * channels;
            FileRead::Block(self.buffer.view().unwrap())
        }

        fn position_secs(&self) -> u64 {
            0
        }

        fn seek_secs(&mut self, _: u64) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_wider_link_is_written_in_full() {
        let mut file = ChannelSwitch {
            links: vec![1, 2],
            buffer: PlanarBuffer::new(1),
            served: 0,
        };
        let mut samples = Vec::new();
        let mut writes = 0;
        let mut sink = |s: &[i16]| {
            samples.extend_from_slice(s);
            writes += 1;
            true
        };

        let config = DecodeConfig::default();
        let result = run_file_decoder(&mut file, &mut sink, &mut (), &config).unwrap();
        assert_eq!(result, Ok(()));
        assert_eq!(file.served, 4096 + 2 * 4096);
        assert_eq!(samples.len(), file.served);
        // One pass for the mono block, two for the stereo one.
        assert_eq!(writes, 3);
        assert_eq!(&samples[4096..4098], &[8192, 16384]);
        assert_eq!(&samples[samples.len() - 2..], &[8192, 16384]);
    }

    #[test]
    fn test_unusable_config_is_refused() {
        let config = DecodeConfig {
            conversion_capacity: 1,
            ..DecodeConfig::default()
        };
        let mut file = FakeFile::new(100);
        let mut recorder = Recorder::default();
        let mut sink = |_: &[i16]| true;

        let err = run_file_decoder(&mut file, &mut sink, &mut recorder, &config).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(recorder.events.is_empty());

        let err = decode_file("missing.ogg", &mut sink, &mut recorder, &config).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(recorder.events.is_empty());
    }
}
