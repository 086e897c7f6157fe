//! Streaming decode orchestrator.

use oggfeed_core::{DecodeConfig, DecodeError, DecodeResult, Result, StreamInfo};
use tracing::{debug, error, info, trace, warn};

use crate::codec::{CodecEngine, PacketDecoder, VorbisEngine};
use crate::convert::SampleConverter;
use crate::elapsed::SampleClock;
use crate::feed::{ByteSource, DecodeListener, PcmSink};
use crate::header::acquire_headers;
use crate::ogg::{LogicalStream, PacketOutcome, Page, PageFetch, PageReader};

/// Decode a chained Ogg Vorbis bitstream with the default engine and
/// configuration.
pub fn decode_stream<S, K, L>(source: S, sink: &mut K, listener: &mut L) -> DecodeResult
where
    S: ByteSource,
    K: PcmSink + ?Sized,
    L: DecodeListener + ?Sized,
{
    StreamDecoder::new(VorbisEngine::new()).decode(source, sink, listener)
}

/// Orchestrates one or more sequential decode invocations over pulled input.
///
/// Each invocation owns its synchronizer, per-stream state and conversion
/// buffer; nothing is shared between invocations except the engine.
#[derive(Debug)]
pub struct StreamDecoder<E> {
    engine: E,
    config: DecodeConfig,
}

enum State<D> {
    Init,
    AcquireFirstPage,
    AcquireHeaders(Page),
    Decode(Box<ActiveStream<D>>),
    StreamEnded(StreamEnd),
    Done,
}

impl<D> State<D> {
    const fn name(&self) -> &'static str {
        match self {
            Self::Init => "Init",
            Self::AcquireFirstPage => "AcquireFirstPage",
            Self::AcquireHeaders(_) => "AcquireHeaders",
            Self::Decode(_) => "Decode",
            Self::StreamEnded(_) => "StreamEnded",
            Self::Done => "Done",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamEnd {
    /// End of stream page, or the start of the next chained stream.
    Finished,
    /// The source ran dry mid-stream.
    Exhausted,
    /// The sink refused more samples.
    Aborted,
}

struct ActiveStream<D> {
    stream: LogicalStream,
    decoder: D,
    clock: SampleClock,
}

impl<E: CodecEngine> StreamDecoder<E> {
    pub fn new(engine: E) -> Self {
        Self {
            engine,
            config: DecodeConfig::default(),
        }
    }

    /// Use a custom buffer configuration.
    pub fn with_config(engine: E, config: DecodeConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { engine, config })
    }

    pub const fn engine(&self) -> &E {
        &self.engine
    }

    pub const fn config(&self) -> &DecodeConfig {
        &self.config
    }

    /// Run one decode invocation to completion.
    ///
    /// Returns `Ok(())` when the input ends cleanly (after any number of
    /// chained streams, including none) or the sink aborts. The listener's
    /// `on_stop` is called exactly once, on every exit path.
    pub fn decode<S, K, L>(&mut self, source: S, sink: &mut K, listener: &mut L) -> DecodeResult
    where
        S: ByteSource,
        K: PcmSink + ?Sized,
        L: DecodeListener + ?Sized,
    {
        let mut reader = PageReader::new(source, self.config.read_chunk_size);
        let mut converter = SampleConverter::new(self.config.conversion_capacity);
        let mut streams = 0usize;
        let mut state: State<E::Decoder> = State::Init;

        let result = loop {
            trace!("State {}", state.name());
            state = match state {
                State::Init => {
                    listener.on_header_start();
                    State::AcquireFirstPage
                }

                State::AcquireFirstPage => match reader.next_page() {
                    PageFetch::Page(page) => State::AcquireHeaders(page),
                    PageFetch::Corrupt if streams == 0 => {
                        error!("Input does not start with an Ogg page");
                        break Err(DecodeError::InvalidOggBitstream);
                    }
                    PageFetch::Corrupt => {
                        warn!("Skipping unframed data after stream {streams}");
                        State::AcquireFirstPage
                    }
                    PageFetch::Exhausted if streams == 0 && reader.buffered() > 0 => {
                        error!(
                            "Input ended with {} bytes that never formed a page",
                            reader.buffered()
                        );
                        break Err(DecodeError::InvalidOggBitstream);
                    }
                    PageFetch::Exhausted => State::Done,
                },

                State::AcquireHeaders(page) => {
                    let (stream, headers) = match acquire_headers(&mut reader, &page) {
                        Ok(acquired) => acquired,
                        Err(kind) => break Err(kind),
                    };
                    let decoder = match self.engine.open(&headers) {
                        Ok(decoder) => decoder,
                        Err(e) => {
                            error!("Codec engine rejected the headers: {e}");
                            break Err(DecodeError::CorruptSecondaryHeader);
                        }
                    };

                    let info: StreamInfo = headers.info();
                    streams += 1;
                    info!("Stream {streams}: {info}");
                    listener.on_stream_start(&info);

                    State::Decode(Box::new(ActiveStream {
                        stream,
                        decoder,
                        clock: SampleClock::new(info.sample_rate),
                    }))
                }

                State::Decode(mut active) => {
                    let end = run_stream(&mut reader, &mut active, &mut converter, sink, listener);
                    State::StreamEnded(end)
                }

                State::StreamEnded(end) => {
                    debug!("Stream {streams} ended: {end:?}");
                    match end {
                        StreamEnd::Aborted | StreamEnd::Exhausted => State::Done,
                        StreamEnd::Finished if reader.is_exhausted() && reader.buffered() == 0 => {
                            State::Done
                        }
                        StreamEnd::Finished => State::AcquireFirstPage,
                    }
                }

                State::Done => break Ok(()),
            };
        };

        match result {
            Ok(()) => info!(
                "Decode finished: {streams} stream(s), {} bytes read",
                reader.bytes_read()
            ),
            Err(kind) => error!("Decode failed: {kind} (code {})", kind.code()),
        }
        listener.on_stop();
        result
    }
}

/// Decode one logical stream until it ends, the input runs dry, or the sink
/// aborts.
fn run_stream<S, D, K, L>(
    reader: &mut PageReader<S>,
    active: &mut ActiveStream<D>,
    converter: &mut SampleConverter,
    sink: &mut K,
    listener: &mut L,
) -> StreamEnd
where
    S: ByteSource,
    D: PacketDecoder,
    K: PcmSink + ?Sized,
    L: DecodeListener + ?Sized,
{
    loop {
        loop {
            match active.stream.extract_packet() {
                PacketOutcome::Packet(packet) => {
                    if let Err(e) = active.decoder.decode(&packet) {
                        warn!("Skipping packet {}: {e}", packet.packet_no);
                    }
                    if !deliver(active, converter, sink, listener) {
                        return StreamEnd::Aborted;
                    }
                }
                PacketOutcome::Corrupt => debug!("Packet data missing at this position"),
                PacketOutcome::NeedMorePages => break,
            }
        }

        if active.stream.eos_seen() {
            return StreamEnd::Finished;
        }

        match reader.next_page() {
            PageFetch::Page(page) => {
                if page.is_bos() && page.serial() != active.stream.serial() {
                    info!(
                        "Stream {:#x} starts before stream {:#x} ended",
                        page.serial(),
                        active.stream.serial()
                    );
                    reader.push_back(page);
                    return StreamEnd::Finished;
                }
                if let Err(e) = active.stream.feed_page(&page) {
                    trace!("Ignoring page: {e}");
                }
            }
            PageFetch::Corrupt => warn!("Corrupt or missing data in bitstream; continuing"),
            PageFetch::Exhausted => return StreamEnd::Exhausted,
        }
    }
}

/// Drain the decoder's pending output through the converter into the sink.
/// Returns `false` if the sink aborted.
fn deliver<D, K, L>(
    active: &mut ActiveStream<D>,
    converter: &mut SampleConverter,
    sink: &mut K,
    listener: &mut L,
) -> bool
where
    D: PacketDecoder,
    K: PcmSink + ?Sized,
    L: DecodeListener + ?Sized,
{
    while let Some(block) = active.decoder.pending() {
        let available = block.frames();
        let pass = converter.convert(&block);
        if pass.frames == 0 {
            warn!("Conversion buffer cannot hold one frame; dropping {available} frames");
            active.decoder.acknowledge_consumed(available);
            break;
        }
        active.decoder.acknowledge_consumed(pass.frames);

        if let Some(seconds) = active.clock.advance(pass.frames) {
            debug!("Elapsed {seconds}s");
            listener.on_elapsed_seconds(seconds);
        }

        if !sink.write(converter.output()) {
            info!("Sink aborted the decode");
            return false;
        }
    }
    true
}
