//! Threaded player: runs one decode invocation on a worker thread and feeds
//! the PCM ring buffer.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use oggfeed_core::{DecodeConfig, DecodeError, DecodeResult, Error, Result, StreamInfo};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, info, trace, warn};

use crate::buffer::{shared_ring_buffer, SharedRingBuffer};
use crate::codec::{CodecEngine, VorbisEngine};
use crate::decoder::{open_and_run, StreamDecoder};
use crate::feed::{ByteSource, DecodeListener, PcmSink};

/// Ring capacity in samples (about 0.75 s of 44.1 kHz stereo).
pub const DEFAULT_RING_CAPACITY: usize = 1 << 16;

/// How long a blocked producer sleeps before checking the ring again.
const BACKOFF: Duration = Duration::from_millis(2);

/// Playback state of the player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackState {
    #[default]
    Stopped,
    /// Reading stream headers.
    Buffering,
    Playing,
    Paused,
}

/// Events emitted by the player.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerEvent {
    StateChanged(PlaybackState),
    /// A logical stream started.
    StreamInfo(StreamInfo),
    /// Whole seconds played.
    Progress(u64),
    /// The invocation ended normally.
    Finished,
    /// The invocation failed.
    Failed(DecodeError),
}

/// State shared between the handle, the worker and the output callback.
#[derive(Debug)]
pub(crate) struct Shared {
    pub(crate) state: RwLock<PlaybackState>,
    pub(crate) volume: Mutex<f32>,
    stop: AtomicBool,
    seek: Mutex<Option<u64>>,
    position: AtomicU64,
    info: RwLock<Option<StreamInfo>>,
}

impl Shared {
    fn new() -> Self {
        Self {
            state: RwLock::new(PlaybackState::Stopped),
            volume: Mutex::new(1.0),
            stop: AtomicBool::new(false),
            seek: Mutex::new(None),
            position: AtomicU64::new(0),
            info: RwLock::new(None),
        }
    }

    fn stopping(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }
}

/// Plays Ogg Vorbis input on a background thread.
///
/// Decoded PCM lands in a lock-free ring buffer; the host drains it through
/// [`VorbisPlayer::ring`] or, with the `playback` feature, an
/// [`AudioOutput`](crate::output::AudioOutput).
pub struct VorbisPlayer {
    shared: Arc<Shared>,
    ring: SharedRingBuffer,
    config: DecodeConfig,
    event_tx: Sender<PlayerEvent>,
    event_rx: Receiver<PlayerEvent>,
    worker: Option<JoinHandle<()>>,
}

impl VorbisPlayer {
    pub fn new() -> Self {
        Self::with_config(DecodeConfig::default(), DEFAULT_RING_CAPACITY)
    }

    pub fn with_config(config: DecodeConfig, ring_capacity: usize) -> Self {
        let (event_tx, event_rx) = unbounded();
        Self {
            shared: Arc::new(Shared::new()),
            ring: shared_ring_buffer(ring_capacity),
            config,
            event_tx,
            event_rx,
            worker: None,
        }
    }

    /// Consumer side of the PCM ring.
    pub fn ring(&self) -> SharedRingBuffer {
        Arc::clone(&self.ring)
    }

    #[cfg(feature = "playback")]
    pub(crate) fn shared(&self) -> Arc<Shared> {
        Arc::clone(&self.shared)
    }

    pub fn state(&self) -> PlaybackState {
        *self.shared.state.read()
    }

    /// Parameters of the stream currently playing.
    pub fn stream_info(&self) -> Option<StreamInfo> {
        self.shared.info.read().clone()
    }

    /// Last reported position in whole seconds.
    pub fn position(&self) -> u64 {
        self.shared.position.load(Ordering::Relaxed)
    }

    pub fn volume(&self) -> f32 {
        *self.shared.volume.lock()
    }

    pub fn set_volume(&self, volume: f32) {
        *self.shared.volume.lock() = volume.clamp(0.0, 1.0);
    }

    /// Decode a pulled byte stream with the Vorbis engine.
    pub fn play_stream<S>(&mut self, source: S) -> Result<()>
    where
        S: ByteSource + Send + 'static,
    {
        self.play_stream_with(VorbisEngine::new(), source)
    }

    /// Decode a pulled byte stream with a custom codec engine.
    pub fn play_stream_with<E, S>(&mut self, engine: E, source: S) -> Result<()>
    where
        E: CodecEngine + Send + 'static,
        S: ByteSource + Send + 'static,
    {
        let mut decoder = StreamDecoder::with_config(engine, self.config)?;
        self.spawn("stream", move |sink, listener| {
            let shared = Arc::clone(&sink.shared);
            let source = StoppableSource { inner: source, shared };
            decoder.decode(source, sink, listener)
        })
    }

    /// Decode a seekable file; [`seek`](Self::seek) takes effect.
    pub fn play_file(&mut self, path: impl Into<PathBuf>) -> Result<()> {
        self.config.validate()?;
        let path = path.into();
        let config = self.config;
        self.spawn("file", move |sink, listener| {
            open_and_run(&path, sink, listener, &config)
        })
    }

    fn spawn<F>(&mut self, kind: &str, job: F) -> Result<()>
    where
        F: FnOnce(&mut RingSink, &mut EventListener) -> DecodeResult + Send + 'static,
    {
        self.stop();
        self.shared.stop.store(false, Ordering::Release);
        *self.shared.seek.lock() = None;
        *self.shared.info.write() = None;
        self.shared.position.store(0, Ordering::Relaxed);
        self.ring.clear();

        let mut sink = RingSink {
            ring: Arc::clone(&self.ring),
            shared: Arc::clone(&self.shared),
        };
        let mut listener = EventListener {
            shared: Arc::clone(&self.shared),
            events: self.event_tx.clone(),
        };

        let handle = std::thread::Builder::new()
            .name(format!("oggfeed-{kind}"))
            .spawn(move || {
                let result = job(&mut sink, &mut listener);
                listener.finish(result);
            })
            .map_err(|e| Error::Internal(format!("Failed to spawn decode thread: {e}")))?;

        info!("Started {kind} decode");
        self.worker = Some(handle);
        Ok(())
    }

    pub fn pause(&self) {
        let mut state = self.shared.state.write();
        if *state == PlaybackState::Playing {
            *state = PlaybackState::Paused;
            drop(state);
            self.emit(PlayerEvent::StateChanged(PlaybackState::Paused));
        }
    }

    pub fn resume(&self) {
        let mut state = self.shared.state.write();
        if *state == PlaybackState::Paused {
            *state = PlaybackState::Playing;
            drop(state);
            self.emit(PlayerEvent::StateChanged(PlaybackState::Playing));
        }
    }

    /// Request a seek to `seconds`. Only file playback honours it.
    pub fn seek(&self, seconds: u64) {
        debug!("Seek to {seconds}s requested");
        *self.shared.seek.lock() = Some(seconds);
    }

    /// Stop the current invocation and wait for the worker to exit.
    pub fn stop(&mut self) {
        let Some(handle) = self.worker.take() else {
            return;
        };
        self.shared.stop.store(true, Ordering::Release);
        if handle.join().is_err() {
            error!("Decode thread panicked");
        }
        self.ring.clear();
    }

    /// Whether a decode invocation is still running.
    pub fn is_active(&self) -> bool {
        self.worker.as_ref().is_some_and(|h| !h.is_finished())
    }

    pub fn try_recv_event(&self) -> Option<PlayerEvent> {
        self.event_rx.try_recv().ok()
    }

    pub fn recv_event(&self) -> Option<PlayerEvent> {
        self.event_rx.recv().ok()
    }

    /// Wait up to `timeout` for an event.
    pub fn recv_event_timeout(&self, timeout: Duration) -> Option<PlayerEvent> {
        match self.event_rx.recv_timeout(timeout) {
            Ok(event) => Some(event),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }

    fn emit(&self, event: PlayerEvent) {
        let _ = self.event_tx.send(event);
    }
}

impl Default for VorbisPlayer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for VorbisPlayer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Ends the input as soon as the player is stopped.
struct StoppableSource<S> {
    inner: S,
    shared: Arc<Shared>,
}

impl<S: ByteSource> ByteSource for StoppableSource<S> {
    fn read(&mut self, buf: &mut [u8]) -> usize {
        if self.shared.stopping() {
            return 0;
        }
        self.inner.read(buf)
    }
}

/// Producer side of the ring. Blocks while the ring is full or the player is
/// paused; refuses samples once the player is stopped.
struct RingSink {
    ring: SharedRingBuffer,
    shared: Arc<Shared>,
}

impl PcmSink for RingSink {
    fn write(&mut self, mut samples: &[i16]) -> bool {
        while !samples.is_empty() {
            if self.shared.stopping() {
                return false;
            }
            if *self.shared.state.read() == PlaybackState::Paused {
                std::thread::sleep(BACKOFF);
                continue;
            }
            let n = self.ring.write(samples);
            samples = &samples[n..];
            if n == 0 {
                std::thread::sleep(BACKOFF);
            }
        }
        !self.shared.stopping()
    }

    fn seek_request(&mut self) -> Option<u64> {
        *self.shared.seek.lock()
    }
}

/// Translates decode notifications into player state and events.
struct EventListener {
    shared: Arc<Shared>,
    events: Sender<PlayerEvent>,
}

impl EventListener {
    fn set_state(&self, new_state: PlaybackState) {
        let old_state = {
            let mut state = self.shared.state.write();
            // A pause survives stream changes.
            if *state == PlaybackState::Paused && new_state == PlaybackState::Playing {
                return;
            }
            std::mem::replace(&mut *state, new_state)
        };
        if old_state != new_state {
            debug!("State changed: {old_state:?} -> {new_state:?}");
            let _ = self.events.send(PlayerEvent::StateChanged(new_state));
        }
    }

    fn finish(&self, result: DecodeResult) {
        let stopped = self.shared.stopping();
        self.set_state(PlaybackState::Stopped);
        match result {
            Ok(()) => {
                let _ = self.events.send(PlayerEvent::Finished);
            }
            Err(kind) if stopped => debug!("Ignoring {kind} after stop"),
            Err(kind) => {
                warn!("Playback failed: {kind}");
                let _ = self.events.send(PlayerEvent::Failed(kind));
            }
        }
    }
}

impl DecodeListener for EventListener {
    fn on_header_start(&mut self) {
        self.set_state(PlaybackState::Buffering);
    }

    fn on_stream_start(&mut self, info: &StreamInfo) {
        *self.shared.info.write() = Some(info.clone());
        let _ = self.events.send(PlayerEvent::StreamInfo(info.clone()));
        self.set_state(PlaybackState::Playing);
    }

    fn on_elapsed_seconds(&mut self, seconds: u64) {
        trace!("Position {seconds}s");
        self.shared.position.store(seconds, Ordering::Relaxed);
        let _ = self.events.send(PlayerEvent::Progress(seconds));
    }
}
