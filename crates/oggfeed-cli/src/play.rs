//! Real-time playback through the default output device.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use oggfeed_core::{DecodeConfig, StreamInfo};
use oggfeed_decode::output::AudioOutput;
use oggfeed_decode::player::DEFAULT_RING_CAPACITY;
use oggfeed_decode::{PlayerEvent, ReaderSource, VorbisPlayer};
use tracing::{debug, info};

const POLL: Duration = Duration::from_millis(50);

pub fn play(input: &Path, file_mode: bool, config: DecodeConfig) -> Result<()> {
    let mut player = VorbisPlayer::with_config(config, DEFAULT_RING_CAPACITY);

    if file_mode {
        player.play_file(input)?;
    } else {
        let file = File::open(input)
            .with_context(|| format!("Failed to open {}", input.display()))?;
        player.play_stream(ReaderSource::new(BufReader::new(file)))?;
    }

    let mut output: Option<(AudioOutput, StreamInfo)> = None;
    loop {
        let Some(event) = player.recv_event() else {
            bail!("Player stopped unexpectedly");
        };
        match event {
            PlayerEvent::StreamInfo(info) => {
                let reusable = output.as_ref().is_some_and(|(_, current)| {
                    current.sample_rate == info.sample_rate && current.channels == info.channels
                });
                if !reusable {
                    // Drop the old stream before opening the device again.
                    drop(output.take());
                    let opened = AudioOutput::for_player(&player, &info)?;
                    info!("Playing on {}: {info}", opened.device_name());
                    output = Some((opened, info));
                }
            }
            PlayerEvent::Progress(seconds) => println!("{seconds}s"),
            PlayerEvent::StateChanged(state) => debug!("Player state: {state:?}"),
            PlayerEvent::Finished => break,
            PlayerEvent::Failed(kind) => bail!("Playback failed: {kind} (status {})", kind.code()),
        }
    }

    // Let the device drain what is left in the ring.
    let ring = player.ring();
    while output.is_some() && !ring.is_empty() {
        std::thread::sleep(POLL);
    }
    Ok(())
}

pub fn list_devices() -> Result<()> {
    for name in oggfeed_decode::output::list_output_devices()? {
        println!("{name}");
    }
    Ok(())
}
