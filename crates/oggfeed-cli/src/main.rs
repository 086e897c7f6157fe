//! # oggfeed
//!
//! Inspect, decode and play Ogg Vorbis files.

mod wav;
#[cfg(feature = "playback")]
mod play;

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use directories::ProjectDirs;
use oggfeed_core::{error::status_code, DecodeConfig};
use oggfeed_decode::{decode_file, read_file_info, ReaderSource, StreamDecoder, VorbisEngine};
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::wav::{ProgressListener, WavSink};

#[derive(Parser)]
#[command(name = "oggfeed", version)]
#[command(about = "Streaming Ogg Vorbis decoder")]
struct Args {
    /// Decode configuration (JSON). Defaults to config.json in the user
    /// config directory, if present.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print stream parameters and duration.
    Info {
        input: PathBuf,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Decode to a 16-bit WAV file.
    Decode {
        input: PathBuf,

        /// Output WAV file
        #[arg(short, long)]
        output: PathBuf,

        /// Use the seekable file decoder instead of the streaming one
        #[arg(long)]
        file_mode: bool,

        /// Start position in seconds (file mode only)
        #[arg(long, requires = "file_mode")]
        seek: Option<u64>,
    },
    /// Play through the default audio device.
    #[cfg(feature = "playback")]
    Play {
        input: PathBuf,

        /// Use the seekable file decoder instead of the streaming one
        #[arg(long)]
        file_mode: bool,
    },
    /// List audio output devices.
    #[cfg(feature = "playback")]
    Devices,
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "oggfeed=info,oggfeed_decode=info".into()),
        )
        .init();

    let args = Args::parse();
    let config = load_config(args.config.as_deref())?;
    debug!("Using {config:?}");

    match args.command {
        Command::Info { input, json } => print_info(&input, json),
        Command::Decode {
            input,
            output,
            file_mode,
            seek,
        } => decode_to_wav(&input, &output, file_mode, seek, &config),
        #[cfg(feature = "playback")]
        Command::Play { input, file_mode } => play::play(&input, file_mode, config),
        #[cfg(feature = "playback")]
        Command::Devices => play::list_devices(),
    }
}

fn load_config(explicit: Option<&Path>) -> Result<DecodeConfig> {
    if let Some(path) = explicit {
        return DecodeConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()));
    }

    let default_path = ProjectDirs::from("org", "oggfeed", "oggfeed")
        .map(|dirs| dirs.config_dir().join("config.json"));
    match default_path {
        Some(path) if path.is_file() => {
            info!("Loading config from {}", path.display());
            DecodeConfig::load(&path)
                .with_context(|| format!("Failed to load config {}", path.display()))
        }
        _ => Ok(DecodeConfig::default()),
    }
}

fn print_info(input: &Path, json: bool) -> Result<()> {
    let info = read_file_info(input)
        .with_context(|| format!("Failed to read {}", input.display()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&info)?);
        return Ok(());
    }

    println!("File:        {}", input.display());
    println!("Sample rate: {} Hz", info.sample_rate);
    println!("Channels:    {}", info.channels);
    println!("Vendor:      {}", info.vendor);
    match info.duration {
        Some(duration) => println!("Duration:    {}", duration.format()),
        None => println!("Duration:    unknown"),
    }
    Ok(())
}

fn decode_to_wav(
    input: &Path,
    output: &Path,
    file_mode: bool,
    seek: Option<u64>,
    config: &DecodeConfig,
) -> Result<()> {
    let info = read_file_info(input)
        .with_context(|| format!("{} is not a readable Ogg Vorbis file", input.display()))?;

    let mut sink = WavSink::create(output, &info)?.with_seek(seek);
    let mut listener = ProgressListener::new(info);

    let result = if file_mode {
        decode_file(input, &mut sink, &mut listener, config)?
    } else {
        let file = File::open(input)
            .with_context(|| format!("Failed to open {}", input.display()))?;
        let mut decoder = StreamDecoder::with_config(VorbisEngine::new(), *config)?;
        decoder.decode(
            ReaderSource::new(BufReader::new(file)),
            &mut sink,
            &mut listener,
        )
    };

    let samples = sink.finish()?;
    if let Err(kind) = result {
        bail!("Decode failed: {kind} (status {})", status_code(result));
    }

    info!(
        "Wrote {samples} samples from {} stream(s) to {}",
        listener.streams(),
        output.display()
    );
    Ok(())
}
