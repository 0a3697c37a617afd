//! # Reel Player
//!
//! Headless playback host for reel-core. Drives the decoder against a
//! presentation clock, optionally dumping frames as PPM and audio as raw PCM.

use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use reel_core::{
    movie_probe, DecoderConfig, FrameView, MovieDecoder, Palette, SharedAudioSink, UnitResult,
};

// ============================================================================
// Options
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
struct PlayerOptions {
    input: PathBuf,
    frames: Option<u64>,
    probe: bool,
    config: Option<PathBuf>,
    dump_dir: Option<PathBuf>,
    audio_out: Option<PathBuf>,
    realtime: bool,
}

fn parse_args(args: &[String]) -> Result<PlayerOptions> {
    let mut input: Option<PathBuf> = None;
    let mut frames: Option<u64> = None;
    let mut probe = false;
    let mut config: Option<PathBuf> = None;
    let mut dump_dir: Option<PathBuf> = None;
    let mut audio_out: Option<PathBuf> = None;
    let mut realtime = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--input" | "-i" => {
                input = Some(PathBuf::from(flag_value(args, i, "--input")?));
                i += 2;
            }
            "--frames" | "-n" => {
                let value = flag_value(args, i, "--frames")?;
                frames = Some(value.parse::<u64>().map_err(|e| {
                    anyhow::anyhow!("Invalid frame count {}: {}", value, e)
                })?);
                i += 2;
            }
            "--config" | "-c" => {
                config = Some(PathBuf::from(flag_value(args, i, "--config")?));
                i += 2;
            }
            "--dump-dir" => {
                dump_dir = Some(PathBuf::from(flag_value(args, i, "--dump-dir")?));
                i += 2;
            }
            "--audio-out" => {
                audio_out = Some(PathBuf::from(flag_value(args, i, "--audio-out")?));
                i += 2;
            }
            "--probe" => {
                probe = true;
                i += 1;
            }
            "--realtime" => {
                realtime = true;
                i += 1;
            }
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            other => {
                // bare path
                if input.is_none() && !other.starts_with('-') {
                    input = Some(PathBuf::from(other));
                } else {
                    tracing::warn!("Ignoring unknown argument {:?}", other);
                }
                i += 1;
            }
        }
    }

    let input = input.ok_or_else(|| {
        print_usage();
        anyhow::anyhow!("Missing required --input")
    })?;

    Ok(PlayerOptions {
        input,
        frames,
        probe,
        config,
        dump_dir,
        audio_out,
        realtime,
    })
}

fn flag_value<'a>(args: &'a [String], i: usize, flag: &str) -> Result<&'a String> {
    args.get(i + 1)
        .ok_or_else(|| anyhow::anyhow!("Missing value for {}", flag))
}

fn print_usage() {
    eprintln!(
        "\nUsage:\n  reel --input <movie> [--frames <n>] [--config <json>] [--dump-dir <dir>] [--audio-out <file>] [--realtime]\n  reel --probe --input <movie>\n"
    );
}

fn load_config(path: Option<&Path>) -> Result<DecoderConfig> {
    let Some(path) = path else {
        return Ok(DecoderConfig::default());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Reading decoder config {:?}", path))?;
    let config = serde_json::from_str(&text)
        .with_context(|| format!("Parsing decoder config {:?}", path))?;
    Ok(config)
}

// ============================================================================
// Playback
// ============================================================================

#[derive(Debug, Default, Clone, PartialEq, Eq)]
struct PlaybackStats {
    decoded_frames: u64,
    palette_changes: u64,
    duration_ms: u64,
    audio_bytes: u64,
    reached_end: bool,
}

/// Writes drained PCM to the `--audio-out` file, if any.
struct AudioWriter {
    out: Option<BufWriter<File>>,
    written: u64,
}

impl AudioWriter {
    fn create(path: Option<&Path>) -> Result<Self> {
        let out = match path {
            Some(path) => Some(BufWriter::new(
                File::create(path).with_context(|| format!("Creating audio output {:?}", path))?,
            )),
            None => None,
        };
        Ok(Self { out, written: 0 })
    }

    fn drain_from(&mut self, sink: &SharedAudioSink) -> Result<()> {
        let (data, _) = sink.drain();
        if let Some(out) = self.out.as_mut() {
            out.write_all(&data)?;
        }
        self.written += data.len() as u64;
        Ok(())
    }

    fn finish(mut self) -> Result<u64> {
        if let Some(out) = self.out.as_mut() {
            out.flush()?;
        }
        Ok(self.written)
    }
}

fn run_playback(options: &PlayerOptions, config: DecoderConfig) -> Result<PlaybackStats> {
    let file = File::open(&options.input).with_context(|| format!("Opening {:?}", options.input))?;
    let sink = SharedAudioSink::new();
    let mut decoder = MovieDecoder::open_with_config(BufReader::new(file), sink.clone(), config)
        .with_context(|| format!("Opening movie {:?}", options.input))?;

    let info = decoder.info();
    tracing::info!(
        "Playing {:?}: {:?} {}x{}, audio={:?}",
        options.input,
        info.format,
        info.width,
        info.height,
        info.audio
    );

    if let Some(dir) = &options.dump_dir {
        std::fs::create_dir_all(dir).with_context(|| format!("Creating dump dir {:?}", dir))?;
    }

    // realtime playback drains audio on its own thread, like an output device
    let stop = Arc::new(AtomicBool::new(false));
    let mut writer = AudioWriter::create(options.audio_out.as_deref())?;
    let drain_thread = if options.realtime {
        let sink = sink.clone();
        let stop = stop.clone();
        let mut thread_writer = std::mem::replace(&mut writer, AudioWriter { out: None, written: 0 });
        Some(thread::spawn(move || -> Result<AudioWriter> {
            while !stop.load(Ordering::Relaxed) {
                thread_writer.drain_from(&sink)?;
                thread::sleep(Duration::from_millis(20));
            }
            thread_writer.drain_from(&sink)?;
            Ok(thread_writer)
        }))
    } else {
        None
    };

    let started = Instant::now();
    let mut stats = PlaybackStats::default();
    let mut palette: Palette = *decoder.palette();
    let mut clock_ms = 0u64;

    let result = loop {
        if options.frames.is_some_and(|limit| stats.decoded_frames >= limit) {
            break Ok(());
        }

        match decoder.decode_next_unit(clock_ms) {
            Ok(UnitResult::NewFrame) => {}
            Ok(UnitResult::EndOfStream) => {
                stats.reached_end = true;
                break Ok(());
            }
            Err(e) => break Err(e),
        }

        if let Some(changed) = decoder.take_dirty_palette() {
            palette = changed;
            stats.palette_changes += 1;
        }

        let start_ms = decoder.video().next_frame_start_ms();
        if options.realtime {
            let target = Duration::from_millis(start_ms);
            if let Some(wait) = target.checked_sub(started.elapsed()) {
                thread::sleep(wait);
            }
        } else {
            writer.drain_from(&sink)?;
        }

        if let Some(dir) = &options.dump_dir {
            let path = dir.join(format!("frame_{:05}.ppm", stats.decoded_frames));
            write_ppm(&path, decoder.frame(), &palette)?;
        }

        stats.decoded_frames += 1;
        stats.duration_ms = start_ms;
        clock_ms = if options.realtime {
            started.elapsed().as_millis() as u64
        } else {
            start_ms
        };
    };

    stop.store(true, Ordering::Relaxed);
    if let Some(handle) = drain_thread {
        writer = handle
            .join()
            .map_err(|_| anyhow::anyhow!("Audio drain thread panicked"))??;
    }
    writer.drain_from(&sink)?;
    stats.audio_bytes = writer.finish()?;

    if let Some(format) = decoder.audio().map(|track| track.sample_format()) {
        tracing::info!("Audio format: {:?}", format);
    }
    decoder.close();

    result.with_context(|| format!("Decoding {:?}", options.input))?;
    Ok(stats)
}

/// Write an indexed frame as a binary PPM through `palette`.
fn write_ppm(path: &Path, frame: FrameView<'_>, palette: &Palette) -> Result<()> {
    let mut out = BufWriter::new(File::create(path).with_context(|| format!("Creating {:?}", path))?);
    write!(out, "P6\n{} {}\n255\n", frame.width, frame.height)?;
    for &index in frame.data {
        let base = index as usize * 3;
        out.write_all(&palette[base..base + 3])?;
    }
    out.flush()?;
    Ok(())
}

// ============================================================================
// Entry point
// ============================================================================

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("reel=info".parse()?)
                .add_directive("reel_core=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();
    let options = parse_args(&args)?;

    tracing::info!("Reel Player v{} (core {})", env!("CARGO_PKG_VERSION"), reel_core::VERSION);

    if options.probe {
        let info = movie_probe(&options.input).with_context(|| format!("Probing {:?}", options.input))?;
        println!("{}", serde_json::to_string_pretty(&info)?);
        return Ok(());
    }

    let config = load_config(options.config.as_deref())?;
    let stats = run_playback(&options, config)?;

    tracing::info!(
        "Playback complete: decoded_frames={}, palette_changes={}, duration_ms={}, audio_bytes={}, reached_end={}",
        stats.decoded_frames,
        stats.palette_changes,
        stats.duration_ms,
        stats.audio_bytes,
        stats.reached_end
    );

    Ok(())
}
