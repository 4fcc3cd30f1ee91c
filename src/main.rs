use anyhow::{Context, Result};
use beatsync::audio::PlaybackEngine;
use beatsync::effects::SyncFrame;
use beatsync::{TickLoop, Visualizer, VisualizerConfig};
use clap::Parser;
use log::{info, warn};
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "beatsync")]
#[command(about = "Play an audio file and print beat-synchronized animation parameters")]
struct Args {
    /// Audio file to play (MP3, WAV, M4A, OGG, etc.)
    #[arg()]
    input_file: PathBuf,

    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Ticks per second
    #[arg(long)]
    fps: Option<u32>,

    /// Animation sensitivity multiplier
    #[arg(long)]
    sensitivity: Option<f32>,

    /// Playback volume (0.0 to 1.0)
    #[arg(long)]
    volume: Option<f32>,

    /// Start playback this many seconds into the track
    #[arg(long)]
    start: Option<f32>,

    /// Start muted
    #[arg(long)]
    muted: bool,

    /// Print one JSON object of CSS variables per tick
    #[arg(long)]
    json: bool,
}

fn build_config(args: &Args) -> Result<VisualizerConfig> {
    let mut config = match &args.config {
        Some(path) => VisualizerConfig::load(path)?,
        None => VisualizerConfig::default(),
    };

    if let Some(fps) = args.fps {
        config.fps = fps;
    }
    if let Some(sensitivity) = args.sensitivity {
        config.beat_sync.sensitivity = sensitivity;
    }
    if let Some(volume) = args.volume {
        config.volume = volume;
    }

    config.validate()?;
    Ok(config)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    let config = build_config(&args)?;

    info!("Starting beatsync");

    let mut engine = PlaybackEngine::new();
    let track = engine.load_file(&args.input_file)?;
    if let Some(duration) = track.duration {
        info!("Track length: {:.1}s", duration.as_secs_f32());
    }
    engine.set_volume(config.volume);
    engine.set_muted(args.muted);
    if let Some(start) = args.start {
        let start = Duration::try_from_secs_f32(start.max(0.0))
            .with_context(|| format!("Invalid start position: {}", start))?;
        engine.seek(start)?;
    }

    let mut visualizer = Visualizer::new(&config);
    visualizer.attach(&mut engine);
    if !visualizer.is_attached() {
        warn!("Analysis unavailable, playing without visualization");
    }

    let mut ticks = TickLoop::new(config.fps);
    let cancel = ticks.cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted");
            cancel.cancel();
        }
    });

    engine.play();

    let stdout = std::io::stdout();
    while ticks.next_tick().await.is_some() {
        let playing = engine.is_playing();
        let sync = visualizer.tick(playing);

        let mut out = stdout.lock();
        if args.json {
            writeln!(out, "{}", serde_json::to_string(&sync.css_vars)?)?;
        } else {
            write!(out, "\r{} {}", clock_time(engine.position()), status_line(sync))?;
            out.flush()?;
        }

        if engine.is_finished() {
            info!("End of track");
            break;
        }
    }

    if !args.json {
        println!();
    }
    visualizer.detach();
    engine.stop();
    Ok(())
}

fn clock_time(position: Duration) -> String {
    let seconds = position.as_secs();
    format!("{}:{:02}", seconds / 60, seconds % 60)
}

fn meter(level: f32) -> String {
    let filled = (level.clamp(0.0, 1.0) * 10.0).round() as usize;
    format!("{}{}", "#".repeat(filled), ".".repeat(10 - filled))
}

fn status_line(sync: &SyncFrame) -> String {
    format!(
        "bass [{}] mid [{}] treble [{}] energy [{}] {} x{:.2}",
        meter(sync.bass_intensity),
        meter(sync.mid_intensity),
        meter(sync.treble_intensity),
        meter(sync.energy_level),
        if sync.beat_pulse > 0.5 { "BEAT" } else { "    " },
        sync.tempo_multiplier
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_line_overrides_config() {
        let args = Args::try_parse_from([
            "beatsync",
            "song.mp3",
            "--fps",
            "30",
            "--sensitivity",
            "1.5",
            "--start",
            "12.5",
        ])
        .unwrap();
        assert_eq!(args.start, Some(12.5));

        let config = build_config(&args).unwrap();
        assert_eq!(config.fps, 30);
        assert_eq!(config.beat_sync.sensitivity, 1.5);
        assert_eq!(config.volume, VisualizerConfig::default().volume);
    }

    #[test]
    fn invalid_overrides_are_rejected() {
        let args = Args::try_parse_from(["beatsync", "song.mp3", "--fps", "0"]).unwrap();
        assert!(build_config(&args).is_err());
    }

    #[test]
    fn clock_time_formats_minutes_and_seconds() {
        assert_eq!(clock_time(Duration::ZERO), "0:00");
        assert_eq!(clock_time(Duration::from_millis(83_900)), "1:23");
    }
}
