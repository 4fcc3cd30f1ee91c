use anyhow::Result;
use beatsync::audio::PrescanProcessor;
use beatsync::VisualizerConfig;
use clap::Parser;
use log::info;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "beatsync-prescan")]
#[command(about = "Run the beat-sync pipeline over an audio file offline and save a report")]
struct Args {
    /// Audio file to pre-scan (MP3, WAV, M4A, OGG, etc.)
    #[arg()]
    input_file: PathBuf,

    /// Output file for the JSON report
    #[arg(short, long, default_value = "prescan_report.json")]
    output: PathBuf,

    /// Include per-tick frames in the report, not just statistics
    #[arg(long)]
    frames: bool,

    /// Simulated ticks per second
    #[arg(long)]
    fps: Option<u32>,

    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => VisualizerConfig::load(path)?,
        None => VisualizerConfig::default(),
    };
    let fps = args.fps.unwrap_or(config.fps);

    info!("Input file: {}", args.input_file.display());
    info!("Output file: {}", args.output.display());
    info!(
        "Transform size: {}, {} ticks per second",
        config.analyzer.transform_size, fps
    );

    let processor = PrescanProcessor::new(config, fps).keep_frames(args.frames);
    let report = processor.prescan_file(&args.input_file)?;

    let stats = &report.statistics;
    info!("=== PRE-SCAN RESULTS ===");
    info!("Duration: {:.2} seconds", report.file_info.duration_seconds);
    info!("Total beats detected: {}", stats.total_beats);
    info!("Average BPM: {:.1}", stats.average_bpm);
    info!("BPM range: {:.1} - {:.1}", stats.bpm_range.0, stats.bpm_range.1);
    info!("Dominant band: {}", stats.dominant_band);
    info!("High energy: {:.1}% of ticks", stats.high_energy_ratio * 100.0);
    info!(
        "Peaks: bass {:.3}, mid {:.3}, treble {:.3}, energy {:.3}",
        stats.peak_bass, stats.peak_mid, stats.peak_treble, stats.peak_energy
    );

    report.save(&args.output)?;
    let file_size = std::fs::metadata(&args.output)?.len();
    info!(
        "Report saved to {} ({:.1} KB)",
        args.output.display(),
        file_size as f64 / 1024.0
    );

    Ok(())
}
