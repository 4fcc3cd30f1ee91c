use anyhow::{bail, Context, Result};
use log::info;
use rodio::buffer::SamplesBuffer;
use rodio::{Decoder, Source};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use super::clock::ManualClock;
use super::tap::{SignalSource, SignalTap, SpectrumTap, TapLink, TapSettings};
use super::{AnalysisFrame, SignalAnalyzer};
use crate::config::VisualizerConfig;
use crate::effects::{BeatSyncMapper, FastRandom, SyncFrame};
use crate::pipeline::Visualizer;

/// Seed for the sparkle jitter, so repeated scans of a file match.
const PRESCAN_SEED: u64 = 0x6265_6174;

/// Decode an audio file and mix it down to mono.
pub fn load_mono_samples<P: AsRef<Path>>(path: P) -> Result<(Vec<f32>, u32)> {
    let path = path.as_ref();
    let file = BufReader::new(
        File::open(path).with_context(|| format!("Failed to open {}", path.display()))?,
    );
    let source = Decoder::new(file)
        .with_context(|| format!("Unsupported or corrupt audio file: {}", path.display()))?;

    let channels = source.channels().max(1) as usize;
    let sample_rate = source.sample_rate();
    let samples: Vec<f32> = source.convert_samples().collect();

    let mono = samples
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect();

    Ok((mono, sample_rate))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileInfo {
    pub filename: String,
    pub duration_seconds: f32,
    pub sample_rate: u32,
    pub total_samples: usize,
    pub frame_rate: f32,
    pub transform_size: usize,
}

/// Analysis and animation state for one simulated render tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrescanFrame {
    /// Seconds from the start of the file
    pub timestamp: f32,

    pub bass: f32,
    pub mid: f32,
    pub treble: f32,
    pub volume: f32,
    pub energy: f32,

    pub is_beat: bool,
    pub beat_strength: f32,
    pub beat_tempo: f32,

    pub beat_pulse: f32,
    pub beat_scale: f32,
    pub tempo_multiplier: f32,
    pub is_high_energy: bool,
}

impl PrescanFrame {
    fn new(timestamp: f32, analysis: &AnalysisFrame, sync: &SyncFrame) -> Self {
        Self {
            timestamp,
            bass: analysis.bass,
            mid: analysis.mid,
            treble: analysis.treble,
            volume: analysis.volume,
            energy: analysis.energy,
            is_beat: analysis.is_beat,
            beat_strength: analysis.beat_strength,
            beat_tempo: analysis.beat_tempo,
            beat_pulse: sync.beat_pulse,
            beat_scale: sync.beat_scale,
            tempo_multiplier: sync.tempo_multiplier,
            is_high_energy: sync.is_high_energy,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrescanStatistics {
    pub total_beats: u32,
    /// Mean of the tempo readings taken at each beat, 0 without beats
    pub average_bpm: f32,
    pub bpm_range: (f32, f32),

    pub peak_bass: f32,
    pub peak_mid: f32,
    pub peak_treble: f32,
    pub peak_energy: f32,

    /// Fraction of ticks where the mapper reported high energy
    pub high_energy_ratio: f32,
    /// "bass", "mid", "treble" or "balanced"
    pub dominant_band: String,
}

impl Default for PrescanStatistics {
    fn default() -> Self {
        Self {
            total_beats: 0,
            average_bpm: 0.0,
            bpm_range: (0.0, 0.0),
            peak_bass: 0.0,
            peak_mid: 0.0,
            peak_treble: 0.0,
            peak_energy: 0.0,
            high_energy_ratio: 0.0,
            dominant_band: "balanced".to_string(),
        }
    }
}

/// Offline run of the full pipeline over a file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrescanReport {
    pub file_info: FileInfo,
    pub statistics: PrescanStatistics,
    /// Empty unless per-frame data was requested
    pub frames: Vec<PrescanFrame>,
}

impl PrescanReport {
    pub fn save<P: AsRef<Path>>(&self, output_path: P) -> Result<()> {
        let output_path = output_path.as_ref();
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(output_path, json)
            .with_context(|| format!("Failed to write {}", output_path.display()))?;
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(input_path: P) -> Result<Self> {
        let input_path = input_path.as_ref();
        let json = std::fs::read_to_string(input_path)
            .with_context(|| format!("Failed to read {}", input_path.display()))?;
        let report = serde_json::from_str(&json)
            .with_context(|| format!("Invalid prescan report {}", input_path.display()))?;
        Ok(report)
    }
}

/// Signal source replaying a decoded buffer into the tap, one render tick at
/// a time.
struct BufferSource {
    link: TapLink,
    sample_rate: u32,
}

impl BufferSource {
    /// Push the samples that would have played since the last tick. Only the
    /// newest `keep` samples can reach the transform window.
    fn play(&self, block: &[f32], keep: usize) {
        let start = block.len().saturating_sub(keep);
        let tail = block[start..].to_vec();
        self.link
            .wrap(SamplesBuffer::new(1, self.sample_rate, tail))
            .for_each(drop);
    }
}

impl SignalSource for BufferSource {
    fn connect_tap(&mut self, settings: &TapSettings) -> Result<Box<dyn SignalTap>> {
        Ok(Box::new(SpectrumTap::with_feed(self.link.open_feed(), settings)))
    }

    fn tap_count(&self) -> usize {
        usize::from(self.link.is_enabled())
    }
}

#[derive(Default)]
struct StatisticsBuilder {
    ticks: usize,
    high_energy_ticks: usize,
    bpm_values: Vec<f32>,
    band_sums: [f64; 3],
    stats: PrescanStatistics,
}

impl StatisticsBuilder {
    fn record(&mut self, analysis: &AnalysisFrame, sync: &SyncFrame) {
        self.ticks += 1;
        let stats = &mut self.stats;
        stats.peak_bass = stats.peak_bass.max(analysis.bass);
        stats.peak_mid = stats.peak_mid.max(analysis.mid);
        stats.peak_treble = stats.peak_treble.max(analysis.treble);
        stats.peak_energy = stats.peak_energy.max(analysis.energy);

        self.band_sums[0] += analysis.bass as f64;
        self.band_sums[1] += analysis.mid as f64;
        self.band_sums[2] += analysis.treble as f64;

        if sync.is_high_energy {
            self.high_energy_ticks += 1;
        }

        if analysis.is_beat {
            stats.total_beats += 1;
            if analysis.beat_tempo > 0.0 {
                self.bpm_values.push(analysis.beat_tempo);
            }
        }
    }

    fn finish(mut self) -> PrescanStatistics {
        if !self.bpm_values.is_empty() {
            let n = self.bpm_values.len() as f32;
            self.stats.average_bpm = self.bpm_values.iter().sum::<f32>() / n;
            self.stats.bpm_range = (
                self.bpm_values.iter().fold(f32::INFINITY, |a, &b| a.min(b)),
                self.bpm_values.iter().fold(f32::NEG_INFINITY, |a, &b| a.max(b)),
            );
        }

        if self.ticks > 0 {
            self.stats.high_energy_ratio = self.high_energy_ticks as f32 / self.ticks as f32;
        }

        let [bass, mid, treble] = self.band_sums;
        self.stats.dominant_band = if bass > mid && bass > treble {
            "bass"
        } else if mid > bass && mid > treble {
            "mid"
        } else if treble > bass && treble > mid {
            "treble"
        } else {
            "balanced"
        }
        .to_string();

        self.stats
    }
}

/// Runs the analyzer and mapper over a decoded file at a simulated frame
/// rate, as if the file were playing in real time.
pub struct PrescanProcessor {
    config: VisualizerConfig,
    fps: u32,
    keep_frames: bool,
}

impl PrescanProcessor {
    pub fn new(config: VisualizerConfig, fps: u32) -> Self {
        Self {
            config,
            fps: fps.max(1),
            keep_frames: true,
        }
    }

    /// Whether the report carries every tick or just the statistics.
    pub fn keep_frames(mut self, keep: bool) -> Self {
        self.keep_frames = keep;
        self
    }

    pub fn prescan_file<P: AsRef<Path>>(&self, file_path: P) -> Result<PrescanReport> {
        let file_path = file_path.as_ref();
        info!("Pre-scanning audio file: {}", file_path.display());

        let (samples, sample_rate) = load_mono_samples(file_path)?;
        self.prescan_samples(&samples, sample_rate, &file_path.to_string_lossy())
    }

    pub fn prescan_samples(
        &self,
        samples: &[f32],
        sample_rate: u32,
        name: &str,
    ) -> Result<PrescanReport> {
        if sample_rate == 0 {
            bail!("sample rate must be positive");
        }
        self.config.validate()?;

        let frame_rate = self.fps as f32;
        let duration_seconds = samples.len() as f32 / sample_rate as f32;
        let transform_size = self.config.analyzer.transform_size;
        info!(
            "Loaded {} samples ({:.2}s) at {}Hz for pre-scanning",
            samples.len(),
            duration_seconds,
            sample_rate
        );

        let clock = ManualClock::new();
        let analyzer =
            SignalAnalyzer::with_clock(self.config.analyzer.clone(), Box::new(clock.clone()));
        let mapper = BeatSyncMapper::with_sources(
            self.config.beat_sync.clone(),
            Box::new(clock.clone()),
            Box::new(FastRandom::with_seed(PRESCAN_SEED)),
        );
        let mut visualizer = Visualizer::from_parts(analyzer, mapper);

        let mut source = BufferSource {
            link: TapLink::new(),
            sample_rate,
        };
        visualizer.attach(&mut source);
        if !visualizer.is_attached() {
            bail!("Failed to attach analyzer for pre-scan");
        }

        let total_ticks = (duration_seconds * frame_rate).floor() as usize;
        let mut frames = Vec::new();
        let mut statistics = StatisticsBuilder::default();
        let mut played = 0usize;

        for tick in 0..total_ticks {
            let elapsed = (tick + 1) as f64 / self.fps as f64;
            let end = ((elapsed * sample_rate as f64) as usize).min(samples.len());
            source.play(&samples[played..end], transform_size);
            played = end;

            clock.set_ms(elapsed * 1000.0);
            visualizer.tick(true);
            let sync = visualizer.sync();
            let analysis = visualizer.analysis();

            statistics.record(analysis, sync);
            if self.keep_frames {
                frames.push(PrescanFrame::new(elapsed as f32, analysis, sync));
            }

            if (tick + 1) % 1000 == 0 {
                info!(
                    "Pre-scanned {} ticks ({:.1}s of {:.1}s)",
                    tick + 1,
                    elapsed,
                    duration_seconds
                );
            }
        }
        visualizer.detach();

        let statistics = statistics.finish();
        info!(
            "Pre-scan complete: {} ticks, {} beats, {:.1} BPM average",
            total_ticks, statistics.total_beats, statistics.average_bpm
        );

        Ok(PrescanReport {
            file_info: FileInfo {
                filename: name.to_string(),
                duration_seconds,
                sample_rate,
                total_samples: samples.len(),
                frame_rate,
                transform_size,
            },
            statistics,
            frames,
        })
    }
}
