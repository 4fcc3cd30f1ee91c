use anyhow::{bail, Context, Result};
use log::{debug, error, info};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::beat_detector::BeatDetector;
use super::clock::{Clock, MonotonicClock};
use super::tap::{SignalSource, SignalTap, TapSettings};
use super::AnalysisFrame;

/// Smallest and largest transform sizes the tap supports.
pub const MIN_TRANSFORM_SIZE: usize = 32;
pub const MAX_TRANSFORM_SIZE: usize = 32768;

/// Fraction of bins making up the bass band.
const BASS_END: f32 = 0.1;
/// Fraction of bins where the mid band stops and treble begins.
const MID_END: f32 = 0.4;

/// Ticks between periodic debug dumps (~2 seconds at 60fps).
const DEBUG_LOG_INTERVAL: u64 = 120;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Transform window in samples, a power of two
    pub transform_size: usize,

    /// Per-bin temporal smoothing of the spectrum (0.0 to 1.0)
    pub smoothing: f32,

    /// Energy ratio over the rolling average that counts as a beat
    pub beat_threshold: f32,

    /// Accepted for compatibility with hosts that configure it; frames do not depend on it
    pub beat_decay_rate: f32,

    pub enabled: bool,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            transform_size: 2048,
            smoothing: 0.8,
            beat_threshold: 1.3,
            beat_decay_rate: 0.95,
            enabled: true,
        }
    }
}

impl AnalyzerConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.transform_size.is_power_of_two()
            || !(MIN_TRANSFORM_SIZE..=MAX_TRANSFORM_SIZE).contains(&self.transform_size)
        {
            bail!(
                "transform size {} must be a power of two between {} and {}",
                self.transform_size,
                MIN_TRANSFORM_SIZE,
                MAX_TRANSFORM_SIZE
            );
        }
        if !(0.0..=1.0).contains(&self.smoothing) {
            bail!("analyzer smoothing {} must be within 0.0..=1.0", self.smoothing);
        }
        if !(self.beat_threshold > 0.0) {
            bail!("beat threshold {} must be positive", self.beat_threshold);
        }
        if !(self.beat_decay_rate > 0.0 && self.beat_decay_rate <= 1.0) {
            bail!("beat decay rate {} must be within (0.0, 1.0]", self.beat_decay_rate);
        }
        Ok(())
    }

    pub fn tap_settings(&self) -> TapSettings {
        TapSettings {
            transform_size: self.transform_size,
            smoothing: self.smoothing,
        }
    }
}

/// Per-frame band levels, in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BandLevels {
    pub bass: f32,
    pub mid: f32,
    pub treble: f32,
}

/// Splits a byte spectrum into bass (first 10%), mid (10% to 40%) and
/// treble (the rest). Each band is the mean of its bins over 255.
pub fn band_levels(frequency_data: &[u8]) -> BandLevels {
    let len = frequency_data.len();
    let bass_end = (len as f32 * BASS_END) as usize;
    let mid_end = (len as f32 * MID_END) as usize;

    BandLevels {
        bass: average_bytes(&frequency_data[..bass_end]),
        mid: average_bytes(&frequency_data[bass_end..mid_end]),
        treble: average_bytes(&frequency_data[mid_end..]),
    }
}

/// Mean and root-mean-square of the normalized bins.
pub fn volume_and_energy(frequency_data: &[u8]) -> (f32, f32) {
    if frequency_data.is_empty() {
        return (0.0, 0.0);
    }

    let (sum, sum_sq) = frequency_data.iter().fold((0.0f32, 0.0f32), |(sum, sum_sq), &b| {
        let value = b as f32 / 255.0;
        (sum + value, sum_sq + value * value)
    });
    let n = frequency_data.len() as f32;
    (sum / n, (sum_sq / n).sqrt())
}

fn average_bytes(bins: &[u8]) -> f32 {
    if bins.is_empty() {
        return 0.0;
    }
    let sum: u32 = bins.iter().map(|&b| b as u32).sum();
    sum as f32 / bins.len() as f32 / 255.0
}

/// Turns a live audio signal into one [`AnalysisFrame`] per tick.
///
/// The analyzer stays idle until [`setup`](Self::setup) connects a tap on a
/// [`SignalSource`]; setup failures are logged and leave it idle rather than
/// reaching the caller.
pub struct SignalAnalyzer {
    config: AnalyzerConfig,
    clock: Box<dyn Clock>,
    tap: Option<Box<dyn SignalTap>>,

    frequency_buffer: Vec<u8>,
    waveform_buffer: Vec<u8>,
    beat_detector: BeatDetector,

    sequence: u64,
    latest: AnalysisFrame,
}

impl SignalAnalyzer {
    pub fn new(config: AnalyzerConfig) -> Self {
        Self::with_clock(config, Box::new(MonotonicClock::new()))
    }

    pub fn with_clock(config: AnalyzerConfig, clock: Box<dyn Clock>) -> Self {
        let beat_detector = BeatDetector::new(config.beat_threshold);
        Self {
            config,
            clock,
            tap: None,
            frequency_buffer: Vec::new(),
            waveform_buffer: Vec::new(),
            beat_detector,
            sequence: 0,
            latest: AnalysisFrame::default(),
        }
    }

    /// Attach to `source`. Calling again while attached does nothing.
    pub fn setup(&mut self, source: Option<&mut dyn SignalSource>) {
        if !self.config.enabled {
            debug!("Analyzer disabled, staying idle");
            return;
        }
        let Some(source) = source else {
            debug!("No signal source, analyzer staying idle");
            return;
        };
        if self.tap.is_some() {
            return;
        }

        if let Err(e) = self.attach(source) {
            error!("Error initializing audio analyzer: {:#}", e);
            self.tap = None;
        }
    }

    fn attach(&mut self, source: &mut dyn SignalSource) -> Result<()> {
        self.config.validate()?;

        if source.is_suspended() {
            source.resume().context("Failed to resume audio output")?;
        }

        let settings = self.config.tap_settings();
        let mut tap = source
            .connect_tap(&settings)
            .context("Failed to connect analysis tap")?;

        let expected_bins = settings.transform_size / 2;
        if tap.bin_count() != expected_bins {
            tap.release();
            bail!(
                "tap reports {} bins, expected {}",
                tap.bin_count(),
                expected_bins
            );
        }

        self.frequency_buffer = vec![0; expected_bins];
        self.waveform_buffer = vec![0; expected_bins];
        self.tap = Some(tap);

        info!(
            "Audio analyzer attached ({} bins, beat threshold {:.2})",
            expected_bins, self.config.beat_threshold
        );
        Ok(())
    }

    pub fn is_analyzing(&self) -> bool {
        self.tap.is_some()
    }

    /// Run one analysis step. Returns `None` while idle.
    pub fn tick(&mut self) -> Option<AnalysisFrame> {
        let tap = self.tap.as_mut()?;

        tap.read_frequency(&mut self.frequency_buffer);
        tap.read_waveform(&mut self.waveform_buffer);

        let bands = band_levels(&self.frequency_buffer);
        let (volume, energy) = volume_and_energy(&self.frequency_buffer);

        let now_ms = self.clock.now_ms();
        let beat = self.beat_detector.detect(energy, now_ms);

        self.sequence += 1;
        let frame = AnalysisFrame {
            sequence: self.sequence,
            timestamp_ms: now_ms,
            bass: bands.bass,
            mid: bands.mid,
            treble: bands.treble,
            beat_strength: beat.beat_strength,
            is_beat: beat.is_beat,
            beat_tempo: beat.beat_tempo,
            frequency_data: Arc::from(self.frequency_buffer.as_slice()),
            waveform_data: Arc::from(self.waveform_buffer.as_slice()),
            volume,
            energy,
        };

        if self.sequence % DEBUG_LOG_INTERVAL == 0 {
            debug!(
                "Analysis: bass={:.3}, mid={:.3}, treble={:.3}, energy={:.3}, tempo={:.0}",
                frame.bass, frame.mid, frame.treble, frame.energy, frame.beat_tempo
            );
        }

        self.latest = frame.clone();
        Some(frame)
    }

    /// Release the tap and stop analysing. Safe to call repeatedly.
    pub fn teardown(&mut self) {
        if let Some(mut tap) = self.tap.take() {
            tap.release();
            info!("Audio analyzer detached after {} ticks", self.sequence);
        }
        self.beat_detector.reset();
        self.latest = AnalysisFrame::default();
    }

    /// Last frame produced, or the silent frame while idle.
    pub fn latest_frame(&self) -> &AnalysisFrame {
        &self.latest
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }
}

impl Drop for SignalAnalyzer {
    fn drop(&mut self) {
        self.teardown();
    }
}
