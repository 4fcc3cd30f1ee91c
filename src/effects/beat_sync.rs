use anyhow::{bail, Result};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use super::css_vars::CssVars;
use super::random::{FastRandom, RandomSource};
use crate::audio::clock::{Clock, MonotonicClock};
use crate::audio::AnalysisFrame;

/// Per-tick decay toward rest while paused or disabled.
const REST_DECAY: f32 = 0.05;
const REST_SCALE_DECAY: f32 = 0.1;

/// `energy_level` above this counts as a high-energy passage.
const HIGH_ENERGY_THRESHOLD: f32 = 0.6;

/// How far a full beat pulse enlarges the beat scale.
const BEAT_SCALE_RANGE: f32 = 0.15;
/// Fraction of beat strength that lights the glow.
const BEAT_GLOW_FACTOR: f32 = 0.7;

/// Tempo window mapped onto animation speed.
const MIN_TEMPO_BPM: f32 = 60.0;
const MAX_TEMPO_BPM: f32 = 180.0;
const MIN_TEMPO_MULTIPLIER: f32 = 0.5;
const MAX_TEMPO_MULTIPLIER: f32 = 2.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BeatSyncConfig {
    pub enabled: bool,

    /// Multiplier applied to every incoming level
    pub sensitivity: f32,

    /// Weight of the previous value when smoothing (0.0 to 1.0, higher = smoother)
    pub smoothing: f32,

    /// Per-tick multiplier for beat pulse and glow
    pub beat_decay: f32,

    pub energy_boost: f32,
    pub bass_boost: f32,
    pub treble_boost: f32,
}

impl Default for BeatSyncConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sensitivity: 1.0,
            smoothing: 0.85,
            beat_decay: 0.92,
            energy_boost: 1.2,
            bass_boost: 1.5,
            treble_boost: 1.3,
        }
    }
}

impl BeatSyncConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.sensitivity >= 0.0) {
            bail!("sensitivity {} must not be negative", self.sensitivity);
        }
        if !(0.0..=1.0).contains(&self.smoothing) {
            bail!("beat sync smoothing {} must be within 0.0..=1.0", self.smoothing);
        }
        if !(0.0..=1.0).contains(&self.beat_decay) {
            bail!("beat decay {} must be within 0.0..=1.0", self.beat_decay);
        }
        for (name, boost) in [
            ("energy", self.energy_boost),
            ("bass", self.bass_boost),
            ("treble", self.treble_boost),
        ] {
            if !(boost >= 0.0) {
                bail!("{} boost {} must not be negative", name, boost);
            }
        }
        Ok(())
    }
}

/// Smoothed animation parameters for one render tick.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncFrame {
    // Smoothed intensities (0.0 to 1.0)
    pub bass_intensity: f32,
    pub mid_intensity: f32,
    pub treble_intensity: f32,

    // Beat-triggered effects
    pub beat_pulse: f32,
    pub beat_scale: f32,
    pub beat_glow: f32,

    pub energy_level: f32,
    pub volume_level: f32,

    pub tempo_multiplier: f32,
    pub is_high_energy: bool,

    // Decorated values for effect consumers
    pub bass_boost: f32,
    pub treble_sparkle: f32,
    pub mid_motion: f32,

    pub css_vars: CssVars,
}

impl Default for SyncFrame {
    fn default() -> Self {
        Self {
            bass_intensity: 0.0,
            mid_intensity: 0.0,
            treble_intensity: 0.0,
            beat_pulse: 0.0,
            beat_scale: 1.0,
            beat_glow: 0.0,
            energy_level: 0.0,
            volume_level: 0.0,
            tempo_multiplier: 1.0,
            is_high_energy: false,
            bass_boost: 0.0,
            treble_sparkle: 0.0,
            mid_motion: 0.0,
            css_vars: CssVars::default(),
        }
    }
}

impl SyncFrame {
    fn refresh_css_vars(&mut self) {
        self.css_vars = CssVars::from_levels(
            self.beat_pulse,
            self.bass_intensity,
            self.mid_intensity,
            self.treble_intensity,
            self.energy_level,
            self.beat_scale,
            self.beat_glow,
            self.tempo_multiplier,
        );
    }
}

/// Animation speed for a tempo: 60 BPM and below play at half speed, 180 BPM
/// and above at double speed. Unknown tempo (0) keeps normal speed.
pub fn tempo_multiplier(bpm: f32) -> f32 {
    if bpm <= 0.0 {
        return 1.0;
    }
    let bpm = bpm.clamp(MIN_TEMPO_BPM, MAX_TEMPO_BPM);
    MIN_TEMPO_MULTIPLIER
        + (bpm - MIN_TEMPO_BPM) / (MAX_TEMPO_BPM - MIN_TEMPO_BPM)
            * (MAX_TEMPO_MULTIPLIER - MIN_TEMPO_MULTIPLIER)
}

fn approach(current: f32, target: f32, factor: f32) -> f32 {
    current + (target - current) * factor
}

fn checked_config(config: BeatSyncConfig) -> BeatSyncConfig {
    match config.validate() {
        Ok(()) => config,
        Err(e) => {
            warn!("Invalid beat sync config ({:#}), using defaults", e);
            BeatSyncConfig::default()
        }
    }
}

/// Converts analysis frames into smoothed animation parameters.
///
/// The mapper free-runs at render rate and can be fed the same analysis
/// frame many times in a row; a beat only fires once per frame sequence.
pub struct BeatSyncMapper {
    config: BeatSyncConfig,
    clock: Box<dyn Clock>,
    random: Box<dyn RandomSource>,

    beat_pulse: f32,
    beat_glow: f32,
    last_beat_sequence: Option<u64>,

    current: SyncFrame,
}

impl BeatSyncMapper {
    pub fn new(config: BeatSyncConfig) -> Self {
        Self::with_sources(
            config,
            Box::new(MonotonicClock::new()),
            Box::new(FastRandom::new()),
        )
    }

    pub fn with_sources(
        config: BeatSyncConfig,
        clock: Box<dyn Clock>,
        random: Box<dyn RandomSource>,
    ) -> Self {
        Self {
            config: checked_config(config),
            clock,
            random,
            beat_pulse: 0.0,
            beat_glow: 0.0,
            last_beat_sequence: None,
            current: SyncFrame::default(),
        }
    }

    pub fn tick(&mut self, frame: &AnalysisFrame, playing: bool) -> &SyncFrame {
        if !self.config.enabled || !playing {
            self.decay_to_rest();
        } else {
            self.follow(frame);
        }
        &self.current
    }

    fn decay_to_rest(&mut self) {
        let s = &mut self.current;
        s.bass_intensity = approach(s.bass_intensity, 0.0, REST_DECAY);
        s.mid_intensity = approach(s.mid_intensity, 0.0, REST_DECAY);
        s.treble_intensity = approach(s.treble_intensity, 0.0, REST_DECAY);
        s.beat_pulse = approach(s.beat_pulse, 0.0, REST_DECAY);
        s.beat_glow = approach(s.beat_glow, 0.0, REST_DECAY);
        s.energy_level = approach(s.energy_level, 0.0, REST_DECAY);
        s.volume_level = approach(s.volume_level, 0.0, REST_DECAY);
        s.beat_scale = approach(s.beat_scale, 1.0, REST_SCALE_DECAY);
        s.bass_boost = approach(s.bass_boost, 0.0, REST_DECAY);
        s.treble_sparkle = approach(s.treble_sparkle, 0.0, REST_DECAY);
        s.mid_motion = approach(s.mid_motion, 0.0, REST_DECAY);
        s.is_high_energy = s.energy_level > HIGH_ENERGY_THRESHOLD;
        s.refresh_css_vars();

        // Resume from the faded values, not from where playback stopped
        self.beat_pulse = s.beat_pulse;
        self.beat_glow = s.beat_glow;
    }

    fn follow(&mut self, frame: &AnalysisFrame) {
        let config = &self.config;

        if frame.is_beat && self.last_beat_sequence != Some(frame.sequence) {
            self.last_beat_sequence = Some(frame.sequence);
            self.beat_pulse = 1.0;
            self.beat_glow = (frame.beat_strength * BEAT_GLOW_FACTOR).min(1.0);
            debug!(
                "Beat pulse (strength {:.2}, tempo {:.0})",
                frame.beat_strength, frame.beat_tempo
            );
        }

        self.beat_pulse *= config.beat_decay;
        self.beat_glow *= config.beat_decay;

        let bass_target = (frame.bass * config.sensitivity * config.bass_boost).min(1.0);
        let mid_target = (frame.mid * config.sensitivity).min(1.0);
        let treble_target = (frame.treble * config.sensitivity * config.treble_boost).min(1.0);
        let energy_target = (frame.energy * config.sensitivity * config.energy_boost).min(1.0);
        let volume_target = (frame.volume * config.sensitivity).min(1.0);

        let step = 1.0 - config.smoothing;
        let previous = &self.current;
        let bass = approach(previous.bass_intensity, bass_target, step);
        let mid = approach(previous.mid_intensity, mid_target, step);
        let treble = approach(previous.treble_intensity, treble_target, step);
        let energy = approach(previous.energy_level, energy_target, step);
        let volume = approach(previous.volume_level, volume_target, step);

        let pulse = self.beat_pulse;
        let jitter = self.random.next_unit() * 0.2 - 0.1;
        let now_ms = self.clock.now_ms();
        let wave = (now_ms * 0.003).sin() as f32;

        self.current = SyncFrame {
            bass_intensity: bass,
            mid_intensity: mid,
            treble_intensity: treble,
            beat_pulse: pulse,
            beat_scale: 1.0 + pulse * BEAT_SCALE_RANGE,
            beat_glow: self.beat_glow,
            energy_level: energy,
            volume_level: volume,
            tempo_multiplier: tempo_multiplier(frame.beat_tempo),
            is_high_energy: energy > HIGH_ENERGY_THRESHOLD,
            bass_boost: bass * (1.0 + pulse * 0.5),
            treble_sparkle: treble * (1.0 + jitter),
            mid_motion: mid * (1.0 + wave * 0.1),
            css_vars: CssVars::default(),
        };
        self.current.refresh_css_vars();
    }

    pub fn latest(&self) -> &SyncFrame {
        &self.current
    }

    pub fn config(&self) -> &BeatSyncConfig {
        &self.config
    }

    /// Takes effect on the next tick; smoothing state is kept. An invalid
    /// config is replaced by the defaults.
    pub fn set_config(&mut self, config: BeatSyncConfig) {
        self.config = checked_config(config);
    }

    pub fn reset(&mut self) {
        self.beat_pulse = 0.0;
        self.beat_glow = 0.0;
        self.last_beat_sequence = None;
        self.current = SyncFrame::default();
    }
}
