use anyhow::{bail, Context, Result};
use log::info;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::audio::playback::DEFAULT_VOLUME;
use crate::audio::AnalyzerConfig;
use crate::effects::BeatSyncConfig;

pub const DEFAULT_FPS: u32 = 60;
pub const MAX_FPS: u32 = 240;

/// Everything a visualizer session can be configured with. Every section
/// falls back to its defaults, so partial files are fine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisualizerConfig {
    pub analyzer: AnalyzerConfig,
    pub beat_sync: BeatSyncConfig,

    /// Ticks per second for analysis and animation
    pub fps: u32,

    /// Initial playback volume (0.0 to 1.0)
    pub volume: f32,
}

impl Default for VisualizerConfig {
    fn default() -> Self {
        Self {
            analyzer: AnalyzerConfig::default(),
            beat_sync: BeatSyncConfig::default(),
            fps: DEFAULT_FPS,
            volume: DEFAULT_VOLUME,
        }
    }
}

impl VisualizerConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: Self = serde_json::from_str(&json)
            .with_context(|| format!("Invalid config {}", path.display()))?;
        config.validate()?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write config {}", path.display()))?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.analyzer.validate()?;
        self.beat_sync.validate()?;
        if self.fps == 0 || self.fps > MAX_FPS {
            bail!("fps {} must be between 1 and {}", self.fps, MAX_FPS);
        }
        if !(0.0..=1.0).contains(&self.volume) {
            bail!("volume {} must be within 0.0..=1.0", self.volume);
        }
        Ok(())
    }
}
