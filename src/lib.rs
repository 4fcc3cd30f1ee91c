//! Real-time beat-synchronized visualization core.
//!
//! A [`SignalAnalyzer`](audio::SignalAnalyzer) taps a playing track and turns
//! it into one [`AnalysisFrame`](audio::AnalysisFrame) per tick; a
//! [`BeatSyncMapper`](effects::BeatSyncMapper) smooths those frames into
//! animation parameters. [`Visualizer`](pipeline::Visualizer) wires the two
//! together.

pub mod audio;
pub mod config;
pub mod effects;
pub mod pipeline;
pub mod tick;

pub use audio::{AnalysisFrame, PlaybackEngine, SignalAnalyzer};
pub use config::VisualizerConfig;
pub use effects::{BeatSyncMapper, CssVars, SyncFrame};
pub use pipeline::{EffectSink, Visualizer};
pub use tick::{CancelHandle, TickLoop};
