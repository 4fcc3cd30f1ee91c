pub mod analyzer;
pub mod beat_detector;
pub mod clock;
pub mod playback;
pub mod prescan;
pub mod rolling;
pub mod spectrum;
pub mod tap;

pub use analyzer::{AnalyzerConfig, SignalAnalyzer};
pub use beat_detector::{BeatDetector, TempoEstimator};
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use playback::{PlaybackEngine, TrackInfo};
pub use prescan::{PrescanProcessor, PrescanReport};
pub use tap::{SignalSource, SignalTap, SpectrumTap, TapSettings};

use std::sync::Arc;

/// One tick of analysis output.
///
/// Frames are immutable once produced: the byte buffers are shared behind an
/// `Arc`, so cloning a frame to hand it to several consumers is cheap.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisFrame {
    /// Tick counter of the analyzer session, starting at 1
    pub sequence: u64,
    pub timestamp_ms: f64,

    // Band levels (0.0 to 1.0)
    pub bass: f32,
    pub mid: f32,
    pub treble: f32,

    // Beat detection
    pub beat_strength: f32,
    pub is_beat: bool,
    pub beat_tempo: f32,

    pub frequency_data: Arc<[u8]>,
    pub waveform_data: Arc<[u8]>,

    pub volume: f32,
    pub energy: f32,
}

impl Default for AnalysisFrame {
    fn default() -> Self {
        Self {
            sequence: 0,
            timestamp_ms: 0.0,
            bass: 0.0,
            mid: 0.0,
            treble: 0.0,
            beat_strength: 0.0,
            is_beat: false,
            beat_tempo: 0.0,
            frequency_data: Arc::from(Vec::<u8>::new()),
            waveform_data: Arc::from(Vec::<u8>::new()),
            volume: 0.0,
            energy: 0.0,
        }
    }
}
