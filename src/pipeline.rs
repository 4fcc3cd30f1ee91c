use log::info;

use crate::audio::{AnalysisFrame, SignalAnalyzer, SignalSource};
use crate::config::VisualizerConfig;
use crate::effects::{BeatSyncMapper, SyncFrame};

/// Something that renders sync frames: a shader, a terminal meter, a style sheet.
pub trait EffectSink {
    fn apply(&mut self, frame: &SyncFrame);
}

impl<F> EffectSink for F
where
    F: FnMut(&SyncFrame),
{
    fn apply(&mut self, frame: &SyncFrame) {
        self(frame)
    }
}

/// Analyzer and mapper wired in sequence. Each tick samples the signal (when
/// attached) and advances the animation. Once detached the analyzer reports
/// silence, so the animation settles even while playback continues.
pub struct Visualizer {
    analyzer: SignalAnalyzer,
    mapper: BeatSyncMapper,
}

impl Visualizer {
    pub fn new(config: &VisualizerConfig) -> Self {
        Self::from_parts(
            SignalAnalyzer::new(config.analyzer.clone()),
            BeatSyncMapper::new(config.beat_sync.clone()),
        )
    }

    pub fn from_parts(analyzer: SignalAnalyzer, mapper: BeatSyncMapper) -> Self {
        Self { analyzer, mapper }
    }

    pub fn attach(&mut self, source: &mut dyn SignalSource) {
        self.analyzer.setup(Some(source));
        if self.analyzer.is_analyzing() {
            info!("Visualizer attached to signal source");
        }
    }

    pub fn is_attached(&self) -> bool {
        self.analyzer.is_analyzing()
    }

    pub fn tick(&mut self, playing: bool) -> &SyncFrame {
        self.analyzer.tick();
        self.mapper.tick(self.analyzer.latest_frame(), playing)
    }

    pub fn tick_into(&mut self, playing: bool, sink: &mut dyn EffectSink) {
        let frame = self.tick(playing);
        sink.apply(frame);
    }

    /// Stop analysing. The mapper keeps running and fades out.
    pub fn detach(&mut self) {
        self.analyzer.teardown();
    }

    pub fn analysis(&self) -> &AnalysisFrame {
        self.analyzer.latest_frame()
    }

    pub fn sync(&self) -> &SyncFrame {
        self.mapper.latest()
    }

    pub fn mapper_mut(&mut self) -> &mut BeatSyncMapper {
        &mut self.mapper
    }
}
