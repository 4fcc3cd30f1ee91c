use super::rolling::{RollingMean, RollingWindow};

/// Energy samples kept for the rolling average (~1 second at 60fps).
pub const ENERGY_HISTORY_LEN: usize = 60;
/// Minimum spacing between two declared beats.
pub const MIN_BEAT_INTERVAL_MS: f64 = 200.0;
/// Beat timestamps older than this are forgotten.
pub const BEAT_WINDOW_MS: f64 = 10_000.0;
/// BPM estimates averaged into the reported tempo.
pub const TEMPO_HISTORY_LEN: usize = 10;
/// Largest beat strength ever reported.
pub const MAX_BEAT_STRENGTH: f32 = 2.0;

/// Upper bound on beats that fit in the timestamp window.
const BEAT_TIMESTAMP_CAPACITY: usize = (BEAT_WINDOW_MS / MIN_BEAT_INTERVAL_MS) as usize + 1;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BeatReading {
    pub beat_strength: f32,
    pub is_beat: bool,
    pub beat_tempo: f32,
}

/// Onset detector comparing instantaneous energy against its recent average.
#[derive(Debug, Clone)]
pub struct BeatDetector {
    threshold: f32,
    energy_history: RollingMean,
    last_beat_ms: Option<f64>,
    tempo: TempoEstimator,
}

impl BeatDetector {
    pub fn new(threshold: f32) -> Self {
        Self {
            threshold,
            energy_history: RollingMean::new(ENERGY_HISTORY_LEN),
            last_beat_ms: None,
            tempo: TempoEstimator::new(),
        }
    }

    pub fn detect(&mut self, energy: f32, now_ms: f64) -> BeatReading {
        // The current sample is part of its own baseline, so the very first
        // tick always reads a ratio of 1.
        self.energy_history.push(energy as f64);
        let average = self.energy_history.mean();

        let beat_strength = if average > 0.0 {
            (energy as f64 / average) as f32
        } else {
            0.0
        };

        let can_beat = self
            .last_beat_ms
            .map_or(true, |last| now_ms - last >= MIN_BEAT_INTERVAL_MS);
        let is_beat = beat_strength > self.threshold && can_beat;

        if is_beat {
            self.last_beat_ms = Some(now_ms);
            self.tempo.record_beat(now_ms);
        }

        BeatReading {
            beat_strength: beat_strength.min(MAX_BEAT_STRENGTH),
            is_beat,
            beat_tempo: self.tempo.bpm(),
        }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn reset(&mut self) {
        self.energy_history.clear();
        self.last_beat_ms = None;
        self.tempo.reset();
    }
}

/// Rolling BPM estimate from the spacing of recent beats.
#[derive(Debug, Clone)]
pub struct TempoEstimator {
    beat_times: RollingWindow<f64>,
    bpm_history: RollingMean,
}

impl TempoEstimator {
    pub fn new() -> Self {
        Self {
            beat_times: RollingWindow::new(BEAT_TIMESTAMP_CAPACITY),
            bpm_history: RollingMean::new(TEMPO_HISTORY_LEN),
        }
    }

    pub fn record_beat(&mut self, now_ms: f64) {
        self.beat_times.push(now_ms);
        let cutoff = now_ms - BEAT_WINDOW_MS;
        self.beat_times.pop_front_while(|&t| t <= cutoff);

        if self.beat_times.len() < 2 {
            return;
        }

        // Mean of consecutive intervals telescopes to span / count
        let (first, last) = match (self.beat_times.front(), self.beat_times.back()) {
            (Some(&first), Some(&last)) => (first, last),
            _ => return,
        };
        let average_interval = (last - first) / (self.beat_times.len() - 1) as f64;
        if average_interval > 0.0 {
            self.bpm_history.push(60_000.0 / average_interval);
        }
    }

    /// Average of recent estimates rounded to whole BPM, 0 without data.
    pub fn bpm(&self) -> f32 {
        if self.bpm_history.is_empty() {
            0.0
        } else {
            self.bpm_history.mean().round() as f32
        }
    }

    pub fn reset(&mut self) {
        self.beat_times.clear();
        self.bpm_history.clear();
    }
}

impl Default for TempoEstimator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FRAME_MS: f64 = 1000.0 / 60.0;

    #[test]
    fn first_sample_is_its_own_baseline() {
        let mut detector = BeatDetector::new(1.3);
        let reading = detector.detect(1.0, 0.0);
        assert_eq!(reading.beat_strength, 1.0);
        assert!(!reading.is_beat);
        assert_eq!(reading.beat_tempo, 0.0);
    }

    #[test]
    fn zero_average_gives_zero_strength() {
        let mut detector = BeatDetector::new(1.3);
        for i in 0..120 {
            let reading = detector.detect(0.0, i as f64 * FRAME_MS);
            assert_eq!(reading.beat_strength, 0.0);
            assert!(!reading.is_beat);
        }
    }

    #[test]
    fn spike_over_baseline_is_a_beat_and_strength_is_capped() {
        let mut detector = BeatDetector::new(1.3);
        for i in 0..30 {
            detector.detect(0.1, i as f64 * FRAME_MS);
        }
        let reading = detector.detect(1.0, 30.0 * FRAME_MS);
        assert!(reading.is_beat);
        assert_eq!(reading.beat_strength, MAX_BEAT_STRENGTH);
    }

    #[test]
    fn beats_closer_than_min_interval_are_suppressed() {
        let mut detector = BeatDetector::new(1.3);
        for i in 0..30 {
            detector.detect(0.1, i as f64 * FRAME_MS);
        }
        assert!(detector.detect(1.0, 500.0).is_beat);
        detector.detect(0.1, 520.0);
        assert!(!detector.detect(1.0, 650.0).is_beat, "150ms after previous beat");
        detector.detect(0.1, 670.0);
        assert!(detector.detect(1.0, 700.0).is_beat, "exactly 200ms after previous beat");
    }

    #[test]
    fn steady_beats_converge_on_tempo() {
        let mut detector = BeatDetector::new(1.3);
        let period_ms = 400.0; // 150 BPM
        let ticks_per_period = 24;
        let mut last_tempo = 0.0;

        for tick in 0..(ticks_per_period * 12) {
            let now = tick as f64 * (period_ms / ticks_per_period as f64);
            let energy = if tick % ticks_per_period == 0 { 0.9 } else { 0.1 };
            last_tempo = detector.detect(energy, now).beat_tempo;
        }
        assert!((last_tempo - 150.0).abs() <= 1.0, "tempo {}", last_tempo);
    }

    #[test]
    fn tempo_forgets_beats_older_than_window() {
        let mut tempo = TempoEstimator::new();
        tempo.record_beat(0.0);
        tempo.record_beat(1000.0);
        assert_eq!(tempo.bpm(), 60.0);

        // Far in the future: the old beats are pruned, so no new estimate is added
        tempo.record_beat(30_000.0);
        assert_eq!(tempo.beat_times.len(), 1);
        assert_eq!(tempo.bpm(), 60.0);

        tempo.record_beat(30_500.0);
        assert_eq!(tempo.bpm(), 90.0); // mean of 60 and 120
    }

    #[test]
    fn tempo_history_is_bounded() {
        let mut tempo = TempoEstimator::new();
        let mut now = 0.0;
        for _ in 0..40 {
            now += 500.0;
            tempo.record_beat(now);
        }
        assert_eq!(tempo.bpm_history.len(), TEMPO_HISTORY_LEN);
        assert_eq!(tempo.bpm(), 120.0);
    }

    #[test]
    fn reset_clears_history() {
        let mut detector = BeatDetector::new(1.3);
        for i in 0..30 {
            detector.detect(0.1, i as f64 * FRAME_MS);
        }
        detector.detect(1.0, 500.0);
        detector.reset();
        let reading = detector.detect(1.0, 510.0);
        assert!(!reading.is_beat);
        assert_eq!(reading.beat_tempo, 0.0);
    }
}
