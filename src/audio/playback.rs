use anyhow::{anyhow, bail, Context, Result};
use log::info;
use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink, Source};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::tap::{SignalSource, SignalTap, SpectrumTap, TapLink, TapSettings};

pub const DEFAULT_VOLUME: f32 = 0.7;

/// What is currently loaded into the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackInfo {
    pub path: PathBuf,
    pub sample_rate: u32,
    pub channels: u16,
    pub duration: Option<Duration>,
}

/// Owns the output device and the single active track.
///
/// The engine is created suspended: no device is opened until `resume` (or
/// the first `load_file`). Loading a new track always replaces the previous
/// one, so at most one track is audible at a time. Every loaded track runs
/// through the engine's tap link, which the analyzer connects to through
/// [`SignalSource`].
pub struct PlaybackEngine {
    output: Option<(OutputStream, OutputStreamHandle)>,
    sink: Option<Sink>,
    track: Option<TrackInfo>,
    tap_link: TapLink,
    volume: f32,
    muted: bool,
}

impl PlaybackEngine {
    pub fn new() -> Self {
        Self {
            output: None,
            sink: None,
            track: None,
            tap_link: TapLink::new(),
            volume: DEFAULT_VOLUME,
            muted: false,
        }
    }

    pub fn load_file<P: AsRef<Path>>(&mut self, path: P) -> Result<&TrackInfo> {
        let path = path.as_ref();
        let file = BufReader::new(
            File::open(path).with_context(|| format!("Failed to open {}", path.display()))?,
        );
        let source = Decoder::new(file)
            .with_context(|| format!("Unsupported or corrupt audio file: {}", path.display()))?
            .convert_samples::<f32>();

        let track = TrackInfo {
            path: path.to_path_buf(),
            sample_rate: source.sample_rate(),
            channels: source.channels(),
            duration: source.total_duration(),
        };

        self.resume()?;
        if let Some(previous) = self.sink.take() {
            previous.stop();
        }

        let handle = match &self.output {
            Some((_, handle)) => handle,
            None => bail!("Audio output is not available"),
        };
        let sink = Sink::try_new(handle).context("Failed to create playback sink")?;
        sink.append(self.tap_link.wrap(source));
        sink.pause();
        sink.set_volume(self.effective_volume());

        info!(
            "Loaded audio file: {} ({}Hz, {} channels)",
            path.display(),
            track.sample_rate,
            track.channels
        );
        self.sink = Some(sink);
        Ok(&*self.track.insert(track))
    }

    pub fn play(&self) {
        if let Some(sink) = &self.sink {
            sink.play();
            info!("Audio playback started");
        }
    }

    pub fn pause(&self) {
        if let Some(sink) = &self.sink {
            sink.pause();
            info!("Audio playback paused");
        }
    }

    /// Returns whether playback is running afterwards.
    pub fn toggle_play(&self) -> bool {
        if self.is_playing() {
            self.pause();
        } else {
            self.play();
        }
        self.is_playing()
    }

    pub fn stop(&mut self) {
        if let Some(sink) = self.sink.take() {
            sink.stop();
            info!("Audio playback stopped");
        }
        self.track = None;
    }

    pub fn is_playing(&self) -> bool {
        self.sink
            .as_ref()
            .map_or(false, |sink| !sink.is_paused() && !sink.empty())
    }

    pub fn is_finished(&self) -> bool {
        self.sink.as_ref().map_or(true, |sink| sink.empty())
    }

    pub fn current_track(&self) -> Option<&TrackInfo> {
        self.track.as_ref()
    }

    /// Jump to `position` in the current track, clamped to its length.
    /// Returns the position actually sought to.
    pub fn seek(&self, position: Duration) -> Result<Duration> {
        let (Some(sink), Some(track)) = (&self.sink, &self.track) else {
            bail!("No track loaded");
        };
        let target = clamp_seek(position, track.duration);
        sink.try_seek(target)
            .map_err(|e| anyhow!("Failed to seek to {:.1}s: {}", target.as_secs_f32(), e))?;
        info!("Seeked to {:.1}s", target.as_secs_f32());
        Ok(target)
    }

    /// Playback position in the current track, zero when nothing is loaded.
    pub fn position(&self) -> Duration {
        let Some(track) = &self.track else {
            return Duration::ZERO;
        };
        let seconds = self.tap_link.frames_played() as f64 / track.sample_rate.max(1) as f64;
        clamp_seek(Duration::from_secs_f64(seconds), track.duration)
    }

    pub fn duration(&self) -> Option<Duration> {
        self.track.as_ref().and_then(|track| track.duration)
    }

    /// Fraction of the track played, when its length is known.
    pub fn progress(&self) -> Option<f32> {
        let duration = self.duration().filter(|d| !d.is_zero())?;
        Some((self.position().as_secs_f64() / duration.as_secs_f64()) as f32)
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn set_volume(&mut self, volume: f32) {
        self.volume = volume.clamp(0.0, 1.0);
        self.apply_volume();
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    pub fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
        self.apply_volume();
    }

    pub fn toggle_mute(&mut self) -> bool {
        self.set_muted(!self.muted);
        self.muted
    }

    /// Volume actually applied to the sink.
    pub fn effective_volume(&self) -> f32 {
        if self.muted {
            0.0
        } else {
            self.volume
        }
    }

    fn apply_volume(&self) {
        if let Some(sink) = &self.sink {
            sink.set_volume(self.effective_volume());
        }
    }
}

/// Seek target limited to the track length. Unknown lengths are not limited.
pub fn clamp_seek(target: Duration, duration: Option<Duration>) -> Duration {
    match duration {
        Some(duration) => target.min(duration),
        None => target,
    }
}

impl Default for PlaybackEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalSource for PlaybackEngine {
    fn connect_tap(&mut self, settings: &TapSettings) -> Result<Box<dyn SignalTap>> {
        if self.tap_link.is_enabled() {
            bail!("An analysis tap is already connected");
        }
        let feed = self.tap_link.open_feed();
        info!(
            "Analysis tap connected (transform size {}, smoothing {:.2})",
            settings.transform_size, settings.smoothing
        );
        Ok(Box::new(SpectrumTap::with_feed(feed, settings)))
    }

    fn tap_count(&self) -> usize {
        usize::from(self.tap_link.is_enabled())
    }

    fn is_suspended(&self) -> bool {
        self.output.is_none()
    }

    fn resume(&mut self) -> Result<()> {
        if self.output.is_some() {
            return Ok(());
        }
        let output = OutputStream::try_default().context("Failed to open audio output device")?;
        info!("Audio output resumed");
        self.output = Some(output);
        Ok(())
    }
}
