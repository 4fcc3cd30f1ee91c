use anyhow::Result;
use crossbeam_channel::{Receiver, Sender, TrySendError};
use log::{debug, warn};
use rodio::source::SeekError;
use rodio::Source;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::rolling::RollingWindow;
use super::spectrum::SpectrumReader;

/// Mono frames per chunk sent from the audio thread.
pub const TAP_CHUNK_FRAMES: usize = 512;

/// Chunks buffered between the audio thread and the tick loop.
const TAP_CHANNEL_CAPACITY: usize = 64;

/// How the analyzer wants its tap configured.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TapSettings {
    pub transform_size: usize,
    pub smoothing: f32,
}

/// Read side of an analysis tap: byte snapshots of the live signal.
pub trait SignalTap {
    /// Number of spectrum bins (half the transform size).
    fn bin_count(&self) -> usize;

    /// Fill `out` with the current byte spectrum.
    fn read_frequency(&mut self, out: &mut [u8]);

    /// Fill `out` with the current byte waveform.
    fn read_waveform(&mut self, out: &mut [u8]);

    /// Stop receiving signal. Must be safe to call more than once.
    fn release(&mut self) {}
}

/// Anything that can feed a live audio signal to the analyzer without
/// altering what reaches the output.
pub trait SignalSource {
    /// Connect the analysis tap. Sources may refuse a second live tap.
    fn connect_tap(&mut self, settings: &TapSettings) -> Result<Box<dyn SignalTap>>;

    /// Number of taps currently connected.
    fn tap_count(&self) -> usize;

    /// Whether the output must be resumed before signal flows.
    fn is_suspended(&self) -> bool {
        false
    }

    fn resume(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Shared tap wiring held by the owner of the audio pipeline.
#[derive(Clone)]
pub struct TapLink {
    sender: Sender<Vec<f32>>,
    receiver: Receiver<Vec<f32>>,
    enabled: Arc<AtomicBool>,
    dropped_chunks: Arc<AtomicU64>,
    frames_played: Arc<AtomicU64>,
}

impl TapLink {
    pub fn new() -> Self {
        let (sender, receiver) = crossbeam_channel::bounded(TAP_CHANNEL_CAPACITY);
        Self {
            sender,
            receiver,
            enabled: Arc::new(AtomicBool::new(false)),
            dropped_chunks: Arc::new(AtomicU64::new(0)),
            frames_played: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Enable forwarding and hand out the receiving side.
    pub fn open_feed(&self) -> TapFeed {
        self.enabled.store(true, Ordering::Release);
        TapFeed {
            receiver: self.receiver.clone(),
            enabled: Arc::clone(&self.enabled),
        }
    }

    /// Wrap a playback source so every sample also reaches the tap. Restarts
    /// the played-frame count.
    pub fn wrap<S>(&self, source: S) -> TappedSource<S>
    where
        S: Source<Item = f32>,
    {
        self.frames_played.store(0, Ordering::Relaxed);
        TappedSource::new(source, self.clone())
    }

    pub fn dropped_chunks(&self) -> u64 {
        self.dropped_chunks.load(Ordering::Relaxed)
    }

    /// Frames pulled through the most recently wrapped source, tap or no tap.
    pub fn frames_played(&self) -> u64 {
        self.frames_played.load(Ordering::Relaxed)
    }

    fn forward(&self, chunk: Vec<f32>) {
        match self.sender.try_send(chunk) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                let dropped = self.dropped_chunks.fetch_add(1, Ordering::Relaxed) + 1;
                if dropped % 256 == 1 {
                    warn!("Analysis tap is lagging, {} chunks dropped so far", dropped);
                }
            }
            Err(TrySendError::Disconnected(_)) => {}
        }
    }
}

impl Default for TapLink {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiving end of a tap. Dropping or releasing it stops the forwarding.
pub struct TapFeed {
    receiver: Receiver<Vec<f32>>,
    enabled: Arc<AtomicBool>,
}

impl TapFeed {
    fn drain_into(&self, window: &mut RollingWindow<f32>) -> usize {
        let mut received = 0;
        while let Ok(chunk) = self.receiver.try_recv() {
            received += chunk.len();
            for sample in chunk {
                window.push(sample);
            }
        }
        received
    }

    fn close(&self) {
        self.enabled.store(false, Ordering::Release);
        // Discard whatever was in flight
        while self.receiver.try_recv().is_ok() {}
    }
}

/// Passthrough source: yields the inner samples untouched and copies a mono
/// mixdown into the tap while it is enabled.
pub struct TappedSource<S> {
    inner: S,
    link: TapLink,
    channels: u16,
    frame_sum: f32,
    frame_position: u16,
    capturing: bool,
    chunk: Vec<f32>,
}

impl<S> TappedSource<S>
where
    S: Source<Item = f32>,
{
    pub fn new(source: S, link: TapLink) -> Self {
        let channels = source.channels().max(1);
        Self {
            inner: source,
            link,
            channels,
            frame_sum: 0.0,
            frame_position: 0,
            capturing: false,
            chunk: Vec::with_capacity(TAP_CHUNK_FRAMES),
        }
    }

    /// Frame position advances on every sample so the mixdown stays aligned
    /// across enable and disable. Whether a frame is captured is decided on
    /// its first sample.
    fn capture(&mut self, sample: f32) {
        if self.frame_position == 0 {
            self.capturing = self.link.is_enabled();
            self.frame_sum = 0.0;
            if !self.capturing {
                self.chunk.clear();
            }
        }

        self.frame_position += 1;
        if self.capturing {
            self.frame_sum += sample;
        }
        if self.frame_position < self.channels {
            return;
        }
        self.frame_position = 0;
        self.link.frames_played.fetch_add(1, Ordering::Relaxed);

        if self.capturing {
            self.chunk.push(self.frame_sum / self.channels as f32);
            if self.chunk.len() >= TAP_CHUNK_FRAMES {
                self.flush();
            }
        }
    }

    fn flush(&mut self) {
        if self.chunk.is_empty() {
            return;
        }
        let chunk = std::mem::replace(&mut self.chunk, Vec::with_capacity(TAP_CHUNK_FRAMES));
        self.link.forward(chunk);
    }
}

impl<S> Iterator for TappedSource<S>
where
    S: Source<Item = f32>,
{
    type Item = f32;

    fn next(&mut self) -> Option<Self::Item> {
        match self.inner.next() {
            Some(sample) => {
                self.capture(sample);
                Some(sample)
            }
            None => {
                if self.link.is_enabled() {
                    self.flush();
                }
                None
            }
        }
    }
}

impl<S> Source for TappedSource<S>
where
    S: Source<Item = f32>,
{
    fn current_frame_len(&self) -> Option<usize> {
        self.inner.current_frame_len()
    }

    fn channels(&self) -> u16 {
        self.inner.channels()
    }

    fn sample_rate(&self) -> u32 {
        self.inner.sample_rate()
    }

    fn total_duration(&self) -> Option<Duration> {
        self.inner.total_duration()
    }

    fn try_seek(&mut self, pos: Duration) -> Result<(), SeekError> {
        self.inner.try_seek(pos)?;
        self.frame_sum = 0.0;
        self.frame_position = 0;
        let frame = pos.as_secs_f64() * self.inner.sample_rate() as f64;
        self.link.frames_played.store(frame as u64, Ordering::Relaxed);
        Ok(())
    }
}

/// `SignalTap` over a rolling window of mono samples.
///
/// Either drains a [`TapFeed`] from a live source on every read, or is fed
/// directly through [`SpectrumTap::push_samples`] for offline analysis.
pub struct SpectrumTap {
    feed: Option<TapFeed>,
    samples: RollingWindow<f32>,
    scratch: Vec<f32>,
    reader: SpectrumReader,
    released: bool,
}

impl SpectrumTap {
    pub fn new(settings: &TapSettings) -> Self {
        Self {
            feed: None,
            samples: RollingWindow::new(settings.transform_size),
            scratch: Vec::with_capacity(settings.transform_size),
            reader: SpectrumReader::new(settings.transform_size, settings.smoothing),
            released: false,
        }
    }

    pub fn with_feed(feed: TapFeed, settings: &TapSettings) -> Self {
        let mut tap = Self::new(settings);
        tap.feed = Some(feed);
        tap
    }

    pub fn push_samples(&mut self, samples: &[f32]) {
        for &sample in samples {
            self.samples.push(sample);
        }
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    fn refresh(&mut self) {
        if let Some(feed) = &self.feed {
            let received = feed.drain_into(&mut self.samples);
            if received > 0 {
                debug!("Tap received {} samples", received);
            }
        }
        self.scratch.clear();
        self.scratch.extend(self.samples.iter().copied());
    }
}

impl SignalTap for SpectrumTap {
    fn bin_count(&self) -> usize {
        self.reader.bin_count()
    }

    fn read_frequency(&mut self, out: &mut [u8]) {
        self.refresh();
        self.reader.frequency_bytes(&self.scratch, out);
    }

    fn read_waveform(&mut self, out: &mut [u8]) {
        // Waveform follows the frequency read of the same tick; no refresh
        // so both snapshots describe the same window.
        if self.scratch.is_empty() {
            self.refresh();
        }
        self.reader.waveform_bytes(&self.scratch, out);
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if let Some(feed) = self.feed.take() {
            feed.close();
        }
        self.samples.clear();
        self.scratch.clear();
        self.reader.reset();
    }
}

impl Drop for SpectrumTap {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rodio::buffer::SamplesBuffer;

    fn settings(transform_size: usize) -> TapSettings {
        TapSettings {
            transform_size,
            smoothing: 0.0,
        }
    }

    #[test]
    fn passthrough_without_tap() {
        let input: Vec<f32> = (0..100).map(|i| i as f32 / 100.0).collect();
        let link = TapLink::new();
        let source = link.wrap(SamplesBuffer::new(1, 44100, input.clone()));

        let output: Vec<f32> = source.collect();
        assert_eq!(output, input);
        assert!(link.receiver.try_recv().is_err(), "nothing forwarded while disabled");
    }

    #[test]
    fn passthrough_stereo_with_tap_enabled() {
        let input: Vec<f32> = (0..(TAP_CHUNK_FRAMES * 4))
            .map(|i| (i as f32 - 500.0) / 1000.0)
            .collect();
        let link = TapLink::new();
        let feed = link.open_feed();
        let source = link.wrap(SamplesBuffer::new(2, 44100, input.clone()));

        let output: Vec<f32> = source.collect();
        assert_eq!(output, input);

        let mut window = RollingWindow::new(TAP_CHUNK_FRAMES * 4);
        let received = feed.drain_into(&mut window);
        assert_eq!(received, TAP_CHUNK_FRAMES * 2);

        // Mono mixdown of the first stereo frame
        let first = *window.front().unwrap();
        assert!((first - (input[0] + input[1]) / 2.0).abs() < 1e-6);
    }

    #[test]
    fn stereo_mixdown_stays_aligned_across_reenable() {
        let input: Vec<f32> = [1.0f32, -1.0].repeat(TAP_CHUNK_FRAMES);
        let link = TapLink::new();
        let feed = link.open_feed();
        let mut source = link.wrap(SamplesBuffer::new(2, 44100, input));

        assert_eq!(source.next(), Some(1.0));
        link.enabled.store(false, Ordering::Release);
        assert_eq!(source.next(), Some(-1.0));
        link.enabled.store(true, Ordering::Release);
        let _: Vec<f32> = source.by_ref().collect();

        let mut window = RollingWindow::new(TAP_CHUNK_FRAMES * 2);
        let received = feed.drain_into(&mut window);
        assert!(received > 0);
        assert_eq!(*window.front().unwrap(), 0.0);
        assert!(window.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn frames_started_while_disabled_are_skipped() {
        let link = TapLink::new();
        let feed = link.open_feed();
        link.enabled.store(false, Ordering::Release);
        let mut source = link.wrap(SamplesBuffer::new(2, 44100, vec![0.5f32, 0.5, 0.25, 0.25]));

        assert_eq!(source.next(), Some(0.5));
        link.enabled.store(true, Ordering::Release);
        let rest: Vec<f32> = source.by_ref().collect();
        assert_eq!(rest, vec![0.5, 0.25, 0.25]);

        let mut window = RollingWindow::new(8);
        assert_eq!(feed.drain_into(&mut window), 1);
        assert_eq!(*window.front().unwrap(), 0.25);
    }

    #[test]
    fn seeking_is_forwarded_to_the_inner_source() {
        let input: Vec<f32> = (0..200).map(|i| i as f32).collect();
        let link = TapLink::new();
        let mut source = link.wrap(SamplesBuffer::new(1, 100, input));

        assert_eq!(source.next(), Some(0.0));
        assert!(source.try_seek(Duration::from_millis(500)).is_ok());
        assert_eq!(link.frames_played(), 50);
        assert_eq!(source.next(), Some(50.0));
        assert_eq!(link.frames_played(), 51);
    }

    #[test]
    fn frames_are_counted_with_the_tap_disabled() {
        let link = TapLink::new();
        let source = link.wrap(SamplesBuffer::new(2, 44100, vec![0.0f32; 300]));
        assert_eq!(source.count(), 300);
        assert_eq!(link.frames_played(), 150);

        let _ = link.wrap(SamplesBuffer::new(1, 44100, vec![0.0f32; 10]));
        assert_eq!(link.frames_played(), 0);
    }

    #[test]
    fn source_metadata_is_forwarded() {
        let link = TapLink::new();
        let source = link.wrap(SamplesBuffer::new(2, 48000, vec![0.0f32; 96_000]));
        assert_eq!(source.channels(), 2);
        assert_eq!(source.sample_rate(), 48000);
        assert_eq!(source.total_duration(), Some(Duration::from_secs(1)));
    }

    #[test]
    fn lagging_consumer_drops_chunks_instead_of_blocking() {
        let link = TapLink::new();
        let _feed = link.open_feed();
        let frames = TAP_CHUNK_FRAMES * (TAP_CHANNEL_CAPACITY + 10);
        let source = link.wrap(SamplesBuffer::new(1, 44100, vec![0.1f32; frames]));

        let count = source.count();
        assert_eq!(count, frames);
        assert_eq!(link.dropped_chunks(), 10);
    }

    #[test]
    fn spectrum_tap_reads_live_feed() {
        let link = TapLink::new();
        let mut tap = SpectrumTap::with_feed(link.open_feed(), &settings(256));
        assert_eq!(tap.bin_count(), 128);

        let tone: Vec<f32> = (0..(TAP_CHUNK_FRAMES * 2))
            .map(|i| (2.0 * std::f32::consts::PI * 16.0 * i as f32 / 256.0).sin() * 0.01)
            .collect();
        let _: Vec<f32> = link.wrap(SamplesBuffer::new(1, 44100, tone)).collect();

        let mut spectrum = vec![0u8; 128];
        let mut waveform = vec![0u8; 128];
        tap.read_frequency(&mut spectrum);
        tap.read_waveform(&mut waveform);

        assert!(spectrum[16] > spectrum[100]);
        assert!(waveform.iter().any(|&b| b != 128));
    }

    #[test]
    fn release_is_idempotent_and_disables_forwarding() {
        let link = TapLink::new();
        let mut tap = SpectrumTap::with_feed(link.open_feed(), &settings(64));
        assert!(link.is_enabled());

        tap.release();
        tap.release();
        assert!(tap.is_released());
        assert!(!link.is_enabled());

        drop(tap);
        assert!(!link.is_enabled());
    }

    #[test]
    fn pushed_samples_feed_offline_tap() {
        let mut tap = SpectrumTap::new(&settings(64));
        let mut spectrum = vec![0u8; 32];

        tap.read_frequency(&mut spectrum);
        assert!(spectrum.iter().all(|&b| b == 0));

        tap.push_samples(&vec![0.5f32; 64]);
        tap.read_frequency(&mut spectrum);
        assert!(spectrum[0] > 0);
    }
}
