use rustfft::{num_complex::Complex, FftPlanner};
use std::sync::Arc;

/// Lower bound of the decibel range mapped onto byte magnitudes.
pub const MIN_DECIBELS: f32 = -100.0;
/// Upper bound of the decibel range mapped onto byte magnitudes.
pub const MAX_DECIBELS: f32 = -30.0;

/// Turns a window of mono samples into byte-valued spectrum and waveform
/// snapshots, with the same conventions as a browser `AnalyserNode`:
/// Blackman window, per-bin temporal smoothing, and a fixed decibel range
/// mapped onto `0..=255`.
pub struct SpectrumReader {
    transform_size: usize,
    fft: Arc<dyn rustfft::Fft<f32>>,
    window: Vec<f32>,
    smoothing: f32,

    // Reused between reads
    buffer: Vec<Complex<f32>>,
    smoothed: Vec<f32>,
}

impl SpectrumReader {
    pub fn new(transform_size: usize, smoothing: f32) -> Self {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(transform_size);

        Self {
            transform_size,
            fft,
            window: Self::blackman_window(transform_size),
            smoothing: smoothing.clamp(0.0, 1.0),
            buffer: vec![Complex::new(0.0, 0.0); transform_size],
            smoothed: vec![0.0; transform_size / 2],
        }
    }

    fn blackman_window(size: usize) -> Vec<f32> {
        let alpha = 0.16f32;
        let a0 = 0.5 * (1.0 - alpha);
        let a1 = 0.5;
        let a2 = 0.5 * alpha;

        (0..size)
            .map(|i| {
                let phase = 2.0 * std::f32::consts::PI * i as f32 / size as f32;
                a0 - a1 * phase.cos() + a2 * (2.0 * phase).cos()
            })
            .collect()
    }

    pub fn transform_size(&self) -> usize {
        self.transform_size
    }

    pub fn bin_count(&self) -> usize {
        self.transform_size / 2
    }

    /// Compute the byte spectrum of `samples` (most recent last) into `out`.
    ///
    /// Fewer samples than the transform size are zero padded at the front;
    /// extra samples beyond the transform size are ignored from the old end.
    pub fn frequency_bytes(&mut self, samples: &[f32], out: &mut [u8]) {
        self.load_window(samples);
        self.fft.process(&mut self.buffer);

        let scale = 1.0 / self.transform_size as f32;
        let range_scale = 255.0 / (MAX_DECIBELS - MIN_DECIBELS);

        for (k, smoothed) in self.smoothed.iter_mut().enumerate() {
            let magnitude = self.buffer[k].norm() * scale;
            *smoothed = self.smoothing * *smoothed + (1.0 - self.smoothing) * magnitude;
        }

        for (byte, &magnitude) in out.iter_mut().zip(self.smoothed.iter()) {
            *byte = if magnitude <= 0.0 {
                0
            } else {
                let db = 20.0 * magnitude.log10();
                (range_scale * (db - MIN_DECIBELS)).clamp(0.0, 255.0) as u8
            };
        }
    }

    /// Copy the start of the current window into `out` as unsigned bytes
    /// centred on 128.
    pub fn waveform_bytes(&self, samples: &[f32], out: &mut [u8]) {
        let start = samples.len().saturating_sub(self.transform_size);
        let recent = &samples[start..];
        let padding = self.transform_size - recent.len();

        for (i, byte) in out.iter_mut().enumerate() {
            let sample = if i < padding { 0.0 } else { recent[i - padding] };
            *byte = (128.0 * (sample + 1.0)).clamp(0.0, 255.0) as u8;
        }
    }

    /// Forget the smoothing state, e.g. after a track change.
    pub fn reset(&mut self) {
        self.smoothed.iter_mut().for_each(|s| *s = 0.0);
    }

    fn load_window(&mut self, samples: &[f32]) {
        let start = samples.len().saturating_sub(self.transform_size);
        let recent = &samples[start..];
        let padding = self.transform_size - recent.len();

        for (i, slot) in self.buffer.iter_mut().enumerate() {
            let sample = if i < padding { 0.0 } else { recent[i - padding] };
            *slot = Complex::new(sample * self.window[i], 0.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(frequency_bin: f32, size: usize, amplitude: f32) -> Vec<f32> {
        (0..size)
            .map(|i| {
                amplitude
                    * (2.0 * std::f32::consts::PI * frequency_bin * i as f32 / size as f32).sin()
            })
            .collect()
    }

    #[test]
    fn silence_maps_to_zero_bytes() {
        let mut reader = SpectrumReader::new(256, 0.0);
        let mut out = vec![0xAAu8; reader.bin_count()];
        reader.frequency_bytes(&vec![0.0; 256], &mut out);
        assert!(out.iter().all(|&b| b == 0));
    }

    #[test]
    fn tone_peaks_at_its_bin() {
        let size = 512;
        let mut reader = SpectrumReader::new(size, 0.0);
        let mut out = vec![0u8; reader.bin_count()];
        // Quiet enough that the peak stays inside the decibel range
        reader.frequency_bytes(&sine(20.0, size, 0.01), &mut out);

        let peak = out
            .iter()
            .enumerate()
            .max_by_key(|(_, &b)| b)
            .map(|(i, _)| i)
            .unwrap();
        assert_eq!(peak, 20);
        assert!(out[peak] > 100 && out[peak] < 255);
        assert!(out[200] < out[peak] / 2);
    }

    #[test]
    fn smoothing_holds_previous_energy() {
        let size = 256;
        let tone = sine(10.0, size, 0.8);

        let mut sharp = SpectrumReader::new(size, 0.0);
        let mut smooth = SpectrumReader::new(size, 0.8);
        let mut out_sharp = vec![0u8; size / 2];
        let mut out_smooth = vec![0u8; size / 2];

        sharp.frequency_bytes(&tone, &mut out_sharp);
        smooth.frequency_bytes(&tone, &mut out_smooth);
        sharp.frequency_bytes(&vec![0.0; size], &mut out_sharp);
        smooth.frequency_bytes(&vec![0.0; size], &mut out_smooth);

        assert_eq!(out_sharp[10], 0);
        assert!(out_smooth[10] > 0);

        smooth.reset();
        smooth.frequency_bytes(&vec![0.0; size], &mut out_smooth);
        assert_eq!(out_smooth[10], 0);
    }

    #[test]
    fn waveform_bytes_centre_on_128() {
        let reader = SpectrumReader::new(8, 0.8);
        let mut out = [0u8; 4];
        reader.waveform_bytes(&[0.0, 1.0, -1.0, 0.5, 0.0, 0.0, 0.0, 0.0], &mut out);
        assert_eq!(out, [128, 255, 0, 192]);

        // Short input is padded with silence at the front
        reader.waveform_bytes(&[1.0], &mut out);
        assert_eq!(out, [128, 128, 128, 128]);
    }
}
