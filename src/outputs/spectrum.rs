// SPDX-License-Identifier: GPL-3.0-only

use super::AudioOutput;
use crate::constants::DEFAULT_SPECTRUM_SIZE;
use crate::media::AudioBuffer;
use crate::sync::lock;
use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::sync::{Arc, Mutex};
use tracing::trace;

struct SpectrumState {
    fft: Arc<dyn Fft<f32>>,
    buffer: Vec<Complex<f32>>,
    reals: Vec<f32>,
    imaginaries: Vec<f32>,
    magnitudes: Vec<f32>,
    disposed: bool,
}

/// Magnitude spectrum of one channel of the latest audio buffer
///
/// Each update de-interleaves the selected channel, zero-pads or truncates it
/// to `sample_count` samples and keeps the first `sample_count / 2` bins.
pub struct AudioSpectrumOutput {
    sample_count: usize,
    channel: usize,
    state: Mutex<SpectrumState>,
}

impl AudioSpectrumOutput {
    pub fn new(sample_count: usize, channel: usize) -> Self {
        let sample_count = sample_count.max(2);
        let bins = sample_count / 2;
        Self {
            sample_count,
            channel,
            state: Mutex::new(SpectrumState {
                fft: FftPlanner::new().plan_fft_forward(sample_count),
                buffer: vec![Complex::default(); sample_count],
                reals: vec![0.0; bins],
                imaginaries: vec![0.0; bins],
                magnitudes: vec![0.0; bins],
                disposed: false,
            }),
        }
    }

    pub fn sample_count(&self) -> usize {
        self.sample_count
    }

    pub fn channel(&self) -> usize {
        self.channel
    }

    /// Copy of the magnitude spectrum
    pub fn spectrum(&self) -> Vec<f32> {
        lock(&self.state).magnitudes.clone()
    }

    pub fn reals(&self) -> Vec<f32> {
        lock(&self.state).reals.clone()
    }

    pub fn imaginaries(&self) -> Vec<f32> {
        lock(&self.state).imaginaries.clone()
    }

    /// Read the magnitudes in place without copying
    pub fn with_spectrum<R>(&self, f: impl FnOnce(&[f32]) -> R) -> R {
        f(&lock(&self.state).magnitudes)
    }
}

impl Default for AudioSpectrumOutput {
    fn default() -> Self {
        Self::new(DEFAULT_SPECTRUM_SIZE, 0)
    }
}

impl AudioOutput for AudioSpectrumOutput {
    fn update(&self, buffer: &AudioBuffer<'_>) {
        let channels = buffer.channel_count().max(1) as usize;
        if self.channel >= channels {
            trace!(channel = self.channel, channels, "Channel not present in buffer");
            return;
        }

        let mut state = lock(&self.state);
        if state.disposed {
            return;
        }
        let SpectrumState {
            fft,
            buffer: work,
            reals,
            imaginaries,
            magnitudes,
            ..
        } = &mut *state;

        let samples = buffer.samples().iter().skip(self.channel).step_by(channels);
        work.fill(Complex::default());
        for (slot, &sample) in work.iter_mut().zip(samples) {
            slot.re = sample;
        }
        fft.process(work);

        for (i, bin) in work.iter().take(magnitudes.len()).enumerate() {
            reals[i] = bin.re;
            imaginaries[i] = bin.im;
            magnitudes[i] = bin.norm();
        }
    }

    fn dispose(&self) {
        let mut state = lock(&self.state);
        state.disposed = true;
        state.magnitudes.fill(0.0);
        state.reals.fill(0.0);
        state.imaginaries.fill(0.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pure_tone_peaks_at_its_bin() {
        let n = 64;
        let bin = 5;
        // Stereo: the tone is on the right channel only
        let samples: Vec<f32> = (0..n)
            .flat_map(|i| {
                let phase = 2.0 * std::f32::consts::PI * bin as f32 * i as f32 / n as f32;
                [0.0, phase.sin()]
            })
            .collect();
        let output = AudioSpectrumOutput::new(n, 1);
        output.update(&AudioBuffer::new(&samples, 48_000, 2, 0));

        let spectrum = output.spectrum();
        assert_eq!(spectrum.len(), n / 2);
        let peak = spectrum
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap();
        assert_eq!(peak, bin);
        assert!((spectrum[bin] - n as f32 / 2.0).abs() < 0.05);
    }

    #[test]
    fn test_short_buffer_is_zero_padded() {
        let output = AudioSpectrumOutput::new(16, 0);
        output.update(&AudioBuffer::new(&[1.0], 8_000, 1, 0));
        // An impulse has a flat spectrum
        output.with_spectrum(|s| assert!(s.iter().all(|m| (m - 1.0).abs() < 1e-5)));
        assert_eq!(output.reals().len(), 8);
        assert!(output.imaginaries().iter().all(|v| v.abs() < 1e-5));
    }

    #[test]
    fn test_missing_channel_is_ignored() {
        let output = AudioSpectrumOutput::new(16, 1);
        output.update(&AudioBuffer::new(&[1.0; 8], 8_000, 1, 0));
        assert!(output.spectrum().iter().all(|&m| m == 0.0));
        assert_eq!(AudioSpectrumOutput::default().sample_count(), DEFAULT_SPECTRUM_SIZE);
    }
}
