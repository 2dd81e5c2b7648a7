// SPDX-License-Identifier: GPL-3.0-only

use super::AudioOutput;
use crate::media::AudioBuffer;
use crate::sync::lock;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, warn};

/// Recorded audio, materialized from an [`AudioClipOutput`]
#[derive(Debug, Clone, PartialEq)]
pub struct AudioClip {
    pub name: String,
    /// Interleaved samples
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channel_count: u32,
}

impl AudioClip {
    pub fn frame_count(&self) -> usize {
        self.samples.len() / self.channel_count.max(1) as usize
    }

    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.frame_count() as f64 / self.sample_rate as f64)
    }
}

#[derive(Default)]
struct ClipState {
    bytes: Vec<u8>,
    sample_rate: u32,
    channel_count: u32,
    disposed: bool,
}

/// Accumulates every audio buffer it receives
///
/// The format of the first buffer is kept; later buffers with a different
/// rate or channel count are skipped.
#[derive(Default)]
pub struct AudioClipOutput {
    state: Mutex<ClipState>,
}

impl AudioClipOutput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes accumulated so far
    pub fn len_bytes(&self) -> usize {
        lock(&self.state).bytes.len()
    }

    /// Snapshot everything recorded so far
    ///
    /// `None` until a buffer with a known format has arrived.
    pub fn to_clip(&self) -> Option<AudioClip> {
        let state = lock(&self.state);
        if state.sample_rate == 0 || state.channel_count == 0 {
            return None;
        }
        Some(AudioClip {
            name: chrono::Local::now()
                .format("recording_%Y_%m_%d_%H_%M_%S_%3f")
                .to_string(),
            samples: bytemuck::pod_collect_to_vec(&state.bytes),
            sample_rate: state.sample_rate,
            channel_count: state.channel_count,
        })
    }
}

impl AudioOutput for AudioClipOutput {
    fn update(&self, buffer: &AudioBuffer<'_>) {
        let mut state = lock(&self.state);
        if state.disposed {
            return;
        }
        if state.sample_rate == 0 && state.channel_count == 0 {
            state.sample_rate = buffer.sample_rate();
            state.channel_count = buffer.channel_count();
            debug!(
                sample_rate = state.sample_rate,
                channel_count = state.channel_count,
                "Audio clip format set"
            );
        } else if state.sample_rate != buffer.sample_rate()
            || state.channel_count != buffer.channel_count()
        {
            warn!(
                expected_rate = state.sample_rate,
                expected_channels = state.channel_count,
                rate = buffer.sample_rate(),
                channels = buffer.channel_count(),
                "Skipping audio buffer with a different format"
            );
            return;
        }
        state
            .bytes
            .extend_from_slice(bytemuck::cast_slice(buffer.samples()));
    }

    fn dispose(&self) {
        let mut state = lock(&self.state);
        state.disposed = true;
        state.bytes = Vec::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accumulates_and_materializes() {
        let output = AudioClipOutput::new();
        assert!(output.to_clip().is_none());

        output.update(&AudioBuffer::new(&[0.1, 0.2, 0.3, 0.4], 48_000, 2, 0));
        output.update(&AudioBuffer::new(&[0.5, 0.6], 48_000, 2, 10));
        assert_eq!(output.len_bytes(), 6 * 4);

        let clip = output.to_clip().unwrap();
        assert_eq!(clip.samples, vec![0.1, 0.2, 0.3, 0.4, 0.5, 0.6]);
        assert_eq!(clip.frame_count(), 3);
        assert_eq!(clip.duration(), Duration::from_secs_f64(3.0 / 48_000.0));
        assert!(clip.name.starts_with("recording_"));
    }

    #[test]
    fn test_skips_format_changes() {
        let output = AudioClipOutput::new();
        output.update(&AudioBuffer::new(&[1.0; 4], 44_100, 1, 0));
        output.update(&AudioBuffer::new(&[2.0; 4], 48_000, 1, 0));
        output.update(&AudioBuffer::new(&[3.0; 4], 44_100, 2, 0));
        assert_eq!(output.to_clip().unwrap().samples, vec![1.0; 4]);
    }

    #[test]
    fn test_dispose_clears_and_ignores_updates() {
        let output = AudioClipOutput::new();
        output.update(&AudioBuffer::new(&[1.0; 8], 16_000, 1, 0));
        output.dispose();
        output.update(&AudioBuffer::new(&[1.0; 8], 16_000, 1, 0));
        assert_eq!(output.len_bytes(), 0);
        output.dispose();
    }
}
