// SPDX-License-Identifier: GPL-3.0-only

use crate::buffer::BufferView;
use crate::devices::DeviceIdentity;
use crate::native::{CaptureBoundary, SampleHandle};
use std::sync::Arc;

/// Interleaved audio samples from one capture callback
pub struct AudioBuffer<'a> {
    samples: BufferView<'a, f32>,
    sample_rate: u32,
    channel_count: u32,
    timestamp: i64,
    device: Option<Arc<DeviceIdentity>>,
}

impl AudioBuffer<'static> {
    /// Build a buffer that owns a copy of `samples`
    pub fn new(samples: &[f32], sample_rate: u32, channel_count: u32, timestamp: i64) -> Self {
        AudioBuffer {
            samples: BufferView::from(samples),
            sample_rate,
            channel_count,
            timestamp,
            device: None,
        }
    }
}

impl<'a> AudioBuffer<'a> {
    /// Wrap the native sample behind `sample` without copying
    ///
    /// # Safety
    ///
    /// `sample` must be the handle delivered to the currently running sample
    /// callback, and the returned buffer must not outlive that callback.
    pub(crate) unsafe fn from_native(
        boundary: &dyn CaptureBoundary,
        sample: SampleHandle,
        device: Option<Arc<DeviceIdentity>>,
    ) -> AudioBuffer<'a> {
        let raw = boundary.audio_buffer(sample);
        AudioBuffer {
            // SAFETY: the sample stays valid for the callback, per the caller
            samples: unsafe { BufferView::from_raw_parts(raw.data, raw.sample_count) },
            sample_rate: raw.sample_rate,
            channel_count: raw.channel_count,
            timestamp: raw.timestamp,
            device,
        }
    }

    /// Interleaved samples; empty once released
    pub fn samples(&self) -> &[f32] {
        self.samples.as_slice()
    }

    pub fn sample_view(&self) -> &BufferView<'a, f32> {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channel_count(&self) -> u32 {
        self.channel_count
    }

    /// Media-clock timestamp in nanoseconds
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    /// Number of frames (samples per channel)
    pub fn frame_count(&self) -> usize {
        match self.channel_count {
            0 => 0,
            n => self.samples.len() / n as usize,
        }
    }

    /// The device that produced this buffer
    pub fn device(&self) -> Option<&Arc<DeviceIdentity>> {
        self.device.as_ref()
    }

    /// Whether the sample memory has been released
    pub fn is_released(&self) -> bool {
        self.samples.is_released()
    }

    /// Deep copy that can be kept after the callback returns
    pub fn to_copied(&self) -> AudioBuffer<'static> {
        AudioBuffer {
            samples: self.samples.to_owned_view(),
            sample_rate: self.sample_rate,
            channel_count: self.channel_count,
            timestamp: self.timestamp,
            device: self.device.clone(),
        }
    }
}

/// Cloning keeps the metadata and releases the samples.
///
/// Use [`AudioBuffer::to_copied`] to keep the samples.
impl Clone for AudioBuffer<'_> {
    fn clone(&self) -> Self {
        Self {
            samples: BufferView::released(),
            sample_rate: self.sample_rate,
            channel_count: self.channel_count,
            timestamp: self.timestamp,
            device: self.device.clone(),
        }
    }
}

impl std::fmt::Debug for AudioBuffer<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioBuffer")
            .field("samples", &self.samples)
            .field("sample_rate", &self.sample_rate)
            .field("channel_count", &self.channel_count)
            .field("timestamp", &self.timestamp)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clone_releases_samples_keeps_metadata() {
        let buffer = AudioBuffer::new(&[0.1, 0.2, 0.3, 0.4], 48_000, 2, 1_000);
        let clone = buffer.clone();

        assert!(clone.is_released());
        assert!(clone.samples().is_empty());
        assert_eq!(clone.sample_rate(), 48_000);
        assert_eq!(clone.channel_count(), 2);
        assert_eq!(clone.timestamp(), 1_000);
        // Original still readable
        assert_eq!(buffer.samples().len(), 4);
    }

    #[test]
    fn test_to_copied_keeps_samples() {
        let native = vec![0.25f32; 8];
        let borrowed = AudioBuffer {
            samples: unsafe { BufferView::from_raw_parts(native.as_ptr(), native.len()) },
            sample_rate: 16_000,
            channel_count: 1,
            timestamp: 5,
            device: None,
        };
        let copy = borrowed.to_copied();
        drop(borrowed);
        drop(native);
        assert_eq!(copy.samples(), &[0.25; 8]);
        assert_eq!(copy.frame_count(), 8);
    }

    #[test]
    fn test_frame_count_with_zero_channels() {
        let buffer = AudioBuffer::new(&[1.0, 2.0], 44_100, 0, 0);
        assert_eq!(buffer.frame_count(), 0);
    }
}
