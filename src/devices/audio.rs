// SPDX-License-Identifier: GPL-3.0-only

use super::core::DeviceCore;
use super::delegate_media_device;
use super::session::SessionHandler;
use crate::errors::Result;
use crate::media::AudioBuffer;
use crate::native::{DeviceFlags, PropertyKey, PropertyValue};
use std::sync::Arc;

/// A microphone or other audio input
pub struct AudioDevice {
    pub(crate) core: Arc<DeviceCore>,
}

impl AudioDevice {
    pub(crate) fn from_core(core: Arc<DeviceCore>) -> Self {
        Self { core }
    }

    pub fn echo_cancellation_supported(&self) -> bool {
        self.core.flags().contains(DeviceFlags::ECHO_CANCELLATION)
    }

    pub fn echo_cancellation(&self) -> bool {
        self.core.property(PropertyKey::EchoCancellation).as_bool()
    }

    pub fn set_echo_cancellation(&self, enabled: bool) {
        self.core
            .set_property(PropertyKey::EchoCancellation, PropertyValue::Bool(enabled));
    }

    /// Sample rate in Hz
    pub fn sample_rate(&self) -> u32 {
        self.core.property(PropertyKey::SampleRate).as_int().max(0) as u32
    }

    pub fn set_sample_rate(&self, sample_rate: u32) {
        self.core.set_property(
            PropertyKey::SampleRate,
            PropertyValue::Int(sample_rate.min(i32::MAX as u32) as i32),
        );
    }

    pub fn channel_count(&self) -> u32 {
        self.core.property(PropertyKey::ChannelCount).as_int().max(0) as u32
    }

    pub fn set_channel_count(&self, channel_count: u32) {
        self.core.set_property(
            PropertyKey::ChannelCount,
            PropertyValue::Int(channel_count.min(i32::MAX as u32) as i32),
        );
    }

    /// Start streaming audio into `handler`
    ///
    /// The handler runs on the native capture thread and the buffer it
    /// receives is only valid for the duration of the call; use
    /// [`AudioBuffer::to_copied`] to keep samples around.
    pub fn start_running<F>(&self, handler: F) -> Result<()>
    where
        F: Fn(&AudioBuffer<'_>) + Send + Sync + 'static,
    {
        self.core.start(SessionHandler::Audio(Arc::new(handler)))
    }
}

delegate_media_device!(AudioDevice);
