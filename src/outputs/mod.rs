// SPDX-License-Identifier: GPL-3.0-only

//! Output sinks
//!
//! A sink consumes buffers from a running device. `update` may be called from
//! the capture thread while `dispose` and readers run elsewhere, so every sink
//! guards its state with one lock that `update` and `dispose` both take.
//!
//! ```ignore
//! let clip = Arc::new(AudioClipOutput::new());
//! microphone.start_running(outputs::audio_handler(Arc::clone(&clip)))?;
//! ```

mod audio_clip;
mod pixel_buffer;
mod spectrum;
mod texture;

pub use audio_clip::{AudioClip, AudioClipOutput};
pub use pixel_buffer::PixelBufferOutput;
pub use spectrum::AudioSpectrumOutput;
pub use texture::{FrameMailbox, TextureOutput};

use crate::media::{AudioBuffer, CameraImage};
use std::sync::Arc;

/// Sink for audio buffers
pub trait AudioOutput: Send + Sync {
    fn update(&self, buffer: &AudioBuffer<'_>);

    /// Release resources; later updates are ignored
    fn dispose(&self);
}

/// Sink for camera images
pub trait CameraOutput: Send + Sync {
    fn update(&self, image: &CameraImage<'_>);

    /// Release resources; later updates are ignored
    fn dispose(&self);
}

/// Adapt an audio sink into a handler for [`AudioDevice::start_running`](crate::devices::AudioDevice::start_running)
pub fn audio_handler<O>(output: Arc<O>) -> impl Fn(&AudioBuffer<'_>) + Send + Sync + 'static
where
    O: AudioOutput + ?Sized + 'static,
{
    move |buffer| output.update(buffer)
}

/// Adapt a camera sink into a handler for [`CameraDevice::start_running`](crate::devices::CameraDevice::start_running)
pub fn camera_handler<O>(output: Arc<O>) -> impl Fn(&CameraImage<'_>) + Send + Sync + 'static
where
    O: CameraOutput + ?Sized + 'static,
{
    move |image| output.update(image)
}
