// SPDX-License-Identifier: GPL-3.0-only

use super::CameraOutput;
use crate::conversion::{stage_image, ConversionOptions, GpuConverter, Orientation, PlaneLayout};
use crate::errors::Result;
use crate::gpu::{wgpu, GpuContext};
use crate::media::CameraImage;
use crate::sync::lock;
use std::sync::Mutex;
use tracing::{debug, trace};

type FrameObserver = Box<dyn Fn(i64) + Send + Sync>;

/// Latest staged frame waiting for upload
///
/// Capture threads stage into the mailbox; the render thread takes from it.
/// Staging overwrites whatever frame was still waiting.
#[derive(Debug, Default)]
pub struct FrameMailbox {
    layout: Option<PlaneLayout>,
    bytes: Vec<u8>,
    options: ConversionOptions,
    timestamp: Option<i64>,
}

impl FrameMailbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy `image` into the mailbox
    pub fn stage(&mut self, image: &CameraImage<'_>, options: ConversionOptions) -> Result<()> {
        let layout = stage_image(image, &mut self.bytes);
        // A failed stage leaves nothing usable behind
        self.layout = layout.as_ref().ok().copied();
        self.timestamp = self.layout.map(|_| image.timestamp());
        self.options = options;
        layout.map(|_| ())
    }

    /// Timestamp of the staged frame
    pub fn timestamp(&self) -> Option<i64> {
        self.timestamp
    }

    pub fn layout(&self) -> Option<&PlaneLayout> {
        self.layout.as_ref()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn options(&self) -> ConversionOptions {
        self.options
    }

    pub fn clear(&mut self) {
        self.layout = None;
        self.timestamp = None;
        self.bytes = Vec::new();
    }
}

struct TextureState {
    mailbox: FrameMailbox,
    converter: Option<GpuConverter>,
    last_delivered: Option<i64>,
    orientation: Orientation,
    disposed: bool,
}

/// Keeps the latest camera frame as a GPU texture
///
/// [`CameraOutput::update`] only stages the frame. [`TextureOutput::poll`]
/// runs on the render thread, uploads and converts a frame whose timestamp
/// has not been delivered yet, and notifies `on_frame` observers once per
/// distinct timestamp.
pub struct TextureOutput {
    state: Mutex<TextureState>,
    observers: Mutex<Vec<FrameObserver>>,
}

impl TextureOutput {
    pub fn new(context: &GpuContext) -> Self {
        Self {
            state: Mutex::new(TextureState {
                mailbox: FrameMailbox::new(),
                converter: Some(GpuConverter::new(context)),
                last_delivered: None,
                orientation: Orientation::default(),
                disposed: false,
            }),
            observers: Mutex::new(Vec::new()),
        }
    }

    pub fn set_orientation(&self, orientation: Orientation) {
        lock(&self.state).orientation = orientation;
    }

    /// Call `observer` with the timestamp of each newly delivered frame
    pub fn on_frame(&self, observer: impl Fn(i64) + Send + Sync + 'static) {
        lock(&self.observers).push(Box::new(observer));
    }

    /// Convert the staged frame if it is new
    ///
    /// Returns `Ok(false)` when nothing new arrived since the last poll.
    pub fn poll(&self) -> Result<bool> {
        let timestamp = {
            let mut guard = lock(&self.state);
            let state = &mut *guard;
            let (Some(layout), Some(timestamp), Some(converter)) = (
                state.mailbox.layout(),
                state.mailbox.timestamp(),
                state.converter.as_mut(),
            ) else {
                return Ok(false);
            };
            if state.last_delivered == Some(timestamp) {
                return Ok(false);
            }
            // Recorded first so a failing frame is not retried every poll
            state.last_delivered = Some(timestamp);
            let (width, height) =
                converter.convert_staged(layout, state.mailbox.bytes(), state.mailbox.options())?;
            trace!(timestamp, width, height, "Texture updated");
            timestamp
        };

        for observer in lock(&self.observers).iter() {
            observer(timestamp);
        }
        Ok(true)
    }

    /// The current output texture
    pub fn texture(&self) -> Option<wgpu::Texture> {
        lock(&self.state)
            .converter
            .as_ref()
            .and_then(|converter| converter.output_texture().cloned())
    }

    /// Output width and height; zero before the first frame
    pub fn size(&self) -> (u32, u32) {
        lock(&self.state)
            .converter
            .as_ref()
            .map_or((0, 0), |converter| converter.output_size())
    }

    /// Read the current texture back to host memory
    pub fn read_rgba(&self) -> Result<Option<Vec<u8>>> {
        let state = lock(&self.state);
        match state.converter.as_ref() {
            Some(converter) if converter.output_texture().is_some() => converter.read_rgba().map(Some),
            _ => Ok(None),
        }
    }

    /// Timestamp of the frame in the texture
    pub fn last_timestamp(&self) -> Option<i64> {
        lock(&self.state).last_delivered
    }
}

impl CameraOutput for TextureOutput {
    fn update(&self, image: &CameraImage<'_>) {
        let mut state = lock(&self.state);
        if state.disposed {
            return;
        }
        let options = ConversionOptions::for_image(image, state.orientation);
        if let Err(e) = state.mailbox.stage(image, options) {
            debug!(error = %e, timestamp = image.timestamp(), "Dropping frame");
        }
    }

    fn dispose(&self) {
        let mut state = lock(&self.state);
        if state.disposed {
            return;
        }
        state.disposed = true;
        state.converter = None;
        state.mailbox.clear();
        lock(&self.observers).clear();
        debug!("Texture output disposed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::ImageFormat;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn rgba(data: &[u8], timestamp: i64) -> CameraImage<'_> {
        CameraImage::interleaved(ImageFormat::RGBA8888, data, 2, 2, 8, timestamp).unwrap()
    }

    #[test]
    fn test_mailbox_keeps_latest() {
        let mut mailbox = FrameMailbox::new();
        assert!(mailbox.timestamp().is_none());
        mailbox.stage(&rgba(&[1; 16], 1), ConversionOptions::default()).unwrap();
        mailbox.stage(&rgba(&[2; 16], 2), ConversionOptions::default()).unwrap();
        assert_eq!(mailbox.timestamp(), Some(2));
        assert_eq!(mailbox.bytes(), &[2; 16]);
    }

    #[test]
    fn test_mailbox_failed_stage_clears() {
        let mut mailbox = FrameMailbox::new();
        mailbox.stage(&rgba(&[1; 16], 1), ConversionOptions::default()).unwrap();
        let data = [1u8; 16];
        let released = rgba(&data, 2).clone();
        assert!(mailbox.stage(&released, ConversionOptions::default()).is_err());
        assert!(mailbox.timestamp().is_none());
        assert!(mailbox.layout().is_none());
    }

    #[test]
    fn test_poll_notifies_once_per_timestamp() {
        let context = match GpuContext::blocking("texture_output_test") {
            Ok(context) => context,
            Err(e) => {
                println!("Skipping test (no GPU): {}", e);
                return;
            }
        };
        let output = TextureOutput::new(&context);
        let frames = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&frames);
        output.on_frame(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(!output.poll().unwrap());
        output.update(&rgba(&[7; 16], 5));
        assert!(output.poll().unwrap());
        assert!(!output.poll().unwrap());
        output.update(&rgba(&[7; 16], 5));
        assert!(!output.poll().unwrap());
        output.update(&rgba(&[8; 16], 6));
        assert!(output.poll().unwrap());

        assert_eq!(frames.load(Ordering::SeqCst), 2);
        assert_eq!(output.size(), (2, 2));
        assert_eq!(output.read_rgba().unwrap(), Some(vec![8; 16]));

        output.dispose();
        output.dispose();
        assert!(output.texture().is_none());
        assert!(!output.poll().unwrap());
    }
}
