// SPDX-License-Identifier: GPL-3.0-only

use super::CameraOutput;
use crate::conversion::{ConversionOptions, CpuConverter, Orientation};
use crate::media::{CameraImage, ImageFormat};
use crate::sync::lock;
use std::sync::Mutex;
use tracing::debug;

#[derive(Default)]
struct PixelState {
    converter: CpuConverter,
    pixels: Vec<u8>,
    // Conversion target, swapped with `pixels` once a frame converts
    scratch: Vec<u8>,
    width: u32,
    height: u32,
    timestamp: i64,
    orientation: Orientation,
    disposed: bool,
}

/// Keeps the latest camera frame as RGBA pixels in host memory
///
/// Frames convert into a second buffer that replaces the visible one only on
/// success, so a dropped frame leaves the previous one intact. Both buffers
/// are reused across frames and reallocated only when the frame size changes. Readers see a live buffer; copy it out with
/// [`PixelBufferOutput::snapshot`] to keep a frame.
#[derive(Default)]
pub struct PixelBufferOutput {
    state: Mutex<PixelState>,
}

impl PixelBufferOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_orientation(self, orientation: Orientation) -> Self {
        self.set_orientation(orientation);
        self
    }

    pub fn set_orientation(&self, orientation: Orientation) {
        lock(&self.state).orientation = orientation;
    }

    pub fn orientation(&self) -> Orientation {
        lock(&self.state).orientation
    }

    /// Read the pixels with their width and height
    pub fn with_pixel_buffer<R>(&self, f: impl FnOnce(&[u8], u32, u32) -> R) -> R {
        let state = lock(&self.state);
        f(&state.pixels, state.width, state.height)
    }

    /// Copy of the pixels with their width and height
    pub fn snapshot(&self) -> (Vec<u8>, u32, u32) {
        self.with_pixel_buffer(|pixels, width, height| (pixels.to_vec(), width, height))
    }

    pub fn width(&self) -> u32 {
        lock(&self.state).width
    }

    pub fn height(&self) -> u32 {
        lock(&self.state).height
    }

    /// Timestamp of the frame currently in the buffer
    pub fn timestamp(&self) -> i64 {
        lock(&self.state).timestamp
    }
}

impl CameraOutput for PixelBufferOutput {
    fn update(&self, image: &CameraImage<'_>) {
        let mut guard = lock(&self.state);
        let state = &mut *guard;
        if state.disposed {
            return;
        }
        if image.format() == ImageFormat::Unknown {
            debug!(timestamp = image.timestamp(), "Skipping frame with unknown format");
            return;
        }

        let len = image.width() as usize * image.height() as usize * 4;
        if state.scratch.len() != len {
            debug!(
                width = image.width(),
                height = image.height(),
                "Reallocating pixel buffer"
            );
            state.scratch = vec![0; len];
        }

        let options = ConversionOptions::for_image(image, state.orientation);
        match state.converter.convert(image, options, &mut state.scratch) {
            Ok((width, height)) => {
                std::mem::swap(&mut state.pixels, &mut state.scratch);
                state.width = width;
                state.height = height;
                state.timestamp = image.timestamp();
            }
            Err(e) => {
                debug!(error = %e, timestamp = image.timestamp(), "Dropping frame");
            }
        }
    }

    fn dispose(&self) {
        let mut state = lock(&self.state);
        state.disposed = true;
        state.pixels = Vec::new();
        state.scratch = Vec::new();
        state.width = 0;
        state.height = 0;
    }
}
