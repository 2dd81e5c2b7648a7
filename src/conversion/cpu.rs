// SPDX-License-Identifier: GPL-3.0-only

//! CPU conversion path

use super::layout::{stage_image, PlaneLayout};
use super::{ConversionOptions, Mirror, Rotation};
use crate::errors::{Error, Result};
use crate::media::{CameraImage, ImageFormat};
use tracing::trace;

/// Converts camera images into caller-owned RGBA8888 buffers
///
/// Owns its staging and rotation buffers so steady-state conversion does not
/// allocate.
#[derive(Debug, Default)]
pub struct CpuConverter {
    scratch: Vec<u8>,
    converted: Vec<u8>,
}

impl CpuConverter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Convert `image` into `dst` and return the output width and height
    ///
    /// `dst` must hold exactly `width * height * 4` bytes. Rotations by 90
    /// and 270 degrees swap the output dimensions.
    pub fn convert(
        &mut self,
        image: &CameraImage<'_>,
        options: ConversionOptions,
        dst: &mut [u8],
    ) -> Result<(u32, u32)> {
        let (width, height) = (image.width(), image.height());
        let expected = width as usize * height as usize * 4;
        if dst.len() != expected {
            return Err(Error::InvalidArgument(format!(
                "destination holds {} bytes, {width}x{height} RGBA needs {expected}",
                dst.len()
            )));
        }

        let layout = stage_image(image, &mut self.scratch)?;
        let rotation = options.rotation();
        if rotation == Rotation::None {
            to_rgba(&layout, &self.scratch, options.mirror, dst);
        } else {
            self.converted.resize(expected, 0);
            to_rgba(&layout, &self.scratch, options.mirror, &mut self.converted);
            rotate_rgba(&self.converted, width, height, rotation, dst);
        }

        trace!(
            width,
            height,
            rotation = rotation.degrees(),
            mirror = ?options.mirror,
            "Converted frame on CPU"
        );
        Ok(rotation.output_size(width, height))
    }
}

/// BT.601 full-range YCbCr to opaque RGBA
#[inline]
pub fn ycbcr_to_rgba(y: u8, cb: u8, cr: u8) -> [u8; 4] {
    let y = y as f32;
    let u = cb as f32 - 128.0;
    let v = cr as f32 - 128.0;
    let channel = |value: f32| value.round().clamp(0.0, 255.0) as u8;
    [
        channel(y + 1.402 * v),
        channel(y - 0.344 * u - 0.714 * v),
        channel(y + 1.772 * u),
        255,
    ]
}

/// Write `width * height` RGBA pixels, reading each through `pixel(sx, sy)`
fn fill(dst: &mut [u8], width: u32, height: u32, mirror: Mirror, pixel: impl Fn(u32, u32) -> [u8; 4]) {
    for (y, row) in dst.chunks_exact_mut(width as usize * 4).enumerate() {
        for (x, out) in row.chunks_exact_mut(4).enumerate() {
            let (sx, sy) = mirror.source(x as u32, y as u32, width, height);
            out.copy_from_slice(&pixel(sx, sy));
        }
    }
}

/// Convert a staged image to RGBA at its source size
///
/// `data` and `layout` come from [`stage_image`], which guarantees every
/// index read here is in bounds.
pub(crate) fn to_rgba(layout: &PlaneLayout, data: &[u8], mirror: Mirror, dst: &mut [u8]) {
    let (width, height) = (layout.width, layout.height);
    match layout.format {
        ImageFormat::YCbCr420 => {
            let (cb, cr) = (layout.cb_offset() as usize, layout.cr_offset() as usize);
            fill(dst, width, height, mirror, |x, y| {
                let chroma = layout.chroma_index(x, y);
                ycbcr_to_rgba(data[layout.luma_index(x, y)], data[cb + chroma], data[cr + chroma])
            });
        }
        ImageFormat::RGBA8888 => fill(dst, width, height, mirror, |x, y| {
            let i = layout.pixel_index(x, y);
            [data[i], data[i + 1], data[i + 2], data[i + 3]]
        }),
        ImageFormat::BGRA8888 => fill(dst, width, height, mirror, |x, y| {
            let i = layout.pixel_index(x, y);
            [data[i + 2], data[i + 1], data[i], data[i + 3]]
        }),
        ImageFormat::Unknown => {}
    }
}

/// Rotate a tightly packed `width` x `height` RGBA image clockwise into `dst`
pub fn rotate_rgba(src: &[u8], width: u32, height: u32, rotation: Rotation, dst: &mut [u8]) {
    let (out_width, _) = rotation.output_size(width, height);
    for (dy, row) in dst.chunks_exact_mut(out_width as usize * 4).enumerate() {
        let dy = dy as u32;
        for (dx, out) in row.chunks_exact_mut(4).enumerate() {
            let dx = dx as u32;
            let (sx, sy) = match rotation {
                Rotation::None => (dx, dy),
                Rotation::Rotate90 => (dy, height - 1 - dx),
                Rotation::Rotate180 => (width - 1 - dx, height - 1 - dy),
                Rotation::Rotate270 => (width - 1 - dy, dx),
            };
            let i = (sy as usize * width as usize + sx as usize) * 4;
            out.copy_from_slice(&src[i..i + 4]);
        }
    }
}
