// SPDX-License-Identifier: GPL-3.0-only

//! Plane staging
//!
//! Packs an image's pixel memory into one contiguous scratch buffer and
//! records where each plane starts and how to step through it. Both
//! converters read pixels only through the resulting [`PlaneLayout`].

use crate::constants::STAGING_ROW_PADDING;
use crate::errors::{Error, Result};
use crate::media::{CameraImage, ImageFormat, Plane};
use tracing::trace;

/// How chroma samples are arranged in the staged buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChromaLayout {
    /// No chroma planes (RGBA/BGRA)
    Interleaved,
    /// Separate Cb and Cr planes (I420)
    Planar,
    /// One interleaved block starting with Cb (NV12)
    CbFirst,
    /// One interleaved block starting with Cr (NV21)
    CrFirst,
}

/// Offsets and strides into a staged buffer
///
/// `offsets` are `[y, cb, cr, 0]` for YCbCr and all zero for interleaved
/// images. `strides` are `[y_row, chroma_row, y_pixel, chroma_pixel]`; for
/// interleaved images only `strides[0]` (bytes per row) is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaneLayout {
    pub format: ImageFormat,
    pub width: u32,
    pub height: u32,
    pub offsets: [u32; 4],
    pub strides: [u32; 4],
    pub chroma: ChromaLayout,
}

impl PlaneLayout {
    pub fn cb_offset(&self) -> u32 {
        self.offsets[1]
    }

    pub fn cr_offset(&self) -> u32 {
        self.offsets[2]
    }

    /// Byte index of the luma sample at `(x, y)`
    #[inline]
    pub(crate) fn luma_index(&self, x: u32, y: u32) -> usize {
        self.offsets[0] as usize + y as usize * self.strides[0] as usize + x as usize * self.strides[2] as usize
    }

    /// Byte offset of the chroma pair for pixel `(x, y)`, relative to the plane offsets
    #[inline]
    pub(crate) fn chroma_index(&self, x: u32, y: u32) -> usize {
        (y / 2) as usize * self.strides[1] as usize + (x / 2) as usize * self.strides[3] as usize
    }

    /// Byte index of the first byte of pixel `(x, y)` in an interleaved image
    #[inline]
    pub(crate) fn pixel_index(&self, x: u32, y: u32) -> usize {
        y as usize * self.strides[0] as usize + x as usize * 4
    }

    /// Make sure every pixel the converters will touch lies inside `len` bytes
    fn check_bounds(&self, len: usize) -> Result<()> {
        let (last_x, last_y) = (self.width - 1, self.height - 1);
        let required = if self.chroma == ChromaLayout::Interleaved {
            self.pixel_index(last_x, last_y) + 4
        } else {
            let chroma = self.chroma_index(last_x, last_y);
            let luma = self.luma_index(last_x, last_y);
            luma.max(self.cb_offset() as usize + chroma)
                .max(self.cr_offset() as usize + chroma)
                + 1
        };
        if required > len {
            return Err(Error::InvalidArgument(format!(
                "{}x{} {:?} image needs {required} bytes, staged {len}",
                self.width, self.height, self.format
            )));
        }
        Ok(())
    }
}

/// Pack `image` into `scratch` and describe the result
///
/// `scratch` is cleared and reused; its capacity grows to
/// `width * height * 4` plus row padding and then stays put across frames.
pub fn stage_image(image: &CameraImage<'_>, scratch: &mut Vec<u8>) -> Result<PlaneLayout> {
    let (width, height) = (image.width(), image.height());
    if width == 0 || height == 0 {
        return Err(Error::InvalidArgument(format!("empty image {width}x{height}")));
    }
    scratch.clear();
    scratch.reserve(width as usize * height as usize * 4 + STAGING_ROW_PADDING * height as usize);

    let layout = match image.format() {
        ImageFormat::YCbCr420 => stage_ycbcr(image, scratch)?,
        ImageFormat::RGBA8888 | ImageFormat::BGRA8888 => stage_interleaved(image, scratch)?,
        ImageFormat::Unknown => return Err(Error::UnknownFormat(ImageFormat::Unknown as i32)),
    };
    layout.check_bounds(scratch.len())?;
    trace!(?layout, staged = scratch.len(), "Staged image");
    Ok(layout)
}

fn stage_interleaved(image: &CameraImage<'_>, scratch: &mut Vec<u8>) -> Result<PlaneLayout> {
    let pixels = image.pixel_buffer();
    if pixels.is_empty() {
        return Err(Error::InvalidArgument("pixel buffer has been released".into()));
    }
    scratch.extend_from_slice(pixels);
    Ok(PlaneLayout {
        format: image.format(),
        width: image.width(),
        height: image.height(),
        offsets: [0; 4],
        strides: [(pixels.len() / image.height() as usize) as u32, 0, 0, 0],
        chroma: ChromaLayout::Interleaved,
    })
}

fn stage_ycbcr(image: &CameraImage<'_>, scratch: &mut Vec<u8>) -> Result<PlaneLayout> {
    let [luma, cb, cr] = match image.planes() {
        [luma, cb, cr, ..] => [luma, cb, cr],
        planes => {
            return Err(Error::InvalidArgument(format!(
                "YCbCr420 needs 3 planes, got {}",
                planes.len()
            )));
        }
    };
    if [luma, cb, cr].iter().any(|plane| plane.data().is_empty()) {
        return Err(Error::InvalidArgument("image planes have been released".into()));
    }

    scratch.extend_from_slice(luma.data());
    let y_len = luma.data().len() as u32;
    let strides = [
        luma.row_stride(),
        cb.row_stride(),
        luma.pixel_stride().max(1),
        cb.pixel_stride().max(1),
    ];

    let (offsets, chroma) = if cb.pixel_stride() <= 1 {
        scratch.extend_from_slice(cb.data());
        scratch.extend_from_slice(cr.data());
        let cb_len = cb.data().len() as u32;
        ([0, y_len, y_len + cb_len, 0], ChromaLayout::Planar)
    } else if address(cb) > address(cr) {
        stage_chroma_block(scratch, cr, cb);
        ([0, y_len + 1, y_len, 0], ChromaLayout::CrFirst)
    } else {
        stage_chroma_block(scratch, cb, cr);
        ([0, y_len, y_len + 1, 0], ChromaLayout::CbFirst)
    };

    Ok(PlaneLayout {
        format: ImageFormat::YCbCr420,
        width: image.width(),
        height: image.height(),
        offsets,
        strides,
        chroma,
    })
}

fn address(plane: &Plane<'_>) -> usize {
    plane.buffer().as_ptr() as usize
}

/// Copy an interleaved chroma block, padding it to an even length
///
/// Semi-planar planes usually stop one byte short of the other plane's last
/// sample, so the missing byte is taken from there.
fn stage_chroma_block(scratch: &mut Vec<u8>, first: &Plane<'_>, second: &Plane<'_>) {
    let block = first.data();
    scratch.extend_from_slice(block);
    if block.len() % 2 == 1 {
        let pad = second.data().last().copied().unwrap_or(128);
        scratch.push(pad);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn planar<'a>(y: &'a [u8], cb: &'a [u8], cr: &'a [u8], w: u32, h: u32, chroma_pixel: u32) -> CameraImage<'a> {
        let chroma_row = if chroma_pixel == 1 { w / 2 } else { w };
        let planes = vec![
            Plane::new(y, w, h, w, 1),
            Plane::new(cb, w / 2, h / 2, chroma_row, chroma_pixel),
            Plane::new(cr, w / 2, h / 2, chroma_row, chroma_pixel),
        ];
        CameraImage::planar(planes, w, h, 0).unwrap()
    }

    #[test]
    fn test_i420_concatenates_planes() {
        let y = [10u8; 16];
        let cb = [20u8; 4];
        let cr = [30u8; 4];
        let image = planar(&y, &cb, &cr, 4, 4, 1);
        let mut scratch = Vec::new();
        let layout = stage_image(&image, &mut scratch).unwrap();

        assert_eq!(layout.chroma, ChromaLayout::Planar);
        assert_eq!(layout.offsets, [0, 16, 20, 0]);
        assert_eq!(layout.strides, [4, 2, 1, 1]);
        assert_eq!(scratch.len(), 24);
        assert_eq!(scratch[16], 20);
        assert_eq!(scratch[20], 30);
    }

    #[test]
    fn test_nv12_from_lower_cb_address() {
        let y = [0u8; 16];
        // U0 V0 U1 V1 U2 V2 U3 V3
        let uv = [1u8, 2, 3, 4, 5, 6, 7, 8];
        let image = planar(&y, &uv[..7], &uv[1..], 4, 4, 2);
        let mut scratch = Vec::new();
        let layout = stage_image(&image, &mut scratch).unwrap();

        assert_eq!(layout.chroma, ChromaLayout::CbFirst);
        assert_eq!(layout.cb_offset(), 16);
        assert_eq!(layout.cr_offset(), 17);
        assert_eq!(&scratch[16..], &uv[..]);
    }

    #[test]
    fn test_nv21_from_lower_cr_address() {
        let y = [0u8; 16];
        // V0 U0 V1 U1 V2 U2 V3 U3
        let vu = [2u8, 1, 4, 3, 6, 5, 8, 7];
        let image = planar(&y, &vu[1..], &vu[..7], 4, 4, 2);
        let mut scratch = Vec::new();
        let layout = stage_image(&image, &mut scratch).unwrap();

        assert_eq!(layout.chroma, ChromaLayout::CrFirst);
        assert_eq!(layout.cr_offset(), 16);
        assert_eq!(layout.cb_offset(), 17);
        // Padded with the last Cb byte
        assert_eq!(&scratch[16..], &vu[..]);
        assert_eq!(scratch[layout.cb_offset() as usize], 1);
    }

    #[test]
    fn test_interleaved_stride_from_length() {
        let data = vec![0u8; 6 * 4 * 2];
        let image = CameraImage::interleaved(ImageFormat::BGRA8888, &data, 4, 2, 24, 0).unwrap();
        let mut scratch = Vec::new();
        let layout = stage_image(&image, &mut scratch).unwrap();

        assert_eq!(layout.chroma, ChromaLayout::Interleaved);
        assert_eq!(layout.offsets, [0; 4]);
        assert_eq!(layout.strides[0], 24);
    }

    #[test]
    fn test_scratch_reserved_for_rgba_output() {
        let y = [0u8; 64];
        let cb = [0u8; 16];
        let cr = [0u8; 16];
        let image = planar(&y, &cb, &cr, 8, 8, 1);
        let mut scratch = Vec::new();
        stage_image(&image, &mut scratch).unwrap();
        assert!(scratch.capacity() >= 8 * 8 * 4 + STAGING_ROW_PADDING * 8);
    }

    #[test]
    fn test_released_image_is_rejected() {
        let y = [0u8; 16];
        let cb = [0u8; 4];
        let cr = [0u8; 4];
        let image = planar(&y, &cb, &cr, 4, 4, 1).clone();
        assert!(matches!(
            stage_image(&image, &mut Vec::new()),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_short_planes_are_rejected() {
        let y = [0u8; 4];
        let cb = [0u8; 4];
        let cr = [0u8; 4];
        let image = planar(&y, &cb, &cr, 4, 4, 1);
        assert!(stage_image(&image, &mut Vec::new()).is_err());
    }
}
