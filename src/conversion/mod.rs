// SPDX-License-Identifier: GPL-3.0-only

//! Camera image to RGBA conversion
//!
//! Both paths share the staging step in [`layout`]: planes are packed into
//! one byte buffer and described by per-plane offsets and strides. The CPU
//! path converts and rotates in host memory; the GPU path runs the same
//! bookkeeping through two compute kernels.
//!
//! Colours use BT.601 full range:
//!
//! ```text
//! R = Y + 1.402 (V - 128)
//! G = Y - 0.344 (U - 128) - 0.714 (V - 128)
//! B = Y + 1.772 (U - 128)
//! ```

pub mod cpu;
pub mod gpu;
pub mod layout;

pub use cpu::CpuConverter;
pub use gpu::GpuConverter;
pub use layout::{stage_image, ChromaLayout, PlaneLayout};

use crate::media::CameraImage;

/// Clockwise rotation applied after colour conversion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Rotation {
    #[default]
    None,
    Rotate90,
    Rotate180,
    Rotate270,
}

impl Rotation {
    pub fn degrees(self) -> u32 {
        match self {
            Rotation::None => 0,
            Rotation::Rotate90 => 90,
            Rotation::Rotate180 => 180,
            Rotation::Rotate270 => 270,
        }
    }

    /// Parse a clockwise angle; anything but a right angle is rejected
    pub fn from_degrees(degrees: u32) -> Option<Self> {
        match degrees % 360 {
            0 => Some(Rotation::None),
            90 => Some(Rotation::Rotate90),
            180 => Some(Rotation::Rotate180),
            270 => Some(Rotation::Rotate270),
            _ => None,
        }
    }

    pub fn swaps_dimensions(self) -> bool {
        matches!(self, Rotation::Rotate90 | Rotation::Rotate270)
    }

    /// Size of a `width` x `height` image after rotation
    pub fn output_size(self, width: u32, height: u32) -> (u32, u32) {
        if self.swaps_dimensions() {
            (height, width)
        } else {
            (width, height)
        }
    }
}

/// Screen orientation the output should be upright for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Orientation {
    #[default]
    Unknown,
    LandscapeLeft,
    Portrait,
    LandscapeRight,
    PortraitUpsideDown,
}

impl Orientation {
    pub fn rotation(self) -> Rotation {
        match self {
            Orientation::LandscapeLeft | Orientation::Unknown => Rotation::None,
            Orientation::Portrait => Rotation::Rotate90,
            Orientation::LandscapeRight => Rotation::Rotate180,
            Orientation::PortraitUpsideDown => Rotation::Rotate270,
        }
    }
}

/// Flip applied while converting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Mirror {
    #[default]
    None,
    /// Left-right flip
    Horizontal,
    /// Top-bottom flip
    Vertical,
}

impl Mirror {
    /// Code passed to conversion kernels
    pub(crate) fn gpu_code(self) -> u32 {
        match self {
            Mirror::None => 0,
            Mirror::Horizontal => 1,
            Mirror::Vertical => 2,
        }
    }

    /// Source coordinate for output pixel `(x, y)`
    #[inline]
    pub(crate) fn source(self, x: u32, y: u32, width: u32, height: u32) -> (u32, u32) {
        match self {
            Mirror::None => (x, y),
            Mirror::Horizontal => (width - 1 - x, y),
            Mirror::Vertical => (x, height - 1 - y),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConversionOptions {
    pub orientation: Orientation,
    pub mirror: Mirror,
}

impl ConversionOptions {
    pub fn new(orientation: Orientation, mirror: Mirror) -> Self {
        Self {
            orientation,
            mirror,
        }
    }

    /// Options that undo the mirroring the camera reported for `image`
    ///
    /// Front cameras report `vertically_mirrored`, a flip about the vertical
    /// axis, which is a left-right flip of the pixels.
    pub fn for_image(image: &CameraImage<'_>, orientation: Orientation) -> Self {
        let mirror = if image.vertically_mirrored() {
            Mirror::Horizontal
        } else {
            Mirror::None
        };
        Self::new(orientation, mirror)
    }

    pub fn rotation(&self) -> Rotation {
        self.orientation.rotation()
    }
}
