// SPDX-License-Identifier: MPL-2.0

//! Sample types delivered by capture devices
//!
//! # Audio
//!
//! [`AudioBuffer`] carries interleaved `f32` samples with rate, channel count
//! and a media-clock timestamp in nanoseconds.
//!
//! # Camera
//!
//! [`CameraImage`] carries either an interleaved pixel buffer (RGBA/BGRA) or a
//! list of [`Plane`]s (YCbCr 4:2:0), plus optional per-frame metadata.
//!
//! Both borrow native memory for the extent of the delivering callback.
//! `Clone` keeps every scalar field and releases the sample memory;
//! `to_copied()` keeps the memory by copying it.

mod audio_buffer;
mod camera_image;

pub use audio_buffer::AudioBuffer;
pub use camera_image::{CameraImage, ImageFormat, ImageMetadata, MetadataKey, Plane};
