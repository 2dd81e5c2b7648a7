// SPDX-License-Identifier: GPL-3.0-only

use crate::buffer::BufferView;
use crate::devices::DeviceIdentity;
use crate::errors::{Error, Result};
use crate::native::{CaptureBoundary, SampleHandle};
use std::sync::Arc;

/// Pixel layout of a camera image
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ImageFormat {
    #[default]
    Unknown = 0,
    /// Planar or semi-planar 4:2:0, delivered as planes
    YCbCr420 = 1,
    /// Interleaved RGBA, 8 bits per channel
    RGBA8888 = 2,
    /// Interleaved BGRA, 8 bits per channel
    BGRA8888 = 3,
}

impl ImageFormat {
    pub fn from_raw(code: i32) -> Self {
        match code {
            1 => ImageFormat::YCbCr420,
            2 => ImageFormat::RGBA8888,
            3 => ImageFormat::BGRA8888,
            _ => ImageFormat::Unknown,
        }
    }

    /// Whether pixels arrive as separate planes
    pub fn is_planar(self) -> bool {
        self == ImageFormat::YCbCr420
    }

    /// Whether pixels arrive in one interleaved buffer
    pub fn is_interleaved(self) -> bool {
        matches!(self, ImageFormat::RGBA8888 | ImageFormat::BGRA8888)
    }

    /// Code passed to conversion kernels
    pub fn gpu_format_code(self) -> u32 {
        self as u32
    }
}

/// Metadata selector understood by the native side
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetadataKey {
    IntrinsicMatrix = 1,
    ExposureBias = 2,
    ExposureDuration = 3,
    FocalLength = 4,
    FNumber = 5,
    Brightness = 6,
    Iso = 7,
}

/// Per-frame camera metadata; each field is present only when reported
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ImageMetadata {
    /// Row-major 3x3 camera intrinsics
    pub intrinsics: Option<[f32; 9]>,
    pub exposure_bias: Option<f32>,
    /// Exposure duration in seconds
    pub exposure_duration: Option<f32>,
    pub iso: Option<f32>,
    /// Focal length in millimeters
    pub focal_length: Option<f32>,
    pub f_number: Option<f32>,
    pub brightness: Option<f32>,
}

impl ImageMetadata {
    fn from_native(boundary: &dyn CaptureBoundary, sample: SampleHandle) -> Self {
        let scalar = |key| {
            let mut value = [0f32; 1];
            boundary
                .camera_image_metadata(sample, key, &mut value)
                .then_some(value[0])
        };
        let mut matrix = [0f32; 9];
        let intrinsics = boundary
            .camera_image_metadata(sample, MetadataKey::IntrinsicMatrix, &mut matrix)
            .then_some(matrix);

        Self {
            intrinsics,
            exposure_bias: scalar(MetadataKey::ExposureBias),
            exposure_duration: scalar(MetadataKey::ExposureDuration),
            iso: scalar(MetadataKey::Iso),
            focal_length: scalar(MetadataKey::FocalLength),
            f_number: scalar(MetadataKey::FNumber),
            brightness: scalar(MetadataKey::Brightness),
        }
    }
}

/// One plane of a planar image
pub struct Plane<'a> {
    buffer: BufferView<'a, u8>,
    width: u32,
    height: u32,
    row_stride: u32,
    pixel_stride: u32,
}

impl<'a> Plane<'a> {
    /// Plane over caller memory
    pub fn new(data: &'a [u8], width: u32, height: u32, row_stride: u32, pixel_stride: u32) -> Self {
        Self {
            buffer: BufferView::Borrowed(data),
            width,
            height,
            row_stride,
            pixel_stride,
        }
    }

    pub fn data(&self) -> &[u8] {
        self.buffer.as_slice()
    }

    pub fn buffer(&self) -> &BufferView<'a, u8> {
        &self.buffer
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn row_stride(&self) -> u32 {
        self.row_stride
    }

    pub fn pixel_stride(&self) -> u32 {
        self.pixel_stride
    }

    fn with_buffer<'b>(&self, buffer: BufferView<'b, u8>) -> Plane<'b> {
        Plane {
            buffer,
            width: self.width,
            height: self.height,
            row_stride: self.row_stride,
            pixel_stride: self.pixel_stride,
        }
    }
}

impl Clone for Plane<'_> {
    fn clone(&self) -> Self {
        self.with_buffer(BufferView::released())
    }
}

impl std::fmt::Debug for Plane<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Plane")
            .field("buffer", &self.buffer)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("row_stride", &self.row_stride)
            .field("pixel_stride", &self.pixel_stride)
            .finish()
    }
}

/// Camera frame from one capture callback
pub struct CameraImage<'a> {
    format: ImageFormat,
    width: u32,
    height: u32,
    row_stride: u32,
    timestamp: i64,
    vertically_mirrored: bool,
    pixel_buffer: BufferView<'a, u8>,
    planes: Vec<Plane<'a>>,
    metadata: ImageMetadata,
    device: Option<Arc<DeviceIdentity>>,
}

impl<'a> CameraImage<'a> {
    /// Interleaved image over caller memory
    pub fn interleaved(
        format: ImageFormat,
        data: &'a [u8],
        width: u32,
        height: u32,
        row_stride: u32,
        timestamp: i64,
    ) -> Result<Self> {
        if !format.is_interleaved() {
            return Err(Error::InvalidArgument(format!(
                "{format:?} is not an interleaved format"
            )));
        }
        if (row_stride as usize) * (height as usize) > data.len() {
            return Err(Error::InvalidArgument(format!(
                "pixel buffer of {} bytes is smaller than {row_stride}x{height}",
                data.len()
            )));
        }
        Ok(Self {
            format,
            width,
            height,
            row_stride,
            timestamp,
            vertically_mirrored: false,
            pixel_buffer: BufferView::Borrowed(data),
            planes: Vec::new(),
            metadata: ImageMetadata::default(),
            device: None,
        })
    }

    /// Planar YCbCr 4:2:0 image from Y, Cb and Cr planes
    pub fn planar(planes: Vec<Plane<'a>>, width: u32, height: u32, timestamp: i64) -> Result<Self> {
        if planes.len() < 3 {
            return Err(Error::InvalidArgument(format!(
                "YCbCr420 needs 3 planes, got {}",
                planes.len()
            )));
        }
        Ok(Self {
            format: ImageFormat::YCbCr420,
            width,
            height,
            row_stride: 0,
            timestamp,
            vertically_mirrored: false,
            pixel_buffer: BufferView::released(),
            planes,
            metadata: ImageMetadata::default(),
            device: None,
        })
    }

    pub fn with_mirrored(mut self, mirrored: bool) -> Self {
        self.vertically_mirrored = mirrored;
        self
    }

    pub fn with_metadata(mut self, metadata: ImageMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Wrap the native image behind `sample` without copying
    ///
    /// # Safety
    ///
    /// `sample` must be a camera sample that has not been released, and the
    /// returned image must not outlive the release.
    pub(crate) unsafe fn from_native(
        boundary: &dyn CaptureBoundary,
        sample: SampleHandle,
        device: Option<Arc<DeviceIdentity>>,
    ) -> CameraImage<'a> {
        let raw = boundary.camera_image(sample);
        let format = ImageFormat::from_raw(raw.format);
        let planes = if format.is_planar() {
            (0..raw.plane_count)
                .map(|index| {
                    let plane = boundary.camera_image_plane(sample, index);
                    Plane {
                        // SAFETY: plane memory lives until the sample is released
                        buffer: unsafe { BufferView::from_raw_parts(plane.data, plane.data_size) },
                        width: plane.width,
                        height: plane.height,
                        row_stride: plane.row_stride,
                        pixel_stride: plane.pixel_stride,
                    }
                })
                .collect()
        } else {
            Vec::new()
        };
        let pixel_buffer = if format.is_interleaved() {
            // SAFETY: pixel memory lives until the sample is released
            unsafe { BufferView::from_raw_parts(raw.data, raw.data_size) }
        } else {
            BufferView::released()
        };

        CameraImage {
            format,
            width: raw.width,
            height: raw.height,
            row_stride: if format.is_planar() { 0 } else { raw.row_stride },
            timestamp: raw.timestamp,
            vertically_mirrored: raw.vertically_mirrored,
            pixel_buffer,
            planes,
            metadata: ImageMetadata::from_native(boundary, sample),
            device,
        }
    }

    pub fn format(&self) -> ImageFormat {
        self.format
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Row stride in bytes; zero for planar images
    pub fn row_stride(&self) -> u32 {
        self.row_stride
    }

    /// Timestamp in nanoseconds
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    /// Whether the image is mirrored about its vertical axis
    pub fn vertically_mirrored(&self) -> bool {
        self.vertically_mirrored
    }

    /// Interleaved pixel data; empty for planar images or once released
    pub fn pixel_buffer(&self) -> &[u8] {
        self.pixel_buffer.as_slice()
    }

    pub fn pixel_view(&self) -> &BufferView<'a, u8> {
        &self.pixel_buffer
    }

    pub fn planes(&self) -> &[Plane<'a>] {
        &self.planes
    }

    pub fn metadata(&self) -> &ImageMetadata {
        &self.metadata
    }

    pub fn device(&self) -> Option<&Arc<DeviceIdentity>> {
        self.device.as_ref()
    }

    /// Whether the pixel and plane memory has been released
    pub fn is_released(&self) -> bool {
        self.pixel_buffer.is_released() && self.planes.iter().all(|p| p.buffer.is_released())
    }

    /// Deep copy that can be kept after the callback returns
    ///
    /// Planes are copied into one allocation in their original address
    /// order, so chroma ordering detection still works on the copy.
    pub fn to_copied(&self) -> CameraImage<'static> {
        CameraImage {
            format: self.format,
            width: self.width,
            height: self.height,
            row_stride: self.row_stride,
            timestamp: self.timestamp,
            vertically_mirrored: self.vertically_mirrored,
            pixel_buffer: self.pixel_buffer.to_owned_view(),
            planes: copy_planes(&self.planes),
            metadata: self.metadata,
            device: self.device.clone(),
        }
    }

    fn stripped<'b>(&self) -> CameraImage<'b> {
        CameraImage {
            format: self.format,
            width: self.width,
            height: self.height,
            row_stride: self.row_stride,
            timestamp: self.timestamp,
            vertically_mirrored: self.vertically_mirrored,
            pixel_buffer: BufferView::released(),
            planes: self
                .planes
                .iter()
                .map(|p| p.with_buffer(BufferView::released()))
                .collect(),
            metadata: self.metadata,
            device: self.device.clone(),
        }
    }
}

/// Cloning keeps every scalar field and the plane geometry, and releases the
/// pixel and plane memory.
///
/// Use [`CameraImage::to_copied`] to keep the pixels.
impl Clone for CameraImage<'_> {
    fn clone(&self) -> Self {
        self.stripped()
    }
}

impl std::fmt::Debug for CameraImage<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CameraImage")
            .field("format", &self.format)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("row_stride", &self.row_stride)
            .field("timestamp", &self.timestamp)
            .field("vertically_mirrored", &self.vertically_mirrored)
            .field("pixel_buffer", &self.pixel_buffer)
            .field("planes", &self.planes)
            .finish()
    }
}

/// Copy planes into one shared allocation, keeping their relative placement
///
/// Planes that overlap or touch in memory (semi-planar chroma) are copied as
/// one region so their address order and overlap survive. Separate regions
/// are packed back to back in address order.
fn copy_planes(planes: &[Plane<'_>]) -> Vec<Plane<'static>> {
    if planes.iter().any(|p| p.buffer.is_released()) {
        return planes.iter().map(|p| p.with_buffer(p.buffer.to_owned_view())).collect();
    }

    let address = |i: usize| planes[i].buffer.as_ptr() as usize;
    let mut order: Vec<usize> = (0..planes.len()).collect();
    order.sort_by_key(|&i| address(i));

    let total: usize = planes.iter().map(|p| p.buffer.len()).sum();
    let mut data: Vec<u8> = Vec::with_capacity(total);
    let mut ranges = vec![0..0; planes.len()];
    // (first address, offset in `data`, end address) of the current region
    let mut region: Option<(usize, usize, usize)> = None;

    for i in order {
        let bytes = planes[i].data();
        let start = address(i);
        let end = start + bytes.len();
        let (region_start, base, region_end) = match region {
            Some(current) if start <= current.2 => current,
            _ => (start, data.len(), start),
        };
        let offset = base + (start - region_start);
        if data.len() < offset + bytes.len() {
            data.resize(offset + bytes.len(), 0);
        }
        data[offset..offset + bytes.len()].copy_from_slice(bytes);
        ranges[i] = offset..offset + bytes.len();
        region = Some((region_start, base, region_end.max(end)));
    }

    let shared: Arc<[u8]> = Arc::from(data);
    planes
        .iter()
        .zip(ranges)
        .map(|(plane, range)| plane.with_buffer(BufferView::shared(Arc::clone(&shared), range)))
        .collect()
}
