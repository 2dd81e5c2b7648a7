// SPDX-License-Identifier: GPL-3.0-only

//! Native capture boundary
//!
//! The platform capture library does device enumeration and capture. This
//! module mirrors its C ABI as the [`CaptureBoundary`] trait so the rest of
//! the crate can be driven either by the real library ([`ffi`], feature
//! `native`) or by the in-process [`virtual_device`] backend.
//!
//! ```text
//!  capture thread (native)          this crate
//! ┌────────────────────────┐      ┌──────────────────────────────┐
//! │ handler(ctx, sample) ──┼────▶ │ trampoline: ctx → token      │
//! │                        │      │ token table → live session?  │
//! │                        │ ◀────┼─ accessors(sample)           │
//! │ release(sample)     ◀──┼──────┼─ camera samples only         │
//! └────────────────────────┘      └──────────────────────────────┘
//! ```
//!
//! Audio samples are valid only while the callback runs. Camera samples
//! (streaming and photo) stay valid until [`CaptureBoundary::release_sample_buffer`].

#[cfg(feature = "native")]
pub mod ffi;
mod status;
pub mod virtual_device;

pub use status::{DeviceFlags, DeviceLocation, Status};

use crate::media::MetadataKey;
use crate::permissions::{PermissionKind, PermissionStatus};
use std::ffi::c_void;

/// Opaque device handle owned by exactly one device wrapper
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceHandle(pub *mut c_void);

impl DeviceHandle {
    pub const NULL: Self = Self(std::ptr::null_mut());

    pub fn is_null(self) -> bool {
        self.0.is_null()
    }
}

// SAFETY: the handle is an opaque token; the native library synchronizes
// access to the object behind it.
unsafe impl Send for DeviceHandle {}
unsafe impl Sync for DeviceHandle {}

/// Opaque sample buffer handle passed to sample callbacks
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SampleHandle(pub *mut c_void);

// SAFETY: camera samples are retained by the native side until released, so
// the handle may move to the thread that releases it.
unsafe impl Send for SampleHandle {}

/// `(context, sample)` invoked per captured frame or audio chunk
pub type SampleBufferHandler = extern "C" fn(context: *mut c_void, sample: *mut c_void);

/// `(context)` invoked when a device disconnects
pub type DisconnectHandler = extern "C" fn(context: *mut c_void);

/// `(context, status)` invoked once when a permission request completes
pub type PermissionHandler = extern "C" fn(context: *mut c_void, status: i32);

/// Audio sample accessors for one sample handle
#[derive(Debug, Clone, Copy)]
pub struct RawAudioBuffer {
    pub data: *const f32,
    pub sample_count: usize,
    pub sample_rate: u32,
    pub channel_count: u32,
    pub timestamp: i64,
}

/// Camera image accessors for one sample handle
#[derive(Debug, Clone, Copy)]
pub struct RawCameraImage {
    pub data: *const u8,
    pub data_size: usize,
    pub format: i32,
    pub width: u32,
    pub height: u32,
    pub row_stride: u32,
    pub timestamp: i64,
    pub vertically_mirrored: bool,
    pub plane_count: usize,
}

/// One plane of a planar camera image
#[derive(Debug, Clone, Copy)]
pub struct RawPlane {
    pub data: *const u8,
    pub data_size: usize,
    pub width: u32,
    pub height: u32,
    pub pixel_stride: u32,
    pub row_stride: u32,
}

/// Device property selector; each maps onto one native getter/setter pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyKey {
    EchoCancellation,
    SampleRate,
    ChannelCount,
    FieldOfView,
    ExposureBiasRange,
    ExposureDurationRange,
    IsoRange,
    ZoomRange,
    PreviewResolution,
    PhotoResolution,
    FrameRate,
    ExposureMode,
    ExposureBias,
    /// Write-only: `Pair(duration, iso)`
    ExposureDuration,
    /// Write-only: `Pair(x, y)` normalized
    ExposurePoint,
    FlashMode,
    FocusMode,
    /// Write-only: `Pair(x, y)` normalized
    FocusPoint,
    TorchMode,
    WhiteBalanceMode,
    VideoStabilizationMode,
    ZoomRatio,
}

/// Property value shapes crossing the boundary
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PropertyValue {
    None,
    Bool(bool),
    Int(i32),
    Float(f32),
    Pair(f32, f32),
    Size(u32, u32),
}

impl PropertyValue {
    pub fn as_bool(self) -> bool {
        match self {
            PropertyValue::Bool(v) => v,
            PropertyValue::Int(v) => v != 0,
            _ => false,
        }
    }

    pub fn as_int(self) -> i32 {
        match self {
            PropertyValue::Int(v) => v,
            PropertyValue::Bool(v) => v as i32,
            PropertyValue::Float(v) => v as i32,
            _ => 0,
        }
    }

    pub fn as_float(self) -> f32 {
        match self {
            PropertyValue::Float(v) => v,
            PropertyValue::Int(v) => v as f32,
            _ => 0.0,
        }
    }

    pub fn as_pair(self) -> (f32, f32) {
        match self {
            PropertyValue::Pair(a, b) => (a, b),
            PropertyValue::Size(w, h) => (w as f32, h as f32),
            _ => (0.0, 0.0),
        }
    }

    pub fn as_size(self) -> (u32, u32) {
        match self {
            PropertyValue::Size(w, h) => (w, h),
            PropertyValue::Pair(a, b) => (a.max(0.0) as u32, b.max(0.0) as u32),
            _ => (0, 0),
        }
    }
}

/// The native capture library's C ABI
///
/// Methods mirror the exported functions one-to-one; status results are
/// returned raw and translated by callers with [`Status::check`].
pub trait CaptureBoundary: Send + Sync + 'static {
    /// Install the process-wide session token
    fn set_session_token(&self, token: Option<&str>) -> Status;

    /// Configure the global audio session before audio discovery
    fn configure_audio_session(&self);

    /// Fill `out` with audio device handles; `count` receives the number written
    fn audio_devices(&self, out: &mut [DeviceHandle], count: &mut usize) -> Status;

    /// Fill `out` with camera device handles; `count` receives the number written
    fn camera_devices(&self, out: &mut [DeviceHandle], count: &mut usize) -> Status;

    fn release_device(&self, device: DeviceHandle) -> Status;

    /// Write the NUL-terminated unique ID into `dst`
    fn unique_id(&self, device: DeviceHandle, dst: &mut [u8]) -> Status;

    /// Write the NUL-terminated display name into `dst`
    fn name(&self, device: DeviceHandle, dst: &mut [u8]) -> Status;

    fn flags(&self, device: DeviceHandle) -> DeviceFlags;

    fn is_running(&self, device: DeviceHandle) -> bool;

    fn start_running(
        &self,
        device: DeviceHandle,
        handler: SampleBufferHandler,
        context: *mut c_void,
    ) -> Status;

    /// Returns once no further sample callbacks will fire for the device
    fn stop_running(&self, device: DeviceHandle) -> Status;

    fn set_disconnect_handler(
        &self,
        device: DeviceHandle,
        handler: Option<DisconnectHandler>,
        context: *mut c_void,
    ) -> Status;

    fn property(&self, device: DeviceHandle, key: PropertyKey) -> PropertyValue;

    /// Forward a property write; the native side clamps or ignores unsupported values
    fn set_property(&self, device: DeviceHandle, key: PropertyKey, value: PropertyValue);

    /// Capture one photo; the handler fires exactly once
    fn capture_photo(&self, device: DeviceHandle, handler: SampleBufferHandler, context: *mut c_void);

    fn audio_buffer(&self, sample: SampleHandle) -> RawAudioBuffer;

    fn camera_image(&self, sample: SampleHandle) -> RawCameraImage;

    fn camera_image_plane(&self, sample: SampleHandle, index: usize) -> RawPlane;

    /// Copy metadata values for `key` into `dst`; false when not reported
    fn camera_image_metadata(&self, sample: SampleHandle, key: MetadataKey, dst: &mut [f32]) -> bool;

    fn release_sample_buffer(&self, sample: SampleHandle);

    fn check_permissions(&self, kind: PermissionKind) -> PermissionStatus;

    fn request_permissions(
        &self,
        kind: PermissionKind,
        handler: PermissionHandler,
        context: *mut c_void,
    );
}

/// Encode a token as an opaque callback context
pub(crate) fn token_to_context(token: u64) -> *mut c_void {
    token as usize as *mut c_void
}

/// Decode an opaque callback context back into a token
pub(crate) fn context_to_token(context: *mut c_void) -> u64 {
    context as usize as u64
}

/// Read a NUL-terminated string written by the native side
pub(crate) fn read_c_string(buf: &[u8]) -> String {
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    String::from_utf8_lossy(&buf[..end]).into_owned()
}

/// Write `value` NUL-terminated into `dst`, truncating to fit
pub(crate) fn write_c_string(value: &str, dst: &mut [u8]) -> Status {
    if dst.is_empty() {
        return Status::InvalidArgument;
    }
    let len = value.len().min(dst.len() - 1);
    dst[..len].copy_from_slice(&value.as_bytes()[..len]);
    dst[len] = 0;
    Status::Ok
}
