// SPDX-License-Identifier: GPL-3.0-only

//! Bindings to the platform capture library
//!
//! Only built with the `native` feature. Every exported C function is
//! declared here once; [`FfiBoundary`] maps the [`CaptureBoundary`] trait onto
//! them.

use super::{
    CaptureBoundary, DeviceFlags, DeviceHandle, DisconnectHandler, PermissionHandler,
    PropertyKey, PropertyValue, RawAudioBuffer, RawCameraImage, RawPlane, SampleBufferHandler,
    SampleHandle, Status,
};
use crate::media::MetadataKey;
use crate::permissions::{PermissionKind, PermissionStatus};
use libc::{c_char, c_float, c_int, c_void};
use std::ffi::CString;
use tracing::warn;

type Device = *mut c_void;
type Sample = *mut c_void;

#[link(name = "NatDevice")]
unsafe extern "C" {
    // Session
    fn NDSetSessionToken(token: *const c_char) -> c_int;
    fn NDConfigureAudioSession();

    // Discovery and handles
    fn NDGetAudioDevices(devices: *mut Device, size: c_int, count: *mut c_int) -> c_int;
    fn NDGetCameraDevices(devices: *mut Device, size: c_int, count: *mut c_int) -> c_int;
    fn NDReleaseMediaDevice(device: Device) -> c_int;
    fn NDMediaDeviceGetUniqueID(device: Device, dst: *mut c_char) -> c_int;
    fn NDMediaDeviceGetName(device: Device, dst: *mut c_char) -> c_int;
    fn NDMediaDeviceGetFlags(device: Device) -> c_int;
    fn NDMediaDeviceIsRunning(device: Device) -> bool;
    fn NDMediaDeviceStartRunning(device: Device, handler: SampleBufferHandler, context: *mut c_void) -> c_int;
    fn NDMediaDeviceStopRunning(device: Device) -> c_int;
    fn NDMediaDeviceSetDisconnectHandler(
        device: Device,
        handler: Option<DisconnectHandler>,
        context: *mut c_void,
    ) -> c_int;

    // Audio device
    fn NDAudioDeviceEchoCancellation(device: Device) -> bool;
    fn NDAudioDeviceSetEchoCancellation(device: Device, enabled: bool);
    fn NDAudioDeviceSampleRate(device: Device) -> c_int;
    fn NDAudioDeviceSetSampleRate(device: Device, sample_rate: c_int);
    fn NDAudioDeviceChannelCount(device: Device) -> c_int;
    fn NDAudioDeviceSetChannelCount(device: Device, channel_count: c_int);

    // Camera device
    fn NDCameraDeviceFieldOfView(device: Device, x: *mut c_float, y: *mut c_float);
    fn NDCameraDeviceExposureBiasRange(device: Device, min: *mut c_float, max: *mut c_float);
    fn NDCameraDeviceExposureDurationRange(device: Device, min: *mut c_float, max: *mut c_float);
    fn NDCameraDeviceISORange(device: Device, min: *mut c_float, max: *mut c_float);
    fn NDCameraDeviceZoomRange(device: Device, min: *mut c_float, max: *mut c_float);
    fn NDCameraDevicePreviewResolution(device: Device, width: *mut c_int, height: *mut c_int);
    fn NDCameraDeviceSetPreviewResolution(device: Device, width: c_int, height: c_int);
    fn NDCameraDevicePhotoResolution(device: Device, width: *mut c_int, height: *mut c_int);
    fn NDCameraDeviceSetPhotoResolution(device: Device, width: c_int, height: c_int);
    fn NDCameraDeviceFrameRate(device: Device) -> c_int;
    fn NDCameraDeviceSetFrameRate(device: Device, frame_rate: c_int);
    fn NDCameraDeviceExposureBias(device: Device) -> c_float;
    fn NDCameraDeviceSetExposureBias(device: Device, bias: c_float);
    fn NDCameraDeviceSetExposurePoint(device: Device, x: c_float, y: c_float);
    fn NDCameraDeviceExposureMode(device: Device) -> c_int;
    fn NDCameraDeviceSetExposureMode(device: Device, mode: c_int);
    fn NDCameraDeviceSetExposureDuration(device: Device, duration: c_float, iso: c_float);
    fn NDCameraDeviceFlashMode(device: Device) -> c_int;
    fn NDCameraDeviceSetFlashMode(device: Device, mode: c_int);
    fn NDCameraDeviceFocusMode(device: Device) -> c_int;
    fn NDCameraDeviceSetFocusMode(device: Device, mode: c_int);
    fn NDCameraDeviceSetFocusPoint(device: Device, x: c_float, y: c_float);
    fn NDCameraDeviceTorchMode(device: Device) -> c_int;
    fn NDCameraDeviceSetTorchMode(device: Device, mode: c_int);
    fn NDCameraDeviceWhiteBalanceMode(device: Device) -> c_int;
    fn NDCameraDeviceSetWhiteBalanceMode(device: Device, mode: c_int);
    fn NDCameraDeviceVideoStabilizationMode(device: Device) -> c_int;
    fn NDCameraDeviceSetVideoStabilizationMode(device: Device, mode: c_int);
    fn NDCameraDeviceZoomRatio(device: Device) -> c_float;
    fn NDCameraDeviceSetZoomRatio(device: Device, ratio: c_float);
    fn NDCameraDeviceCapturePhoto(device: Device, handler: SampleBufferHandler, context: *mut c_void);

    // Audio buffer
    fn NDAudioBufferData(buffer: Sample) -> *mut c_float;
    fn NDAudioBufferSampleCount(buffer: Sample) -> c_int;
    fn NDAudioBufferSampleRate(buffer: Sample) -> c_int;
    fn NDAudioBufferChannelCount(buffer: Sample) -> c_int;
    fn NDAudioBufferTimestamp(buffer: Sample) -> i64;

    // Camera image
    fn NDCameraImageData(image: Sample) -> *mut c_void;
    fn NDCameraImageDataSize(image: Sample) -> c_int;
    fn NDCameraImageFormat(image: Sample) -> c_int;
    fn NDCameraImageWidth(image: Sample) -> c_int;
    fn NDCameraImageHeight(image: Sample) -> c_int;
    fn NDCameraImageRowStride(image: Sample) -> c_int;
    fn NDCameraImageTimestamp(image: Sample) -> i64;
    fn NDCameraImageVerticallyMirrored(image: Sample) -> bool;
    fn NDCameraImagePlaneCount(image: Sample) -> c_int;
    fn NDCameraImagePlaneData(image: Sample, plane: c_int) -> *mut c_void;
    fn NDCameraImagePlaneDataSize(image: Sample, plane: c_int) -> c_int;
    fn NDCameraImagePlaneWidth(image: Sample, plane: c_int) -> c_int;
    fn NDCameraImagePlaneHeight(image: Sample, plane: c_int) -> c_int;
    fn NDCameraImagePlanePixelStride(image: Sample, plane: c_int) -> c_int;
    fn NDCameraImagePlaneRowStride(image: Sample, plane: c_int) -> c_int;
    fn NDCameraImageMetadata(image: Sample, key: c_int, value: *mut c_float, count: c_int) -> bool;
    fn NDReleaseSampleBuffer(sample: Sample);

    // Permissions
    fn NDCheckPermissions(kind: c_int) -> c_int;
    fn NDRequestPermissions(kind: c_int, handler: PermissionHandler, context: *mut c_void);
}

fn non_negative(value: c_int) -> u32 {
    value.max(0) as u32
}

/// [`CaptureBoundary`] over the linked platform library
#[derive(Debug, Default, Clone, Copy)]
pub struct FfiBoundary;

impl FfiBoundary {
    pub fn new() -> Self {
        Self
    }

    fn pair(device: Device, read: unsafe extern "C" fn(Device, *mut c_float, *mut c_float)) -> PropertyValue {
        let (mut a, mut b) = (0.0, 0.0);
        // SAFETY: `device` is a live handle and both outputs are valid
        unsafe { read(device, &mut a, &mut b) };
        PropertyValue::Pair(a, b)
    }

    fn size(device: Device, read: unsafe extern "C" fn(Device, *mut c_int, *mut c_int)) -> PropertyValue {
        let (mut width, mut height) = (0, 0);
        // SAFETY: `device` is a live handle and both outputs are valid
        unsafe { read(device, &mut width, &mut height) };
        PropertyValue::Size(non_negative(width), non_negative(height))
    }
}

impl CaptureBoundary for FfiBoundary {
    fn set_session_token(&self, token: Option<&str>) -> Status {
        let token = match token.map(CString::new).transpose() {
            Ok(token) => token,
            Err(_) => return Status::InvalidArgument,
        };
        let ptr = token.as_ref().map_or(std::ptr::null(), |token| token.as_ptr());
        // SAFETY: `ptr` is null or a NUL-terminated string alive for the call
        Status::from_raw(unsafe { NDSetSessionToken(ptr) })
    }

    fn configure_audio_session(&self) {
        #[cfg(target_os = "ios")]
        // SAFETY: no arguments; safe to call repeatedly
        unsafe {
            NDConfigureAudioSession()
        };
    }

    fn audio_devices(&self, out: &mut [DeviceHandle], count: &mut usize) -> Status {
        let mut written: c_int = 0;
        // SAFETY: DeviceHandle is repr(transparent) over a pointer and `out`
        // has room for `out.len()` handles
        let status = unsafe {
            NDGetAudioDevices(out.as_mut_ptr().cast(), out.len() as c_int, &mut written)
        };
        *count = (written.max(0) as usize).min(out.len());
        Status::from_raw(status)
    }

    fn camera_devices(&self, out: &mut [DeviceHandle], count: &mut usize) -> Status {
        let mut written: c_int = 0;
        // SAFETY: as for `audio_devices`
        let status = unsafe {
            NDGetCameraDevices(out.as_mut_ptr().cast(), out.len() as c_int, &mut written)
        };
        *count = (written.max(0) as usize).min(out.len());
        Status::from_raw(status)
    }

    fn release_device(&self, device: DeviceHandle) -> Status {
        // SAFETY: callers release each handle exactly once
        Status::from_raw(unsafe { NDReleaseMediaDevice(device.0) })
    }

    fn unique_id(&self, device: DeviceHandle, dst: &mut [u8]) -> Status {
        if dst.is_empty() {
            return Status::InvalidArgument;
        }
        // SAFETY: the library writes at most the fixed ID capacity, which
        // callers allocate
        Status::from_raw(unsafe { NDMediaDeviceGetUniqueID(device.0, dst.as_mut_ptr().cast()) })
    }

    fn name(&self, device: DeviceHandle, dst: &mut [u8]) -> Status {
        if dst.is_empty() {
            return Status::InvalidArgument;
        }
        // SAFETY: as for `unique_id`
        Status::from_raw(unsafe { NDMediaDeviceGetName(device.0, dst.as_mut_ptr().cast()) })
    }

    fn flags(&self, device: DeviceHandle) -> DeviceFlags {
        // SAFETY: live handle
        DeviceFlags(unsafe { NDMediaDeviceGetFlags(device.0) } as u32)
    }

    fn is_running(&self, device: DeviceHandle) -> bool {
        // SAFETY: live handle
        unsafe { NDMediaDeviceIsRunning(device.0) }
    }

    fn start_running(&self, device: DeviceHandle, handler: SampleBufferHandler, context: *mut c_void) -> Status {
        // SAFETY: `context` is an integer token, never dereferenced natively
        Status::from_raw(unsafe { NDMediaDeviceStartRunning(device.0, handler, context) })
    }

    fn stop_running(&self, device: DeviceHandle) -> Status {
        // SAFETY: live handle
        Status::from_raw(unsafe { NDMediaDeviceStopRunning(device.0) })
    }

    fn set_disconnect_handler(
        &self,
        device: DeviceHandle,
        handler: Option<DisconnectHandler>,
        context: *mut c_void,
    ) -> Status {
        // SAFETY: `context` is an integer token; `None` clears the handler
        Status::from_raw(unsafe { NDMediaDeviceSetDisconnectHandler(device.0, handler, context) })
    }

    fn property(&self, device: DeviceHandle, key: PropertyKey) -> PropertyValue {
        let d = device.0;
        // SAFETY: every getter takes a live handle and returns by value
        unsafe {
            match key {
                PropertyKey::EchoCancellation => PropertyValue::Bool(NDAudioDeviceEchoCancellation(d)),
                PropertyKey::SampleRate => PropertyValue::Int(NDAudioDeviceSampleRate(d)),
                PropertyKey::ChannelCount => PropertyValue::Int(NDAudioDeviceChannelCount(d)),
                PropertyKey::FieldOfView => Self::pair(d, NDCameraDeviceFieldOfView),
                PropertyKey::ExposureBiasRange => Self::pair(d, NDCameraDeviceExposureBiasRange),
                PropertyKey::ExposureDurationRange => Self::pair(d, NDCameraDeviceExposureDurationRange),
                PropertyKey::IsoRange => Self::pair(d, NDCameraDeviceISORange),
                PropertyKey::ZoomRange => Self::pair(d, NDCameraDeviceZoomRange),
                PropertyKey::PreviewResolution => Self::size(d, NDCameraDevicePreviewResolution),
                PropertyKey::PhotoResolution => Self::size(d, NDCameraDevicePhotoResolution),
                PropertyKey::FrameRate => PropertyValue::Int(NDCameraDeviceFrameRate(d)),
                PropertyKey::ExposureMode => PropertyValue::Int(NDCameraDeviceExposureMode(d)),
                PropertyKey::ExposureBias => PropertyValue::Float(NDCameraDeviceExposureBias(d)),
                PropertyKey::FlashMode => PropertyValue::Int(NDCameraDeviceFlashMode(d)),
                PropertyKey::FocusMode => PropertyValue::Int(NDCameraDeviceFocusMode(d)),
                PropertyKey::TorchMode => PropertyValue::Int(NDCameraDeviceTorchMode(d)),
                PropertyKey::WhiteBalanceMode => PropertyValue::Int(NDCameraDeviceWhiteBalanceMode(d)),
                PropertyKey::VideoStabilizationMode => {
                    PropertyValue::Int(NDCameraDeviceVideoStabilizationMode(d))
                }
                PropertyKey::ZoomRatio => PropertyValue::Float(NDCameraDeviceZoomRatio(d)),
                PropertyKey::ExposureDuration | PropertyKey::ExposurePoint | PropertyKey::FocusPoint => {
                    PropertyValue::None
                }
            }
        }
    }

    fn set_property(&self, device: DeviceHandle, key: PropertyKey, value: PropertyValue) {
        let d = device.0;
        let (int, float, (a, b)) = (value.as_int(), value.as_float(), value.as_pair());
        let (width, height) = value.as_size();
        // SAFETY: every setter takes a live handle and plain values
        unsafe {
            match key {
                PropertyKey::EchoCancellation => NDAudioDeviceSetEchoCancellation(d, value.as_bool()),
                PropertyKey::SampleRate => NDAudioDeviceSetSampleRate(d, int),
                PropertyKey::ChannelCount => NDAudioDeviceSetChannelCount(d, int),
                PropertyKey::PreviewResolution => {
                    NDCameraDeviceSetPreviewResolution(d, width as c_int, height as c_int)
                }
                PropertyKey::PhotoResolution => {
                    NDCameraDeviceSetPhotoResolution(d, width as c_int, height as c_int)
                }
                PropertyKey::FrameRate => NDCameraDeviceSetFrameRate(d, int),
                PropertyKey::ExposureMode => NDCameraDeviceSetExposureMode(d, int),
                PropertyKey::ExposureBias => NDCameraDeviceSetExposureBias(d, float),
                PropertyKey::ExposureDuration => NDCameraDeviceSetExposureDuration(d, a, b),
                PropertyKey::ExposurePoint => NDCameraDeviceSetExposurePoint(d, a, b),
                PropertyKey::FlashMode => NDCameraDeviceSetFlashMode(d, int),
                PropertyKey::FocusMode => NDCameraDeviceSetFocusMode(d, int),
                PropertyKey::FocusPoint => NDCameraDeviceSetFocusPoint(d, a, b),
                PropertyKey::TorchMode => NDCameraDeviceSetTorchMode(d, int),
                PropertyKey::WhiteBalanceMode => NDCameraDeviceSetWhiteBalanceMode(d, int),
                PropertyKey::VideoStabilizationMode => NDCameraDeviceSetVideoStabilizationMode(d, int),
                PropertyKey::ZoomRatio => NDCameraDeviceSetZoomRatio(d, float),
                PropertyKey::FieldOfView
                | PropertyKey::ExposureBiasRange
                | PropertyKey::ExposureDurationRange
                | PropertyKey::IsoRange
                | PropertyKey::ZoomRange => warn!(?key, "Ignoring write to read-only property"),
            }
        }
    }

    fn capture_photo(&self, device: DeviceHandle, handler: SampleBufferHandler, context: *mut c_void) {
        // SAFETY: `context` is an integer token taken exactly once by `handler`
        unsafe { NDCameraDeviceCapturePhoto(device.0, handler, context) }
    }

    fn audio_buffer(&self, sample: SampleHandle) -> RawAudioBuffer {
        let s = sample.0;
        // SAFETY: `sample` is the handle of the running audio callback
        unsafe {
            RawAudioBuffer {
                data: NDAudioBufferData(s),
                sample_count: NDAudioBufferSampleCount(s).max(0) as usize,
                sample_rate: non_negative(NDAudioBufferSampleRate(s)),
                channel_count: non_negative(NDAudioBufferChannelCount(s)),
                timestamp: NDAudioBufferTimestamp(s),
            }
        }
    }

    fn camera_image(&self, sample: SampleHandle) -> RawCameraImage {
        let s = sample.0;
        // SAFETY: `sample` is a retained camera sample
        unsafe {
            RawCameraImage {
                data: NDCameraImageData(s).cast(),
                data_size: NDCameraImageDataSize(s).max(0) as usize,
                format: NDCameraImageFormat(s),
                width: non_negative(NDCameraImageWidth(s)),
                height: non_negative(NDCameraImageHeight(s)),
                row_stride: non_negative(NDCameraImageRowStride(s)),
                timestamp: NDCameraImageTimestamp(s),
                vertically_mirrored: NDCameraImageVerticallyMirrored(s),
                plane_count: NDCameraImagePlaneCount(s).max(0) as usize,
            }
        }
    }

    fn camera_image_plane(&self, sample: SampleHandle, index: usize) -> RawPlane {
        let (s, i) = (sample.0, index as c_int);
        // SAFETY: `sample` is a retained camera sample and `index` is below
        // its plane count
        unsafe {
            RawPlane {
                data: NDCameraImagePlaneData(s, i).cast(),
                data_size: NDCameraImagePlaneDataSize(s, i).max(0) as usize,
                width: non_negative(NDCameraImagePlaneWidth(s, i)),
                height: non_negative(NDCameraImagePlaneHeight(s, i)),
                pixel_stride: non_negative(NDCameraImagePlanePixelStride(s, i)),
                row_stride: non_negative(NDCameraImagePlaneRowStride(s, i)),
            }
        }
    }

    fn camera_image_metadata(&self, sample: SampleHandle, key: MetadataKey, dst: &mut [f32]) -> bool {
        // SAFETY: `dst` has room for `dst.len()` floats
        unsafe { NDCameraImageMetadata(sample.0, key as c_int, dst.as_mut_ptr(), dst.len() as c_int) }
    }

    fn release_sample_buffer(&self, sample: SampleHandle) {
        // SAFETY: each retained sample is released once
        unsafe { NDReleaseSampleBuffer(sample.0) }
    }

    fn check_permissions(&self, kind: PermissionKind) -> PermissionStatus {
        // SAFETY: plain value call
        PermissionStatus::from_raw(unsafe { NDCheckPermissions(kind as c_int) })
    }

    fn request_permissions(&self, kind: PermissionKind, handler: PermissionHandler, context: *mut c_void) {
        // SAFETY: `context` is an integer token taken exactly once by `handler`
        unsafe { NDRequestPermissions(kind as c_int, handler, context) }
    }
}
