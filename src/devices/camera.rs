// SPDX-License-Identifier: GPL-3.0-only

use super::core::DeviceCore;
use super::delegate_media_device;
use super::session::SessionHandler;
use crate::errors::Result;
use crate::media::CameraImage;
use crate::native::{DeviceFlags, PropertyKey, PropertyValue};
use std::sync::Arc;

macro_rules! native_enum {
    (@first $name:ident $first:ident $($rest:ident)*) => {
        $name::$first
    };
    (
        $(#[$meta:meta])*
        $name:ident { $($(#[$vmeta:meta])* $variant:ident = $value:expr),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(i32)]
        pub enum $name {
            $($(#[$vmeta])* $variant = $value),+
        }

        impl $name {
            /// Decode a native value, falling back to the first variant
            pub fn from_raw(value: i32) -> Self {
                match value {
                    $(v if v == $value => $name::$variant,)+
                    _ => native_enum!(@first $name $($variant)+),
                }
            }

            pub fn raw(self) -> i32 {
                self as i32
            }
        }
    };
}

native_enum! {
    /// Exposure control
    ExposureMode { Continuous = 0, Locked = 1, Manual = 2 }
}

native_enum! {
    FlashMode { Off = 0, On = 1, Auto = 2 }
}

native_enum! {
    FocusMode { Continuous = 0, Locked = 1 }
}

native_enum! {
    /// Torch level; the native side treats the value as a percentage
    TorchMode { Off = 0, Maximum = 100 }
}

native_enum! {
    WhiteBalanceMode { Continuous = 0, Locked = 1 }
}

native_enum! {
    VideoStabilizationMode { Off = 0, Standard = 1 }
}

/// A camera
///
/// Setters forward to the native side even when the matching capability
/// flag is absent; the native side clamps or ignores what it can't apply.
pub struct CameraDevice {
    pub(crate) core: Arc<DeviceCore>,
}

impl CameraDevice {
    pub(crate) fn from_core(core: Arc<DeviceCore>) -> Self {
        Self { core }
    }

    fn has(&self, flag: DeviceFlags) -> bool {
        self.core.flags().contains(flag)
    }

    fn pair(&self, key: PropertyKey) -> (f32, f32) {
        self.core.property(key).as_pair()
    }

    // --- Capabilities ---

    pub fn front_facing(&self) -> bool {
        self.has(DeviceFlags::FRONT_FACING)
    }

    pub fn flash_supported(&self) -> bool {
        self.has(DeviceFlags::FLASH)
    }

    pub fn torch_supported(&self) -> bool {
        self.has(DeviceFlags::TORCH)
    }

    pub fn depth_supported(&self) -> bool {
        self.has(DeviceFlags::DEPTH)
    }

    pub fn exposure_point_supported(&self) -> bool {
        self.has(DeviceFlags::EXPOSURE_POINT)
    }

    pub fn focus_point_supported(&self) -> bool {
        self.has(DeviceFlags::FOCUS_POINT)
    }

    pub fn exposure_mode_supported(&self, mode: ExposureMode) -> bool {
        self.has(match mode {
            ExposureMode::Continuous => DeviceFlags::EXPOSURE_CONTINUOUS,
            ExposureMode::Locked => DeviceFlags::EXPOSURE_LOCK,
            ExposureMode::Manual => DeviceFlags::EXPOSURE_MANUAL,
        })
    }

    pub fn focus_mode_supported(&self, mode: FocusMode) -> bool {
        self.has(match mode {
            FocusMode::Continuous => DeviceFlags::FOCUS_CONTINUOUS,
            FocusMode::Locked => DeviceFlags::FOCUS_LOCK,
        })
    }

    pub fn white_balance_mode_supported(&self, mode: WhiteBalanceMode) -> bool {
        self.has(match mode {
            WhiteBalanceMode::Continuous => DeviceFlags::WHITE_BALANCE_CONTINUOUS,
            WhiteBalanceMode::Locked => DeviceFlags::WHITE_BALANCE_LOCK,
        })
    }

    pub fn video_stabilization_mode_supported(&self, mode: VideoStabilizationMode) -> bool {
        match mode {
            VideoStabilizationMode::Off => true,
            VideoStabilizationMode::Standard => self.has(DeviceFlags::VIDEO_STABILIZATION),
        }
    }

    // --- Ranges ---

    /// Horizontal and vertical field of view in degrees
    pub fn field_of_view(&self) -> (f32, f32) {
        self.pair(PropertyKey::FieldOfView)
    }

    /// Exposure bias range in EV
    pub fn exposure_bias_range(&self) -> (f32, f32) {
        self.pair(PropertyKey::ExposureBiasRange)
    }

    /// Exposure duration range in seconds
    pub fn exposure_duration_range(&self) -> (f32, f32) {
        self.pair(PropertyKey::ExposureDurationRange)
    }

    pub fn iso_range(&self) -> (f32, f32) {
        self.pair(PropertyKey::IsoRange)
    }

    pub fn zoom_range(&self) -> (f32, f32) {
        self.pair(PropertyKey::ZoomRange)
    }

    // --- Properties ---

    pub fn preview_resolution(&self) -> (u32, u32) {
        self.core.property(PropertyKey::PreviewResolution).as_size()
    }

    pub fn set_preview_resolution(&self, width: u32, height: u32) {
        self.core
            .set_property(PropertyKey::PreviewResolution, PropertyValue::Size(width, height));
    }

    pub fn photo_resolution(&self) -> (u32, u32) {
        self.core.property(PropertyKey::PhotoResolution).as_size()
    }

    pub fn set_photo_resolution(&self, width: u32, height: u32) {
        self.core
            .set_property(PropertyKey::PhotoResolution, PropertyValue::Size(width, height));
    }

    pub fn frame_rate(&self) -> i32 {
        self.core.property(PropertyKey::FrameRate).as_int()
    }

    pub fn set_frame_rate(&self, frame_rate: i32) {
        self.core
            .set_property(PropertyKey::FrameRate, PropertyValue::Int(frame_rate));
    }

    pub fn exposure_mode(&self) -> ExposureMode {
        ExposureMode::from_raw(self.core.property(PropertyKey::ExposureMode).as_int())
    }

    pub fn set_exposure_mode(&self, mode: ExposureMode) {
        self.core
            .set_property(PropertyKey::ExposureMode, PropertyValue::Int(mode.raw()));
    }

    pub fn exposure_bias(&self) -> f32 {
        self.core.property(PropertyKey::ExposureBias).as_float()
    }

    pub fn set_exposure_bias(&self, bias: f32) {
        self.core
            .set_property(PropertyKey::ExposureBias, PropertyValue::Float(bias));
    }

    /// Manual exposure; `duration` in seconds
    pub fn set_exposure_duration(&self, duration: f32, iso: f32) {
        self.core
            .set_property(PropertyKey::ExposureDuration, PropertyValue::Pair(duration, iso));
    }

    /// Normalized point of interest in `[0, 1]`
    pub fn set_exposure_point(&self, x: f32, y: f32) {
        self.core
            .set_property(PropertyKey::ExposurePoint, PropertyValue::Pair(x, y));
    }

    pub fn flash_mode(&self) -> FlashMode {
        FlashMode::from_raw(self.core.property(PropertyKey::FlashMode).as_int())
    }

    pub fn set_flash_mode(&self, mode: FlashMode) {
        self.core
            .set_property(PropertyKey::FlashMode, PropertyValue::Int(mode.raw()));
    }

    pub fn focus_mode(&self) -> FocusMode {
        FocusMode::from_raw(self.core.property(PropertyKey::FocusMode).as_int())
    }

    pub fn set_focus_mode(&self, mode: FocusMode) {
        self.core
            .set_property(PropertyKey::FocusMode, PropertyValue::Int(mode.raw()));
    }

    /// Normalized point of interest in `[0, 1]`
    pub fn set_focus_point(&self, x: f32, y: f32) {
        self.core
            .set_property(PropertyKey::FocusPoint, PropertyValue::Pair(x, y));
    }

    pub fn torch_mode(&self) -> TorchMode {
        TorchMode::from_raw(self.core.property(PropertyKey::TorchMode).as_int())
    }

    pub fn set_torch_mode(&self, mode: TorchMode) {
        self.core
            .set_property(PropertyKey::TorchMode, PropertyValue::Int(mode.raw()));
    }

    pub fn white_balance_mode(&self) -> WhiteBalanceMode {
        WhiteBalanceMode::from_raw(self.core.property(PropertyKey::WhiteBalanceMode).as_int())
    }

    pub fn set_white_balance_mode(&self, mode: WhiteBalanceMode) {
        self.core
            .set_property(PropertyKey::WhiteBalanceMode, PropertyValue::Int(mode.raw()));
    }

    pub fn video_stabilization_mode(&self) -> VideoStabilizationMode {
        VideoStabilizationMode::from_raw(
            self.core
                .property(PropertyKey::VideoStabilizationMode)
                .as_int(),
        )
    }

    pub fn set_video_stabilization_mode(&self, mode: VideoStabilizationMode) {
        self.core.set_property(
            PropertyKey::VideoStabilizationMode,
            PropertyValue::Int(mode.raw()),
        );
    }

    pub fn zoom_ratio(&self) -> f32 {
        self.core.property(PropertyKey::ZoomRatio).as_float()
    }

    pub fn set_zoom_ratio(&self, ratio: f32) {
        self.core
            .set_property(PropertyKey::ZoomRatio, PropertyValue::Float(ratio));
    }

    // --- Capture ---

    /// Start streaming preview frames into `handler`
    ///
    /// With a main context attached, frames arriving on other threads are
    /// posted there and delivered on the next pump. Each frame stays valid
    /// until the handler returns.
    pub fn start_running<F>(&self, handler: F) -> Result<()>
    where
        F: Fn(&CameraImage<'_>) + Send + Sync + 'static,
    {
        self.core.start(SessionHandler::Camera(Arc::new(handler)))
    }

    /// Capture a single photo; `handler` runs once with the result
    pub fn capture_photo<F>(&self, handler: F)
    where
        F: FnOnce(&CameraImage<'_>) + Send + 'static,
    {
        self.core.capture_photo(Box::new(handler));
    }
}

delegate_media_device!(CameraDevice);
