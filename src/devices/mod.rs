// SPDX-License-Identifier: GPL-3.0-only

//! Capture devices
//!
//! Each device exclusively owns one native handle and runs at most one
//! streaming session at a time:
//!
//! ```text
//! Idle ──start_running──▶ Running
//! Running ──stop_running──▶ Idle
//! Running ──native disconnect──▶ Idle   (session torn down, observers fire)
//! ```
//!
//! Starting while running is an [`Error::InvalidOperation`](crate::Error);
//! stopping while idle is a no-op. Dropping a device stops it and releases
//! the native handle exactly once.

mod audio;
mod camera;
mod core;
mod session;

pub use audio::AudioDevice;
pub use camera::{
    CameraDevice, ExposureMode, FlashMode, FocusMode, TorchMode, VideoStabilizationMode,
    WhiteBalanceMode,
};

pub(crate) use self::core::DeviceCore;

use crate::errors::Result;
use crate::native::{DeviceFlags, DeviceLocation};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Which kind of media a device captures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceKind {
    Audio,
    Camera,
}

/// Cached identity of a device
///
/// Unique ID and name are fetched once at construction; native queries for
/// them are not reliable after a disconnect.
#[derive(Debug, Clone)]
pub struct DeviceIdentity {
    pub kind: DeviceKind,
    pub unique_id: String,
    pub name: String,
}

impl PartialEq for DeviceIdentity {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.unique_id == other.unique_id
    }
}

impl Eq for DeviceIdentity {}

impl Hash for DeviceIdentity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.kind.hash(state);
        self.unique_id.hash(state);
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            DeviceKind::Audio => write!(f, "microphone:{}", self.unique_id),
            DeviceKind::Camera => write!(f, "camera:{}", self.unique_id),
        }
    }
}

/// Identifies a registered disconnect observer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(pub(crate) u64);

/// Behavior shared by audio and camera devices
pub trait MediaDevice: Send + Sync {
    fn identity(&self) -> &Arc<DeviceIdentity>;

    fn flags(&self) -> DeviceFlags;

    fn is_running(&self) -> bool;

    /// Stop streaming; a no-op when not running
    fn stop_running(&self) -> Result<()>;

    /// Register an observer invoked once when the device disconnects
    fn on_disconnected(&self, observer: Box<dyn Fn() + Send + Sync>) -> ObserverId;

    fn remove_disconnect_observer(&self, id: ObserverId) -> bool;

    fn kind(&self) -> DeviceKind {
        self.identity().kind
    }

    fn unique_id(&self) -> &str {
        &self.identity().unique_id
    }

    fn name(&self) -> &str {
        &self.identity().name
    }

    fn location(&self) -> DeviceLocation {
        self.flags().location()
    }

    /// Whether this is the default device for its media type
    fn is_default(&self) -> bool {
        self.flags().contains(DeviceFlags::DEFAULT)
    }
}

macro_rules! delegate_media_device {
    ($device:ty) => {
        impl $crate::devices::MediaDevice for $device {
            fn identity(&self) -> &std::sync::Arc<$crate::devices::DeviceIdentity> {
                self.core.identity()
            }

            fn flags(&self) -> $crate::native::DeviceFlags {
                self.core.flags()
            }

            fn is_running(&self) -> bool {
                self.core.is_running()
            }

            fn stop_running(&self) -> $crate::errors::Result<()> {
                self.core.stop()
            }

            fn on_disconnected(
                &self,
                observer: Box<dyn Fn() + Send + Sync>,
            ) -> $crate::devices::ObserverId {
                self.core.add_observer(observer)
            }

            fn remove_disconnect_observer(&self, id: $crate::devices::ObserverId) -> bool {
                self.core.remove_observer(id)
            }
        }

        impl PartialEq for $device {
            fn eq(&self, other: &Self) -> bool {
                self.core.identity() == other.core.identity()
            }
        }

        impl Eq for $device {}

        impl std::fmt::Display for $device {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                std::fmt::Display::fmt(self.core.identity().as_ref(), f)
            }
        }

        impl std::fmt::Debug for $device {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.debug_struct(stringify!($device))
                    .field("unique_id", &self.core.identity().unique_id)
                    .field("name", &self.core.identity().name)
                    .field("running", &self.core.is_running())
                    .finish()
            }
        }
    };
}

pub(crate) use delegate_media_device;

/// A discovered device of either kind
#[derive(Debug, PartialEq, Eq)]
pub enum Device {
    Audio(AudioDevice),
    Camera(CameraDevice),
}

impl Device {
    pub fn as_media(&self) -> &dyn MediaDevice {
        match self {
            Device::Audio(device) => device,
            Device::Camera(device) => device,
        }
    }

    pub fn as_audio(&self) -> Option<&AudioDevice> {
        match self {
            Device::Audio(device) => Some(device),
            Device::Camera(_) => None,
        }
    }

    pub fn as_camera(&self) -> Option<&CameraDevice> {
        match self {
            Device::Camera(device) => Some(device),
            Device::Audio(_) => None,
        }
    }

    pub fn into_audio(self) -> Option<AudioDevice> {
        match self {
            Device::Audio(device) => Some(device),
            Device::Camera(_) => None,
        }
    }

    pub fn into_camera(self) -> Option<CameraDevice> {
        match self {
            Device::Camera(device) => Some(device),
            Device::Audio(_) => None,
        }
    }
}

impl MediaDevice for Device {
    fn identity(&self) -> &Arc<DeviceIdentity> {
        self.as_media().identity()
    }

    fn flags(&self) -> DeviceFlags {
        self.as_media().flags()
    }

    fn is_running(&self) -> bool {
        self.as_media().is_running()
    }

    fn stop_running(&self) -> Result<()> {
        self.as_media().stop_running()
    }

    fn on_disconnected(&self, observer: Box<dyn Fn() + Send + Sync>) -> ObserverId {
        self.as_media().on_disconnected(observer)
    }

    fn remove_disconnect_observer(&self, id: ObserverId) -> bool {
        self.as_media().remove_disconnect_observer(id)
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self.identity().as_ref(), f)
    }
}

impl From<AudioDevice> for Device {
    fn from(device: AudioDevice) -> Self {
        Device::Audio(device)
    }
}

impl From<CameraDevice> for Device {
    fn from(device: CameraDevice) -> Self {
        Device::Camera(device)
    }
}
