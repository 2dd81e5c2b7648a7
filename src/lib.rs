// SPDX-License-Identifier: GPL-3.0-only

//! Media Capture - audio and camera devices over a native capture library
//!
//! This library wraps a platform capture library behind a safe Rust API:
//! device discovery, streaming with zero-copy sample delivery, permissions,
//! and conversion of camera frames into RGBA8888 on the CPU or GPU.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`native`]: The C ABI boundary, plus an in-process virtual backend
//! - [`context`]: Process-wide setup from an explicit [`Config`]
//! - [`query`]: Device discovery, filtering and ordering
//! - [`devices`]: Audio and camera devices and their streaming sessions
//! - [`media`]: Audio buffers and camera images handed to callbacks
//! - [`conversion`]: Pixel format conversion to RGBA8888
//! - [`outputs`]: Ready-made sinks for audio and camera streams
//! - [`permissions`]: Platform permission providers
//! - [`dispatch`]: Main-thread marshaling and app lifecycle
//!
//! # Example
//!
//! ```ignore
//! let context = MediaContext::new(Config::load_default(), Arc::new(VirtualBoundary::demo()))?;
//! let query = DeviceQuery::new(&context, Some(&query::filters::camera))?;
//! let camera = query.current().and_then(Device::as_camera).unwrap();
//! let preview = Arc::new(PixelBufferOutput::new());
//! camera.start_running(outputs::camera_handler(Arc::clone(&preview)))?;
//! ```

pub mod buffer;
pub mod config;
pub mod constants;
pub mod context;
pub mod conversion;
pub mod devices;
pub mod dispatch;
pub mod errors;
pub mod gpu;
pub mod media;
pub mod native;
pub mod outputs;
pub mod permissions;
pub mod query;
mod sync;
pub mod token;

// Re-export commonly used types
pub use config::Config;
pub use context::MediaContext;
pub use conversion::{ConversionOptions, CpuConverter, GpuConverter, Mirror, Orientation, Rotation};
pub use devices::{AudioDevice, CameraDevice, Device, DeviceKind, MediaDevice};
pub use dispatch::{Lifecycle, MainContext};
pub use errors::{Error, Result};
pub use media::{AudioBuffer, CameraImage, ImageFormat};
pub use permissions::{PermissionKind, PermissionStatus, Permissions};
pub use query::DeviceQuery;
