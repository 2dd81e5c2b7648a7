// SPDX-License-Identifier: GPL-3.0-only

//! Device discovery
//!
//! A query enumerates audio devices then cameras, wraps every handle, keeps
//! the ones the filter accepts and orders them so defaults and internal
//! devices come first (microphones before cameras within each group).

use crate::constants::{
    ENUMERATION_BUFFER_SIZE, SCORE_CAMERA, SCORE_EXTERNAL, SCORE_NOT_DEFAULT,
    SCORE_UNKNOWN_LOCATION,
};
use crate::context::{ContextShared, MediaContext};
use crate::devices::{AudioDevice, CameraDevice, Device, DeviceCore, DeviceKind, MediaDevice};
use crate::errors::Result;
use crate::native::{CaptureBoundary, DeviceHandle, DeviceLocation, Status};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Predicate selecting which discovered devices a query keeps
pub type DeviceFilter = dyn Fn(&Device) -> bool;

/// Ordered, filtered set of devices with a cyclic cursor
#[derive(Debug)]
pub struct DeviceQuery {
    devices: Vec<Device>,
    cursor: usize,
}

impl DeviceQuery {
    /// Discover devices using the configured capacity
    pub fn new(context: &MediaContext, filter: Option<&DeviceFilter>) -> Result<Self> {
        Self::discover(context, filter, context.config().enumeration_capacity)
    }

    /// Discover devices, keeping at most `capacity` after ordering
    pub fn discover(
        context: &MediaContext,
        filter: Option<&DeviceFilter>,
        capacity: usize,
    ) -> Result<Self> {
        let boundary = context.boundary();
        if context.config().configure_audio_session {
            boundary.configure_audio_session();
        }

        let shared = context.shared();
        let mut devices = Vec::new();
        enumerate(&shared, DeviceKind::Audio, &mut devices)?;
        enumerate(&shared, DeviceKind::Camera, &mut devices)?;
        let discovered = devices.len();

        if let Some(filter) = filter {
            // Rejected devices drop here and release their handles
            devices.retain(|device| filter(device));
        }
        devices.sort_by_key(score);
        devices.truncate(capacity);

        info!(
            discovered,
            kept = devices.len(),
            capacity,
            "Device discovery complete"
        );
        Ok(Self { devices, cursor: 0 })
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Device> {
        self.devices.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Device> {
        self.devices.iter()
    }

    /// Device under the cursor; `None` when the query is empty
    pub fn current(&self) -> Option<&Device> {
        self.devices.get(self.cursor)
    }

    /// Move the cursor to the next device, wrapping around
    pub fn advance(&mut self) {
        if !self.devices.is_empty() {
            self.cursor = (self.cursor + 1) % self.devices.len();
        }
    }

    pub fn into_devices(self) -> Vec<Device> {
        self.devices
    }
}

impl std::ops::Index<usize> for DeviceQuery {
    type Output = Device;

    fn index(&self, index: usize) -> &Device {
        &self.devices[index]
    }
}

impl<'a> IntoIterator for &'a DeviceQuery {
    type Item = &'a Device;
    type IntoIter = std::slice::Iter<'a, Device>;

    fn into_iter(self) -> Self::IntoIter {
        self.devices.iter()
    }
}

impl IntoIterator for DeviceQuery {
    type Item = Device;
    type IntoIter = std::vec::IntoIter<Device>;

    fn into_iter(self) -> Self::IntoIter {
        self.devices.into_iter()
    }
}

fn enumerate(shared: &Arc<ContextShared>, kind: DeviceKind, out: &mut Vec<Device>) -> Result<()> {
    let boundary: &dyn CaptureBoundary = shared.boundary.as_ref();
    let mut handles = [DeviceHandle::NULL; ENUMERATION_BUFFER_SIZE];
    let mut count = 0usize;
    let status: Status = match kind {
        DeviceKind::Audio => boundary.audio_devices(&mut handles, &mut count),
        DeviceKind::Camera => boundary.camera_devices(&mut handles, &mut count),
    };
    status.check()?;

    let count = count.min(handles.len());
    if count == ENUMERATION_BUFFER_SIZE {
        warn!(?kind, count, "Enumeration buffer full, further devices may be missing");
    }

    for &handle in &handles[..count] {
        if handle.is_null() {
            continue;
        }
        match DeviceCore::open(Arc::clone(shared), handle, kind) {
            Ok(core) => out.push(match kind {
                DeviceKind::Audio => Device::Audio(AudioDevice::from_core(core)),
                DeviceKind::Camera => Device::Camera(CameraDevice::from_core(core)),
            }),
            Err(e) => warn!(?kind, error = %e, "Skipping device that failed to open"),
        }
    }
    debug!(?kind, count, "Enumerated devices");
    Ok(())
}

/// Sort key: lower sorts first
pub(crate) fn score(device: &Device) -> u32 {
    let mut score = if device.is_default() { 0 } else { SCORE_NOT_DEFAULT };
    score += match device.location() {
        DeviceLocation::Internal => 0,
        DeviceLocation::External => SCORE_EXTERNAL,
        DeviceLocation::Unknown => SCORE_UNKNOWN_LOCATION,
    };
    if device.kind() == DeviceKind::Camera {
        score += SCORE_CAMERA;
    }
    score
}

/// Ready-made filters for [`DeviceQuery::discover`]
pub mod filters {
    use crate::devices::{Device, DeviceKind, MediaDevice};
    use crate::native::DeviceLocation;

    pub fn audio(device: &Device) -> bool {
        device.kind() == DeviceKind::Audio
    }

    pub fn camera(device: &Device) -> bool {
        device.kind() == DeviceKind::Camera
    }

    pub fn internal(device: &Device) -> bool {
        device.location() == DeviceLocation::Internal
    }

    pub fn external(device: &Device) -> bool {
        device.location() == DeviceLocation::External
    }

    pub fn default_device(device: &Device) -> bool {
        device.is_default()
    }

    pub fn front_camera(device: &Device) -> bool {
        device.as_camera().is_some_and(|camera| camera.front_facing())
    }

    pub fn rear_camera(device: &Device) -> bool {
        device.as_camera().is_some_and(|camera| !camera.front_facing())
    }

    pub fn torch(device: &Device) -> bool {
        device.as_camera().is_some_and(|camera| camera.torch_supported())
    }

    pub fn depth(device: &Device) -> bool {
        device.as_camera().is_some_and(|camera| camera.depth_supported())
    }

    pub fn echo_cancellation(device: &Device) -> bool {
        device
            .as_audio()
            .is_some_and(|audio| audio.echo_cancellation_supported())
    }
}
