// SPDX-License-Identifier: GPL-3.0-only

//! In-process capture backend
//!
//! [`VirtualBoundary`] implements [`CaptureBoundary`] with synthetic devices.
//! It behaves like the platform library where it matters to callers:
//!
//! - every enumeration hands out fresh handles that must be released
//! - sample callbacks run on a capture thread (or on the thread calling
//!   [`VirtualBoundary::emit`] in manual mode)
//! - `stop_running` returns only once no callback for that handle is in
//!   flight, unless it is called from inside one
//! - camera samples stay alive until `release_sample_buffer`
//!
//! Tests use the inspection methods to check that handles and samples are
//! released exactly once.

use super::{
    CaptureBoundary, DeviceFlags, DeviceHandle, DisconnectHandler, PermissionHandler,
    PropertyKey, PropertyValue, RawAudioBuffer, RawCameraImage, RawPlane, SampleBufferHandler,
    SampleHandle, Status,
};
use crate::devices::DeviceKind;
use crate::media::{ImageFormat, MetadataKey};
use crate::permissions::{PermissionKind, PermissionStatus};
use crate::sync::lock;
use std::collections::HashMap;
use std::ffi::c_void;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::{JoinHandle, ThreadId};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Chroma blue-difference value of the synthetic YUV pattern
pub const PATTERN_CB: u8 = 96;
/// Chroma red-difference value of the synthetic YUV pattern
pub const PATTERN_CR: u8 = 160;

/// Luma of the synthetic pattern at `(x, y)`: a diagonal gradient
pub fn pattern_luma(x: u32, y: u32, width: u32, height: u32) -> u8 {
    let span = (width + height).saturating_sub(2).max(1);
    ((x + y) * 255 / span) as u8
}

/// Colour of the synthetic RGBA pattern at `(x, y)`
pub fn pattern_rgba(x: u32, y: u32, width: u32, height: u32) -> [u8; 4] {
    [
        (x * 255 / width.saturating_sub(1).max(1)) as u8,
        (y * 255 / height.saturating_sub(1).max(1)) as u8,
        128,
        255,
    ]
}

/// Pixel layout a virtual camera produces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameLayout {
    /// Three planes, chroma pixel stride 1
    I420,
    /// Semi-planar, Cb first
    Nv12,
    /// Semi-planar, Cr first
    Nv21,
    Rgba,
    Bgra,
    /// Reports format code 0
    Unknown,
}

/// How streaming devices produce samples
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    /// Samples are produced only by [`VirtualBoundary::emit`]
    Manual,
    /// One capture thread per running device produces a sample every interval
    Threaded { interval: Duration },
}

/// Description of one synthetic device
#[derive(Debug, Clone)]
pub struct VirtualDeviceSpec {
    kind: DeviceKind,
    unique_id: String,
    name: String,
    flags: DeviceFlags,
    layout: FrameLayout,
    width: u32,
    height: u32,
    failing_identity: bool,
}

impl VirtualDeviceSpec {
    pub fn audio(unique_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(DeviceKind::Audio, unique_id, name)
    }

    pub fn camera(unique_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(DeviceKind::Camera, unique_id, name)
    }

    fn new(kind: DeviceKind, unique_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind,
            unique_id: unique_id.into(),
            name: name.into(),
            flags: DeviceFlags::INTERNAL,
            layout: FrameLayout::Nv12,
            width: 64,
            height: 48,
            failing_identity: false,
        }
    }

    pub fn with_flags(mut self, flags: DeviceFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_layout(mut self, layout: FrameLayout) -> Self {
        self.layout = layout;
        self
    }

    pub fn with_resolution(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Make unique ID and name queries fail, as a half-initialized device does
    pub fn with_failing_identity(mut self) -> Self {
        self.failing_identity = true;
        self
    }

    pub fn unique_id(&self) -> &str {
        &self.unique_id
    }

    fn default_properties(&self) -> HashMap<PropertyKey, PropertyValue> {
        use PropertyKey::*;
        match self.kind {
            DeviceKind::Audio => HashMap::from([
                (EchoCancellation, PropertyValue::Bool(false)),
                (SampleRate, PropertyValue::Int(48_000)),
                (ChannelCount, PropertyValue::Int(1)),
            ]),
            DeviceKind::Camera => HashMap::from([
                (FieldOfView, PropertyValue::Pair(64.0, 48.0)),
                (ExposureBiasRange, PropertyValue::Pair(-2.0, 2.0)),
                (ExposureDurationRange, PropertyValue::Pair(1.0 / 8000.0, 0.5)),
                (IsoRange, PropertyValue::Pair(50.0, 3200.0)),
                (ZoomRange, PropertyValue::Pair(1.0, 8.0)),
                (PreviewResolution, PropertyValue::Size(self.width, self.height)),
                (PhotoResolution, PropertyValue::Size(self.width, self.height)),
                (FrameRate, PropertyValue::Int(30)),
                (ExposureMode, PropertyValue::Int(0)),
                (ExposureBias, PropertyValue::Float(0.0)),
                (FlashMode, PropertyValue::Int(0)),
                (FocusMode, PropertyValue::Int(0)),
                (TorchMode, PropertyValue::Int(0)),
                (WhiteBalanceMode, PropertyValue::Int(0)),
                (VideoStabilizationMode, PropertyValue::Int(0)),
                (ZoomRatio, PropertyValue::Float(1.0)),
            ]),
        }
    }
}

/// Tracks threads currently inside a sample callback for one handle
#[derive(Default)]
struct DeliveryGate {
    delivering: Mutex<Vec<ThreadId>>,
    idle: Condvar,
}

impl DeliveryGate {
    fn enter(&self) {
        lock(&self.delivering).push(std::thread::current().id());
    }

    fn exit(&self) {
        let me = std::thread::current().id();
        let mut delivering = lock(&self.delivering);
        if let Some(pos) = delivering.iter().position(|id| *id == me) {
            delivering.swap_remove(pos);
        }
        self.idle.notify_all();
    }

    /// Wait until only the calling thread (if any) is delivering
    fn wait_idle(&self) {
        let me = std::thread::current().id();
        let mut delivering = lock(&self.delivering);
        while delivering.iter().any(|id| *id != me) {
            delivering = self
                .idle
                .wait(delivering)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

struct Stream {
    handler: SampleBufferHandler,
    context: usize,
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

struct HandleEntry {
    unique_id: String,
    stream: Option<Stream>,
    disconnect: Option<(DisconnectHandler, usize)>,
    gate: Arc<DeliveryGate>,
}

struct DeviceState {
    spec: VirtualDeviceSpec,
    properties: HashMap<PropertyKey, PropertyValue>,
    disconnected: bool,
    frame_index: u64,
    last_stream: Option<(SampleBufferHandler, usize)>,
    last_disconnect: Option<(DisconnectHandler, usize)>,
}

impl DeviceState {
    fn property(&self, key: PropertyKey) -> PropertyValue {
        self.properties
            .get(&key)
            .copied()
            .unwrap_or(PropertyValue::None)
    }

    fn next_sample(&mut self) -> SampleData {
        let index = self.frame_index;
        self.frame_index += 1;
        match self.spec.kind {
            DeviceKind::Audio => {
                let rate = self.property(PropertyKey::SampleRate).as_int().max(1) as u32;
                let channels = self.property(PropertyKey::ChannelCount).as_int().max(1) as u32;
                SampleData::Audio(synth_audio(rate, channels, index))
            }
            DeviceKind::Camera => {
                let (width, height) = self.property(PropertyKey::PreviewResolution).as_size();
                SampleData::Camera(self.frame(width, height, index * 33_333_333))
            }
        }
    }

    fn photo(&mut self) -> SampleData {
        let (width, height) = self.property(PropertyKey::PhotoResolution).as_size();
        SampleData::Camera(self.frame(width, height, self.frame_index * 33_333_333))
    }

    fn frame(&self, width: u32, height: u32, timestamp: u64) -> Frame {
        let mut frame = synth_frame(self.spec.layout, width.max(1), height.max(1));
        frame.timestamp = timestamp as i64;
        frame.mirrored = self.spec.flags.contains(DeviceFlags::FRONT_FACING);
        frame.exposure_bias = self.property(PropertyKey::ExposureBias).as_float();
        frame
    }
}

struct AudioSample {
    samples: Vec<f32>,
    sample_rate: u32,
    channel_count: u32,
    timestamp: i64,
}

struct PlaneDesc {
    offset: usize,
    len: usize,
    width: u32,
    height: u32,
    pixel_stride: u32,
    row_stride: u32,
}

struct Frame {
    format: ImageFormat,
    width: u32,
    height: u32,
    row_stride: u32,
    timestamp: i64,
    mirrored: bool,
    exposure_bias: f32,
    data: Vec<u8>,
    planes: Vec<PlaneDesc>,
}

enum SampleData {
    Audio(AudioSample),
    Camera(Frame),
}

fn synth_audio(sample_rate: u32, channel_count: u32, index: u64) -> AudioSample {
    // 10 ms chunks of a 440 Hz tone
    let frames = (sample_rate / 100).max(1) as usize;
    let start = index as usize * frames;
    let mut samples = Vec::with_capacity(frames * channel_count as usize);
    for frame in 0..frames {
        let t = (start + frame) as f32 / sample_rate as f32;
        let value = 0.5 * (2.0 * std::f32::consts::PI * 440.0 * t).sin();
        samples.extend(std::iter::repeat_n(value, channel_count as usize));
    }
    AudioSample {
        samples,
        sample_rate,
        channel_count,
        timestamp: (index * 10_000_000) as i64,
    }
}

fn synth_frame(layout: FrameLayout, width: u32, height: u32) -> Frame {
    let (w, h) = (width as usize, height as usize);
    let (cw, ch) = (w.div_ceil(2), h.div_ceil(2));
    let luma = || {
        (0..height)
            .flat_map(|y| (0..width).map(move |x| pattern_luma(x, y, width, height)))
            .collect::<Vec<u8>>()
    };
    let plane = |offset, len, pw: usize, ph: usize, pixel_stride: u32, row_stride: usize| PlaneDesc {
        offset,
        len,
        width: pw as u32,
        height: ph as u32,
        pixel_stride,
        row_stride: row_stride as u32,
    };

    let (format, row_stride, data, planes) = match layout {
        FrameLayout::I420 => {
            let mut data = luma();
            data.extend(std::iter::repeat_n(PATTERN_CB, cw * ch));
            data.extend(std::iter::repeat_n(PATTERN_CR, cw * ch));
            let planes = vec![
                plane(0, w * h, w, h, 1, w),
                plane(w * h, cw * ch, cw, ch, 1, cw),
                plane(w * h + cw * ch, cw * ch, cw, ch, 1, cw),
            ];
            (ImageFormat::YCbCr420, 0, data, planes)
        }
        FrameLayout::Nv12 | FrameLayout::Nv21 => {
            let mut data = luma();
            let pair = if layout == FrameLayout::Nv12 {
                [PATTERN_CB, PATTERN_CR]
            } else {
                [PATTERN_CR, PATTERN_CB]
            };
            for _ in 0..cw * ch {
                data.extend_from_slice(&pair);
            }
            // Each chroma plane view stops one byte short of the block
            let len = cw * ch * 2 - 1;
            let (cb, cr) = if layout == FrameLayout::Nv12 {
                (w * h, w * h + 1)
            } else {
                (w * h + 1, w * h)
            };
            let planes = vec![
                plane(0, w * h, w, h, 1, w),
                plane(cb, len, cw, ch, 2, cw * 2),
                plane(cr, len, cw, ch, 2, cw * 2),
            ];
            (ImageFormat::YCbCr420, 0, data, planes)
        }
        FrameLayout::Rgba | FrameLayout::Bgra => {
            let mut data = Vec::with_capacity(w * h * 4);
            for y in 0..height {
                for x in 0..width {
                    let [r, g, b, a] = pattern_rgba(x, y, width, height);
                    if layout == FrameLayout::Rgba {
                        data.extend_from_slice(&[r, g, b, a]);
                    } else {
                        data.extend_from_slice(&[b, g, r, a]);
                    }
                }
            }
            let format = if layout == FrameLayout::Rgba {
                ImageFormat::RGBA8888
            } else {
                ImageFormat::BGRA8888
            };
            (format, width * 4, data, Vec::new())
        }
        FrameLayout::Unknown => (ImageFormat::Unknown, width * 4, vec![0; w * h * 4], Vec::new()),
    };

    Frame {
        format,
        width,
        height,
        row_stride,
        timestamp: 0,
        mirrored: false,
        exposure_bias: 0.0,
        data,
        planes,
    }
}

struct Registry {
    delivery: DeliveryMode,
    required_token: Option<String>,
    session_status: Status,
    token: Option<String>,
    devices: Vec<DeviceState>,
    handles: HashMap<u64, HandleEntry>,
    released: Vec<String>,
    permissions: HashMap<PermissionKind, PermissionStatus>,
    answers: HashMap<PermissionKind, PermissionStatus>,
}

impl Registry {
    fn device_mut(&mut self, unique_id: &str) -> Option<&mut DeviceState> {
        self.devices
            .iter_mut()
            .find(|device| device.spec.unique_id == unique_id)
    }

    fn device_for(&self, handle: DeviceHandle) -> Option<&DeviceState> {
        let entry = self.handles.get(&handle_id(handle))?;
        self.devices
            .iter()
            .find(|device| device.spec.unique_id == entry.unique_id)
    }

    fn device_for_mut(&mut self, handle: DeviceHandle) -> Option<&mut DeviceState> {
        let unique_id = self.handles.get(&handle_id(handle))?.unique_id.clone();
        self.device_mut(&unique_id)
    }

    fn session_ok(&self) -> bool {
        match &self.required_token {
            Some(required) => self.token.as_ref() == Some(required),
            None => true,
        }
    }
}

struct State {
    registry: Mutex<Registry>,
    samples: Mutex<HashMap<u64, SampleData>>,
    next_id: AtomicU64,
    audio_session_configured: AtomicBool,
}

impl State {
    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Produce one sample for a running handle; false when not running
    fn deliver(&self, id: u64) -> bool {
        let (handler, context, gate, sample_id, is_audio) = {
            let mut registry = lock(&self.registry);
            let Some(entry) = registry.handles.get(&id) else {
                return false;
            };
            let Some(stream) = &entry.stream else {
                return false;
            };
            let (handler, context) = (stream.handler, stream.context);
            let gate = Arc::clone(&entry.gate);
            let unique_id = entry.unique_id.clone();
            let Some(device) = registry.device_mut(&unique_id) else {
                return false;
            };
            let sample = device.next_sample();
            let is_audio = matches!(sample, SampleData::Audio(_));
            let sample_id = self.next_id();
            lock(&self.samples).insert(sample_id, sample);
            // Entered under the registry lock so a concurrent stop either
            // sees this delivery or prevents it
            gate.enter();
            (handler, context, gate, sample_id, is_audio)
        };

        handler(to_context(context), id_to_ptr(sample_id));
        if is_audio {
            lock(&self.samples).remove(&sample_id);
        }
        gate.exit();
        true
    }

    /// Tear down the stream on `id`; waits for in-flight callbacks
    fn stop_stream(&self, id: u64) -> bool {
        let (stream, gate) = {
            let mut registry = lock(&self.registry);
            let Some(entry) = registry.handles.get_mut(&id) else {
                return false;
            };
            let Some(stream) = entry.stream.take() else {
                return false;
            };
            (stream, Arc::clone(&entry.gate))
        };

        stream.stop.store(true, Ordering::Release);
        if let Some(thread) = stream.thread
            && thread.thread().id() != std::thread::current().id()
            && thread.join().is_err()
        {
            warn!(handle = id, "Virtual capture thread panicked");
        }
        gate.wait_idle();
        true
    }
}

fn spawn_capture(
    state: Arc<State>,
    id: u64,
    interval: Duration,
    stop: Arc<AtomicBool>,
) -> std::io::Result<JoinHandle<()>> {
    std::thread::Builder::new()
        .name(format!("virtual-capture-{id}"))
        .spawn(move || {
            while !stop.load(Ordering::Acquire) {
                std::thread::sleep(interval);
                if stop.load(Ordering::Acquire) || !state.deliver(id) {
                    break;
                }
            }
            debug!(handle = id, "Virtual capture thread exiting");
        })
}

fn handle_id(handle: DeviceHandle) -> u64 {
    handle.0 as usize as u64
}

fn id_to_ptr(id: u64) -> *mut c_void {
    id as usize as *mut c_void
}

fn sample_id(sample: SampleHandle) -> u64 {
    sample.0 as usize as u64
}

fn to_context(context: usize) -> *mut c_void {
    context as *mut c_void
}

/// Synthetic capture backend
#[derive(Clone)]
pub struct VirtualBoundary {
    state: Arc<State>,
}

impl VirtualBoundary {
    pub fn new() -> Self {
        Self {
            state: Arc::new(State {
                registry: Mutex::new(Registry {
                    delivery: DeliveryMode::Manual,
                    required_token: None,
                    session_status: Status::Ok,
                    token: None,
                    devices: Vec::new(),
                    handles: HashMap::new(),
                    released: Vec::new(),
                    permissions: HashMap::new(),
                    answers: HashMap::new(),
                }),
                samples: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                audio_session_configured: AtomicBool::new(false),
            }),
        }
    }

    /// Two microphones and two cameras producing samples on capture threads
    pub fn demo() -> Self {
        Self::new()
            .with_device(
                VirtualDeviceSpec::audio("virtual-mic", "Built-in Microphone").with_flags(
                    DeviceFlags::INTERNAL | DeviceFlags::DEFAULT | DeviceFlags::ECHO_CANCELLATION,
                ),
            )
            .with_device(
                VirtualDeviceSpec::audio("virtual-usb-mic", "USB Microphone")
                    .with_flags(DeviceFlags::EXTERNAL),
            )
            .with_device(
                VirtualDeviceSpec::camera("virtual-cam-back", "Back Camera")
                    .with_flags(
                        DeviceFlags::INTERNAL
                            | DeviceFlags::DEFAULT
                            | DeviceFlags::FLASH
                            | DeviceFlags::TORCH
                            | DeviceFlags::DEPTH
                            | DeviceFlags::FOCUS_POINT
                            | DeviceFlags::EXPOSURE_POINT
                            | DeviceFlags::EXPOSURE_CONTINUOUS
                            | DeviceFlags::FOCUS_CONTINUOUS
                            | DeviceFlags::WHITE_BALANCE_CONTINUOUS,
                    )
                    .with_layout(FrameLayout::Nv12)
                    .with_resolution(640, 480),
            )
            .with_device(
                VirtualDeviceSpec::camera("virtual-cam-front", "Front Camera")
                    .with_flags(
                        DeviceFlags::INTERNAL
                            | DeviceFlags::FRONT_FACING
                            | DeviceFlags::EXPOSURE_CONTINUOUS
                            | DeviceFlags::FOCUS_CONTINUOUS,
                    )
                    .with_layout(FrameLayout::I420)
                    .with_resolution(320, 240),
            )
            .with_delivery(DeliveryMode::Threaded {
                interval: Duration::from_millis(33),
            })
    }

    pub fn with_device(self, spec: VirtualDeviceSpec) -> Self {
        lock(&self.state.registry).devices.push(DeviceState {
            properties: spec.default_properties(),
            spec,
            disconnected: false,
            frame_index: 0,
            last_stream: None,
            last_disconnect: None,
        });
        self
    }

    pub fn with_delivery(self, delivery: DeliveryMode) -> Self {
        lock(&self.state.registry).delivery = delivery;
        self
    }

    /// Reject enumeration unless this token was installed
    pub fn require_session_token(self, token: impl Into<String>) -> Self {
        lock(&self.state.registry).required_token = Some(token.into());
        self
    }

    /// Status returned for an accepted session (e.g. [`Status::LimitedPlan`])
    pub fn with_session_status(self, status: Status) -> Self {
        lock(&self.state.registry).session_status = status;
        self
    }

    /// Status reported by `check_permissions`
    pub fn with_permission(self, kind: PermissionKind, status: PermissionStatus) -> Self {
        lock(&self.state.registry).permissions.insert(kind, status);
        self
    }

    /// Answer given to the next permission prompt
    pub fn with_permission_answer(self, kind: PermissionKind, status: PermissionStatus) -> Self {
        lock(&self.state.registry).answers.insert(kind, status);
        self
    }

    /// Deliver one sample to every running handle of the device
    ///
    /// Returns the number of callbacks made.
    pub fn emit(&self, unique_id: &str) -> usize {
        let ids: Vec<u64> = lock(&self.state.registry)
            .handles
            .iter()
            .filter(|(_, entry)| entry.unique_id == unique_id && entry.stream.is_some())
            .map(|(id, _)| *id)
            .collect();
        ids.into_iter().filter(|id| self.state.deliver(*id)).count()
    }

    /// Unplug a device: stop its streams and fire disconnect callbacks
    ///
    /// The device disappears from later enumerations. Calling this twice
    /// fires the callbacks twice, as some platforms do.
    pub fn disconnect(&self, unique_id: &str) {
        let ids: Vec<u64> = {
            let mut registry = lock(&self.state.registry);
            if let Some(device) = registry.device_mut(unique_id) {
                device.disconnected = true;
            }
            registry
                .handles
                .iter()
                .filter(|(_, entry)| entry.unique_id == unique_id)
                .map(|(id, _)| *id)
                .collect()
        };
        info!(unique_id, handles = ids.len(), "Virtual device disconnected");

        for id in ids {
            self.state.stop_stream(id);
            let handler = lock(&self.state.registry)
                .handles
                .get(&id)
                .and_then(|entry| entry.disconnect);
            if let Some((handler, context)) = handler {
                handler(to_context(context));
            }
        }
    }

    /// Call the last disconnect callback registered for the device, even if
    /// it has since been cleared, as a late native notification would
    pub fn replay_disconnect(&self, unique_id: &str) -> bool {
        let last = lock(&self.state.registry)
            .device_mut(unique_id)
            .and_then(|device| device.last_disconnect);
        match last {
            Some((handler, context)) => {
                handler(to_context(context));
                true
            }
            None => false,
        }
    }

    /// Call the last sample callback registered for the device, even if its
    /// stream has stopped, as a late native callback would
    pub fn replay_sample(&self, unique_id: &str) -> bool {
        let (handler, context, sample_id, is_audio) = {
            let mut registry = lock(&self.state.registry);
            let Some(device) = registry.device_mut(unique_id) else {
                return false;
            };
            let Some((handler, context)) = device.last_stream else {
                return false;
            };
            let sample = device.next_sample();
            let is_audio = matches!(sample, SampleData::Audio(_));
            let sample_id = self.state.next_id();
            lock(&self.state.samples).insert(sample_id, sample);
            (handler, context, sample_id, is_audio)
        };
        handler(to_context(context), id_to_ptr(sample_id));
        if is_audio {
            lock(&self.state.samples).remove(&sample_id);
        }
        true
    }

    /// Unique IDs of released handles, in release order
    pub fn released_devices(&self) -> Vec<String> {
        lock(&self.state.registry).released.clone()
    }

    /// How many handles for the device have been released
    pub fn release_count(&self, unique_id: &str) -> usize {
        lock(&self.state.registry)
            .released
            .iter()
            .filter(|id| *id == unique_id)
            .count()
    }

    /// Handles handed out and not yet released
    pub fn live_handles(&self) -> usize {
        lock(&self.state.registry).handles.len()
    }

    /// Camera samples delivered and not yet released
    pub fn outstanding_samples(&self) -> usize {
        lock(&self.state.samples).len()
    }

    /// Current value of a device property, looked up by unique ID
    pub fn device_property(&self, unique_id: &str, key: PropertyKey) -> Option<PropertyValue> {
        lock(&self.state.registry)
            .device_mut(unique_id)
            .and_then(|device| device.properties.get(&key).copied())
    }

    /// Whether any handle of the device is streaming
    pub fn is_streaming(&self, unique_id: &str) -> bool {
        lock(&self.state.registry)
            .handles
            .values()
            .any(|entry| entry.unique_id == unique_id && entry.stream.is_some())
    }

    pub fn session_token(&self) -> Option<String> {
        lock(&self.state.registry).token.clone()
    }

    pub fn audio_session_configured(&self) -> bool {
        self.state.audio_session_configured.load(Ordering::Acquire)
    }

    fn enumerate(&self, kind: DeviceKind, out: &mut [DeviceHandle], count: &mut usize) -> Status {
        *count = 0;
        let mut registry = lock(&self.state.registry);
        if !registry.session_ok() {
            return Status::InvalidSession;
        }
        let unique_ids: Vec<String> = registry
            .devices
            .iter()
            .filter(|device| device.spec.kind == kind && !device.disconnected)
            .map(|device| device.spec.unique_id.clone())
            .take(out.len())
            .collect();

        for (slot, unique_id) in out.iter_mut().zip(unique_ids) {
            let id = self.state.next_id();
            registry.handles.insert(
                id,
                HandleEntry {
                    unique_id,
                    stream: None,
                    disconnect: None,
                    gate: Arc::new(DeliveryGate::default()),
                },
            );
            *slot = DeviceHandle(id_to_ptr(id));
            *count += 1;
        }
        registry.session_status
    }

    fn identity_string(
        &self,
        device: DeviceHandle,
        dst: &mut [u8],
        pick: fn(&VirtualDeviceSpec) -> &str,
    ) -> Status {
        let registry = lock(&self.state.registry);
        match registry.device_for(device) {
            Some(state) if state.spec.failing_identity => Status::InvalidOperation,
            Some(state) => super::write_c_string(pick(&state.spec), dst),
            None => Status::InvalidArgument,
        }
    }
}

impl Default for VirtualBoundary {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureBoundary for VirtualBoundary {
    fn set_session_token(&self, token: Option<&str>) -> Status {
        let mut registry = lock(&self.state.registry);
        registry.token = token.map(str::to_owned);
        if registry.session_ok() {
            registry.session_status
        } else {
            Status::InvalidSession
        }
    }

    fn configure_audio_session(&self) {
        self.state
            .audio_session_configured
            .store(true, Ordering::Release);
    }

    fn audio_devices(&self, out: &mut [DeviceHandle], count: &mut usize) -> Status {
        self.enumerate(DeviceKind::Audio, out, count)
    }

    fn camera_devices(&self, out: &mut [DeviceHandle], count: &mut usize) -> Status {
        self.enumerate(DeviceKind::Camera, out, count)
    }

    fn release_device(&self, device: DeviceHandle) -> Status {
        let id = handle_id(device);
        self.state.stop_stream(id);
        let mut registry = lock(&self.state.registry);
        match registry.handles.remove(&id) {
            Some(entry) => {
                registry.released.push(entry.unique_id);
                Status::Ok
            }
            None => Status::InvalidArgument,
        }
    }

    fn unique_id(&self, device: DeviceHandle, dst: &mut [u8]) -> Status {
        self.identity_string(device, dst, |spec| &spec.unique_id)
    }

    fn name(&self, device: DeviceHandle, dst: &mut [u8]) -> Status {
        self.identity_string(device, dst, |spec| &spec.name)
    }

    fn flags(&self, device: DeviceHandle) -> DeviceFlags {
        lock(&self.state.registry)
            .device_for(device)
            .map_or(DeviceFlags::empty(), |state| state.spec.flags)
    }

    fn is_running(&self, device: DeviceHandle) -> bool {
        lock(&self.state.registry)
            .handles
            .get(&handle_id(device))
            .is_some_and(|entry| entry.stream.is_some())
    }

    fn start_running(
        &self,
        device: DeviceHandle,
        handler: SampleBufferHandler,
        context: *mut c_void,
    ) -> Status {
        let id = handle_id(device);
        let mut registry = lock(&self.state.registry);
        let delivery = registry.delivery;
        let Some(state) = registry.device_for_mut(device) else {
            return Status::InvalidArgument;
        };
        if state.disconnected {
            return Status::InvalidOperation;
        }
        state.last_stream = Some((handler, context as usize));

        let Some(entry) = registry.handles.get_mut(&id) else {
            return Status::InvalidArgument;
        };
        if entry.stream.is_some() {
            return Status::InvalidOperation;
        }

        let stop = Arc::new(AtomicBool::new(false));
        let thread = match delivery {
            DeliveryMode::Manual => None,
            DeliveryMode::Threaded { interval } => {
                match spawn_capture(Arc::clone(&self.state), id, interval, Arc::clone(&stop)) {
                    Ok(thread) => Some(thread),
                    Err(e) => {
                        warn!(error = %e, "Failed to spawn virtual capture thread");
                        return Status::InvalidOperation;
                    }
                }
            }
        };
        entry.stream = Some(Stream {
            handler,
            context: context as usize,
            stop,
            thread,
        });
        debug!(handle = id, unique_id = %entry.unique_id, "Virtual stream started");
        Status::Ok
    }

    fn stop_running(&self, device: DeviceHandle) -> Status {
        let id = handle_id(device);
        if !lock(&self.state.registry).handles.contains_key(&id) {
            return Status::InvalidArgument;
        }
        if self.state.stop_stream(id) {
            debug!(handle = id, "Virtual stream stopped");
        }
        Status::Ok
    }

    fn set_disconnect_handler(
        &self,
        device: DeviceHandle,
        handler: Option<DisconnectHandler>,
        context: *mut c_void,
    ) -> Status {
        let id = handle_id(device);
        let mut registry = lock(&self.state.registry);
        let registration = handler.map(|handler| (handler, context as usize));
        let Some(entry) = registry.handles.get_mut(&id) else {
            return Status::InvalidArgument;
        };
        entry.disconnect = registration;
        if registration.is_some()
            && let Some(state) = registry.device_for_mut(device)
        {
            state.last_disconnect = registration;
        }
        Status::Ok
    }

    fn property(&self, device: DeviceHandle, key: PropertyKey) -> PropertyValue {
        lock(&self.state.registry)
            .device_for(device)
            .map_or(PropertyValue::None, |state| state.property(key))
    }

    fn set_property(&self, device: DeviceHandle, key: PropertyKey, value: PropertyValue) {
        if let Some(state) = lock(&self.state.registry).device_for_mut(device) {
            state.properties.insert(key, value);
        }
    }

    fn capture_photo(&self, device: DeviceHandle, handler: SampleBufferHandler, context: *mut c_void) {
        let (sample, delivery) = {
            let mut registry = lock(&self.state.registry);
            let delivery = registry.delivery;
            let Some(state) = registry.device_for_mut(device) else {
                warn!("Photo requested on an unknown handle");
                return;
            };
            if state.spec.kind != DeviceKind::Camera {
                warn!("Photo requested on an audio device");
                return;
            }
            (state.photo(), delivery)
        };
        let sample_id = self.state.next_id();
        lock(&self.state.samples).insert(sample_id, sample);

        let context = context as usize;
        match delivery {
            DeliveryMode::Manual => handler(to_context(context), id_to_ptr(sample_id)),
            DeliveryMode::Threaded { .. } => {
                let spawned = std::thread::Builder::new()
                    .name("virtual-photo".to_string())
                    .spawn(move || handler(to_context(context), id_to_ptr(sample_id)));
                if let Err(e) = spawned {
                    warn!(error = %e, "Failed to spawn photo thread, delivering inline");
                    handler(to_context(context), id_to_ptr(sample_id));
                }
            }
        }
    }

    fn audio_buffer(&self, sample: SampleHandle) -> RawAudioBuffer {
        match lock(&self.state.samples).get(&sample_id(sample)) {
            Some(SampleData::Audio(audio)) => RawAudioBuffer {
                data: audio.samples.as_ptr(),
                sample_count: audio.samples.len(),
                sample_rate: audio.sample_rate,
                channel_count: audio.channel_count,
                timestamp: audio.timestamp,
            },
            _ => RawAudioBuffer {
                data: std::ptr::null(),
                sample_count: 0,
                sample_rate: 0,
                channel_count: 0,
                timestamp: 0,
            },
        }
    }

    fn camera_image(&self, sample: SampleHandle) -> RawCameraImage {
        match lock(&self.state.samples).get(&sample_id(sample)) {
            Some(SampleData::Camera(frame)) => RawCameraImage {
                data: frame.data.as_ptr(),
                data_size: frame.data.len(),
                format: frame.format as i32,
                width: frame.width,
                height: frame.height,
                row_stride: frame.row_stride,
                timestamp: frame.timestamp,
                vertically_mirrored: frame.mirrored,
                plane_count: frame.planes.len(),
            },
            _ => RawCameraImage {
                data: std::ptr::null(),
                data_size: 0,
                format: 0,
                width: 0,
                height: 0,
                row_stride: 0,
                timestamp: 0,
                vertically_mirrored: false,
                plane_count: 0,
            },
        }
    }

    fn camera_image_plane(&self, sample: SampleHandle, index: usize) -> RawPlane {
        let samples = lock(&self.state.samples);
        match samples.get(&sample_id(sample)) {
            Some(SampleData::Camera(frame)) if index < frame.planes.len() => {
                let plane = &frame.planes[index];
                RawPlane {
                    data: frame.data[plane.offset..].as_ptr(),
                    data_size: plane.len,
                    width: plane.width,
                    height: plane.height,
                    pixel_stride: plane.pixel_stride,
                    row_stride: plane.row_stride,
                }
            }
            _ => RawPlane {
                data: std::ptr::null(),
                data_size: 0,
                width: 0,
                height: 0,
                pixel_stride: 0,
                row_stride: 0,
            },
        }
    }

    fn camera_image_metadata(&self, sample: SampleHandle, key: MetadataKey, dst: &mut [f32]) -> bool {
        let samples = lock(&self.state.samples);
        let Some(SampleData::Camera(frame)) = samples.get(&sample_id(sample)) else {
            return false;
        };
        let (fx, fy) = (frame.width as f32, frame.width as f32);
        let (cx, cy) = (frame.width as f32 / 2.0, frame.height as f32 / 2.0);
        let values = match key {
            MetadataKey::IntrinsicMatrix => vec![fx, 0.0, cx, 0.0, fy, cy, 0.0, 0.0, 1.0],
            MetadataKey::ExposureBias => vec![frame.exposure_bias],
            MetadataKey::ExposureDuration => vec![1.0 / 60.0],
            MetadataKey::FocalLength => vec![4.25],
            MetadataKey::FNumber => vec![1.8],
            MetadataKey::Brightness => vec![3.5],
            MetadataKey::Iso => vec![100.0],
        };
        if dst.len() < values.len() {
            return false;
        }
        dst[..values.len()].copy_from_slice(&values);
        true
    }

    fn release_sample_buffer(&self, sample: SampleHandle) {
        if lock(&self.state.samples).remove(&sample_id(sample)).is_none() {
            warn!(sample = sample_id(sample), "Released an unknown sample");
        }
    }

    fn check_permissions(&self, kind: PermissionKind) -> PermissionStatus {
        lock(&self.state.registry)
            .permissions
            .get(&kind)
            .copied()
            .unwrap_or(PermissionStatus::Authorized)
    }

    fn request_permissions(&self, kind: PermissionKind, handler: PermissionHandler, context: *mut c_void) {
        let (answer, delivery) = {
            let mut registry = lock(&self.state.registry);
            let current = registry
                .permissions
                .get(&kind)
                .copied()
                .unwrap_or(PermissionStatus::Authorized);
            let answer = registry.answers.get(&kind).copied().unwrap_or(current);
            registry.permissions.insert(kind, answer);
            (answer, registry.delivery)
        };
        let context = context as usize;
        match delivery {
            DeliveryMode::Manual => handler(to_context(context), answer as i32),
            DeliveryMode::Threaded { .. } => {
                let spawned = std::thread::Builder::new()
                    .name("virtual-permission".to_string())
                    .spawn(move || handler(to_context(context), answer as i32));
                if let Err(e) = spawned {
                    warn!(error = %e, "Failed to spawn permission thread, answering inline");
                    handler(to_context(context), answer as i32);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::read_c_string;

    fn handles(boundary: &VirtualBoundary, kind: DeviceKind) -> Vec<DeviceHandle> {
        let mut out = [DeviceHandle::NULL; 8];
        let mut count = 0;
        let status = match kind {
            DeviceKind::Audio => boundary.audio_devices(&mut out, &mut count),
            DeviceKind::Camera => boundary.camera_devices(&mut out, &mut count),
        };
        assert_eq!(status, Status::Ok);
        out[..count].to_vec()
    }

    #[test]
    fn test_enumeration_hands_out_fresh_handles() {
        let boundary = VirtualBoundary::new()
            .with_device(VirtualDeviceSpec::audio("mic", "Mic"))
            .with_device(VirtualDeviceSpec::camera("cam", "Cam"));
        let first = handles(&boundary, DeviceKind::Camera);
        let second = handles(&boundary, DeviceKind::Camera);
        assert_eq!(first.len(), 1);
        assert_ne!(first[0], second[0]);
        assert_eq!(boundary.live_handles(), 2);

        let mut buf = [0u8; 16];
        assert_eq!(boundary.unique_id(first[0], &mut buf), Status::Ok);
        assert_eq!(read_c_string(&buf), "cam");

        assert_eq!(boundary.release_device(first[0]), Status::Ok);
        assert_eq!(boundary.release_device(first[0]), Status::InvalidArgument);
        assert_eq!(boundary.release_count("cam"), 1);
    }

    #[test]
    fn test_session_token_gate() {
        let boundary = VirtualBoundary::new()
            .with_device(VirtualDeviceSpec::audio("mic", "Mic"))
            .require_session_token("secret");
        let mut out = [DeviceHandle::NULL; 4];
        let mut count = 0;
        assert_eq!(
            boundary.audio_devices(&mut out, &mut count),
            Status::InvalidSession
        );
        assert_eq!(boundary.set_session_token(Some("secret")), Status::Ok);
        assert_eq!(boundary.audio_devices(&mut out, &mut count), Status::Ok);
        assert_eq!(count, 1);
        boundary.release_device(out[0]);
    }

    #[test]
    fn test_nv21_chroma_planes_are_swapped() {
        let frame = synth_frame(FrameLayout::Nv21, 4, 2);
        let (cb, cr) = (&frame.planes[1], &frame.planes[2]);
        assert_eq!(cb.offset, cr.offset + 1);
        assert_eq!(frame.data[cb.offset], PATTERN_CB);
        assert_eq!(frame.data[cr.offset], PATTERN_CR);
        assert_eq!(cb.pixel_stride, 2);
    }

    #[test]
    fn test_i420_plane_sizes_round_up() {
        let frame = synth_frame(FrameLayout::I420, 5, 3);
        assert_eq!(frame.planes[0].len, 15);
        assert_eq!(frame.planes[1].len, 6);
        assert_eq!(frame.data.len(), 15 + 12);
    }

    #[test]
    fn test_bgra_swizzles_pattern() {
        let frame = synth_frame(FrameLayout::Bgra, 2, 2);
        let [r, g, b, a] = pattern_rgba(0, 0, 2, 2);
        assert_eq!(&frame.data[..4], &[b, g, r, a]);
        assert_eq!(frame.row_stride, 8);
    }
}
