// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for device lifecycle and streaming

use media_capture::native::virtual_device::{VirtualBoundary, VirtualDeviceSpec};
use media_capture::native::{DeviceFlags, PropertyKey, PropertyValue};
use media_capture::query::filters;
use media_capture::{
    AudioBuffer, CameraImage, Config, Device, DeviceQuery, Error, MediaContext, MediaDevice,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

fn boundary() -> VirtualBoundary {
    VirtualBoundary::new()
        .with_device(
            VirtualDeviceSpec::audio("mic", "Microphone")
                .with_flags(DeviceFlags::INTERNAL | DeviceFlags::DEFAULT),
        )
        .with_device(
            VirtualDeviceSpec::camera("cam", "Camera")
                .with_flags(DeviceFlags::INTERNAL | DeviceFlags::DEFAULT)
                .with_resolution(8, 6),
        )
}

fn context(boundary: &VirtualBoundary) -> MediaContext {
    MediaContext::new(Config::default(), Arc::new(boundary.clone())).unwrap()
}

fn counter() -> (Arc<AtomicUsize>, impl Fn(&CameraImage<'_>) + Send + Sync + 'static) {
    let count = Arc::new(AtomicUsize::new(0));
    let handler_count = Arc::clone(&count);
    (count, move |_: &CameraImage<'_>| {
        handler_count.fetch_add(1, Ordering::SeqCst);
    })
}

fn camera(context: &MediaContext) -> media_capture::CameraDevice {
    DeviceQuery::new(context, Some(&filters::camera))
        .unwrap()
        .into_devices()
        .into_iter()
        .find_map(Device::into_camera)
        .expect("camera")
}

#[test]
fn test_stop_twice_is_a_no_op() {
    let boundary = boundary();
    let context = context(&boundary);
    let camera = camera(&context);
    let (count, handler) = counter();

    camera.start_running(handler).unwrap();
    assert!(camera.is_running());
    assert_eq!(boundary.emit("cam"), 1);

    camera.stop_running().unwrap();
    camera.stop_running().unwrap();
    assert!(!camera.is_running());
    assert!(!boundary.is_streaming("cam"));
    assert_eq!(boundary.emit("cam"), 0);
    assert_eq!(count.load(Ordering::SeqCst), 1);
    assert_eq!(boundary.release_count("cam"), 0);
}

#[test]
fn test_start_while_running_is_rejected() {
    let boundary = boundary();
    let context = context(&boundary);
    let camera = camera(&context);
    let (_, first) = counter();
    let (_, second) = counter();

    camera.start_running(first).unwrap();
    let err = camera.start_running(second).unwrap_err();
    assert!(matches!(err, Error::InvalidOperation(_)), "got {err:?}");
    assert!(camera.is_running());
}

#[test]
fn test_restart_registers_a_fresh_callback_context() {
    let boundary = boundary();
    let context = context(&boundary);
    let camera = camera(&context);
    let (first_count, first) = counter();
    let (second_count, second) = counter();

    camera.start_running(first).unwrap();
    camera.stop_running().unwrap();

    // A late callback carrying the old context reaches nobody
    assert!(boundary.replay_sample("cam"));
    assert_eq!(first_count.load(Ordering::SeqCst), 0);

    camera.start_running(second).unwrap();
    boundary.emit("cam");
    assert_eq!(first_count.load(Ordering::SeqCst), 0);
    assert_eq!(second_count.load(Ordering::SeqCst), 1);
}

#[test]
fn test_drop_releases_every_handle_once() {
    let boundary = boundary();
    let context = context(&boundary);
    let query = DeviceQuery::new(&context, None).unwrap();
    assert_eq!(query.len(), 2);
    assert_eq!(boundary.live_handles(), 2);

    drop(query);
    assert_eq!(boundary.live_handles(), 0);
    assert_eq!(boundary.release_count("mic"), 1);
    assert_eq!(boundary.release_count("cam"), 1);
}

#[test]
fn test_drop_while_running_stops_first() {
    let boundary = boundary();
    let context = context(&boundary);
    let camera = camera(&context);
    let (_, handler) = counter();

    camera.start_running(handler).unwrap();
    drop(camera);
    assert!(!boundary.is_streaming("cam"));
    assert_eq!(boundary.release_count("cam"), 1);
}

#[test]
fn test_camera_samples_released_after_handler() {
    let boundary = boundary();
    let context = context(&boundary);
    let camera = camera(&context);
    let seen = Arc::new(Mutex::new(Vec::new()));
    let frames = Arc::clone(&seen);

    camera
        .start_running(move |image| {
            frames
                .lock()
                .unwrap()
                .push((image.width(), image.height(), image.timestamp(), image.to_copied()));
        })
        .unwrap();
    boundary.emit("cam");
    boundary.emit("cam");
    assert_eq!(boundary.outstanding_samples(), 0);

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 2);
    assert_eq!((seen[0].0, seen[0].1), (8, 6));
    assert!(seen[1].2 > seen[0].2);
    // Copies stay readable after the native sample is gone
    assert!(!seen[0].3.is_released());
    assert_eq!(seen[0].3.planes()[0].data().len(), 48);
    assert_eq!(seen[0].3.device().map(|d| d.unique_id.as_str()), Some("cam"));
}

#[test]
fn test_audio_buffers_follow_device_format() {
    let boundary = boundary();
    let context = context(&boundary);
    let microphone = DeviceQuery::new(&context, Some(&filters::audio))
        .unwrap()
        .into_devices()
        .into_iter()
        .find_map(Device::into_audio)
        .unwrap();
    microphone.set_sample_rate(16_000);
    microphone.set_channel_count(2);
    assert_eq!(microphone.sample_rate(), 16_000);

    let copies: Arc<Mutex<Vec<AudioBuffer<'static>>>> = Arc::default();
    let sink = Arc::clone(&copies);
    microphone
        .start_running(move |buffer| sink.lock().unwrap().push(buffer.to_copied()))
        .unwrap();
    boundary.emit("mic");
    microphone.stop_running().unwrap();

    let copies = copies.lock().unwrap();
    assert_eq!(copies.len(), 1);
    assert_eq!(copies[0].sample_rate(), 16_000);
    assert_eq!(copies[0].channel_count(), 2);
    assert_eq!(copies[0].frame_count(), 160);
    assert_eq!(copies[0].samples().len(), 320);
}

#[test]
fn test_properties_reach_the_native_side() {
    let boundary = boundary();
    let context = context(&boundary);
    let camera = camera(&context);

    camera.set_zoom_ratio(2.5);
    camera.set_frame_rate(60);
    camera.set_preview_resolution(4, 2);
    assert_eq!(camera.zoom_ratio(), 2.5);
    assert_eq!(camera.frame_rate(), 60);
    assert_eq!(camera.zoom_range(), (1.0, 8.0));
    assert_eq!(
        boundary.device_property("cam", PropertyKey::PreviewResolution),
        Some(PropertyValue::Size(4, 2))
    );

    let sizes = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&sizes);
    camera
        .start_running(move |image| sink.lock().unwrap().push((image.width(), image.height())))
        .unwrap();
    boundary.emit("cam");
    assert_eq!(*sizes.lock().unwrap(), vec![(4, 2)]);
}

#[test]
fn test_capture_photo_runs_handler_once() {
    let boundary = boundary();
    let context = context(&boundary);
    let camera = camera(&context);
    camera.set_photo_resolution(16, 12);
    camera.set_exposure_bias(0.5);
    let photos = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&photos);

    camera.capture_photo(move |image| {
        sink.lock().unwrap().push((
            image.width(),
            image.height(),
            image.metadata().exposure_bias,
        ));
    });

    assert_eq!(*photos.lock().unwrap(), vec![(16, 12, Some(0.5))]);
    assert_eq!(boundary.outstanding_samples(), 0);
}

#[test]
fn test_panicking_handler_does_not_stop_streaming() {
    let boundary = boundary();
    let context = context(&boundary);
    let camera = camera(&context);
    let calls = Arc::new(AtomicUsize::new(0));
    let handler_calls = Arc::clone(&calls);

    camera
        .start_running(move |_| {
            handler_calls.fetch_add(1, Ordering::SeqCst);
            panic!("handler failure");
        })
        .unwrap();
    boundary.emit("cam");
    boundary.emit("cam");

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert!(camera.is_running());
    assert_eq!(boundary.outstanding_samples(), 0);
}

#[test]
fn test_devices_compare_by_identity() {
    let boundary = boundary();
    let context = context(&boundary);
    let first = camera(&context);
    let second = camera(&context);
    assert_eq!(first, second);
    assert_eq!(first.to_string(), "camera:cam");
    assert_eq!(first.name(), "Camera");
    assert!(first.is_default());
}
