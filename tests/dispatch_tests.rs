// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for main-thread marshaling, lifecycle and disconnects

use media_capture::native::virtual_device::{DeliveryMode, VirtualBoundary, VirtualDeviceSpec};
use media_capture::query::filters;
use media_capture::{
    CameraDevice, Config, Device, DeviceQuery, Lifecycle, MainContext, MediaContext, MediaDevice,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::ThreadId;
use std::time::{Duration, Instant};

fn boundary() -> VirtualBoundary {
    VirtualBoundary::new()
        .with_device(VirtualDeviceSpec::camera("cam", "Camera").with_resolution(4, 4))
        .with_device(VirtualDeviceSpec::audio("mic", "Mic"))
}

fn camera(context: &MediaContext) -> CameraDevice {
    DeviceQuery::new(context, Some(&filters::camera))
        .unwrap()
        .into_devices()
        .into_iter()
        .find_map(Device::into_camera)
        .unwrap()
}

/// Emit one sample from a thread other than the caller's
fn emit_off_thread(boundary: &VirtualBoundary, unique_id: &'static str) -> usize {
    let boundary = boundary.clone();
    std::thread::spawn(move || boundary.emit(unique_id))
        .join()
        .unwrap()
}

#[test]
fn test_frames_wait_for_main_pump() {
    let boundary = boundary();
    let main = MainContext::new();
    let context = MediaContext::new(Config::default(), Arc::new(boundary.clone()))
        .unwrap()
        .with_main_context(main.clone());
    let camera = camera(&context);

    let threads: Arc<Mutex<Vec<ThreadId>>> = Arc::default();
    let sink = Arc::clone(&threads);
    camera
        .start_running(move |_| sink.lock().unwrap().push(std::thread::current().id()))
        .unwrap();

    assert_eq!(emit_off_thread(&boundary, "cam"), 1);
    assert!(threads.lock().unwrap().is_empty());
    assert_eq!(main.pending(), 1);
    // The native sample stays retained while the frame is queued
    assert_eq!(boundary.outstanding_samples(), 1);

    assert_eq!(main.pump(), 1);
    assert_eq!(*threads.lock().unwrap(), vec![std::thread::current().id()]);
    assert_eq!(boundary.outstanding_samples(), 0);
}

#[test]
fn test_main_thread_frames_run_in_place() {
    let boundary = boundary();
    let main = MainContext::new();
    let context = MediaContext::new(Config::default(), Arc::new(boundary.clone()))
        .unwrap()
        .with_main_context(main.clone());
    let camera = camera(&context);
    let frames = Arc::new(AtomicUsize::new(0));
    let count = Arc::clone(&frames);
    camera
        .start_running(move |_| {
            count.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

    boundary.emit("cam");
    assert_eq!(frames.load(Ordering::SeqCst), 1);
    assert_eq!(main.pending(), 0);
}

#[test]
fn test_queued_frames_are_dropped_after_stop() {
    let boundary = boundary();
    let main = MainContext::new();
    let context = MediaContext::new(Config::default(), Arc::new(boundary.clone()))
        .unwrap()
        .with_main_context(main.clone());
    let camera = camera(&context);
    let frames = Arc::new(AtomicUsize::new(0));
    let count = Arc::clone(&frames);
    camera
        .start_running(move |_| {
            count.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

    emit_off_thread(&boundary, "cam");
    camera.stop_running().unwrap();
    main.pump();

    assert_eq!(frames.load(Ordering::SeqCst), 0);
    assert_eq!(boundary.outstanding_samples(), 0);
}

#[test]
fn test_pause_drops_frames_until_resume() {
    let boundary = boundary();
    let lifecycle = Lifecycle::new();
    let context = MediaContext::new(Config::default(), Arc::new(boundary.clone()))
        .unwrap()
        .with_lifecycle(lifecycle.clone());
    let camera = camera(&context);
    let frames = Arc::new(AtomicUsize::new(0));
    let count = Arc::clone(&frames);
    camera
        .start_running(move |_| {
            count.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
    assert_eq!(lifecycle.subscriber_count(), 1);

    lifecycle.set_paused(true);
    boundary.emit("cam");
    assert_eq!(frames.load(Ordering::SeqCst), 0);
    assert_eq!(boundary.outstanding_samples(), 0);

    lifecycle.set_paused(false);
    boundary.emit("cam");
    assert_eq!(frames.load(Ordering::SeqCst), 1);
}

#[test]
fn test_session_started_while_paused_starts_paused() {
    let boundary = boundary();
    let lifecycle = Lifecycle::new();
    lifecycle.set_paused(true);
    let context = MediaContext::new(Config::default(), Arc::new(boundary.clone()))
        .unwrap()
        .with_lifecycle(lifecycle.clone());
    let camera = camera(&context);
    let frames = Arc::new(AtomicUsize::new(0));
    let count = Arc::clone(&frames);
    camera
        .start_running(move |_| {
            count.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

    boundary.emit("cam");
    assert_eq!(frames.load(Ordering::SeqCst), 0);
}

#[test]
fn test_session_started_while_paused_resumes() {
    let boundary = boundary();
    let lifecycle = Lifecycle::new();
    lifecycle.set_paused(true);
    let context = MediaContext::new(Config::default(), Arc::new(boundary.clone()))
        .unwrap()
        .with_lifecycle(lifecycle.clone());
    let camera = camera(&context);
    let frames = Arc::new(AtomicUsize::new(0));
    let count = Arc::clone(&frames);
    camera
        .start_running(move |_| {
            count.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

    lifecycle.set_paused(false);
    boundary.emit("cam");
    assert_eq!(frames.load(Ordering::SeqCst), 1);
}

#[test]
fn test_pause_racing_start_is_not_missed() {
    for _ in 0..50 {
        let boundary = boundary();
        let lifecycle = Lifecycle::new();
        let context = MediaContext::new(Config::default(), Arc::new(boundary.clone()))
            .unwrap()
            .with_lifecycle(lifecycle.clone());
        let camera = camera(&context);
        let frames = Arc::new(AtomicUsize::new(0));
        let count = Arc::clone(&frames);

        std::thread::scope(|scope| {
            scope.spawn(|| lifecycle.set_paused(true));
            camera
                .start_running(move |_| {
                    count.fetch_add(1, Ordering::SeqCst);
                })
                .unwrap();
        });

        boundary.emit("cam");
        assert_eq!(frames.load(Ordering::SeqCst), 0);
        camera.stop_running().unwrap();
    }
}

#[test]
fn test_quit_stops_running_devices() {
    let boundary = boundary();
    let lifecycle = Lifecycle::new();
    let context = MediaContext::new(Config::default(), Arc::new(boundary.clone()))
        .unwrap()
        .with_lifecycle(lifecycle.clone());
    let camera = camera(&context);
    camera.start_running(|_| {}).unwrap();

    lifecycle.quit();
    assert!(!camera.is_running());
    assert!(!boundary.is_streaming("cam"));
    assert_eq!(lifecycle.subscriber_count(), 0);
}

#[test]
fn test_disconnect_stops_and_notifies_once() {
    let boundary = boundary();
    let context = MediaContext::new(Config::default(), Arc::new(boundary.clone())).unwrap();
    let camera = camera(&context);
    let notified = Arc::new(AtomicUsize::new(0));
    let count = Arc::clone(&notified);
    camera.on_disconnected(Box::new(move || {
        count.fetch_add(1, Ordering::SeqCst);
    }));
    let removed = camera.on_disconnected(Box::new(|| panic!("removed observer ran")));
    assert!(camera.remove_disconnect_observer(removed));
    camera.start_running(|_| {}).unwrap();

    boundary.disconnect("cam");
    boundary.disconnect("cam");

    assert_eq!(notified.load(Ordering::SeqCst), 1);
    assert!(!camera.is_running());
    assert!(camera.start_running(|_| {}).is_err());
    // Identity stays readable after the disconnect
    assert_eq!(camera.unique_id(), "cam");
}

#[test]
fn test_late_disconnect_after_drop_is_ignored() {
    let boundary = boundary();
    let context = MediaContext::new(Config::default(), Arc::new(boundary.clone())).unwrap();
    let camera = camera(&context);
    let notified = Arc::new(AtomicUsize::new(0));
    let count = Arc::clone(&notified);
    camera.on_disconnected(Box::new(move || {
        count.fetch_add(1, Ordering::SeqCst);
    }));

    drop(camera);
    assert!(boundary.replay_disconnect("cam"));
    assert_eq!(notified.load(Ordering::SeqCst), 0);
    assert_eq!(boundary.release_count("cam"), 1);
}

#[test]
fn test_late_sample_after_drop_is_ignored() {
    let boundary = boundary();
    let context = MediaContext::new(Config::default(), Arc::new(boundary.clone())).unwrap();
    let microphone = DeviceQuery::new(&context, Some(&filters::audio))
        .unwrap()
        .into_devices()
        .into_iter()
        .find_map(Device::into_audio)
        .unwrap();
    let buffers = Arc::new(AtomicUsize::new(0));
    let count = Arc::clone(&buffers);
    microphone
        .start_running(move |_| {
            count.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
    boundary.emit("mic");

    drop(microphone);
    assert!(boundary.replay_sample("mic"));
    assert_eq!(buffers.load(Ordering::SeqCst), 1);
}

#[test]
fn test_threaded_delivery_stops_cleanly() {
    let boundary = boundary().with_delivery(DeliveryMode::Threaded {
        interval: Duration::from_millis(2),
    });
    let context = MediaContext::new(Config::default(), Arc::new(boundary.clone())).unwrap();
    let camera = camera(&context);
    let frames = Arc::new(AtomicUsize::new(0));
    let count = Arc::clone(&frames);
    camera
        .start_running(move |_| {
            count.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

    let start = Instant::now();
    while frames.load(Ordering::SeqCst) < 3 && start.elapsed() < Duration::from_secs(5) {
        std::thread::sleep(Duration::from_millis(1));
    }
    camera.stop_running().unwrap();
    let stopped_at = frames.load(Ordering::SeqCst);
    assert!(stopped_at >= 3);

    std::thread::sleep(Duration::from_millis(20));
    assert_eq!(frames.load(Ordering::SeqCst), stopped_at);
    assert_eq!(boundary.outstanding_samples(), 0);
}

#[test]
fn test_stop_from_inside_handler() {
    let boundary = boundary();
    let context = MediaContext::new(Config::default(), Arc::new(boundary.clone())).unwrap();
    let camera = Arc::new(camera(&context));
    let frames = Arc::new(AtomicUsize::new(0));
    let count = Arc::clone(&frames);
    let weak = Arc::downgrade(&camera);
    camera
        .start_running(move |_| {
            count.fetch_add(1, Ordering::SeqCst);
            if let Some(camera) = weak.upgrade() {
                camera.stop_running().unwrap();
            }
        })
        .unwrap();

    boundary.emit("cam");
    boundary.emit("cam");
    assert_eq!(frames.load(Ordering::SeqCst), 1);
    assert!(!camera.is_running());
}
