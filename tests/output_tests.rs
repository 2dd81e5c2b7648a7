// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for output sinks fed by running devices

use media_capture::gpu::GpuContext;
use media_capture::native::virtual_device::{FrameLayout, VirtualBoundary, VirtualDeviceSpec};
use media_capture::outputs::{
    self, AudioClipOutput, AudioOutput, AudioSpectrumOutput, CameraOutput, TextureOutput,
};
use media_capture::query::filters;
use media_capture::{
    AudioDevice, CameraDevice, Config, Device, DeviceQuery, MainContext, MediaContext,
    MediaDevice, Orientation,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn boundary() -> VirtualBoundary {
    VirtualBoundary::new()
        .with_device(VirtualDeviceSpec::audio("mic", "Microphone"))
        .with_device(
            VirtualDeviceSpec::camera("cam", "Camera")
                .with_layout(FrameLayout::Nv12)
                .with_resolution(8, 4),
        )
}

fn microphone(context: &MediaContext) -> AudioDevice {
    DeviceQuery::new(context, Some(&filters::audio))
        .unwrap()
        .into_devices()
        .into_iter()
        .find_map(Device::into_audio)
        .unwrap()
}

fn camera(context: &MediaContext) -> CameraDevice {
    DeviceQuery::new(context, Some(&filters::camera))
        .unwrap()
        .into_devices()
        .into_iter()
        .find_map(Device::into_camera)
        .unwrap()
}

#[test]
fn test_clip_records_every_buffer() {
    let boundary = boundary();
    let context = MediaContext::new(Config::default(), Arc::new(boundary.clone())).unwrap();
    let microphone = microphone(&context);
    microphone.set_sample_rate(48_000);
    microphone.set_channel_count(1);

    let clip = Arc::new(AudioClipOutput::new());
    assert!(clip.to_clip().is_none());
    microphone
        .start_running(outputs::audio_handler(Arc::clone(&clip)))
        .unwrap();
    for _ in 0..3 {
        boundary.emit("mic");
    }
    microphone.stop_running().unwrap();

    let recorded = clip.to_clip().unwrap();
    assert_eq!(recorded.sample_rate, 48_000);
    assert_eq!(recorded.channel_count, 1);
    assert_eq!(recorded.frame_count(), 1440);
    assert!((recorded.duration().as_secs_f64() - 0.03).abs() < 1e-6);
    assert!(recorded.name.starts_with("recording_"));
    assert_eq!(clip.len_bytes(), 1440 * 4);

    clip.dispose();
    boundary.emit("mic");
    assert_eq!(clip.len_bytes(), 0);
}

#[test]
fn test_spectrum_peaks_at_the_tone() {
    let boundary = boundary();
    let context = MediaContext::new(Config::default(), Arc::new(boundary.clone())).unwrap();
    let microphone = microphone(&context);
    microphone.set_sample_rate(48_000);
    microphone.set_channel_count(2);

    let spectrum = Arc::new(AudioSpectrumOutput::new(1024, 1));
    microphone
        .start_running(outputs::audio_handler(Arc::clone(&spectrum)))
        .unwrap();
    boundary.emit("mic");

    let magnitudes = spectrum.spectrum();
    assert_eq!(magnitudes.len(), 512);
    let peak = magnitudes
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(b.1))
        .map(|(bin, _)| bin)
        .unwrap();
    // 440 Hz at 48 kHz over 1024 points
    assert!((8..=10).contains(&peak), "peak bin {peak}");

    spectrum.dispose();
    boundary.emit("mic");
    assert!(spectrum.spectrum().iter().all(|m| *m == 0.0));
}

#[test]
fn test_spectrum_ignores_missing_channel() {
    let boundary = boundary();
    let context = MediaContext::new(Config::default(), Arc::new(boundary.clone())).unwrap();
    let microphone = microphone(&context);
    microphone.set_channel_count(1);

    let spectrum = Arc::new(AudioSpectrumOutput::new(256, 1));
    microphone
        .start_running(outputs::audio_handler(Arc::clone(&spectrum)))
        .unwrap();
    boundary.emit("mic");
    assert!(spectrum.spectrum().iter().all(|m| *m == 0.0));
}

#[test]
fn test_texture_output_on_main_context() {
    let gpu = match GpuContext::blocking("output_tests") {
        Ok(gpu) => gpu,
        Err(e) => {
            println!("Skipping test (no GPU): {}", e);
            return;
        }
    };
    let boundary = boundary();
    let main = MainContext::new();
    let context = MediaContext::new(Config::default(), Arc::new(boundary.clone()))
        .unwrap()
        .with_main_context(main.clone());
    let camera = camera(&context);

    let texture = Arc::new(TextureOutput::new(&gpu));
    texture.set_orientation(Orientation::Portrait);
    let frames = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&frames);
    texture.on_frame(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    camera
        .start_running(outputs::camera_handler(Arc::clone(&texture)))
        .unwrap();

    let emitter = boundary.clone();
    std::thread::spawn(move || emitter.emit("cam")).join().unwrap();
    assert!(!texture.poll().unwrap());
    assert_eq!(main.pump(), 1);
    assert!(texture.poll().unwrap());

    assert_eq!(frames.load(Ordering::SeqCst), 1);
    assert_eq!(texture.size(), (4, 8));
    assert_eq!(texture.read_rgba().unwrap().map(|pixels| pixels.len()), Some(4 * 8 * 4));

    camera.stop_running().unwrap();
    texture.dispose();
    assert!(texture.texture().is_none());
    assert_eq!(boundary.outstanding_samples(), 0);
}
