// SPDX-License-Identifier: GPL-3.0-only

//! CLI commands for device operations
//!
//! This module provides command-line functionality for:
//! - Listing available devices
//! - Streaming audio buffers or camera frames
//! - Capturing a photo
//! - Checking capture permissions

use futures::channel::mpsc;
use media_capture::conversion::Orientation;
use media_capture::native::CaptureBoundary;
use media_capture::outputs::{AudioOutput, AudioSpectrumOutput, CameraOutput, PixelBufferOutput};
use media_capture::query::filters;
use media_capture::{
    Config, Device, DeviceQuery, MediaContext, MediaDevice, PermissionKind, PermissionStatus,
};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// How long to wait for the requested number of buffers
const STREAM_TIMEOUT: Duration = Duration::from_secs(10);

/// Build the capture context from the config file and the compiled-in boundary
pub fn create_context(config: Option<&Path>) -> Result<MediaContext, Box<dyn std::error::Error>> {
    let config = match config {
        Some(path) => Config::load(path)?,
        None => Config::load_default(),
    };
    Ok(MediaContext::new(config, boundary())?)
}

#[cfg(feature = "native")]
fn boundary() -> Arc<dyn CaptureBoundary> {
    Arc::new(media_capture::native::ffi::FfiBoundary)
}

#[cfg(not(feature = "native"))]
fn boundary() -> Arc<dyn CaptureBoundary> {
    Arc::new(media_capture::native::virtual_device::VirtualBoundary::demo())
}

/// List all available devices
pub fn list_devices(context: &MediaContext) -> Result<(), Box<dyn std::error::Error>> {
    let query = DeviceQuery::new(context, None)?;

    if query.is_empty() {
        println!("No devices found.");
        return Ok(());
    }

    println!("Available devices:");
    println!();
    for (index, device) in query.iter().enumerate() {
        let default = if device.is_default() { " (default)" } else { "" };
        println!("  [{}] {}{}", index, device.name(), default);
        println!("      ID: {}", device.unique_id());
        println!("      Location: {:?}", device.location());
        match device {
            Device::Audio(audio) => {
                println!(
                    "      Format: {} Hz, {} channel(s)",
                    audio.sample_rate(),
                    audio.channel_count()
                );
            }
            Device::Camera(camera) => {
                let (width, height) = camera.preview_resolution();
                println!(
                    "      Preview: {}x{}@{}fps{}",
                    width,
                    height,
                    camera.frame_rate(),
                    if camera.front_facing() { ", front facing" } else { "" }
                );
            }
        }
        println!();
    }

    Ok(())
}

/// Stream audio buffers and print a spectrum peak per buffer
pub fn stream_audio(
    context: &MediaContext,
    index: usize,
    frames: usize,
) -> Result<(), Box<dyn std::error::Error>> {
    let query = DeviceQuery::new(context, Some(&filters::audio))?;
    let microphone = query
        .get(index)
        .and_then(Device::as_audio)
        .ok_or_else(|| format!("Audio device index {} out of range", index))?;
    println!("Using microphone: {}", microphone.name());

    let spectrum = Arc::new(AudioSpectrumOutput::default());
    let (sender, mut receiver) = mpsc::unbounded();
    let sink = Arc::clone(&spectrum);
    microphone.start_running(move |buffer| {
        sink.update(buffer);
        let _ = sender.unbounded_send(format!(
            "{:>14} ns  {} frames  {} Hz  {} ch",
            buffer.timestamp(),
            buffer.frame_count(),
            buffer.sample_rate(),
            buffer.channel_count()
        ));
    })?;

    let received = receive_lines(&mut receiver, frames, |line| {
        let peak = spectrum.with_spectrum(|bins| {
            bins.iter()
                .enumerate()
                .max_by(|a, b| a.1.total_cmp(b.1))
                .map_or(0, |(bin, _)| bin)
        });
        println!("{}  peak bin {}", line, peak);
    });
    microphone.stop_running()?;
    spectrum.dispose();

    println!();
    println!("Received {} buffer(s)", received);
    Ok(())
}

/// Stream camera frames through the CPU converter
pub fn stream_camera(
    context: &MediaContext,
    index: usize,
    frames: usize,
    rotate: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let query = DeviceQuery::new(context, Some(&filters::camera))?;
    let camera = query
        .get(index)
        .and_then(Device::as_camera)
        .ok_or_else(|| format!("Camera index {} out of range", index))?;
    println!("Using camera: {}", camera.name());

    let orientation = if rotate {
        Orientation::Portrait
    } else {
        Orientation::LandscapeLeft
    };
    let preview = Arc::new(PixelBufferOutput::new().with_orientation(orientation));
    let (sender, mut receiver) = mpsc::unbounded();
    let sink = Arc::clone(&preview);
    camera.start_running(move |image| {
        sink.update(image);
        let _ = sender.unbounded_send(format!(
            "{:>14} ns  {:?} {}x{}",
            image.timestamp(),
            image.format(),
            image.width(),
            image.height()
        ));
    })?;

    let received = receive_lines(&mut receiver, frames, |line| {
        let (width, height) = (preview.width(), preview.height());
        println!("{}  -> RGBA {}x{}", line, width, height);
    });
    camera.stop_running()?;
    preview.dispose();

    println!();
    println!("Received {} frame(s)", received);
    Ok(())
}

/// Capture a single photo
pub fn take_photo(context: &MediaContext, index: usize) -> Result<(), Box<dyn std::error::Error>> {
    let query = DeviceQuery::new(context, Some(&filters::camera))?;
    let camera = query
        .get(index)
        .and_then(Device::as_camera)
        .ok_or_else(|| format!("Camera index {} out of range", index))?;
    println!("Using camera: {}", camera.name());

    println!("Capturing...");
    let (sender, mut receiver) = mpsc::unbounded();
    camera.capture_photo(move |image| {
        let metadata = image.metadata();
        let mut line = format!(
            "{:?} {}x{} at {} ns",
            image.format(),
            image.width(),
            image.height(),
            image.timestamp()
        );
        if let Some(bias) = metadata.exposure_bias {
            line.push_str(&format!(", exposure bias {:.2}", bias));
        }
        if let Some(iso) = metadata.iso {
            line.push_str(&format!(", ISO {:.0}", iso));
        }
        let _ = sender.unbounded_send(line);
    });

    let received = receive_lines(&mut receiver, 1, |line| println!("Photo: {}", line));
    if received == 0 {
        return Err("Failed to capture photo".into());
    }
    Ok(())
}

/// Print (and optionally request) capture permissions
pub fn show_permissions(
    context: &MediaContext,
    request: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let permissions = context.permissions();
    println!("Provider: {:?}", permissions);

    let rt = tokio::runtime::Runtime::new()?;
    for kind in [PermissionKind::Audio, PermissionKind::Camera] {
        let mut status = permissions.check(kind);
        if request && status != PermissionStatus::Authorized {
            status = rt.block_on(permissions.request(kind));
        }
        println!("  {:<8} {}", kind.to_string(), status);
    }
    Ok(())
}

/// Print lines from `receiver` until `count` arrived or the stream times out
fn receive_lines(
    receiver: &mut mpsc::UnboundedReceiver<String>,
    count: usize,
    mut print: impl FnMut(&str),
) -> usize {
    let start = Instant::now();
    let mut received = 0;
    while received < count && start.elapsed() < STREAM_TIMEOUT {
        match receiver.try_recv() {
            Ok(line) => {
                print(&line);
                received += 1;
            }
            Err(_) => {
                // Nothing yet, wait a bit
                std::thread::sleep(Duration::from_millis(5));
            }
        }
    }
    received
}
