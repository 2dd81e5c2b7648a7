// SPDX-License-Identifier: GPL-3.0-only

//! Streaming sessions and sample-callback trampolines
//!
//! The native side calls [`on_sample`] with the integer token registered at
//! start. The token resolves weakly through [`SESSIONS`], so callbacks that
//! race a stop (or outlive the device) find nothing and return.

use super::DeviceIdentity;
use crate::dispatch::MainContext;
use crate::media::{AudioBuffer, CameraImage};
use crate::native::{context_to_token, CaptureBoundary, SampleHandle};
use crate::token::{OneShotTable, Token, TokenTable};
use std::ffi::c_void;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, LazyLock};
use tracing::{debug, error, trace, warn};

pub(crate) type AudioHandler = Arc<dyn Fn(&AudioBuffer<'_>) + Send + Sync>;
pub(crate) type CameraHandler = Arc<dyn Fn(&CameraImage<'_>) + Send + Sync>;
pub(crate) type PhotoHandler = Box<dyn FnOnce(&CameraImage<'_>) + Send>;

/// Live streaming sessions keyed by callback token
pub(crate) static SESSIONS: LazyLock<TokenTable<StreamSession>> = LazyLock::new(TokenTable::new);

/// Photo requests waiting for their single callback
static PENDING_PHOTOS: LazyLock<OneShotTable<PendingPhoto>> = LazyLock::new(OneShotTable::new);

pub(crate) enum SessionHandler {
    Audio(AudioHandler),
    Camera(CameraHandler),
}

/// Where camera frames are handed to user code, fixed at start
#[derive(Clone)]
pub(crate) enum Dispatch {
    Direct,
    Post(MainContext),
}

impl Dispatch {
    pub fn from_main(main: Option<&MainContext>) -> Self {
        match main {
            Some(main) => Dispatch::Post(main.clone()),
            None => Dispatch::Direct,
        }
    }

    /// Run `job` here, or post it when off the main thread
    fn run(&self, job: impl FnOnce() + Send + 'static) {
        match self {
            Dispatch::Post(main) if !main.is_current() => main.post(job),
            _ => job(),
        }
    }
}

/// Camera sample retained by the native side until dropped
struct RetainedSample {
    boundary: Arc<dyn CaptureBoundary>,
    sample: SampleHandle,
}

impl Drop for RetainedSample {
    fn drop(&mut self) {
        self.boundary.release_sample_buffer(self.sample);
    }
}

pub(crate) struct StreamSession {
    boundary: Arc<dyn CaptureBoundary>,
    identity: Arc<DeviceIdentity>,
    handler: SessionHandler,
    dispatch: Dispatch,
    paused: AtomicBool,
    active: AtomicBool,
}

impl StreamSession {
    pub fn new(
        boundary: Arc<dyn CaptureBoundary>,
        identity: Arc<DeviceIdentity>,
        handler: SessionHandler,
        dispatch: Dispatch,
        paused: bool,
    ) -> Self {
        Self {
            boundary,
            identity,
            handler,
            dispatch,
            paused: AtomicBool::new(paused),
            active: AtomicBool::new(true),
        }
    }

    pub fn set_paused(&self, paused: bool) {
        self.paused.store(paused, Ordering::Release);
        debug!(device = %self.identity, paused, "Session pause changed");
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    /// Mark stopped; frames already posted are dropped when their job runs
    pub fn deactivate(&self) {
        self.active.store(false, Ordering::Release);
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    fn deliver(self: Arc<Self>, sample: SampleHandle) {
        if let SessionHandler::Audio(handler) = &self.handler {
            // Audio samples die with the callback, so never post them
            if self.is_paused() || !self.is_active() {
                trace!(device = %self.identity, "Dropping audio buffer");
                return;
            }
            // SAFETY: `sample` is the handle of the callback running now and
            // the buffer does not escape this scope
            let buffer = unsafe {
                AudioBuffer::from_native(
                    self.boundary.as_ref(),
                    sample,
                    Some(Arc::clone(&self.identity)),
                )
            };
            guarded(&self.identity, "audio handler", || handler(&buffer));
            return;
        }

        let retained = RetainedSample {
            boundary: Arc::clone(&self.boundary),
            sample,
        };
        if self.is_paused() {
            trace!(device = %self.identity, "Paused, releasing camera frame");
            return;
        }
        let dispatch = self.dispatch.clone();
        dispatch.run(move || self.deliver_camera(retained));
    }

    fn deliver_camera(&self, retained: RetainedSample) {
        let SessionHandler::Camera(handler) = &self.handler else {
            return;
        };
        if !self.is_active() {
            debug!(device = %self.identity, "Session stopped before frame ran, dropping");
            return;
        }
        // SAFETY: the sample is retained until `retained` drops below
        let image = unsafe {
            CameraImage::from_native(
                self.boundary.as_ref(),
                retained.sample,
                Some(Arc::clone(&self.identity)),
            )
        };
        guarded(&self.identity, "camera handler", || handler(&image));
        drop(image);
        drop(retained);
    }
}

struct PendingPhoto {
    boundary: Arc<dyn CaptureBoundary>,
    identity: Arc<DeviceIdentity>,
    dispatch: Dispatch,
    handler: PhotoHandler,
}

/// Park a photo request until the native callback fires
pub(crate) fn register_photo(
    boundary: Arc<dyn CaptureBoundary>,
    identity: Arc<DeviceIdentity>,
    dispatch: Dispatch,
    handler: PhotoHandler,
) -> Token {
    PENDING_PHOTOS.insert(PendingPhoto {
        boundary,
        identity,
        dispatch,
        handler,
    })
}

/// Invoke user code without letting a panic unwind into native frames
pub(crate) fn guarded(identity: &DeviceIdentity, what: &str, f: impl FnOnce()) {
    if panic::catch_unwind(AssertUnwindSafe(f)).is_err() {
        error!(device = %identity, what, "Callback panicked, continuing");
    }
}

pub(crate) extern "C" fn on_sample(context: *mut c_void, sample: *mut c_void) {
    let token = Token::from_raw(context_to_token(context));
    match SESSIONS.resolve(token) {
        Some(session) => session.deliver(SampleHandle(sample)),
        None => trace!(token = token.raw(), "Sample for inactive session ignored"),
    }
}

pub(crate) extern "C" fn on_photo(context: *mut c_void, sample: *mut c_void) {
    let token = Token::from_raw(context_to_token(context));
    let Some(pending) = PENDING_PHOTOS.take(token) else {
        warn!(token = token.raw(), "Photo callback without a pending request");
        return;
    };
    let PendingPhoto {
        boundary,
        identity,
        dispatch,
        handler,
    } = pending;
    let retained = RetainedSample {
        boundary,
        sample: SampleHandle(sample),
    };
    dispatch.run(move || {
        // SAFETY: the photo sample is retained until `retained` drops below
        let image = unsafe {
            CameraImage::from_native(
                retained.boundary.as_ref(),
                retained.sample,
                Some(Arc::clone(&identity)),
            )
        };
        guarded(&identity, "photo handler", || handler(&image));
        drop(image);
        drop(retained);
    });
}
