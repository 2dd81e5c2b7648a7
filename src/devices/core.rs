// SPDX-License-Identifier: GPL-3.0-only

//! Handle ownership and session state shared by both device kinds

use super::session::{
    self, on_sample, Dispatch, PhotoHandler, SessionHandler, StreamSession, SESSIONS,
};
use super::{DeviceIdentity, DeviceKind, ObserverId};
use crate::constants::DEVICE_STRING_CAPACITY;
use crate::context::ContextShared;
use crate::dispatch::LifecycleSubscription;
use crate::errors::{Error, Result};
use crate::native::{
    context_to_token, read_c_string, token_to_context, CaptureBoundary, DeviceFlags,
    DeviceHandle, PropertyKey, PropertyValue, Status,
};
use crate::sync::lock;
use crate::token::{Token, TokenTable};
use std::ffi::c_void;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, LazyLock, Mutex, OnceLock};
use tracing::{debug, info, trace, warn};

/// Live device cores keyed by disconnect token
static DEVICES: LazyLock<TokenTable<DeviceCore>> = LazyLock::new(TokenTable::new);

type Observer = Arc<dyn Fn() + Send + Sync>;

struct ActiveSession {
    session: Arc<StreamSession>,
    token: Token,
    _subscription: Option<LifecycleSubscription>,
}

pub(crate) struct DeviceCore {
    context: Arc<ContextShared>,
    handle: DeviceHandle,
    identity: Arc<DeviceIdentity>,
    disconnect_token: OnceLock<Token>,
    session: Mutex<Option<ActiveSession>>,
    observers: Mutex<Vec<(ObserverId, Observer)>>,
    next_observer: AtomicU64,
    disconnected: AtomicBool,
}

impl DeviceCore {
    /// Take ownership of `handle`, caching its identity
    ///
    /// On failure the handle has already been released.
    pub fn open(context: Arc<ContextShared>, handle: DeviceHandle, kind: DeviceKind) -> Result<Arc<Self>> {
        let boundary = Arc::clone(&context.boundary);
        let strings = read_device_string(|buf| boundary.unique_id(handle, buf)).and_then(|unique_id| {
            read_device_string(|buf| boundary.name(handle, buf)).map(|name| (unique_id, name))
        });
        let (unique_id, name) = match strings {
            Ok(strings) => strings,
            Err(e) => {
                if let Err(release) = boundary.release_device(handle).check() {
                    debug!(error = %release, "Failed to release unreadable device");
                }
                return Err(e);
            }
        };

        let core = Arc::new(Self {
            context,
            handle,
            identity: Arc::new(DeviceIdentity {
                kind,
                unique_id,
                name,
            }),
            disconnect_token: OnceLock::new(),
            session: Mutex::new(None),
            observers: Mutex::new(Vec::new()),
            next_observer: AtomicU64::new(1),
            disconnected: AtomicBool::new(false),
        });

        let token = DEVICES.register(&core);
        let _ = core.disconnect_token.set(token);
        let status = boundary.set_disconnect_handler(
            handle,
            Some(on_disconnect),
            token_to_context(token.raw()),
        );
        if let Err(e) = status.check() {
            warn!(device = %core.identity, error = %e, "Failed to register disconnect handler");
        }

        debug!(device = %core.identity, name = %core.identity.name, "Opened device");
        Ok(core)
    }

    pub fn identity(&self) -> &Arc<DeviceIdentity> {
        &self.identity
    }

    pub fn flags(&self) -> DeviceFlags {
        self.context.boundary.flags(self.handle)
    }

    pub fn property(&self, key: PropertyKey) -> PropertyValue {
        self.context.boundary.property(self.handle, key)
    }

    pub fn set_property(&self, key: PropertyKey, value: PropertyValue) {
        trace!(device = %self.identity, ?key, ?value, "Setting property");
        self.context.boundary.set_property(self.handle, key, value);
    }

    pub fn is_running(&self) -> bool {
        self.context.boundary.is_running(self.handle)
    }

    /// Start a streaming session; fails if one is already active
    pub fn start(self: &Arc<Self>, handler: SessionHandler) -> Result<()> {
        let mut slot = lock(&self.session);
        if slot.is_some() {
            return Err(Error::InvalidOperation(format!(
                "{} is already running, stop it first",
                self.identity
            )));
        }

        let session = Arc::new(StreamSession::new(
            Arc::clone(&self.context.boundary),
            Arc::clone(&self.identity),
            handler,
            Dispatch::from_main(self.context.main.as_ref()),
            false,
        ));

        // Subscribe first, then seed from the current pause flag
        let subscription = self.context.lifecycle.as_ref().map(|lifecycle| {
            let pause_target = Arc::downgrade(&session);
            let quit_target = Arc::downgrade(self);
            let subscription = lifecycle.subscribe(
                move |paused| {
                    if let Some(session) = pause_target.upgrade() {
                        session.set_paused(paused);
                    }
                },
                move || {
                    if let Some(core) = quit_target.upgrade()
                        && let Err(e) = core.stop()
                    {
                        warn!(device = %core.identity, error = %e, "Stop on quit failed");
                    }
                },
            );
            if lifecycle.is_paused() {
                session.set_paused(true);
            }
            subscription
        });

        let token = SESSIONS.register(&session);
        let status = self
            .context
            .boundary
            .start_running(self.handle, on_sample, token_to_context(token.raw()));
        if let Err(e) = status.check() {
            session.deactivate();
            SESSIONS.revoke(token);
            warn!(device = %self.identity, error = %e, "Failed to start streaming");
            return Err(e);
        }

        *slot = Some(ActiveSession {
            session,
            token,
            _subscription: subscription,
        });
        info!(device = %self.identity, token = token.raw(), "Started streaming");
        Ok(())
    }

    /// Stop the active session; a no-op when idle
    pub fn stop(&self) -> Result<()> {
        let Some(active) = lock(&self.session).take() else {
            return Ok(());
        };
        active.session.deactivate();
        // Blocks until the native side stops calling back
        let status = self.context.boundary.stop_running(self.handle);
        SESSIONS.revoke(active.token);
        drop(active);
        info!(device = %self.identity, "Stopped streaming");
        status.check()
    }

    pub fn capture_photo(&self, handler: PhotoHandler) {
        let token = session::register_photo(
            Arc::clone(&self.context.boundary),
            Arc::clone(&self.identity),
            Dispatch::from_main(self.context.main.as_ref()),
            handler,
        );
        debug!(device = %self.identity, token = token.raw(), "Capturing photo");
        self.context
            .boundary
            .capture_photo(self.handle, session::on_photo, token_to_context(token.raw()));
    }

    pub fn add_observer(&self, observer: Box<dyn Fn() + Send + Sync>) -> ObserverId {
        let id = ObserverId(self.next_observer.fetch_add(1, Ordering::Relaxed));
        lock(&self.observers).push((id, Arc::from(observer)));
        id
    }

    pub fn remove_observer(&self, id: ObserverId) -> bool {
        let mut observers = lock(&self.observers);
        let before = observers.len();
        observers.retain(|(existing, _)| *existing != id);
        observers.len() != before
    }

    fn handle_disconnect(&self) {
        if self.disconnected.swap(true, Ordering::AcqRel) {
            debug!(device = %self.identity, "Duplicate disconnect ignored");
            return;
        }
        warn!(device = %self.identity, "Device disconnected");
        if let Err(e) = self.stop() {
            warn!(device = %self.identity, error = %e, "Stop after disconnect failed");
        }

        let observers: Vec<Observer> = lock(&self.observers)
            .iter()
            .map(|(_, observer)| Arc::clone(observer))
            .collect();
        for observer in observers {
            session::guarded(&self.identity, "disconnect observer", || observer());
        }
    }
}

impl Drop for DeviceCore {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!(device = %self.identity, error = %e, "Stop on drop failed");
        }
        let boundary = &self.context.boundary;
        if let Some(token) = self.disconnect_token.get() {
            let _ = boundary.set_disconnect_handler(self.handle, None, std::ptr::null_mut());
            DEVICES.revoke(*token);
        }
        if let Err(e) = boundary.release_device(self.handle).check() {
            warn!(device = %self.identity, error = %e, "Failed to release device");
        }
        debug!(device = %self.identity, "Released device");
    }
}

fn read_device_string(read: impl FnOnce(&mut [u8]) -> Status) -> Result<String> {
    let mut buf = vec![0u8; DEVICE_STRING_CAPACITY];
    read(&mut buf).check()?;
    Ok(read_c_string(&buf))
}

extern "C" fn on_disconnect(context: *mut c_void) {
    let token = Token::from_raw(context_to_token(context));
    match DEVICES.resolve(token) {
        Some(core) => core.handle_disconnect(),
        None => debug!(token = token.raw(), "Disconnect for released device ignored"),
    }
}

