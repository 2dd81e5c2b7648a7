// SPDX-License-Identifier: GPL-3.0-only

//! Capture permissions
//!
//! The provider is picked once at startup by [`Permissions::for_platform`]:
//! Apple platforms ask the native library, Android polls an OS permission
//! API, and desktop platforms have no capture permission model.

use crate::constants::PERMISSION_POLL_INTERVAL;
use crate::native::{context_to_token, token_to_context, CaptureBoundary};
use crate::token::{OneShotTable, Token};
use futures::channel::oneshot;
use std::ffi::c_void;
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Media type a permission covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum PermissionKind {
    Audio = 1,
    Camera = 2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(i32)]
pub enum PermissionStatus {
    #[default]
    Unknown = 0,
    Denied = 2,
    Authorized = 3,
}

impl PermissionStatus {
    pub fn from_raw(code: i32) -> Self {
        match code {
            2 => PermissionStatus::Denied,
            3 => PermissionStatus::Authorized,
            _ => PermissionStatus::Unknown,
        }
    }

    pub fn is_authorized(self) -> bool {
        self == PermissionStatus::Authorized
    }
}

impl std::fmt::Display for PermissionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PermissionKind::Audio => write!(f, "microphone"),
            PermissionKind::Camera => write!(f, "camera"),
        }
    }
}

impl std::fmt::Display for PermissionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PermissionStatus::Unknown => write!(f, "unknown"),
            PermissionStatus::Denied => write!(f, "denied"),
            PermissionStatus::Authorized => write!(f, "authorized"),
        }
    }
}

/// OS permission calls on platforms without a completion callback
pub trait OsPermissionApi: Send + Sync {
    fn has_permission(&self, kind: PermissionKind) -> bool;

    /// Show the system prompt; returns without waiting for an answer
    fn request_permission(&self, kind: PermissionKind);
}

/// Prompt-and-poll provider with a bounded wait
#[derive(Clone)]
pub struct PolledPermissions {
    api: Arc<dyn OsPermissionApi>,
    wait: Duration,
    interval: Duration,
}

impl PolledPermissions {
    pub fn new(api: Arc<dyn OsPermissionApi>, wait: Duration) -> Self {
        Self {
            api,
            wait,
            interval: PERMISSION_POLL_INTERVAL,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    fn check(&self, kind: PermissionKind) -> PermissionStatus {
        if self.api.has_permission(kind) {
            PermissionStatus::Authorized
        } else {
            // The OS API cannot tell "never asked" from "refused"
            PermissionStatus::Denied
        }
    }

    async fn request(&self, kind: PermissionKind) -> PermissionStatus {
        if self.api.has_permission(kind) {
            return PermissionStatus::Authorized;
        }
        self.api.request_permission(kind);

        let deadline = tokio::time::Instant::now() + self.wait;
        loop {
            tokio::time::sleep(self.interval).await;
            if self.api.has_permission(kind) {
                info!(%kind, "Permission granted");
                return PermissionStatus::Authorized;
            }
            if tokio::time::Instant::now() >= deadline {
                warn!(%kind, wait_ms = self.wait.as_millis() as u64, "Permission prompt timed out");
                return PermissionStatus::Denied;
            }
        }
    }
}

static PENDING_PERMISSIONS: LazyLock<OneShotTable<oneshot::Sender<PermissionStatus>>> =
    LazyLock::new(OneShotTable::new);

extern "C" fn on_permission_result(context: *mut c_void, status: i32) {
    let token = Token::from_raw(context_to_token(context));
    match PENDING_PERMISSIONS.take(token) {
        Some(sender) => {
            // The requester may have given up; nothing to do then
            let _ = sender.send(PermissionStatus::from_raw(status));
        }
        None => debug!(token = token.raw(), "Permission result without a pending request"),
    }
}

/// Platform permissions provider
#[derive(Clone)]
pub enum Permissions {
    /// Ask the native capture library
    Native(Arc<dyn CaptureBoundary>),
    /// Poll an OS permission API after prompting
    Polled(PolledPermissions),
    /// No capture permission model
    AlwaysAuthorized,
}

impl Permissions {
    /// Pick the provider for the current platform
    pub fn for_platform(boundary: Arc<dyn CaptureBoundary>, wait: Duration) -> Self {
        Self::select(boundary, wait, None)
    }

    /// Like [`for_platform`](Self::for_platform), with the Android OS API
    pub fn for_platform_with_api(
        boundary: Arc<dyn CaptureBoundary>,
        wait: Duration,
        api: Arc<dyn OsPermissionApi>,
    ) -> Self {
        Self::select(boundary, wait, Some(api))
    }

    #[allow(unused_variables)]
    fn select(
        boundary: Arc<dyn CaptureBoundary>,
        wait: Duration,
        api: Option<Arc<dyn OsPermissionApi>>,
    ) -> Self {
        #[cfg(any(target_os = "macos", target_os = "ios"))]
        {
            Permissions::Native(boundary)
        }
        #[cfg(target_os = "android")]
        {
            match api {
                Some(api) => Permissions::Polled(PolledPermissions::new(api, wait)),
                None => {
                    warn!("No OS permission API supplied, assuming authorized");
                    Permissions::AlwaysAuthorized
                }
            }
        }
        #[cfg(not(any(target_os = "macos", target_os = "ios", target_os = "android")))]
        {
            Permissions::AlwaysAuthorized
        }
    }

    /// Current status without prompting
    pub fn check(&self, kind: PermissionKind) -> PermissionStatus {
        match self {
            Permissions::Native(boundary) => boundary.check_permissions(kind),
            Permissions::Polled(polled) => polled.check(kind),
            Permissions::AlwaysAuthorized => PermissionStatus::Authorized,
        }
    }

    /// Prompt if needed and resolve once the user answers
    pub async fn request(&self, kind: PermissionKind) -> PermissionStatus {
        let status = match self {
            Permissions::Native(boundary) => {
                let (sender, receiver) = oneshot::channel();
                let token = PENDING_PERMISSIONS.insert(sender);
                boundary.request_permissions(kind, on_permission_result, token_to_context(token.raw()));
                // A dropped sender means the native side never answered
                receiver.await.unwrap_or(PermissionStatus::Denied)
            }
            Permissions::Polled(polled) => polled.request(kind).await,
            Permissions::AlwaysAuthorized => PermissionStatus::Authorized,
        };
        debug!(%kind, %status, "Permission request resolved");
        status
    }
}

impl std::fmt::Debug for Permissions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Permissions::Native(_) => write!(f, "Permissions::Native"),
            Permissions::Polled(polled) => f
                .debug_struct("Permissions::Polled")
                .field("wait", &polled.wait)
                .finish(),
            Permissions::AlwaysAuthorized => write!(f, "Permissions::AlwaysAuthorized"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    struct FakeApi {
        granted: AtomicBool,
        grant_after_prompt: bool,
        prompts: AtomicU32,
    }

    impl OsPermissionApi for FakeApi {
        fn has_permission(&self, _kind: PermissionKind) -> bool {
            self.granted.load(Ordering::SeqCst)
        }

        fn request_permission(&self, _kind: PermissionKind) {
            self.prompts.fetch_add(1, Ordering::SeqCst);
            if self.grant_after_prompt {
                self.granted.store(true, Ordering::SeqCst);
            }
        }
    }

    fn polled(granted: bool, grant_after_prompt: bool) -> (Arc<FakeApi>, Permissions) {
        let api = Arc::new(FakeApi {
            granted: AtomicBool::new(granted),
            grant_after_prompt,
            prompts: AtomicU32::new(0),
        });
        let permissions = Permissions::Polled(
            PolledPermissions::new(api.clone(), Duration::from_millis(50))
                .with_interval(Duration::from_millis(5)),
        );
        (api, permissions)
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(PermissionStatus::from_raw(3), PermissionStatus::Authorized);
        assert_eq!(PermissionStatus::from_raw(2), PermissionStatus::Denied);
        assert_eq!(PermissionStatus::from_raw(1), PermissionStatus::Unknown);
        assert_eq!(PermissionKind::Camera as i32, 2);
    }

    #[tokio::test]
    async fn test_polled_already_granted_skips_prompt() {
        let (api, permissions) = polled(true, false);
        assert_eq!(
            permissions.request(PermissionKind::Camera).await,
            PermissionStatus::Authorized
        );
        assert_eq!(api.prompts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_polled_grant_after_prompt() {
        let (api, permissions) = polled(false, true);
        assert_eq!(permissions.check(PermissionKind::Audio), PermissionStatus::Denied);
        assert_eq!(
            permissions.request(PermissionKind::Audio).await,
            PermissionStatus::Authorized
        );
        assert_eq!(permissions.check(PermissionKind::Audio), PermissionStatus::Authorized);
        assert_eq!(api.prompts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_polled_times_out_as_denied() {
        let (_api, permissions) = polled(false, false);
        assert_eq!(
            permissions.request(PermissionKind::Camera).await,
            PermissionStatus::Denied
        );
    }

    #[tokio::test]
    async fn test_always_authorized() {
        let permissions = Permissions::AlwaysAuthorized;
        assert!(permissions.check(PermissionKind::Camera).is_authorized());
        assert!(permissions.request(PermissionKind::Audio).await.is_authorized());
    }
}
