// SPDX-License-Identifier: GPL-3.0-only

//! Process-wide capture context
//!
//! Created once at startup from an explicit [`Config`]. Installs the session
//! token on the native boundary and carries the optional main context and
//! lifecycle hub that devices use when streaming.

use crate::config::Config;
use crate::dispatch::{Lifecycle, MainContext};
use crate::errors::Result;
use crate::native::CaptureBoundary;
use crate::permissions::Permissions;
use std::sync::Arc;
use tracing::{info, warn};

/// State shared by every device created from one context
pub(crate) struct ContextShared {
    pub boundary: Arc<dyn CaptureBoundary>,
    pub main: Option<MainContext>,
    pub lifecycle: Option<Lifecycle>,
}

/// Entry point for discovery and permissions
pub struct MediaContext {
    config: Config,
    boundary: Arc<dyn CaptureBoundary>,
    main: Option<MainContext>,
    lifecycle: Option<Lifecycle>,
    permissions: Permissions,
}

impl MediaContext {
    /// Install the session token and select the platform permissions provider
    pub fn new(config: Config, boundary: Arc<dyn CaptureBoundary>) -> Result<Self> {
        match boundary
            .set_session_token(config.session_token.as_deref())
            .check()
        {
            Ok(()) => info!(
                token_installed = config.session_token.is_some(),
                "Capture session configured"
            ),
            // Discovery reports the rejection to the caller
            Err(e) if e.is_fatal() => warn!(error = %e, "Capture session rejected"),
            Err(e) => return Err(e),
        }

        let permissions = Permissions::for_platform(Arc::clone(&boundary), config.permission_wait());
        Ok(Self {
            config,
            boundary,
            main: None,
            lifecycle: None,
            permissions,
        })
    }

    /// Marshal camera frames to `main` when they arrive on other threads
    pub fn with_main_context(mut self, main: MainContext) -> Self {
        self.main = Some(main);
        self
    }

    /// Deliver pause and quit notifications to streaming sessions
    pub fn with_lifecycle(mut self, lifecycle: Lifecycle) -> Self {
        self.lifecycle = Some(lifecycle);
        self
    }

    /// Replace the permissions provider chosen at startup
    pub fn with_permissions(mut self, permissions: Permissions) -> Self {
        self.permissions = permissions;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn boundary(&self) -> &Arc<dyn CaptureBoundary> {
        &self.boundary
    }

    pub fn main_context(&self) -> Option<&MainContext> {
        self.main.as_ref()
    }

    pub fn lifecycle(&self) -> Option<&Lifecycle> {
        self.lifecycle.as_ref()
    }

    pub fn permissions(&self) -> &Permissions {
        &self.permissions
    }

    pub(crate) fn shared(&self) -> Arc<ContextShared> {
        Arc::new(ContextShared {
            boundary: Arc::clone(&self.boundary),
            main: self.main.clone(),
            lifecycle: self.lifecycle.clone(),
        })
    }
}
