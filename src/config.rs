// SPDX-License-Identifier: GPL-3.0-only

use crate::constants::{DEFAULT_PERMISSION_WAIT, ENUMERATION_BUFFER_SIZE, SESSION_TOKEN_ENV};
use crate::errors::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// Process-wide capture settings
///
/// Passed explicitly into [`crate::MediaContext::new`] at process start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Session token installed on the native boundary before discovery
    pub session_token: Option<String>,
    /// Configure the global audio session before audio discovery (iOS only)
    pub configure_audio_session: bool,
    /// Maximum number of devices a query returns
    pub enumeration_capacity: usize,
    /// Bounded wait for permission prompts without a completion callback
    pub permission_wait_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            session_token: None,
            configure_audio_session: true,
            enumeration_capacity: ENUMERATION_BUFFER_SIZE,
            permission_wait_ms: DEFAULT_PERMISSION_WAIT.as_millis() as u64,
        }
    }
}

impl Config {
    /// Parse a configuration from JSON text
    pub fn from_json_str(text: &str) -> Result<Self> {
        let mut config: Config = serde_json::from_str(text)?;
        config.apply_env();
        Ok(config)
    }

    /// Load a configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&text)
    }

    /// Load from the user configuration directory, falling back to defaults
    pub fn load_default() -> Self {
        let Some(path) = Self::default_path() else {
            return Self::default().with_env();
        };
        if !path.exists() {
            debug!(path = %path.display(), "No config file, using defaults");
            return Self::default().with_env();
        }
        match Self::load(&path) {
            Ok(config) => config,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to load config, using defaults");
                Self::default().with_env()
            }
        }
    }

    /// `<config dir>/media-capture/config.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("media-capture").join("config.json"))
    }

    /// Permission wait as a duration
    pub fn permission_wait(&self) -> Duration {
        Duration::from_millis(self.permission_wait_ms)
    }

    fn with_env(mut self) -> Self {
        self.apply_env();
        self
    }

    fn apply_env(&mut self) {
        if let Ok(token) = std::env::var(SESSION_TOKEN_ENV)
            && !token.is_empty()
        {
            self.session_token = Some(token);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: Config = serde_json::from_str(r#"{ "enumeration_capacity": 4 }"#).unwrap();
        assert_eq!(config.enumeration_capacity, 4);
        assert!(config.configure_audio_session);
        assert_eq!(config.permission_wait(), DEFAULT_PERMISSION_WAIT);
    }

    #[test]
    fn test_invalid_json_is_config_error() {
        let err = Config::from_json_str("{ not json").unwrap_err();
        assert!(matches!(err, crate::Error::Config(_)));
    }
}
