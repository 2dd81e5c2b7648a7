// SPDX-License-Identifier: MPL-2.0

//! Integration tests for configuration module

use media_capture::constants::{DEFAULT_PERMISSION_WAIT, ENUMERATION_BUFFER_SIZE};
use media_capture::{Config, Error};
use std::path::PathBuf;
use std::time::Duration;

fn temp_config(name: &str, contents: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("media-capture-tests-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(name);
    std::fs::write(&path, contents).unwrap();
    path
}

#[test]
fn test_config_default() {
    let config = Config::default();

    assert!(
        config.configure_audio_session,
        "Audio session setup should be enabled by default"
    );
    assert_eq!(config.enumeration_capacity, ENUMERATION_BUFFER_SIZE);
    assert_eq!(config.permission_wait(), DEFAULT_PERMISSION_WAIT);
}

#[test]
fn test_config_serializes_round_trip() {
    let config = Config {
        session_token: Some("token".into()),
        configure_audio_session: false,
        enumeration_capacity: 8,
        permission_wait_ms: 250,
    };
    let text = serde_json::to_string_pretty(&config).unwrap();
    let parsed: Config = serde_json::from_str(&text).unwrap();
    assert_eq!(parsed, config);
    assert_eq!(parsed.permission_wait(), Duration::from_millis(250));
}

#[test]
fn test_config_load_from_file() {
    let path = temp_config(
        "load.json",
        r#"{ "configure_audio_session": false, "permission_wait_ms": 10 }"#,
    );
    let config = Config::load(&path).unwrap();

    assert!(!config.configure_audio_session);
    assert_eq!(config.permission_wait(), Duration::from_millis(10));
    // Missing keys keep their defaults
    assert_eq!(config.enumeration_capacity, ENUMERATION_BUFFER_SIZE);
    let _ = std::fs::remove_file(path);
}

#[test]
fn test_config_load_missing_file() {
    let path = std::env::temp_dir().join("media-capture-tests-missing").join("config.json");
    let err = Config::load(&path).unwrap_err();
    assert!(matches!(err, Error::Config(_)), "got {err:?}");
}

#[test]
fn test_config_default_path() {
    if let Some(path) = Config::default_path() {
        assert!(path.ends_with("media-capture/config.json"));
    }
}
