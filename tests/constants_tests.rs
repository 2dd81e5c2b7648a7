// SPDX-License-Identifier: MPL-2.0

//! Integration tests for constants module

use media_capture::constants::*;

#[test]
fn test_ordering_scores_are_hierarchical() {
    // Default beats location, location beats media type
    let worst_default = SCORE_UNKNOWN_LOCATION + SCORE_CAMERA;
    assert!(
        worst_default < SCORE_NOT_DEFAULT,
        "Any default device should sort before every non-default one"
    );
    assert!(SCORE_EXTERNAL < SCORE_UNKNOWN_LOCATION);
    assert!(SCORE_UNKNOWN_LOCATION < SCORE_CAMERA);
}

#[test]
fn test_buffer_sizes() {
    assert!(ENUMERATION_BUFFER_SIZE > 0);
    assert!(DEVICE_STRING_CAPACITY >= 256);
    assert!(DEFAULT_SPECTRUM_SIZE.is_power_of_two());
}

#[test]
fn test_gpu_alignment() {
    assert_eq!(COPY_ROW_ALIGNMENT % 4, 0);
    assert!(WORKGROUP_SIZE.is_power_of_two());
}

#[test]
fn test_permission_poll_fits_in_wait() {
    assert!(PERMISSION_POLL_INTERVAL < DEFAULT_PERMISSION_WAIT);
}
