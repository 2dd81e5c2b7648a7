// SPDX-License-Identifier: GPL-3.0-only

//! Crate-wide constants

use std::time::Duration;

/// Number of handle slots offered to the native side per enumeration call
pub const ENUMERATION_BUFFER_SIZE: usize = 1 << 6;

/// Size of the buffer the native side writes unique IDs and names into
pub const DEVICE_STRING_CAPACITY: usize = 2048;

/// Compute shader workgroup edge (16x16 threads)
pub const WORKGROUP_SIZE: u32 = 16;

/// Extra bytes reserved per row when staging planes for conversion
pub const STAGING_ROW_PADDING: usize = 16;

/// Row alignment required for texture to buffer copies
pub const COPY_ROW_ALIGNMENT: u32 = 256;

/// Default FFT size for the spectrum output
pub const DEFAULT_SPECTRUM_SIZE: usize = 1024;

/// Bounded wait for permission prompts on platforms without a completion callback
pub const DEFAULT_PERMISSION_WAIT: Duration = Duration::from_secs(3);

/// Poll interval while waiting on a permission prompt
pub const PERMISSION_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Environment variable that overrides the configured session token
pub const SESSION_TOKEN_ENV: &str = "MEDIA_CAPTURE_SESSION_TOKEN";

/// Ordering score: devices that are not the default for their media type
pub const SCORE_NOT_DEFAULT: u32 = 10_000;

/// Ordering score: external location
pub const SCORE_EXTERNAL: u32 = 10;

/// Ordering score: unknown location
pub const SCORE_UNKNOWN_LOCATION: u32 = 100;

/// Ordering score: camera devices sort after audio devices
pub const SCORE_CAMERA: u32 = 1000;
