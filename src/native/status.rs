// SPDX-License-Identifier: GPL-3.0-only

//! Status codes and capability flags shared with the native library

use crate::errors::{Error, Result, SessionFailure};
use tracing::warn;

/// Status code returned by boundary calls
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok = 0,
    InvalidArgument = 1,
    InvalidOperation = 2,
    NotImplemented = 3,
    InvalidSession = 101,
    MissingHub = 102,
    InvalidHub = 103,
    InvalidPlan = 104,
    LimitedPlan = 105,
}

impl Status {
    /// Decode a raw status. Unrecognized codes are treated as invalid operations.
    pub fn from_raw(code: i32) -> Self {
        match code {
            0 => Status::Ok,
            1 => Status::InvalidArgument,
            2 => Status::InvalidOperation,
            3 => Status::NotImplemented,
            101 => Status::InvalidSession,
            102 => Status::MissingHub,
            103 => Status::InvalidHub,
            104 => Status::InvalidPlan,
            105 => Status::LimitedPlan,
            _ => Status::InvalidOperation,
        }
    }

    /// The local error kind for this status, if it is not `Ok`
    ///
    /// `LimitedPlan` maps to [`Error::PlanRestricted`] here; [`Status::check`]
    /// is the place that downgrades it to a warning.
    pub fn into_error(self) -> Option<Error> {
        match self {
            Status::Ok => None,
            Status::InvalidArgument => Some(Error::InvalidArgument("rejected by capture backend".into())),
            Status::InvalidOperation => {
                Some(Error::InvalidOperation("rejected by capture backend".into()))
            }
            Status::NotImplemented => {
                Some(Error::NotImplemented("not supported by capture backend".into()))
            }
            Status::InvalidSession => Some(Error::SessionInvalid(SessionFailure::InvalidSession)),
            Status::MissingHub => Some(Error::SessionInvalid(SessionFailure::MissingHub)),
            Status::InvalidHub => Some(Error::SessionInvalid(SessionFailure::InvalidHub)),
            Status::InvalidPlan => Some(Error::SessionInvalid(SessionFailure::InvalidPlan)),
            Status::LimitedPlan => Some(Error::PlanRestricted),
        }
    }

    /// Translate into a result. A limited plan logs a warning and continues.
    pub fn check(self) -> Result<()> {
        match self.into_error() {
            None => Ok(()),
            Some(Error::PlanRestricted) => {
                warn!("Capture plan is limited, continuing with reduced functionality");
                Ok(())
            }
            Some(err) => Err(err),
        }
    }
}

/// Where a device sits relative to the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceLocation {
    Unknown = 0,
    Internal = 1,
    External = 2,
}

/// Capability bit-set reported by the native side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct DeviceFlags(pub u32);

impl DeviceFlags {
    pub const INTERNAL: Self = Self(1 << 0);
    pub const EXTERNAL: Self = Self(1 << 1);
    pub const ECHO_CANCELLATION: Self = Self(1 << 2);
    pub const DEFAULT: Self = Self(1 << 3);
    pub const FRONT_FACING: Self = Self(1 << 6);
    pub const FLASH: Self = Self(1 << 7);
    pub const TORCH: Self = Self(1 << 8);
    pub const EXPOSURE_POINT: Self = Self(1 << 9);
    pub const FOCUS_POINT: Self = Self(1 << 10);
    pub const EXPOSURE_LOCK: Self = Self(1 << 11);
    pub const FOCUS_LOCK: Self = Self(1 << 12);
    pub const WHITE_BALANCE_LOCK: Self = Self(1 << 13);
    pub const EXPOSURE_MANUAL: Self = Self(1 << 14);
    pub const DEPTH: Self = Self(1 << 15);
    pub const EXPOSURE_CONTINUOUS: Self = Self(1 << 16);
    pub const FOCUS_CONTINUOUS: Self = Self(1 << 17);
    pub const WHITE_BALANCE_CONTINUOUS: Self = Self(1 << 18);
    pub const VIDEO_STABILIZATION: Self = Self(1 << 19);

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Location encoded in the low two bits
    pub fn location(self) -> DeviceLocation {
        match self.0 & 0x3 {
            1 => DeviceLocation::Internal,
            2 => DeviceLocation::External,
            _ => DeviceLocation::Unknown,
        }
    }
}

impl std::ops::BitOr for DeviceFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for DeviceFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip_codes() {
        for code in [0, 1, 2, 3, 101, 102, 103, 104, 105] {
            assert_eq!(Status::from_raw(code) as i32, code);
        }
        assert_eq!(Status::from_raw(42), Status::InvalidOperation);
    }

    #[test]
    fn test_limited_plan_is_a_warning() {
        assert!(Status::LimitedPlan.check().is_ok());
        assert_eq!(Status::LimitedPlan.into_error(), Some(Error::PlanRestricted));
    }

    #[test]
    fn test_session_codes_map_to_session_invalid() {
        for status in [
            Status::InvalidSession,
            Status::MissingHub,
            Status::InvalidHub,
            Status::InvalidPlan,
        ] {
            assert!(matches!(status.check(), Err(Error::SessionInvalid(_))));
        }
    }

    #[test]
    fn test_flags_location() {
        assert_eq!(DeviceFlags::INTERNAL.location(), DeviceLocation::Internal);
        assert_eq!(
            (DeviceFlags::EXTERNAL | DeviceFlags::TORCH).location(),
            DeviceLocation::External
        );
        assert_eq!(DeviceFlags::DEFAULT.location(), DeviceLocation::Unknown);
        assert!((DeviceFlags::FLASH | DeviceFlags::TORCH).contains(DeviceFlags::TORCH));
    }
}
