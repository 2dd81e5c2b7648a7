// SPDX-License-Identifier: MPL-2.0

//! Error types for media capture
//!
//! Native status codes are translated into [`Error`] at the first point of
//! contact (see [`crate::native::Status::check`]) and surfaced to the
//! immediate caller from there.

use thiserror::Error;

/// Result type alias using [`Error`]
pub type Result<T> = std::result::Result<T, Error>;

/// Why the capture session was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionFailure {
    /// The session token is missing or was rejected
    InvalidSession,
    /// The auxiliary hub component is not installed
    MissingHub,
    /// The auxiliary hub component is present but unusable
    InvalidHub,
    /// The account plan does not allow capture at all
    InvalidPlan,
}

impl std::fmt::Display for SessionFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionFailure::InvalidSession => write!(f, "session token is missing or invalid"),
            SessionFailure::MissingHub => write!(f, "hub component is missing"),
            SessionFailure::InvalidHub => write!(f, "hub component is invalid"),
            SessionFailure::InvalidPlan => write!(f, "plan does not permit capture"),
        }
    }
}

/// Main error type
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// Malformed caller input
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Operation called in the wrong state
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// Feature not present on this build or platform
    #[error("not implemented: {0}")]
    NotImplemented(String),

    /// Session token or licensing rejected; fatal to discovery
    #[error("capture session rejected: {0}")]
    SessionInvalid(SessionFailure),

    /// Degraded functionality. Only surfaced when asked for explicitly.
    #[error("capture plan restricts functionality")]
    PlanRestricted,

    /// The conversion pipeline received a pixel format it cannot handle
    #[error("unknown image format: {0}")]
    UnknownFormat(i32),

    /// GPU device or pipeline failure
    #[error("GPU error: {0}")]
    Gpu(String),

    /// Configuration could not be read or parsed
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Whether discovery can never succeed until the session is fixed externally
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::SessionInvalid(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Config(err.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        let err = Error::InvalidArgument("destination is 12 bytes".into());
        assert_eq!(err.to_string(), "invalid argument: destination is 12 bytes");

        let err = Error::SessionInvalid(SessionFailure::MissingHub);
        assert!(err.to_string().contains("hub component is missing"));
    }

    #[test]
    fn test_only_session_errors_are_fatal() {
        assert!(Error::SessionInvalid(SessionFailure::InvalidSession).is_fatal());
        assert!(!Error::PlanRestricted.is_fatal());
        assert!(!Error::UnknownFormat(9).is_fatal());
    }
}
