//! Unified error type for the busyindicator-lib crate.
//!
//! [`BusyIndicatorError`] wraps module-specific errors (`DeviceError`,
//! `IndexError`, `AuthError`, `ApiError`) and domain-specific error kinds
//! (`Config`, `Color`). `From` impls allow `?` to propagate across module
//! boundaries seamlessly.

use std::fmt;

use crate::auth::AuthError;
use crate::device::DeviceError;
use crate::graph::ApiError;
use crate::led::IndexError;

/// Unified error type for busyindicator-lib operations.
#[derive(Debug)]
pub enum BusyIndicatorError {
    /// Light strip transport error (open, permission, write).
    Device(DeviceError),
    /// Cell index outside the configured strip length. Indicates a bug.
    Index(IndexError),
    /// Credential could not be obtained or refreshed.
    Auth(AuthError),
    /// Remote presence API failure.
    Api(ApiError),
    /// Standard I/O error (file read/write, config persistence).
    Io(std::io::Error),
    /// Configuration validation error. Fatal at startup.
    Config(String),
    /// Color parsing error.
    Color(String),
}

impl fmt::Display for BusyIndicatorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BusyIndicatorError::Device(e) => write!(f, "{e}"),
            BusyIndicatorError::Index(e) => write!(f, "{e}"),
            BusyIndicatorError::Auth(e) => write!(f, "{e}"),
            BusyIndicatorError::Api(e) => write!(f, "{e}"),
            BusyIndicatorError::Io(e) => write!(f, "I/O error: {e}"),
            BusyIndicatorError::Config(e) => write!(f, "Config error: {e}"),
            BusyIndicatorError::Color(e) => write!(f, "Color error: {e}"),
        }
    }
}

impl std::error::Error for BusyIndicatorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BusyIndicatorError::Device(e) => Some(e),
            BusyIndicatorError::Index(e) => Some(e),
            BusyIndicatorError::Auth(e) => Some(e),
            BusyIndicatorError::Api(e) => Some(e),
            BusyIndicatorError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<DeviceError> for BusyIndicatorError {
    fn from(e: DeviceError) -> Self {
        BusyIndicatorError::Device(e)
    }
}

impl From<IndexError> for BusyIndicatorError {
    fn from(e: IndexError) -> Self {
        BusyIndicatorError::Index(e)
    }
}

impl From<AuthError> for BusyIndicatorError {
    fn from(e: AuthError) -> Self {
        BusyIndicatorError::Auth(e)
    }
}

impl From<ApiError> for BusyIndicatorError {
    fn from(e: ApiError) -> Self {
        BusyIndicatorError::Api(e)
    }
}

impl From<std::io::Error> for BusyIndicatorError {
    fn from(e: std::io::Error) -> Self {
        BusyIndicatorError::Io(e)
    }
}

impl BusyIndicatorError {
    /// Whether this error should end the process rather than be absorbed by
    /// the poll loop.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            BusyIndicatorError::Config(_) | BusyIndicatorError::Auth(_)
        )
    }
}

/// Crate-level Result alias using [`BusyIndicatorError`].
pub type Result<T> = std::result::Result<T, BusyIndicatorError>;
