//! Centralized error types for the WiiM core library.
//!
//! This module provides a unified error handling system that:
//! - Defines structured error types using `thiserror`
//! - Maps errors to appropriate HTTP status codes
//! - Implements `IntoResponse` for automatic JSON error responses

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use crate::device::DeviceError;
use crate::persistence::PersistenceError;

/// Trait for error types that provide machine-readable error codes.
pub trait ErrorCode {
    /// Returns a machine-readable error code for API responses.
    fn code(&self) -> &'static str;
}

impl ErrorCode for DeviceError {
    fn code(&self) -> &'static str {
        match self {
            Self::Unreachable { .. } => "device_unreachable",
            Self::HttpStatus { .. } => "device_http_error",
            Self::Malformed { .. } => "malformed_device_response",
        }
    }
}

impl ErrorCode for PersistenceError {
    fn code(&self) -> &'static str {
        match self {
            Self::Io { .. } => "persistence_io_error",
            Self::Serialize { .. } => "persistence_serialize_error",
        }
    }
}

/// Application-wide error type.
#[derive(Debug, Error, Serialize)]
#[serde(tag = "type", content = "details")]
pub enum WiimError {
    /// Device timed out, refused the connection, or answered with an error status.
    #[error("Device unreachable: {0}")]
    DeviceUnreachable(String),

    /// Device answered with something other than the expected JSON.
    #[error("Malformed device response: {0}")]
    MalformedDeviceResponse(String),

    #[error("Player not found: {0}")]
    UnknownPlayer(String),

    /// A single-player shortcut was used before any player was registered.
    #[error("No active player")]
    NoActivePlayer,

    #[error("Group not found: {0}")]
    UnknownGroup(String),

    #[error("Media file not found: {0}")]
    MediaNotFound(String),

    /// Writing a durable document failed.
    #[error("Failed to persist state: {0}")]
    PersistenceFailure(String),

    /// Group created with fewer than two valid members.
    #[error("Invalid group: {0}")]
    InvalidGroupComposition(String),

    /// Client sent an invalid or malformed request.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("A network scan is already in progress")]
    ScanInProgress,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl WiimError {
    /// Returns a machine-readable error code for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            Self::DeviceUnreachable(_) => "device_unreachable",
            Self::MalformedDeviceResponse(_) => "malformed_device_response",
            Self::UnknownPlayer(_) => "player_not_found",
            Self::NoActivePlayer => "no_active_player",
            Self::UnknownGroup(_) => "group_not_found",
            Self::MediaNotFound(_) => "media_not_found",
            Self::PersistenceFailure(_) => "persistence_failure",
            Self::InvalidGroupComposition(_) => "invalid_group",
            Self::InvalidRequest(_) => "invalid_request",
            Self::ScanInProgress => "scan_in_progress",
            Self::Internal(_) => "internal_error",
        }
    }

    /// Maps the error to an appropriate HTTP status code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::DeviceUnreachable(_) | Self::MalformedDeviceResponse(_) => {
                StatusCode::BAD_GATEWAY
            }
            Self::UnknownPlayer(_)
            | Self::NoActivePlayer
            | Self::UnknownGroup(_)
            | Self::MediaNotFound(_) => StatusCode::NOT_FOUND,
            Self::InvalidGroupComposition(_) | Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::ScanInProgress => StatusCode::CONFLICT,
            Self::PersistenceFailure(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Result Type Aliases
// ─────────────────────────────────────────────────────────────────────────────

pub use crate::device::DeviceResult;
pub use crate::persistence::PersistenceResult;

/// Convenient Result alias for application-wide operations.
pub type WiimResult<T> = Result<T, WiimError>;

/// JSON response body for error responses.
#[derive(Serialize)]
struct ErrorResponse {
    error: &'static str,
    message: String,
    status: u16,
}

impl IntoResponse for WiimError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: self.code(),
            message: self.to_string(),
            status: status.as_u16(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<DeviceError> for WiimError {
    fn from(err: DeviceError) -> Self {
        match err {
            DeviceError::Malformed { .. } => Self::MalformedDeviceResponse(err.to_string()),
            DeviceError::Unreachable { .. } | DeviceError::HttpStatus { .. } => {
                Self::DeviceUnreachable(err.to_string())
            }
        }
    }
}

impl From<PersistenceError> for WiimError {
    fn from(err: PersistenceError) -> Self {
        Self::PersistenceFailure(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_errors_map_to_bad_gateway() {
        let err: WiimError = DeviceError::Unreachable {
            ip: "192.168.1.20".into(),
            reason: "request timed out".into(),
        }
        .into();
        assert_eq!(err.code(), "device_unreachable");
        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);

        let err: WiimError = DeviceError::Malformed {
            ip: "192.168.1.20".into(),
            reason: "not JSON".into(),
        }
        .into();
        assert_eq!(err.code(), "malformed_device_response");
        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn lookup_errors_are_not_found() {
        for err in [
            WiimError::UnknownPlayer("p1".into()),
            WiimError::UnknownGroup("g1".into()),
            WiimError::MediaNotFound("a.mp3".into()),
            WiimError::NoActivePlayer,
        ] {
            assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        }
    }

    #[test]
    fn invalid_group_is_bad_request() {
        let err = WiimError::InvalidGroupComposition("need at least 2 players".into());
        assert_eq!(err.code(), "invalid_group");
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn scan_in_progress_is_conflict() {
        assert_eq!(WiimError::ScanInProgress.status_code(), StatusCode::CONFLICT);
    }
}
