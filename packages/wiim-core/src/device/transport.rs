//! Low-level HTTP transport for the WiiM `httpapi.asp` command API.
//!
//! Builds the request URL, performs the GET and classifies failures. For the
//! typed command surface, see `client.rs`.

use std::time::{Duration, Instant};

use reqwest::Client;
use serde_json::Value;
use thiserror::Error;

use super::status::RawPayload;
use super::types::{DeviceCommand, DeviceEndpoint};

// ─────────────────────────────────────────────────────────────────────────────
// Error Types
// ─────────────────────────────────────────────────────────────────────────────

/// Errors that can occur while talking to a WiiM device.
#[derive(Debug, Error)]
pub enum DeviceError {
    /// Timeout, connection refused, or any other transport-level failure.
    #[error("Device {ip} unreachable: {reason}")]
    Unreachable { ip: String, reason: String },

    /// Device answered with a non-success HTTP status.
    #[error("Device {ip} returned HTTP {status}")]
    HttpStatus { ip: String, status: u16 },

    /// Device answered, but the body is not the expected JSON.
    #[error("Malformed response from {ip}: {reason}")]
    Malformed { ip: String, reason: String },
}

/// Convenient Result alias for device operations.
pub type DeviceResult<T> = Result<T, DeviceError>;

impl DeviceError {
    /// Returns true if this error is a network condition that may clear on
    /// its own (device rebooting, Wi-Fi hiccup).
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            DeviceError::Unreachable { .. } => true,
            DeviceError::HttpStatus { status, .. } => *status >= 500,
            DeviceError::Malformed { .. } => false,
        }
    }

    fn unreachable(device: &DeviceEndpoint, err: &reqwest::Error) -> Self {
        let reason = if err.is_timeout() {
            "request timed out".to_string()
        } else if err.is_connect() {
            format!("connection failed: {}", err)
        } else {
            err.to_string()
        };
        DeviceError::Unreachable {
            ip: device.ip.clone(),
            reason,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// HTTP client
// ─────────────────────────────────────────────────────────────────────────────

/// Builds the shared HTTP client for device traffic.
///
/// Devices serve HTTPS with self-signed certificates, so certificate
/// validation is disabled for this client only.
pub fn build_device_http_client(timeout: Duration) -> reqwest::Result<Client> {
    Client::builder()
        .timeout(timeout)
        .danger_accept_invalid_certs(true)
        .build()
}

// ─────────────────────────────────────────────────────────────────────────────
// Request/Response
// ─────────────────────────────────────────────────────────────────────────────

/// Sends one vendor command and returns the raw response body.
///
/// Command endpoints answer with a plain `OK`, so only the HTTP status is
/// checked here.
pub async fn send_command(
    client: &Client,
    device: &DeviceEndpoint,
    command: &DeviceCommand,
) -> DeviceResult<String> {
    let url = device.command_url(command);
    log::debug!("[WiiM] {} -> {}", command.label(), device.ip);

    let start = Instant::now();
    let res = client
        .get(&url)
        .send()
        .await
        .map_err(|e| DeviceError::unreachable(device, &e))?;

    let status = res.status();
    let body = res
        .text()
        .await
        .map_err(|e| DeviceError::unreachable(device, &e))?;

    log::debug!(
        "[WiiM] {} on {} completed in {:?}: {}",
        command.label(),
        device.ip,
        start.elapsed(),
        status
    );

    if !status.is_success() {
        return Err(DeviceError::HttpStatus {
            ip: device.ip.clone(),
            status: status.as_u16(),
        });
    }

    Ok(body)
}

/// Sends a query command and parses the JSON object it returns.
pub async fn query_json(
    client: &Client,
    device: &DeviceEndpoint,
    command: &DeviceCommand,
) -> DeviceResult<RawPayload> {
    let body = send_command(client, device, command).await?;
    parse_payload(device, &body)
}

/// Parses a status body. Anything but a JSON object is malformed.
pub(crate) fn parse_payload(device: &DeviceEndpoint, body: &str) -> DeviceResult<RawPayload> {
    match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(DeviceError::Malformed {
            ip: device.ip.clone(),
            reason: format!("expected JSON object, got {}", json_kind(&other)),
        }),
        Err(e) => Err(DeviceError::Malformed {
            ip: device.ip.clone(),
            reason: format!("not JSON: {}", e),
        }),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
