//! Normalization boundary for vendor status payloads.
//!
//! Devices return loosely-typed JSON: numbers arrive as strings, text fields
//! are hex-encoded UTF-8, and any field may be missing. Everything downstream
//! works on [`PlayerStatus`] and [`DeviceInfo`] only.

use serde::Serialize;
use serde_json::{Map, Value};

use super::types::PlaybackState;
use crate::protocol_constants::UNKNOWN_TEXT;

/// Raw JSON object returned by a status query.
pub type RawPayload = Map<String, Value>;

// ─────────────────────────────────────────────────────────────────────────────
// Player Status
// ─────────────────────────────────────────────────────────────────────────────

/// Normalized playback status of one device.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerStatus {
    pub playback_state: PlaybackState,
    pub position_ms: u64,
    pub duration_ms: u64,
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    /// Volume 0-100.
    pub volume: Option<u8>,
    pub muted: Option<bool>,
    /// RSSI in dBm.
    pub wifi_signal: Option<i32>,
    pub device_name: Option<String>,
    pub ssid: Option<String>,
}

impl PlayerStatus {
    /// Creates a status with only the transport fields populated.
    #[must_use]
    pub fn new(playback_state: PlaybackState, position_ms: u64, duration_ms: u64) -> Self {
        Self {
            playback_state,
            position_ms,
            duration_ms,
            title: None,
            artist: None,
            album: None,
            volume: None,
            muted: None,
            wifi_signal: None,
            device_name: None,
            ssid: None,
        }
    }

    /// Normalizes a vendor payload. Missing fields become defaults.
    #[must_use]
    pub fn from_raw(raw: &RawPayload) -> Self {
        let playback_state = raw
            .get("status")
            .and_then(Value::as_str)
            .map(PlaybackState::from_vendor)
            .unwrap_or(PlaybackState::Unknown);

        Self {
            playback_state,
            position_ms: field_u64(raw, "curpos").unwrap_or(0),
            duration_ms: field_u64(raw, "totlen").unwrap_or(0),
            title: field_text(raw, "Title"),
            artist: field_text(raw, "Artist"),
            album: field_text(raw, "Album"),
            volume: field_u64(raw, "vol").map(|v| v.min(100) as u8),
            muted: field_i64(raw, "mute").map(|m| m != 0),
            wifi_signal: field_i64(raw, "RSSI").map(|r| r as i32),
            device_name: field_plain(raw, "DeviceName"),
            ssid: field_text(raw, "essid"),
        }
    }

    /// Track ran to its end and the device stopped on its own.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.playback_state == PlaybackState::Stopped
            && self.duration_ms > 0
            && self.position_ms >= self.duration_ms
    }

    /// Device stopped with a track loaded: either stuck mid-track or finished
    /// and not yet restarted.
    #[must_use]
    pub fn is_stalled(&self) -> bool {
        self.playback_state == PlaybackState::Stopped && self.duration_ms > 0
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Device Info
// ─────────────────────────────────────────────────────────────────────────────

/// Identity and network details reported by `getStatusEx`.
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    pub name: Option<String>,
    pub uuid: Option<String>,
    pub firmware: Option<String>,
    pub project: Option<String>,
    pub hardware: Option<String>,
    pub ssid: Option<String>,
    pub rssi: Option<i32>,
}

impl DeviceInfo {
    #[must_use]
    pub fn from_raw(raw: &RawPayload) -> Self {
        Self {
            name: field_plain(raw, "DeviceName"),
            uuid: field_plain(raw, "uuid"),
            firmware: field_plain(raw, "firmware"),
            project: field_plain(raw, "project"),
            hardware: field_plain(raw, "hardware"),
            ssid: field_text(raw, "essid"),
            rssi: field_i64(raw, "RSSI").map(|r| r as i32),
        }
    }

    /// Only LinkPlay firmware reports both an identity and a build field;
    /// cameras and routers answering JSON on the same path do not.
    #[must_use]
    pub fn is_wiim(&self) -> bool {
        (self.name.is_some() || self.uuid.is_some())
            && (self.firmware.is_some() || self.project.is_some() || self.hardware.is_some())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Field helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Decodes a hex-encoded UTF-8 string.
///
/// Pairs of hex digits are read as bytes and zero bytes are skipped. Input that
/// is not hex, decodes to nothing, or does not form printable UTF-8 is
/// returned unchanged.
#[must_use]
pub fn decode_hex(input: &str) -> String {
    if input.is_empty() || input == UNKNOWN_TEXT {
        return input.to_string();
    }
    if input.len() % 2 != 0 || !input.bytes().all(|b| b.is_ascii_hexdigit()) {
        return input.to_string();
    }

    let bytes: Vec<u8> = input
        .as_bytes()
        .chunks(2)
        .filter_map(|pair| std::str::from_utf8(pair).ok())
        .filter_map(|pair| u8::from_str_radix(pair, 16).ok())
        .filter(|&b| b != 0)
        .collect();

    match String::from_utf8(bytes) {
        Ok(decoded)
            if !decoded.is_empty()
                && !decoded.chars().any(|c| c.is_control() && !c.is_whitespace()) =>
        {
            decoded
        }
        _ => input.to_string(),
    }
}

fn field_u64(raw: &RawPayload, key: &str) -> Option<u64> {
    match raw.get(key)? {
        Value::Number(n) => n.as_u64().or_else(|| n.as_f64().map(|f| f.max(0.0) as u64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn field_i64(raw: &RawPayload, key: &str) -> Option<i64> {
    match raw.get(key)? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn field_plain(raw: &RawPayload, key: &str) -> Option<String> {
    match raw.get(key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn field_text(raw: &RawPayload, key: &str) -> Option<String> {
    field_plain(raw, key).map(|s| decode_hex(&s))
}
