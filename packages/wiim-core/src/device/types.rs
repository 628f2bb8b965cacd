//! Domain types for addressing and commanding WiiM devices.

use serde::{Deserialize, Serialize};

use crate::protocol_constants::{
    CMD_GET_PLAYER_STATUS, CMD_GET_STATUS_EX, CMD_SET_PLAYER, HTTPAPI_PATH, VALID_LOOP_MODES,
};

/// Network address of one physical player.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceEndpoint {
    /// IPv4 address or hostname.
    pub ip: String,
    /// Whether the device API is reached over HTTPS (self-signed).
    pub use_https: bool,
}

impl DeviceEndpoint {
    pub fn new(ip: impl Into<String>, use_https: bool) -> Self {
        Self {
            ip: ip.into(),
            use_https,
        }
    }

    /// Base URL of the device, e.g. `https://192.168.1.20`.
    #[must_use]
    pub fn base_url(&self) -> String {
        let scheme = if self.use_https { "https" } else { "http" };
        format!("{}://{}", scheme, self.ip)
    }

    /// Full request URL for a vendor command.
    #[must_use]
    pub fn command_url(&self, command: &DeviceCommand) -> String {
        format!(
            "{}{}?command={}",
            self.base_url(),
            HTTPAPI_PATH,
            command.as_query()
        )
    }
}

impl std::fmt::Display for DeviceEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.ip)
    }
}

/// Normalized playback state reported by a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    Playing,
    Paused,
    Stopped,
    Loading,
    /// Transitional or undocumented vendor value.
    Unknown,
}

impl PlaybackState {
    /// Maps the vendor `status` string.
    #[must_use]
    pub fn from_vendor(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "play" | "playing" => Self::Playing,
            "pause" | "paused" => Self::Paused,
            "stop" | "stopped" | "none" => Self::Stopped,
            "load" | "loading" | "buffering" => Self::Loading,
            _ => Self::Unknown,
        }
    }
}

/// Plain transport commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportAction {
    /// Resume whatever the device has loaded.
    Play,
    Pause,
    Stop,
    Next,
    Prev,
}

impl TransportAction {
    fn vendor_name(self) -> &'static str {
        match self {
            Self::Play => "play",
            Self::Pause => "pause",
            Self::Stop => "stop",
            Self::Next => "next",
            Self::Prev => "prev",
        }
    }

    /// Parses a route segment such as `next`.
    #[must_use]
    pub fn parse(action: &str) -> Option<Self> {
        match action {
            "play" => Some(Self::Play),
            "pause" => Some(Self::Pause),
            "stop" => Some(Self::Stop),
            "next" => Some(Self::Next),
            "prev" | "previous" => Some(Self::Prev),
            _ => None,
        }
    }
}

/// Relative volume change; the device picks the step size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VolumeStep {
    Up,
    Down,
}

/// Device-native repeat mode.
///
/// Native looping is unreliable with ad-hoc URL playback, so the monitor does
/// not depend on it; the mode is still exposed for manual control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum LoopMode {
    #[default]
    Single,
    RepeatOne,
    RepeatAll,
    Shuffle,
}

impl LoopMode {
    /// Maps a vendor code; anything outside `{0, 1, 2, -1}` becomes `Single`.
    #[must_use]
    pub fn from_code(code: i64) -> Self {
        match code {
            1 => Self::RepeatOne,
            2 => Self::RepeatAll,
            -1 => Self::Shuffle,
            _ => Self::Single,
        }
    }

    #[must_use]
    pub fn code(self) -> i8 {
        match self {
            Self::Single => VALID_LOOP_MODES[0],
            Self::RepeatOne => VALID_LOOP_MODES[1],
            Self::RepeatAll => VALID_LOOP_MODES[2],
            Self::Shuffle => VALID_LOOP_MODES[3],
        }
    }
}

/// A single vendor API command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceCommand {
    GetPlayerStatus,
    GetStatusEx,
    Transport(TransportAction),
    PlayUrl(String),
    Volume(u8),
    VolumeStep(VolumeStep),
    Mute(bool),
    LoopMode(LoopMode),
}

impl DeviceCommand {
    /// Renders the value of the `command` query parameter.
    ///
    /// URL arguments are percent-encoded; the `:` separators are sent raw
    /// because the firmware splits on them before decoding.
    #[must_use]
    pub fn as_query(&self) -> String {
        match self {
            Self::GetPlayerStatus => CMD_GET_PLAYER_STATUS.to_string(),
            Self::GetStatusEx => CMD_GET_STATUS_EX.to_string(),
            Self::Transport(action) => format!("{}:{}", CMD_SET_PLAYER, action.vendor_name()),
            Self::PlayUrl(url) => {
                format!("{}:play:{}", CMD_SET_PLAYER, urlencoding::encode(url))
            }
            Self::Volume(volume) => format!("{}:vol:{}", CMD_SET_PLAYER, (*volume).min(100)),
            Self::VolumeStep(VolumeStep::Up) => format!("{}:vol+", CMD_SET_PLAYER),
            Self::VolumeStep(VolumeStep::Down) => format!("{}:vol-", CMD_SET_PLAYER),
            Self::Mute(mute) => format!("{}:mute:{}", CMD_SET_PLAYER, u8::from(*mute)),
            Self::LoopMode(mode) => format!("{}:loopmode:{}", CMD_SET_PLAYER, mode.code()),
        }
    }

    /// Short label for logs (never includes the URL argument).
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::GetPlayerStatus => "getPlayerStatus",
            Self::GetStatusEx => "getStatusEx",
            Self::Transport(TransportAction::Play) => "play",
            Self::Transport(TransportAction::Pause) => "pause",
            Self::Transport(TransportAction::Stop) => "stop",
            Self::Transport(TransportAction::Next) => "next",
            Self::Transport(TransportAction::Prev) => "prev",
            Self::PlayUrl(_) => "play:url",
            Self::Volume(_) => "vol",
            Self::VolumeStep(VolumeStep::Up) => "vol+",
            Self::VolumeStep(VolumeStep::Down) => "vol-",
            Self::Mute(_) => "mute",
            Self::LoopMode(_) => "loopmode",
        }
    }
}
