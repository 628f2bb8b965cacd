//! Fixed protocol constants that should NOT be changed.
//!
//! These values are defined by the WiiM/LinkPlay HTTP API and by the on-disk
//! layout; tunable timings live in [`crate::state::Config`] instead.

// ─────────────────────────────────────────────────────────────────────────────
// WiiM HTTP API
// ─────────────────────────────────────────────────────────────────────────────

/// Vendor endpoint that accepts every `command=` request.
pub const HTTPAPI_PATH: &str = "/httpapi.asp";

/// Playback status query (state, position, duration, volume, track text).
pub const CMD_GET_PLAYER_STATUS: &str = "getPlayerStatus";

/// Device information query (name, uuid, firmware, Wi-Fi).
pub const CMD_GET_STATUS_EX: &str = "getStatusEx";

/// Prefix shared by every transport/volume command.
pub const CMD_SET_PLAYER: &str = "setPlayerCmd";

/// Loop modes accepted by `setPlayerCmd:loopmode`.
pub const VALID_LOOP_MODES: [i8; 4] = [0, 1, 2, -1];

/// Placeholder string devices send for empty text fields.
pub const UNKNOWN_TEXT: &str = "Unknown";

// ─────────────────────────────────────────────────────────────────────────────
// Discovery
// ─────────────────────────────────────────────────────────────────────────────

/// Host range probed in a /24 subnet scan.
pub const SCAN_HOST_FIRST: u8 = 1;
pub const SCAN_HOST_LAST: u8 = 254;

/// Number of hosts probed per scan.
pub const SCAN_HOST_COUNT: u32 = (SCAN_HOST_LAST - SCAN_HOST_FIRST + 1) as u32;

/// Subnet used when no local IPv4 interface can be found.
pub const FALLBACK_SUBNET: &str = "192.168.1";

// ─────────────────────────────────────────────────────────────────────────────
// Playback
// ─────────────────────────────────────────────────────────────────────────────

/// Tag prefix for ad-hoc groups formed by "play all".
pub const PLAY_ALL_TAG_PREFIX: &str = "playAll";

/// Text-to-speech URL used as the default identification beep.
pub const DEFAULT_BEEP_URL: &str =
    "http://translate.google.com/translate_tts?ie=UTF-8&client=tw-ob&tl=en&q=Beep";

// ─────────────────────────────────────────────────────────────────────────────
// Persistence
// ─────────────────────────────────────────────────────────────────────────────

/// Registry document (players + active player).
pub const PLAYERS_FILE: &str = "players.json";

/// Desired-state document (selections, groups, volumes).
pub const PLAYBACK_FILE: &str = "playback.json";

/// Free-form UI/misc settings document.
pub const SETTINGS_FILE: &str = "settings.json";

/// Media library index.
pub const MEDIA_INDEX_FILE: &str = "media.json";

/// URL path under which media files are served.
pub const MEDIA_URL_PREFIX: &str = "/media";
