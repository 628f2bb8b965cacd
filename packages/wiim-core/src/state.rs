//! Core configuration types.
//!
//! [`Config`] carries every tunable of the engine. All fields have defaults,
//! so a partial YAML/JSON document deserializes cleanly.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Polling cadence of the per-player monitor.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct MonitorTimings {
    /// Delay between arming a monitor and its first poll.
    pub first_poll_ms: u64,
    /// Poll interval while playing, loading, or stopped mid-track.
    pub active_poll_ms: u64,
    /// Poll interval while paused or in an unknown state.
    pub idle_poll_ms: u64,
    /// Delay after reissuing play before polling again.
    pub after_restart_ms: u64,
    /// Backoff after a failed status query.
    pub error_backoff_ms: u64,
}

impl MonitorTimings {
    #[must_use]
    pub fn first_poll(&self) -> Duration {
        Duration::from_millis(self.first_poll_ms)
    }

    #[must_use]
    pub fn active_poll(&self) -> Duration {
        Duration::from_millis(self.active_poll_ms)
    }

    #[must_use]
    pub fn idle_poll(&self) -> Duration {
        Duration::from_millis(self.idle_poll_ms)
    }

    #[must_use]
    pub fn after_restart(&self) -> Duration {
        Duration::from_millis(self.after_restart_ms)
    }

    #[must_use]
    pub fn error_backoff(&self) -> Duration {
        Duration::from_millis(self.error_backoff_ms)
    }
}

impl Default for MonitorTimings {
    fn default() -> Self {
        Self {
            first_poll_ms: 1000,
            active_poll_ms: 500,
            idle_poll_ms: 1000,
            after_restart_ms: 1000,
            error_backoff_ms: 2000,
        }
    }
}

/// Schedule of the global reconciliation loop.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct ReconcilerTimings {
    pub first_cycle_secs: u64,
    pub interval_secs: u64,
}

impl Default for ReconcilerTimings {
    fn default() -> Self {
        Self {
            first_cycle_secs: 20,
            interval_secs: 15,
        }
    }
}

/// Schedule of startup recovery and the watchdog.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct RecoveryTimings {
    /// Grace delay before restoring desired state.
    pub restore_delay_secs: u64,
    pub watchdog_first_secs: u64,
    pub watchdog_interval_secs: u64,
    /// Pause between groups while restoring.
    pub inter_group_delay_ms: u64,
}

impl Default for RecoveryTimings {
    fn default() -> Self {
        Self {
            restore_delay_secs: 5,
            watchdog_first_secs: 10,
            watchdog_interval_secs: 60,
            inter_group_delay_ms: 500,
        }
    }
}

/// Configuration for the WiiM orchestration engine.
///
/// All fields have sensible defaults.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct Config {
    // Server
    /// Preferred HTTP port; the next free port up to +10 is used if taken.
    pub preferred_port: u16,

    /// Collect request statistics for `/api/stats`.
    pub enable_stats: bool,

    /// Directory holding the persisted JSON documents.
    pub data_dir: PathBuf,

    /// Directory holding uploaded media files.
    pub media_dir: PathBuf,

    /// Maximum accepted upload size in bytes.
    pub max_upload_bytes: usize,

    // Devices
    /// Default scheme for newly registered players.
    pub use_https: bool,

    /// Per-request device timeout (milliseconds).
    pub request_timeout_ms: u64,

    /// Maximum discovery probes in flight.
    pub scan_concurrency: usize,

    // Orchestration
    /// Delay between sequential play commands within a group (milliseconds).
    pub stagger_ms: u64,

    pub monitor: MonitorTimings,
    pub reconciler: ReconcilerTimings,
    pub recovery: RecoveryTimings,
}

impl Config {
    /// Validates the configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.request_timeout_ms == 0 {
            return Err("request_timeout_ms must be >= 1".to_string());
        }
        if self.scan_concurrency == 0 {
            return Err("scan_concurrency must be >= 1".to_string());
        }
        if self.max_upload_bytes == 0 {
            return Err("max_upload_bytes must be >= 1".to_string());
        }
        if self.reconciler.interval_secs == 0 || self.recovery.watchdog_interval_secs == 0 {
            return Err("loop intervals must be >= 1 second".to_string());
        }
        let m = &self.monitor;
        if m.active_poll_ms == 0 || m.idle_poll_ms == 0 || m.error_backoff_ms == 0 {
            return Err("monitor poll intervals must be >= 1 ms".to_string());
        }
        Ok(())
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    #[must_use]
    pub fn stagger(&self) -> Duration {
        Duration::from_millis(self.stagger_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            preferred_port: 3000,
            enable_stats: false,
            data_dir: PathBuf::from("data"),
            media_dir: PathBuf::from("media"),
            max_upload_bytes: 100 * 1024 * 1024,
            use_https: true,
            request_timeout_ms: 5000,
            scan_concurrency: 64,
            stagger_ms: 100,
            monitor: MonitorTimings::default(),
            reconciler: ReconcilerTimings::default(),
            recovery: RecoveryTimings::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_default_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.preferred_port, 3000);
        assert!(config.use_https);
        assert_eq!(config.request_timeout(), Duration::from_secs(5));
        assert_eq!(config.stagger(), Duration::from_millis(100));
    }

    #[test]
    fn config_rejects_zero_values() {
        let mut config = Config::default();
        config.request_timeout_ms = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.monitor.active_poll_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn partial_document_fills_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"stagger_ms": 250, "monitor": {"error_backoff_ms": 4000}}"#)
                .unwrap();
        assert_eq!(config.stagger_ms, 250);
        assert_eq!(config.monitor.error_backoff_ms, 4000);
        assert_eq!(config.monitor.active_poll_ms, 500);
        assert_eq!(config.reconciler.interval_secs, 15);
    }
}
