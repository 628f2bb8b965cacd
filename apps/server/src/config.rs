//! Server configuration.
//!
//! Supports loading from YAML files with environment variable overrides.

use std::net::IpAddr;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use wiim_core::{MonitorTimings, ReconcilerTimings, RecoveryTimings};

/// Server configuration loaded from YAML with environment overrides.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Preferred HTTP port.
    /// Override: `PORT`
    pub port: u16,

    /// IP address used in media URLs handed to players.
    /// If not specified, auto-detection will be attempted.
    /// Override: `WIIM_ADVERTISE_IP`
    pub advertise_ip: Option<IpAddr>,

    /// Talk to players over HTTPS (self-signed certificates accepted).
    /// Override: `WIIM_USE_HTTPS`
    pub use_https: bool,

    /// Per-request device timeout in milliseconds.
    /// Override: `WIIM_REQUEST_TIMEOUT`
    pub request_timeout_ms: u64,

    /// Collect request statistics.
    /// Override: `ENABLE_STATS`
    pub enable_stats: bool,

    /// Directory for the persisted JSON documents.
    /// Override: `WIIM_DATA_DIR`
    pub data_dir: PathBuf,

    /// Directory for uploaded media.
    /// Override: `WIIM_MEDIA_DIR`
    pub media_dir: PathBuf,

    /// Delay between play commands within a group, in milliseconds.
    /// Override: `WIIM_STAGGER_MS`
    pub stagger_ms: u64,

    /// Maximum accepted upload size in bytes.
    pub max_upload_bytes: usize,

    /// Hosts queried concurrently during a subnet scan.
    /// Override: `WIIM_SCAN_CONCURRENCY`
    pub scan_concurrency: usize,

    /// Per-player monitor polling cadence.
    /// Override: `WIIM_MONITOR_POLL_MS` (active poll interval)
    pub monitor: MonitorTimings,

    /// Global reconciliation schedule.
    /// Override: `WIIM_RECONCILE_INTERVAL` (seconds)
    pub reconciler: ReconcilerTimings,

    /// Startup restore and watchdog schedule.
    /// Overrides: `WIIM_RESTORE_DELAY`, `WIIM_WATCHDOG_INTERVAL` (seconds)
    pub recovery: RecoveryTimings,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let core = wiim_core::Config::default();
        Self {
            port: core.preferred_port,
            advertise_ip: None,
            use_https: core.use_https,
            request_timeout_ms: core.request_timeout_ms,
            enable_stats: core.enable_stats,
            data_dir: core.data_dir,
            media_dir: core.media_dir,
            stagger_ms: core.stagger_ms,
            max_upload_bytes: core.max_upload_bytes,
            scan_concurrency: core.scan_concurrency,
            monitor: core.monitor,
            reconciler: core.reconciler,
            recovery: core.recovery,
        }
    }
}

impl ServerConfig {
    /// Loads configuration from a YAML file, then applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = if let Some(path) = path {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Applies environment variable overrides to the configuration.
    ///
    /// Unparseable values are ignored with a warning.
    fn apply_env_overrides(&mut self) {
        override_from_env("PORT", &mut self.port);
        override_from_env("WIIM_REQUEST_TIMEOUT", &mut self.request_timeout_ms);
        override_from_env("WIIM_STAGGER_MS", &mut self.stagger_ms);
        override_from_env("WIIM_SCAN_CONCURRENCY", &mut self.scan_concurrency);
        override_from_env("WIIM_MONITOR_POLL_MS", &mut self.monitor.active_poll_ms);
        override_from_env("WIIM_RECONCILE_INTERVAL", &mut self.reconciler.interval_secs);
        override_from_env("WIIM_RESTORE_DELAY", &mut self.recovery.restore_delay_secs);
        override_from_env("WIIM_WATCHDOG_INTERVAL", &mut self.recovery.watchdog_interval_secs);

        if let Ok(val) = std::env::var("WIIM_USE_HTTPS") {
            self.use_https = parse_flag(&val, self.use_https);
        }
        if let Ok(val) = std::env::var("ENABLE_STATS") {
            self.enable_stats = parse_flag(&val, self.enable_stats);
        }
        if let Ok(val) = std::env::var("WIIM_ADVERTISE_IP") {
            match val.parse() {
                Ok(ip) => self.advertise_ip = Some(ip),
                Err(_) => log::warn!("Ignoring WIIM_ADVERTISE_IP={:?}: not an IP address", val),
            }
        }

        // Note: WIIM_DATA_DIR and WIIM_MEDIA_DIR are handled by clap via #[arg(env = ...)] in main.rs
    }

    /// Converts to wiim-core's Config type.
    pub fn to_core_config(&self) -> wiim_core::Config {
        wiim_core::Config {
            preferred_port: self.port,
            enable_stats: self.enable_stats,
            data_dir: self.data_dir.clone(),
            media_dir: self.media_dir.clone(),
            max_upload_bytes: self.max_upload_bytes,
            use_https: self.use_https,
            request_timeout_ms: self.request_timeout_ms,
            scan_concurrency: self.scan_concurrency.max(1),
            stagger_ms: self.stagger_ms,
            monitor: self.monitor.clone(),
            reconciler: self.reconciler.clone(),
            recovery: self.recovery.clone(),
        }
    }
}

fn override_from_env<T: std::str::FromStr>(key: &str, target: &mut T) {
    if let Ok(val) = std::env::var(key) {
        match val.parse() {
            Ok(parsed) => *target = parsed,
            Err(_) => log::warn!("Ignoring {}={:?}: not a valid value", key, val),
        }
    }
}

/// `false`, `0`, `no` and `off` disable; `true`, `1`, `yes` and `on` enable.
fn parse_flag(value: &str, current: bool) -> bool {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => current,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yaml_fields_override_defaults() {
        let config: ServerConfig =
            serde_yaml::from_str("port: 8080\nuse_https: false\nstagger_ms: 250\n").unwrap();
        assert_eq!(config.port, 8080);
        assert!(!config.use_https);
        assert_eq!(config.stagger_ms, 250);
        assert_eq!(config.request_timeout_ms, 5000);

        let core = config.to_core_config();
        assert_eq!(core.preferred_port, 8080);
        assert!(!core.use_https);
        assert_eq!(core.stagger_ms, 250);
    }

    #[test]
    fn timing_sections_are_configurable() {
        let yaml = "\
scan_concurrency: 8
monitor:
  active_poll_ms: 750
reconciler:
  interval_secs: 30
recovery:
  restore_delay_secs: 5
  watchdog_interval_secs: 120
";
        let config: ServerConfig = serde_yaml::from_str(yaml).unwrap();
        let core = config.to_core_config();

        assert_eq!(core.scan_concurrency, 8);
        assert_eq!(core.monitor.active_poll_ms, 750);
        assert_eq!(core.monitor.error_backoff_ms, 2000);
        assert_eq!(core.reconciler.interval_secs, 30);
        assert_eq!(
            core.reconciler.first_cycle_secs,
            ReconcilerTimings::default().first_cycle_secs
        );
        assert_eq!(core.recovery.restore_delay_secs, 5);
        assert_eq!(core.recovery.watchdog_interval_secs, 120);
    }

    #[test]
    fn zero_scan_concurrency_is_clamped() {
        let config: ServerConfig = serde_yaml::from_str("scan_concurrency: 0\n").unwrap();
        assert_eq!(config.to_core_config().scan_concurrency, 1);
    }

    #[test]
    fn numeric_env_values_override_and_bad_values_are_ignored() {
        let mut interval = 60u64;
        std::env::set_var("WIIM_TEST_RECONCILE_INTERVAL", "15");
        override_from_env("WIIM_TEST_RECONCILE_INTERVAL", &mut interval);
        assert_eq!(interval, 15);

        std::env::set_var("WIIM_TEST_RECONCILE_INTERVAL", "soon");
        override_from_env("WIIM_TEST_RECONCILE_INTERVAL", &mut interval);
        assert_eq!(interval, 15);
        std::env::remove_var("WIIM_TEST_RECONCILE_INTERVAL");
    }

    #[test]
    fn flags_accept_common_spellings() {
        assert!(parse_flag("true", false));
        assert!(parse_flag("1", false));
        assert!(!parse_flag("false", true));
        assert!(!parse_flag("OFF", true));
        assert!(parse_flag("maybe", true));
    }
}
