//! Subnet scan with live progress, feeding found devices into the registry.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;

use crate::device::{scan_subnet, DiscoveredDevice, ScanRequest, WiimStatus};
use crate::error::{WiimError, WiimResult};
use crate::protocol_constants::{FALLBACK_SUBNET, SCAN_HOST_COUNT};
use crate::services::player_registry::{NewPlayer, Player, PlayerRegistry, UpsertOutcome};
use crate::utils::{is_valid_subnet_prefix, list_ipv4_interfaces, subnet_prefix};

/// Snapshot served by `/api/scanner/progress`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanSnapshot {
    pub is_scanning: bool,
    pub current: u32,
    pub total: u32,
    /// Percentage, 0-100.
    pub progress: u32,
    #[serde(rename = "currentIP")]
    pub current_ip: Option<String>,
    pub found: usize,
    pub devices: Vec<DiscoveredDevice>,
}

impl Default for ScanSnapshot {
    fn default() -> Self {
        Self {
            is_scanning: false,
            current: 0,
            total: SCAN_HOST_COUNT,
            progress: 0,
            current_ip: None,
            found: 0,
            devices: Vec::new(),
        }
    }
}

/// Shared progress of the (single) running scan.
#[derive(Default)]
pub struct ScanProgress {
    inner: Mutex<ScanSnapshot>,
}

impl ScanProgress {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims the scanner. Fails with `ScanInProgress` if a scan is running.
    ///
    /// The returned guard releases the scanner when dropped, even if the scan
    /// future is abandoned halfway.
    pub fn try_start(&self) -> WiimResult<ScanGuard<'_>> {
        let mut inner = self.inner.lock();
        if inner.is_scanning {
            return Err(WiimError::ScanInProgress);
        }
        *inner = ScanSnapshot {
            is_scanning: true,
            ..Default::default()
        };
        Ok(ScanGuard { progress: self })
    }

    #[must_use]
    pub fn snapshot(&self) -> ScanSnapshot {
        self.inner.lock().clone()
    }
}

pub struct ScanGuard<'a> {
    progress: &'a ScanProgress,
}

impl ScanGuard<'_> {
    /// Records one finished probe.
    pub fn record(&self, ip: &str, found: Option<&DiscoveredDevice>) {
        let mut inner = self.progress.inner.lock();
        inner.current += 1;
        inner.progress = inner.current * 100 / inner.total.max(1);
        inner.current_ip = Some(ip.to_string());
        if let Some(device) = found {
            inner.devices.push(device.clone());
            inner.found = inner.devices.len();
        }
    }
}

impl Drop for ScanGuard<'_> {
    fn drop(&mut self) {
        let mut inner = self.progress.inner.lock();
        inner.is_scanning = false;
        inner.current_ip = None;
    }
}

/// Result of `POST /api/players/scan`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanOutcome {
    pub found: usize,
    pub subnet: String,
    pub devices: Vec<DiscoveredDevice>,
    pub added: usize,
    pub updated: usize,
    pub players: Vec<Player>,
}

pub struct ScanService {
    registry: Arc<PlayerRegistry>,
    device: Arc<dyn WiimStatus>,
    progress: ScanProgress,
    use_https: bool,
    concurrency: usize,
}

impl ScanService {
    pub fn new(
        registry: Arc<PlayerRegistry>,
        device: Arc<dyn WiimStatus>,
        use_https: bool,
        concurrency: usize,
    ) -> Self {
        Self {
            registry,
            device,
            progress: ScanProgress::new(),
            use_https,
            concurrency,
        }
    }

    #[must_use]
    pub fn progress(&self) -> ScanSnapshot {
        self.progress.snapshot()
    }

    /// Scans a /24 and upserts every WiiM device found.
    ///
    /// Without an explicit subnet the first non-loopback interface decides.
    pub async fn scan(&self, subnet: Option<&str>) -> WiimResult<ScanOutcome> {
        let subnet = match subnet.map(str::trim).filter(|s| !s.is_empty()) {
            Some(s) if is_valid_subnet_prefix(s) => s.to_string(),
            Some(s) => {
                return Err(WiimError::InvalidRequest(format!(
                    "subnet must look like 192.168.1, got {}",
                    s
                )))
            }
            None => default_subnet(),
        };

        let guard = self.progress.try_start()?;
        let request = ScanRequest {
            subnet: subnet.clone(),
            use_https: self.use_https,
            concurrency: self.concurrency,
        };
        let devices = scan_subnet(Arc::clone(&self.device), &request, |ip, found| {
            guard.record(ip, found)
        })
        .await;
        drop(guard);

        let mut added = 0;
        let mut updated = 0;
        let mut players = Vec::with_capacity(devices.len());
        for device in &devices {
            let (player, outcome) = self.registry.upsert(NewPlayer {
                ip: device.ip.clone(),
                name: device.info.name.clone(),
                uuid: device.info.uuid.clone(),
                use_https: self.use_https,
            });
            match outcome {
                UpsertOutcome::Created => added += 1,
                UpsertOutcome::Updated => updated += 1,
            }
            players.push(player);
        }

        log::info!(
            "[Scan] {}: {} found, {} added, {} updated",
            subnet,
            devices.len(),
            added,
            updated
        );
        Ok(ScanOutcome {
            found: devices.len(),
            subnet,
            devices,
            added,
            updated,
            players,
        })
    }
}

fn default_subnet() -> String {
    list_ipv4_interfaces()
        .first()
        .map(|iface| subnet_prefix(iface.address))
        .unwrap_or_else(|| FALLBACK_SUBNET.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::mock::MockDevice;
    use tempfile::TempDir;

    #[test]
    fn second_scan_is_rejected_while_running() {
        let progress = ScanProgress::new();
        let guard = progress.try_start().unwrap();
        assert!(matches!(
            progress.try_start(),
            Err(WiimError::ScanInProgress)
        ));
        guard.record("10.0.0.1", None);
        let snap = progress.snapshot();
        assert!(snap.is_scanning);
        assert_eq!(snap.current, 1);
        assert_eq!(snap.total, 254);
        assert_eq!(snap.current_ip.as_deref(), Some("10.0.0.1"));

        drop(guard);
        assert!(!progress.snapshot().is_scanning);
        assert!(progress.try_start().is_ok());
    }

    #[tokio::test]
    async fn found_devices_are_upserted() {
        let dir = TempDir::new().unwrap();
        let registry = Arc::new(PlayerRegistry::load(dir.path()));
        let mock = Arc::new(MockDevice::new());
        mock.set_device_info("10.0.0.7", MockDevice::wiim_info("Kitchen", "uuid-7"));
        let scanner = ScanService::new(registry.clone(), mock.clone(), true, 32);

        let outcome = scanner.scan(Some("10.0.0")).await.unwrap();
        assert_eq!(outcome.found, 1);
        assert_eq!(outcome.added, 1);
        assert_eq!(registry.list()[0].name, "Kitchen");

        // Same uuid at a new address updates the record in place.
        mock.set_device_info("10.0.0.8", MockDevice::wiim_info("Kitchen", "uuid-7"));
        let outcome = scanner.scan(Some("10.0.0")).await.unwrap();
        assert_eq!(outcome.updated, 2);
        assert_eq!(registry.list().len(), 1);

        let progress = scanner.progress();
        assert!(!progress.is_scanning);
        assert_eq!(progress.progress, 100);
    }

    #[tokio::test]
    async fn malformed_subnet_is_rejected() {
        let dir = TempDir::new().unwrap();
        let registry = Arc::new(PlayerRegistry::load(dir.path()));
        let scanner = ScanService::new(registry, Arc::new(MockDevice::new()), true, 8);
        assert!(matches!(
            scanner.scan(Some("10.0")).await,
            Err(WiimError::InvalidRequest(_))
        ));
    }
}
