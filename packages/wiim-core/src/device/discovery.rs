//! Subnet scanning for WiiM devices.
//!
//! Every host of a /24 is probed with `getStatusEx`; hosts that answer with a
//! WiiM-shaped payload are reported. Anything else (timeouts, non-JSON
//! bodies, foreign JSON) simply means "not a WiiM device".

use std::net::Ipv4Addr;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde::Serialize;

use super::status::DeviceInfo;
use super::traits::WiimStatus;
use super::types::DeviceEndpoint;
use crate::protocol_constants::{SCAN_HOST_FIRST, SCAN_HOST_LAST};

/// A device that answered a discovery probe.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveredDevice {
    pub ip: String,
    #[serde(flatten)]
    pub info: DeviceInfo,
}

/// Parameters for one subnet scan.
#[derive(Debug, Clone)]
pub struct ScanRequest {
    /// First three octets, e.g. `192.168.1`.
    pub subnet: String,
    pub use_https: bool,
    /// Maximum probes in flight.
    pub concurrency: usize,
}

/// Probes a single address.
///
/// Returns `None` for anything that is not a WiiM device.
pub async fn probe_device(device: &dyn WiimStatus, endpoint: &DeviceEndpoint) -> Option<DeviceInfo> {
    match device.get_device_info(endpoint).await {
        Ok(info) if info.is_wiim() => Some(info),
        Ok(_) => {
            log::trace!("[Scan] {} answered but is not a WiiM device", endpoint.ip);
            None
        }
        Err(e) => {
            log::trace!("[Scan] {} probe failed: {}", endpoint.ip, e);
            None
        }
    }
}

/// Scans `subnet.1` through `subnet.254`.
///
/// `on_probe` is called once per finished probe, in completion order, with the
/// probed IP and the device found there (if any).
pub async fn scan_subnet<F>(
    device: Arc<dyn WiimStatus>,
    request: &ScanRequest,
    mut on_probe: F,
) -> Vec<DiscoveredDevice>
where
    F: FnMut(&str, Option<&DiscoveredDevice>),
{
    let concurrency = request.concurrency.max(1);
    log::info!(
        "[Scan] Scanning {}.{}-{} (concurrency {})",
        request.subnet,
        SCAN_HOST_FIRST,
        SCAN_HOST_LAST,
        concurrency
    );

    let mut probes = stream::iter(SCAN_HOST_FIRST..=SCAN_HOST_LAST)
        .map(|host| {
            let device = Arc::clone(&device);
            let endpoint = DeviceEndpoint::new(format!("{}.{}", request.subnet, host), request.use_https);
            async move {
                let found = probe_device(device.as_ref(), &endpoint)
                    .await
                    .map(|info| DiscoveredDevice {
                        ip: endpoint.ip.clone(),
                        info,
                    });
                (endpoint.ip, found)
            }
        })
        .buffer_unordered(concurrency);

    let mut devices = Vec::new();
    while let Some((ip, found)) = probes.next().await {
        on_probe(&ip, found.as_ref());
        if let Some(found) = found {
            log::info!(
                "[Scan] Found {} at {}",
                found.info.name.as_deref().unwrap_or("unnamed device"),
                found.ip
            );
            devices.push(found);
        }
    }

    devices.sort_by_key(|d| d.ip.parse::<Ipv4Addr>().ok());
    log::info!("[Scan] Completed: {} device(s) on {}", devices.len(), request.subnet);
    devices
}
