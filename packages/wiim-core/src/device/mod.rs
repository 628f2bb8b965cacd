//! WiiM device client: addressing, wire transport, status normalization and
//! discovery.

pub mod client;
pub mod discovery;
#[cfg(test)]
pub(crate) mod mock;
pub mod status;
pub mod traits;
pub mod transport;
pub mod types;

pub use client::WiimClientImpl;
pub use discovery::{probe_device, scan_subnet, DiscoveredDevice, ScanRequest};
pub use status::{decode_hex, DeviceInfo, PlayerStatus};
pub use traits::{WiimDevice, WiimPlayback, WiimStatus, WiimVolumeControl};
pub use transport::{build_device_http_client, DeviceError, DeviceResult};
pub use types::{
    DeviceCommand, DeviceEndpoint, LoopMode, PlaybackState, TransportAction, VolumeStep,
};
