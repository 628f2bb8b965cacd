//! Trait abstractions for WiiM device operations.
//!
//! These traits enable dependency injection for testability and modularity.
//! Services depend on traits rather than concrete implementations.

use async_trait::async_trait;

use super::status::{DeviceInfo, PlayerStatus};
use super::transport::DeviceResult;
use super::types::{DeviceEndpoint, LoopMode, TransportAction, VolumeStep};

/// Trait for playback control.
///
/// Every method is a single idempotent network call with a fixed timeout.
/// A successful `play_url` only means the device accepted the command;
/// whether it actually plays is checked by the monitor and reconciler.
#[async_trait]
pub trait WiimPlayback: Send + Sync {
    /// Loads and plays a media URL.
    async fn play_url(&self, device: &DeviceEndpoint, url: &str) -> DeviceResult<()>;

    /// Sends a plain transport command.
    async fn transport(&self, device: &DeviceEndpoint, action: TransportAction)
        -> DeviceResult<()>;

    /// Sets the device-native repeat mode.
    async fn set_loop_mode(&self, device: &DeviceEndpoint, mode: LoopMode) -> DeviceResult<()>;

    /// Resumes whatever the device has loaded.
    async fn resume(&self, device: &DeviceEndpoint) -> DeviceResult<()> {
        self.transport(device, TransportAction::Play).await
    }

    async fn pause(&self, device: &DeviceEndpoint) -> DeviceResult<()> {
        self.transport(device, TransportAction::Pause).await
    }

    async fn stop(&self, device: &DeviceEndpoint) -> DeviceResult<()> {
        self.transport(device, TransportAction::Stop).await
    }
}

/// Trait for status queries.
#[async_trait]
pub trait WiimStatus: Send + Sync {
    /// Fetches and normalizes the playback status.
    async fn get_status(&self, device: &DeviceEndpoint) -> DeviceResult<PlayerStatus>;

    /// Fetches identity information, used by discovery.
    async fn get_device_info(&self, device: &DeviceEndpoint) -> DeviceResult<DeviceInfo>;
}

/// Trait for volume and mute control.
#[async_trait]
pub trait WiimVolumeControl: Send + Sync {
    /// Sets the volume (0-100, values > 100 are clamped).
    async fn set_volume(&self, device: &DeviceEndpoint, volume: u8) -> DeviceResult<()>;

    /// Nudges the volume one device-defined step.
    async fn step_volume(&self, device: &DeviceEndpoint, step: VolumeStep) -> DeviceResult<()>;

    async fn set_mute(&self, device: &DeviceEndpoint, mute: bool) -> DeviceResult<()>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Combined Traits (for trait objects)
// ─────────────────────────────────────────────────────────────────────────────

/// Combined trait for all device operations.
///
/// Used by the orchestration services to hold a single client.
pub trait WiimDevice: WiimPlayback + WiimStatus + WiimVolumeControl {}

/// Blanket implementation for any type implementing all traits.
impl<T: WiimPlayback + WiimStatus + WiimVolumeControl> WiimDevice for T {}
