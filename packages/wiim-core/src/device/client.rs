//! High-level WiiM client commands.
//!
//! Free functions implement each command against a shared `reqwest::Client`;
//! [`WiimClientImpl`] wires them to the device traits.

use async_trait::async_trait;
use reqwest::Client;

use super::status::{DeviceInfo, PlayerStatus};
use super::traits::{WiimPlayback, WiimStatus, WiimVolumeControl};
use super::transport::{query_json, send_command, DeviceResult};
use super::types::{DeviceCommand, DeviceEndpoint, LoopMode, TransportAction, VolumeStep};

// ─────────────────────────────────────────────────────────────────────────────
// Playback
// ─────────────────────────────────────────────────────────────────────────────

/// Tells the device to fetch and play `url`.
pub async fn play_url(client: &Client, device: &DeviceEndpoint, url: &str) -> DeviceResult<()> {
    log::info!("[WiiM] Playing {} on {}", url, device.ip);
    send_command(client, device, &DeviceCommand::PlayUrl(url.to_string())).await?;
    Ok(())
}

pub async fn transport(
    client: &Client,
    device: &DeviceEndpoint,
    action: TransportAction,
) -> DeviceResult<()> {
    send_command(client, device, &DeviceCommand::Transport(action)).await?;
    Ok(())
}

pub async fn set_loop_mode(
    client: &Client,
    device: &DeviceEndpoint,
    mode: LoopMode,
) -> DeviceResult<()> {
    send_command(client, device, &DeviceCommand::LoopMode(mode)).await?;
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Status
// ─────────────────────────────────────────────────────────────────────────────

pub async fn get_status(client: &Client, device: &DeviceEndpoint) -> DeviceResult<PlayerStatus> {
    let raw = query_json(client, device, &DeviceCommand::GetPlayerStatus).await?;
    Ok(PlayerStatus::from_raw(&raw))
}

pub async fn get_device_info(
    client: &Client,
    device: &DeviceEndpoint,
) -> DeviceResult<DeviceInfo> {
    let raw = query_json(client, device, &DeviceCommand::GetStatusEx).await?;
    Ok(DeviceInfo::from_raw(&raw))
}

// ─────────────────────────────────────────────────────────────────────────────
// Volume
// ─────────────────────────────────────────────────────────────────────────────

pub async fn set_volume(client: &Client, device: &DeviceEndpoint, volume: u8) -> DeviceResult<()> {
    send_command(client, device, &DeviceCommand::Volume(volume.min(100))).await?;
    Ok(())
}

pub async fn step_volume(
    client: &Client,
    device: &DeviceEndpoint,
    step: VolumeStep,
) -> DeviceResult<()> {
    send_command(client, device, &DeviceCommand::VolumeStep(step)).await?;
    Ok(())
}

pub async fn set_mute(client: &Client, device: &DeviceEndpoint, mute: bool) -> DeviceResult<()> {
    send_command(client, device, &DeviceCommand::Mute(mute)).await?;
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Trait implementation
// ─────────────────────────────────────────────────────────────────────────────

/// Production device client.
///
/// Holds one pooled HTTP client; cloning it is cheap.
#[derive(Clone)]
pub struct WiimClientImpl {
    client: Client,
}

impl WiimClientImpl {
    /// Creates a new client around an HTTP client built with
    /// [`build_device_http_client`](super::transport::build_device_http_client).
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl WiimPlayback for WiimClientImpl {
    async fn play_url(&self, device: &DeviceEndpoint, url: &str) -> DeviceResult<()> {
        play_url(&self.client, device, url).await
    }

    async fn transport(
        &self,
        device: &DeviceEndpoint,
        action: TransportAction,
    ) -> DeviceResult<()> {
        transport(&self.client, device, action).await
    }

    async fn set_loop_mode(&self, device: &DeviceEndpoint, mode: LoopMode) -> DeviceResult<()> {
        set_loop_mode(&self.client, device, mode).await
    }
}

#[async_trait]
impl WiimStatus for WiimClientImpl {
    async fn get_status(&self, device: &DeviceEndpoint) -> DeviceResult<PlayerStatus> {
        get_status(&self.client, device).await
    }

    async fn get_device_info(&self, device: &DeviceEndpoint) -> DeviceResult<DeviceInfo> {
        get_device_info(&self.client, device).await
    }
}

#[async_trait]
impl WiimVolumeControl for WiimClientImpl {
    async fn set_volume(&self, device: &DeviceEndpoint, volume: u8) -> DeviceResult<()> {
        set_volume(&self.client, device, volume).await
    }

    async fn step_volume(&self, device: &DeviceEndpoint, step: VolumeStep) -> DeviceResult<()> {
        step_volume(&self.client, device, step).await
    }

    async fn set_mute(&self, device: &DeviceEndpoint, mute: bool) -> DeviceResult<()> {
        set_mute(&self.client, device, mute).await
    }
}
