//! In-memory device used by the service tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;

use super::status::{DeviceInfo, PlayerStatus};
use super::traits::{WiimPlayback, WiimStatus, WiimVolumeControl};
use super::transport::{DeviceError, DeviceResult};
use super::types::{DeviceEndpoint, LoopMode, PlaybackState, TransportAction, VolumeStep};

#[derive(Debug, Clone, PartialEq)]
pub enum MockCall {
    PlayUrl(String),
    Transport(TransportAction),
    LoopMode(LoopMode),
    Volume(u8),
    VolumeStep(VolumeStep),
    Mute(bool),
    GetStatus,
}

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub ip: String,
    pub call: MockCall,
    pub at: Instant,
}

#[derive(Debug, Clone)]
pub enum Scripted {
    Status(PlayerStatus),
    Unreachable,
}

/// Scriptable fake device.
///
/// Status queries pop from a per-IP script first, then fall back to the
/// per-IP steady status. A successful `play_url` makes the steady status
/// "playing from the start", like a real device.
#[derive(Default)]
pub struct MockDevice {
    calls: Mutex<Vec<RecordedCall>>,
    scripts: Mutex<HashMap<String, VecDeque<Scripted>>>,
    steady: Mutex<HashMap<String, PlayerStatus>>,
    failing: Mutex<HashSet<String>>,
    infos: Mutex<HashMap<String, DeviceInfo>>,
    play_delay: Mutex<Option<Duration>>,
}

impl MockDevice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn playing() -> PlayerStatus {
        PlayerStatus::new(PlaybackState::Playing, 1_000, 180_000)
    }

    pub fn wiim_info(name: &str, uuid: &str) -> DeviceInfo {
        DeviceInfo {
            name: Some(name.to_string()),
            uuid: Some(uuid.to_string()),
            firmware: Some("4.8.6".to_string()),
            ..Default::default()
        }
    }

    pub fn script(&self, ip: &str, steps: impl IntoIterator<Item = Scripted>) {
        self.scripts
            .lock()
            .entry(ip.to_string())
            .or_default()
            .extend(steps);
    }

    pub fn set_status(&self, ip: &str, status: PlayerStatus) {
        self.steady.lock().insert(ip.to_string(), status);
    }

    pub fn set_failing(&self, ip: &str, failing: bool) {
        let mut set = self.failing.lock();
        if failing {
            set.insert(ip.to_string());
        } else {
            set.remove(ip);
        }
    }

    /// Makes every `play_url` take `delay` before it is answered.
    pub fn set_play_delay(&self, delay: Duration) {
        *self.play_delay.lock() = Some(delay);
    }

    pub fn set_device_info(&self, ip: &str, info: DeviceInfo) {
        self.infos.lock().insert(ip.to_string(), info);
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    /// URLs passed to `play_url` for `ip`, in order.
    pub fn plays_for(&self, ip: &str) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.ip == ip)
            .filter_map(|c| match &c.call {
                MockCall::PlayUrl(url) => Some(url.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn play_count(&self, ip: &str) -> usize {
        self.plays_for(ip).len()
    }

    /// Every `play_url` call across all devices, in order.
    pub fn play_calls(&self) -> Vec<RecordedCall> {
        self.calls
            .lock()
            .iter()
            .filter(|c| matches!(c.call, MockCall::PlayUrl(_)))
            .cloned()
            .collect()
    }

    pub fn count(&self, ip: &str, call: &MockCall) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.ip == ip && &c.call == call)
            .count()
    }

    fn record(&self, device: &DeviceEndpoint, call: MockCall) -> DeviceResult<()> {
        self.calls.lock().push(RecordedCall {
            ip: device.ip.clone(),
            call,
            at: Instant::now(),
        });
        if self.failing.lock().contains(&device.ip) {
            return Err(unreachable(device));
        }
        Ok(())
    }
}

fn unreachable(device: &DeviceEndpoint) -> DeviceError {
    DeviceError::Unreachable {
        ip: device.ip.clone(),
        reason: "mock device offline".to_string(),
    }
}

#[async_trait]
impl WiimPlayback for MockDevice {
    async fn play_url(&self, device: &DeviceEndpoint, url: &str) -> DeviceResult<()> {
        let delay = *self.play_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.record(device, MockCall::PlayUrl(url.to_string()))?;
        self.set_status(&device.ip, PlayerStatus::new(PlaybackState::Playing, 0, 180_000));
        Ok(())
    }

    async fn transport(
        &self,
        device: &DeviceEndpoint,
        action: TransportAction,
    ) -> DeviceResult<()> {
        self.record(device, MockCall::Transport(action))
    }

    async fn set_loop_mode(&self, device: &DeviceEndpoint, mode: LoopMode) -> DeviceResult<()> {
        self.record(device, MockCall::LoopMode(mode))
    }
}

#[async_trait]
impl WiimStatus for MockDevice {
    async fn get_status(&self, device: &DeviceEndpoint) -> DeviceResult<PlayerStatus> {
        self.record(device, MockCall::GetStatus)?;
        let scripted = self
            .scripts
            .lock()
            .get_mut(&device.ip)
            .and_then(VecDeque::pop_front);
        match scripted {
            Some(Scripted::Status(status)) => Ok(status),
            Some(Scripted::Unreachable) => Err(unreachable(device)),
            None => Ok(self
                .steady
                .lock()
                .get(&device.ip)
                .cloned()
                .unwrap_or_else(Self::playing)),
        }
    }

    async fn get_device_info(&self, device: &DeviceEndpoint) -> DeviceResult<DeviceInfo> {
        self.infos
            .lock()
            .get(&device.ip)
            .cloned()
            .ok_or_else(|| unreachable(device))
    }
}

#[async_trait]
impl WiimVolumeControl for MockDevice {
    async fn set_volume(&self, device: &DeviceEndpoint, volume: u8) -> DeviceResult<()> {
        self.record(device, MockCall::Volume(volume))
    }

    async fn step_volume(&self, device: &DeviceEndpoint, step: VolumeStep) -> DeviceResult<()> {
        self.record(device, MockCall::VolumeStep(step))
    }

    async fn set_mute(&self, device: &DeviceEndpoint, mute: bool) -> DeviceResult<()> {
        self.record(device, MockCall::Mute(mute))
    }
}
