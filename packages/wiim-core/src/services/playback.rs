//! Per-player command handlers.
//!
//! Every user-initiated command goes through here so that device calls,
//! monitor arming, manual-stop marks and desired state stay consistent.

use std::sync::Arc;

use serde::Serialize;

use crate::context::{url_path, NetworkContext};
use crate::device::{
    DeviceInfo, DeviceResult, LoopMode, PlayerStatus, TransportAction, VolumeStep, WiimDevice,
};
use crate::error::{WiimError, WiimResult};
use crate::protocol_constants::DEFAULT_BEEP_URL;
use crate::services::desired_state::DesiredStateStore;
use crate::services::media_library::{filename_from_url, MediaLibrary};
use crate::services::player_monitor::PlayerMonitor;
use crate::services::player_registry::{Player, PlayerRegistry};
use crate::services::runtime_state::RuntimeState;

/// Result of a play request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayOutcome {
    pub player_id: String,
    /// URL sent to the device; `None` for a plain resume.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Media path recorded as the player's selection.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_path: Option<String>,
    pub monitoring: bool,
}

pub struct PlaybackService {
    registry: Arc<PlayerRegistry>,
    desired: Arc<DesiredStateStore>,
    runtime: Arc<RuntimeState>,
    monitor: Arc<PlayerMonitor>,
    media: Arc<MediaLibrary>,
    device: Arc<dyn WiimDevice>,
    network: NetworkContext,
}

impl PlaybackService {
    pub fn new(
        registry: Arc<PlayerRegistry>,
        desired: Arc<DesiredStateStore>,
        runtime: Arc<RuntimeState>,
        monitor: Arc<PlayerMonitor>,
        media: Arc<MediaLibrary>,
        device: Arc<dyn WiimDevice>,
        network: NetworkContext,
    ) -> Self {
        Self {
            registry,
            desired,
            runtime,
            monitor,
            media,
            device,
            network,
        }
    }

    /// Plays a media URL on a player, or resumes when `file_url` is `None`.
    ///
    /// On success the monitor is armed, the manual-stop mark is cleared and
    /// the media path becomes the player's desired selection.
    pub async fn play(
        &self,
        player_id: &str,
        file_url: Option<&str>,
        group_id: Option<&str>,
    ) -> WiimResult<PlayOutcome> {
        let player = self.registry.require(player_id)?;

        let Some(file_url) = file_url.filter(|u| !u.trim().is_empty()) else {
            log::info!("[Playback] Resume on {} ({})", player.name, player.ip);
            self.device.resume(&player.endpoint()).await?;
            return Ok(PlayOutcome {
                player_id: player.id,
                url: None,
                media_path: None,
                monitoring: self.runtime.is_monitoring(player_id),
            });
        };

        let filename = filename_from_url(file_url)
            .ok_or_else(|| WiimError::InvalidRequest(format!("no file in {}", file_url)))?;
        if !self.media.exists(&filename).await {
            return Err(WiimError::MediaNotFound(filename));
        }

        self.device.play_url(&player.endpoint(), file_url).await?;

        // The player may have been removed while the device call was in flight.
        if !self.registry.contains(player_id) {
            log::warn!(
                "[Playback] {} was removed during play; not arming",
                player_id
            );
            return Err(WiimError::UnknownPlayer(player_id.to_string()));
        }

        let media_path = url_path(file_url);
        self.runtime.clear_manual_stop(player_id);
        self.monitor.start_monitoring(player_id, file_url, group_id);
        self.desired.set_selection(player_id, &media_path);
        log::info!("[Playback] {} now playing {}", player.name, media_path);

        Ok(PlayOutcome {
            player_id: player.id,
            url: Some(file_url.to_string()),
            media_path: Some(media_path),
            monitoring: true,
        })
    }

    /// Stops a player and records the stop as deliberate.
    ///
    /// Nothing changes if the device rejects the stop.
    pub async fn stop(&self, player_id: &str) -> WiimResult<()> {
        let player = self.registry.require(player_id)?;
        self.device.stop(&player.endpoint()).await?;
        self.apply_manual_stop(player_id);
        log::info!("[Playback] {} stopped", player.name);
        Ok(())
    }

    /// Local half of a stop: disarm, mark, forget the selection.
    pub(crate) fn apply_manual_stop(&self, player_id: &str) {
        self.monitor.stop_monitoring(player_id);
        self.runtime.mark_manual_stop(player_id);
        if self.desired.remove_selection(player_id) {
            log::info!("[Playback] {} removed from auto-restore", player_id);
        }
    }

    pub async fn pause(&self, player_id: &str) -> WiimResult<()> {
        self.transport(player_id, TransportAction::Pause).await
    }

    /// Plain transport command. `stop` is routed through [`stop`](Self::stop)
    /// so it is recorded as a manual stop.
    pub async fn transport(&self, player_id: &str, action: TransportAction) -> WiimResult<()> {
        if action == TransportAction::Stop {
            return self.stop(player_id).await;
        }
        let player = self.registry.require(player_id)?;
        self.device.transport(&player.endpoint(), action).await?;
        Ok(())
    }

    /// Sets and remembers a player's volume.
    pub async fn set_volume(&self, player_id: &str, volume: u8) -> WiimResult<()> {
        if volume > 100 {
            return Err(WiimError::InvalidRequest(
                "volume must be between 0 and 100".to_string(),
            ));
        }
        let player = self.registry.require(player_id)?;
        self.device.set_volume(&player.endpoint(), volume).await?;
        self.desired.set_volume(player_id, volume);
        Ok(())
    }

    /// Nudges the volume one step. The resulting level is unknown, so the
    /// remembered volume is left as it was.
    pub async fn step_volume(&self, player_id: &str, step: VolumeStep) -> WiimResult<()> {
        let player = self.registry.require(player_id)?;
        self.device.step_volume(&player.endpoint(), step).await?;
        Ok(())
    }

    pub async fn set_mute(&self, player_id: &str, mute: bool) -> WiimResult<()> {
        let player = self.registry.require(player_id)?;
        self.device.set_mute(&player.endpoint(), mute).await?;
        Ok(())
    }

    pub async fn set_loop_mode(&self, player_id: &str, mode: LoopMode) -> WiimResult<()> {
        let player = self.registry.require(player_id)?;
        self.device.set_loop_mode(&player.endpoint(), mode).await?;
        Ok(())
    }

    /// Plays a short identification sound. Desired state and monitors are
    /// left untouched.
    pub async fn beep(&self, player_id: &str, beep_url: Option<&str>) -> WiimResult<String> {
        let player = self.registry.require(player_id)?;
        let url = match beep_url.map(str::trim) {
            Some(url) if !url.is_empty() && url != "default" => url.to_string(),
            _ => DEFAULT_BEEP_URL.to_string(),
        };
        self.device.play_url(&player.endpoint(), &url).await?;
        Ok(url)
    }

    pub async fn status(&self, player_id: &str) -> WiimResult<PlayerStatus> {
        let player = self.registry.require(player_id)?;
        Ok(self.device.get_status(&player.endpoint()).await?)
    }

    pub async fn device_info(&self, player_id: &str) -> WiimResult<DeviceInfo> {
        let player = self.registry.require(player_id)?;
        Ok(self.device.get_device_info(&player.endpoint()).await?)
    }

    /// Id of the player the single-player shortcuts act on.
    pub fn active_player_id(&self) -> WiimResult<String> {
        self.registry
            .active()
            .map(|p| p.id)
            .ok_or(WiimError::NoActivePlayer)
    }

    /// Sends `url` to a player and arms its monitor.
    ///
    /// Used by the group coordinator and startup recovery; desired state is
    /// not modified.
    pub async fn start_assigned(
        &self,
        player: &Player,
        url: &str,
        group_id: Option<&str>,
    ) -> DeviceResult<()> {
        self.device.play_url(&player.endpoint(), url).await?;
        // Removal or a manual stop may have landed while the command was in flight.
        if !self.registry.contains(&player.id) {
            return Ok(());
        }
        if self.runtime.is_manually_stopped(&player.id) {
            log::info!(
                "[Playback] {} was stopped during start; not arming",
                player.name
            );
            return Ok(());
        }
        self.monitor.start_monitoring(&player.id, url, group_id);
        Ok(())
    }

    /// Re-detects the advertise IP before a batch of restarts.
    pub fn refresh_advertise_ip(&self) {
        self.network.refresh_local_ip();
    }

    /// Device-reachable URL for a stored selection.
    #[must_use]
    pub fn url_for_selection(&self, media_path: &str) -> String {
        if media_path.contains("://") {
            media_path.to_string()
        } else {
            self.network.media_url(media_path)
        }
    }

    /// Forgets everything about a removed player.
    pub fn purge_player(&self, player_id: &str) {
        self.runtime.remove(player_id);
        self.desired.purge_player(player_id);
    }
}
