//! Group coordinator: start, stop and set volume on a set of players together.
//!
//! Starts are sequential with a fixed stagger between issued commands so a
//! burst of play requests does not saturate the Wi-Fi. Stops and volume
//! changes fan out concurrently.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde::Serialize;

use crate::device::{PlaybackState, WiimDevice};
use crate::error::{WiimError, WiimResult};
use crate::protocol_constants::PLAY_ALL_TAG_PREFIX;
use crate::services::desired_state::DesiredStateStore;
use crate::services::playback::PlaybackService;
use crate::services::player_registry::{Player, PlayerRegistry};
use crate::services::runtime_state::RuntimeState;
use crate::utils::now_millis;

/// Per-member outcome of a group command.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberResult {
    pub player_id: String,
    pub name: String,
    pub success: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub already_playing: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub skipped: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl MemberResult {
    fn new(player: &Player, url: Option<&str>) -> Self {
        Self {
            player_id: player.id.clone(),
            name: player.name.clone(),
            success: false,
            already_playing: false,
            skipped: false,
            url: url.map(str::to_string),
            error: None,
        }
    }
}

/// Aggregate result of a staggered start.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupPlayResult {
    pub group_id: String,
    pub started: usize,
    pub failed: usize,
    pub already_playing: usize,
    pub skipped: usize,
    pub results: Vec<MemberResult>,
}

impl GroupPlayResult {
    pub(crate) fn from_results(group_id: &str, results: Vec<MemberResult>) -> Self {
        let already_playing = results.iter().filter(|r| r.already_playing).count();
        let skipped = results.iter().filter(|r| r.skipped).count();
        let started = results
            .iter()
            .filter(|r| r.success && !r.already_playing && !r.skipped)
            .count();
        let failed = results.iter().filter(|r| !r.success).count();
        Self {
            group_id: group_id.to_string(),
            started,
            failed,
            already_playing,
            skipped,
            results,
        }
    }
}

/// Aggregate result of a concurrent fan-out (stop, volume).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupCommandResult {
    pub group_id: String,
    pub succeeded: usize,
    pub failed: usize,
    pub results: Vec<MemberResult>,
}

impl GroupCommandResult {
    pub(crate) fn from_results(group_id: &str, results: Vec<MemberResult>) -> Self {
        let succeeded = results.iter().filter(|r| r.success).count();
        Self {
            group_id: group_id.to_string(),
            succeeded,
            failed: results.len() - succeeded,
            results,
        }
    }
}

/// Why a staggered start is happening.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartMode {
    /// A user asked for it: manual-stop marks are cleared first.
    Requested,
    /// Automatic restore: members that are manually stopped are skipped.
    Restore,
}

pub struct GroupCoordinator {
    registry: Arc<PlayerRegistry>,
    desired: Arc<DesiredStateStore>,
    runtime: Arc<RuntimeState>,
    playback: Arc<PlaybackService>,
    device: Arc<dyn WiimDevice>,
    stagger: Duration,
}

impl GroupCoordinator {
    pub fn new(
        registry: Arc<PlayerRegistry>,
        desired: Arc<DesiredStateStore>,
        runtime: Arc<RuntimeState>,
        playback: Arc<PlaybackService>,
        device: Arc<dyn WiimDevice>,
        stagger: Duration,
    ) -> Self {
        Self {
            registry,
            desired,
            runtime,
            playback,
            device,
            stagger,
        }
    }

    /// Starts every member of a group that has a desired file, in group order.
    pub async fn play_group(&self, group_id: &str) -> WiimResult<GroupPlayResult> {
        let group = self.desired.require_group(group_id)?;
        let members = self.assigned(&group.player_ids);
        log::info!(
            "[GroupCoordinator] Playing group '{}' ({} of {} members assigned)",
            group.name,
            members.len(),
            group.player_ids.len()
        );
        let results = self
            .start_staggered(members, &group.id, StartMode::Requested)
            .await;
        Ok(GroupPlayResult::from_results(&group.id, results))
    }

    /// Starts every registered player that has a desired file under an
    /// ad-hoc `playAll_{millis}` tag.
    pub async fn play_all(&self) -> GroupPlayResult {
        let tag = format!("{}_{}", PLAY_ALL_TAG_PREFIX, now_millis());
        let members = self.assigned(&self.registry.ids());
        log::info!(
            "[GroupCoordinator] Play all: {} players under {}",
            members.len(),
            tag
        );
        let results = self.start_staggered(members, &tag, StartMode::Requested).await;
        GroupPlayResult::from_results(&tag, results)
    }

    /// Stops all members concurrently. Members whose stop succeeded lose their
    /// desired file and are marked manually stopped.
    pub async fn stop_group(&self, group_id: &str) -> WiimResult<GroupCommandResult> {
        let group = self.desired.require_group(group_id)?;
        let members: Vec<Player> = group
            .player_ids
            .iter()
            .filter_map(|id| self.registry.get(id))
            .collect();

        let results = join_all(members.iter().map(|player| async move {
            let mut result = MemberResult::new(player, None);
            match self.device.stop(&player.endpoint()).await {
                Ok(()) => {
                    self.playback.apply_manual_stop(&player.id);
                    result.success = true;
                }
                Err(e) => {
                    log::warn!("[GroupCoordinator] Stop failed for {}: {}", player.name, e);
                    result.error = Some(e.to_string());
                }
            }
            result
        }))
        .await;

        let result = GroupCommandResult::from_results(&group.id, results);
        log::info!(
            "[GroupCoordinator] Stopped group '{}': {} ok, {} failed",
            group.name,
            result.succeeded,
            result.failed
        );
        Ok(result)
    }

    /// Sets the volume of all members concurrently. Best effort; successful
    /// members have the volume persisted.
    pub async fn set_group_volume(
        &self,
        group_id: &str,
        volume: u8,
    ) -> WiimResult<GroupCommandResult> {
        if volume > 100 {
            return Err(WiimError::InvalidRequest(
                "volume must be between 0 and 100".to_string(),
            ));
        }
        let group = self.desired.require_group(group_id)?;
        let members: Vec<Player> = group
            .player_ids
            .iter()
            .filter_map(|id| self.registry.get(id))
            .collect();

        let results = join_all(members.iter().map(|player| async move {
            let mut result = MemberResult::new(player, None);
            match self.device.set_volume(&player.endpoint(), volume).await {
                Ok(()) => result.success = true,
                Err(e) => result.error = Some(e.to_string()),
            }
            result
        }))
        .await;

        let ok: Vec<String> = results
            .iter()
            .filter(|r| r.success)
            .map(|r| r.player_id.clone())
            .collect();
        self.desired.set_volumes(&ok, volume);

        Ok(GroupCommandResult::from_results(&group.id, results))
    }

    /// Issues play to each member in order, sleeping `stagger` before every
    /// command after the first one actually sent.
    ///
    /// Members already playing their URL under an armed monitor are counted
    /// and left alone. Each started member gets a monitor tagged with `tag`.
    pub async fn start_staggered(
        &self,
        members: Vec<(Player, String)>,
        tag: &str,
        mode: StartMode,
    ) -> Vec<MemberResult> {
        let mut results = Vec::with_capacity(members.len());
        let mut issued = false;

        for (player, url) in members {
            let mut result = MemberResult::new(&player, Some(&url));

            if mode == StartMode::Restore && self.runtime.is_manually_stopped(&player.id) {
                log::info!(
                    "[GroupCoordinator] Skipping {}: manually stopped",
                    player.name
                );
                result.success = true;
                result.skipped = true;
                results.push(result);
                continue;
            }
            if mode == StartMode::Requested {
                self.runtime.clear_manual_stop(&player.id);
            }

            if self.is_already_playing(&player, &url).await {
                log::debug!(
                    "[GroupCoordinator] {} already playing {}",
                    player.name,
                    url
                );
                result.success = true;
                result.already_playing = true;
                results.push(result);
                continue;
            }

            if issued && !self.stagger.is_zero() {
                tokio::time::sleep(self.stagger).await;
            }
            issued = true;

            match self.playback.start_assigned(&player, &url, Some(tag)).await {
                Ok(()) => result.success = true,
                Err(e) => {
                    log::warn!(
                        "[GroupCoordinator] Failed to start {} ({}): {}",
                        player.name,
                        player.ip,
                        e
                    );
                    result.error = Some(e.to_string());
                }
            }
            results.push(result);
        }

        results
    }

    /// Registered members that have a desired file, paired with their
    /// device-reachable URL. Group order is kept.
    pub fn assigned(&self, player_ids: &[String]) -> Vec<(Player, String)> {
        player_ids
            .iter()
            .filter_map(|id| {
                let player = self.registry.get(id)?;
                let selection = self.desired.selection(id)?;
                let url = self.playback.url_for_selection(&selection);
                Some((player, url))
            })
            .collect()
    }

    async fn is_already_playing(&self, player: &Player, url: &str) -> bool {
        let armed_with_url = self
            .runtime
            .get(&player.id)
            .map(|s| s.monitoring && s.last_url == url)
            .unwrap_or(false);
        if !armed_with_url {
            return false;
        }
        matches!(
            self.device.get_status(&player.endpoint()).await,
            Ok(status) if status.playback_state == PlaybackState::Playing
        )
    }
}
