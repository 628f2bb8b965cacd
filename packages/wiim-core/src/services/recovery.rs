//! Startup recovery and the watchdog.
//!
//! After a restart the desired state is replayed: groups first (staggered,
//! with a pause between groups), then solo players. The watchdog then keeps
//! cross-checking that every player with a desired file is actually playing.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::device::{PlaybackState, WiimDevice};
use crate::services::desired_state::DesiredStateStore;
use crate::services::group_coordinator::{GroupCoordinator, GroupPlayResult, StartMode};
use crate::services::playback::PlaybackService;
use crate::services::player_registry::PlayerRegistry;
use crate::services::runtime_state::RuntimeState;
use crate::state::RecoveryTimings;
use crate::utils::now_millis;

/// What a restore pass did.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreReport {
    pub groups: Vec<GroupPlayResult>,
    pub solo_started: usize,
    pub solo_failed: usize,
    pub skipped: usize,
}

/// What a watchdog pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchdogReport {
    pub checked: usize,
    pub restarted: usize,
    pub failed: usize,
}

pub struct StartupRecovery {
    registry: Arc<PlayerRegistry>,
    desired: Arc<DesiredStateStore>,
    runtime: Arc<RuntimeState>,
    playback: Arc<PlaybackService>,
    groups: Arc<GroupCoordinator>,
    device: Arc<dyn WiimDevice>,
    timings: RecoveryTimings,
    stagger: Duration,
}

impl StartupRecovery {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        registry: Arc<PlayerRegistry>,
        desired: Arc<DesiredStateStore>,
        runtime: Arc<RuntimeState>,
        playback: Arc<PlaybackService>,
        groups: Arc<GroupCoordinator>,
        device: Arc<dyn WiimDevice>,
        timings: RecoveryTimings,
        stagger: Duration,
    ) -> Self {
        Self {
            registry,
            desired,
            runtime,
            playback,
            groups,
            device,
            timings,
            stagger,
        }
    }

    /// Restores after the grace delay, then runs the watchdog on its
    /// schedule until `cancel` fires.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let restore_delay = Duration::from_secs(self.timings.restore_delay_secs);
        let watchdog_first = Duration::from_secs(self.timings.watchdog_first_secs);
        let watchdog_interval = Duration::from_secs(self.timings.watchdog_interval_secs);

        let started = tokio::time::Instant::now();
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(restore_delay) => {}
        }
        let report = self.restore().await;
        log::info!(
            "[Recovery] Restore done: {} groups, {} solo started, {} solo failed, {} skipped",
            report.groups.len(),
            report.solo_started,
            report.solo_failed,
            report.skipped
        );

        // The first watchdog pass is scheduled from process start.
        let mut next = started + watchdog_first;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    log::info!("[Recovery] Watchdog shutting down");
                    return;
                }
                _ = tokio::time::sleep_until(next) => {}
            }
            let report = self.watchdog_pass().await;
            if report.restarted > 0 || report.failed > 0 {
                log::info!("[Recovery] Watchdog: {:?}", report);
            }
            next = tokio::time::Instant::now() + watchdog_interval;
        }
    }

    /// Replays the desired state: groups first, then solo players.
    pub async fn restore(&self) -> RestoreReport {
        self.playback.refresh_advertise_ip();
        let known: HashSet<String> = self.registry.ids().into_iter().collect();
        let cleanup = self.desired.cleanup(&known);
        if !cleanup.is_empty() {
            log::info!("[Recovery] Cleaned stale desired state: {:?}", cleanup);
        }

        let selections = self.desired.selections();
        let groups = self.desired.groups();
        let mut report = RestoreReport::default();
        if selections.is_empty() {
            log::info!("[Recovery] Nothing to restore");
            return report;
        }

        let grouped: HashSet<&String> = groups.iter().flat_map(|g| &g.player_ids).collect();

        let mut first_group = true;
        for group in &groups {
            let members: Vec<_> = self
                .groups
                .assigned(&group.player_ids)
                .into_iter()
                .filter(|(p, _)| !self.runtime.is_manually_stopped(&p.id))
                .collect();
            if members.is_empty() {
                continue;
            }
            if !first_group {
                tokio::time::sleep(Duration::from_millis(self.timings.inter_group_delay_ms)).await;
            }
            first_group = false;

            let tag = if group.name.is_empty() {
                group.id.clone()
            } else {
                format!("group_{}_{}", group.name, now_millis())
            };
            log::info!(
                "[Recovery] Restoring group '{}' ({} members)",
                group.name,
                members.len()
            );
            let results = self
                .groups
                .start_staggered(members, &tag, StartMode::Restore)
                .await;
            report.groups.push(GroupPlayResult::from_results(&tag, results));
        }

        let mut issued = false;
        for (player_id, media_path) in &selections {
            if grouped.contains(player_id) {
                continue;
            }
            if self.runtime.is_manually_stopped(player_id) {
                report.skipped += 1;
                continue;
            }
            let Some(player) = self.registry.get(player_id) else {
                report.skipped += 1;
                continue;
            };
            if issued && !self.stagger.is_zero() {
                tokio::time::sleep(self.stagger).await;
            }
            issued = true;

            let url = self.playback.url_for_selection(media_path);
            match self.playback.start_assigned(&player, &url, None).await {
                Ok(()) => {
                    log::info!("[Recovery] Restored {} -> {}", player.name, media_path);
                    report.solo_started += 1;
                }
                Err(e) => {
                    log::warn!("[Recovery] Could not restore {}: {}", player.name, e);
                    report.solo_failed += 1;
                }
            }
        }
        report
    }

    /// Restarts every player with a desired file that is not playing.
    ///
    /// `loading` counts as healthy. Manually stopped players are never
    /// touched; players without a monitor get one armed.
    pub async fn watchdog_pass(&self) -> WatchdogReport {
        let mut report = WatchdogReport::default();
        let mut issued = false;
        self.playback.refresh_advertise_ip();

        for (player_id, media_path) in self.desired.selections() {
            if self.runtime.is_manually_stopped(&player_id) {
                continue;
            }
            let Some(player) = self.registry.get(&player_id) else {
                continue;
            };
            report.checked += 1;

            let healthy = matches!(
                self.device.get_status(&player.endpoint()).await,
                Ok(status) if matches!(
                    status.playback_state,
                    PlaybackState::Playing | PlaybackState::Loading
                )
            );
            if healthy {
                continue;
            }
            if issued && !self.stagger.is_zero() {
                tokio::time::sleep(self.stagger).await;
            }
            // Re-check: the player may have been stopped during the query or
            // the stagger delay.
            if self.runtime.is_manually_stopped(&player_id) || !self.registry.contains(&player_id) {
                continue;
            }
            issued = true;

            let url = match self.runtime.get(&player_id) {
                Some(state) if state.monitoring && !state.last_url.is_empty() => state.last_url,
                _ => self.playback.url_for_selection(&media_path),
            };
            let group_id = self.runtime.get(&player_id).and_then(|s| s.group_id);
            log::info!("[Recovery] Watchdog restarting {} ({})", player.name, url);
            match self.playback.start_assigned(&player, &url, group_id.as_deref()).await {
                Ok(()) => report.restarted += 1,
                Err(e) => {
                    log::warn!("[Recovery] Watchdog restart of {} failed: {}", player.name, e);
                    report.failed += 1;
                }
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::mock::MockCall;
    use crate::device::PlayerStatus;
    use crate::services::test_support::Harness;

    #[tokio::test(start_paused = true)]
    async fn cold_start_restores_solo_player_once() {
        let h = Harness::new();
        let p = h.add_player("10.0.0.2", "Kitchen");
        h.desired.set_selection(&p.id, "/media/a.mp3");

        let cancel = CancellationToken::new();
        tokio::spawn(Arc::clone(&h.recovery).run(cancel.clone()));
        tokio::time::sleep(Duration::from_secs(6)).await;

        assert_eq!(
            h.mock.plays_for("10.0.0.2"),
            vec!["http://192.168.1.10:3000/media/a.mp3".to_string()]
        );
        let state = h.runtime.get(&p.id).unwrap();
        assert!(state.monitoring);
        assert_eq!(state.last_url, "http://192.168.1.10:3000/media/a.mp3");
        cancel.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn groups_restore_before_solo_players() {
        let h = Harness::new();
        let solo = h.add_player("10.0.0.2", "Kitchen");
        let a = h.add_player("10.0.0.3", "Lounge");
        let b = h.add_player("10.0.0.4", "Porch");
        for p in [&solo, &a, &b] {
            h.desired.set_selection(&p.id, "/media/a.mp3");
        }
        let known = h.registry.ids().into_iter().collect();
        h.desired
            .create_group("Upstairs", &[a.id.clone(), b.id.clone()], &known)
            .unwrap();

        let report = h.recovery.restore().await;
        assert_eq!(report.groups.len(), 1);
        assert_eq!(report.groups[0].started, 2);
        assert_eq!(report.solo_started, 1);

        let order: Vec<_> = h.mock.play_calls().into_iter().map(|c| c.ip).collect();
        assert_eq!(order, vec!["10.0.0.3", "10.0.0.4", "10.0.0.2"]);

        let tag = h.runtime.get(&a.id).unwrap().group_id.unwrap();
        assert!(tag.starts_with("group_Upstairs_"));
        assert_eq!(h.runtime.get(&b.id).unwrap().group_id, Some(tag));
        assert_eq!(h.runtime.get(&solo.id).unwrap().group_id, None);
    }

    #[tokio::test(start_paused = true)]
    async fn manually_stopped_players_are_not_restored() {
        let h = Harness::new();
        let p = h.add_player("10.0.0.2", "Kitchen");
        h.desired.set_selection(&p.id, "/media/a.mp3");
        h.runtime.mark_manual_stop(&p.id);

        let report = h.recovery.restore().await;
        assert_eq!(report.skipped, 1);
        assert_eq!(h.mock.play_count("10.0.0.2"), 0);

        h.mock.set_status(
            "10.0.0.2",
            PlayerStatus::new(PlaybackState::Stopped, 0, 180_000),
        );
        let report = h.recovery.watchdog_pass().await;
        assert_eq!(report.restarted, 0);
        assert_eq!(h.mock.play_count("10.0.0.2"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn watchdog_restarts_idle_players_and_arms_monitor() {
        let h = Harness::new();
        let idle = h.add_player("10.0.0.2", "Kitchen");
        let loading = h.add_player("10.0.0.3", "Lounge");
        h.desired.set_selection(&idle.id, "/media/a.mp3");
        h.desired.set_selection(&loading.id, "/media/b.mp3");
        h.mock.set_status(
            "10.0.0.2",
            PlayerStatus::new(PlaybackState::Paused, 5_000, 180_000),
        );
        h.mock
            .set_status("10.0.0.3", PlayerStatus::new(PlaybackState::Loading, 0, 0));

        let report = h.recovery.watchdog_pass().await;
        assert_eq!(report.checked, 2);
        assert_eq!(report.restarted, 1);
        assert_eq!(
            h.mock.plays_for("10.0.0.2"),
            vec![h.url("/media/a.mp3")]
        );
        assert_eq!(h.mock.play_count("10.0.0.3"), 0);
        assert!(h.runtime.is_monitoring(&idle.id));
    }

    #[tokio::test(start_paused = true)]
    async fn watchdog_treats_unreachable_as_not_playing() {
        let h = Harness::new();
        let p = h.add_player("10.0.0.2", "Kitchen");
        h.desired.set_selection(&p.id, "/media/a.mp3");
        h.mock.set_failing("10.0.0.2", true);

        let report = h.recovery.watchdog_pass().await;
        assert_eq!(report.failed, 1);
        assert_eq!(h.mock.count("10.0.0.2", &MockCall::PlayUrl(h.url("/media/a.mp3"))), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn restore_prunes_removed_players_first() {
        let h = Harness::new();
        let p = h.add_player("10.0.0.2", "Kitchen");
        h.desired.set_selection(&p.id, "/media/a.mp3");
        h.desired.set_selection("ghost", "/media/a.mp3");

        let report = h.recovery.restore().await;
        assert_eq!(report.solo_started, 1);
        assert!(h.desired.selection("ghost").is_none());
    }
}
