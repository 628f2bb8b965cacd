//! Per-player monitor: keeps one player playing its assigned URL.
//!
//! Each armed player gets one loop. Every tick is a single [`PlayerMonitor::step`]:
//! check the monitoring flag, fetch the status, decide, act. The device's
//! native repeat mode is not used; this loop is what makes a track repeat.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::device::{PlaybackState, PlayerStatus, WiimDevice};
use crate::error::ErrorCode;
use crate::runtime::{TaskSpawner, TokioSpawner};
use crate::services::player_registry::PlayerRegistry;
use crate::services::runtime_state::RuntimeState;
use crate::state::MonitorTimings;

/// What the monitor should do with a fresh status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorDecision {
    /// Track finished on its own: reissue play.
    Restart,
    /// Nothing to do; poll again after the given delay.
    Poll(Duration),
}

/// Outcome of one monitor tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorStep {
    Continue(Duration),
    Terminate(&'static str),
}

/// Pure transition function of the monitor state machine.
#[must_use]
pub fn decide(status: &PlayerStatus, timings: &MonitorTimings) -> MonitorDecision {
    if status.is_finished() {
        return MonitorDecision::Restart;
    }
    match status.playback_state {
        PlaybackState::Playing | PlaybackState::Loading | PlaybackState::Stopped => {
            MonitorDecision::Poll(timings.active_poll())
        }
        PlaybackState::Paused | PlaybackState::Unknown => MonitorDecision::Poll(timings.idle_poll()),
    }
}

/// Arms, runs and disarms per-player monitor loops.
pub struct PlayerMonitor {
    runtime: Arc<RuntimeState>,
    registry: Arc<PlayerRegistry>,
    device: Arc<dyn WiimDevice>,
    spawner: TokioSpawner,
    timings: MonitorTimings,
}

impl PlayerMonitor {
    pub fn new(
        runtime: Arc<RuntimeState>,
        registry: Arc<PlayerRegistry>,
        device: Arc<dyn WiimDevice>,
        spawner: TokioSpawner,
        timings: MonitorTimings,
    ) -> Self {
        Self {
            runtime,
            registry,
            device,
            spawner,
            timings,
        }
    }

    /// Arms monitoring for a player and spawns its loop.
    ///
    /// Re-arming replaces the previous loop.
    pub fn start_monitoring(self: &Arc<Self>, player_id: &str, url: &str, group_id: Option<&str>) {
        let token = self.runtime.arm(player_id, url, group_id);
        log::info!(
            "[Monitor] Armed {} ({}){}",
            player_id,
            url,
            group_id
                .map(|g| format!(" in group {}", g))
                .unwrap_or_default()
        );

        let this = Arc::clone(self);
        let player_id = player_id.to_string();
        self.spawner.spawn(async move {
            this.run(player_id, token).await;
        });
    }

    /// Disarms monitoring. Returns false if the player had no monitor.
    pub fn stop_monitoring(&self, player_id: &str) -> bool {
        let stopped = self.runtime.disarm(player_id);
        if stopped {
            log::info!("[Monitor] Disarmed {}", player_id);
        }
        stopped
    }

    async fn run(self: Arc<Self>, player_id: String, token: CancellationToken) {
        let mut delay = self.timings.first_poll();
        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    log::debug!("[Monitor] Loop for {} cancelled", player_id);
                    return;
                }
                _ = tokio::time::sleep(delay) => {}
            }

            match self.step(&player_id, &token).await {
                MonitorStep::Continue(next) => delay = next,
                MonitorStep::Terminate(reason) => {
                    log::info!("[Monitor] Stopped monitoring {}: {}", player_id, reason);
                    return;
                }
            }
        }
    }

    /// Runs one tick for a player.
    ///
    /// The monitoring flag is checked before the status query and again after
    /// every awaited device call; a cleared flag discards the result.
    pub async fn step(&self, player_id: &str, token: &CancellationToken) -> MonitorStep {
        if !self.is_live(player_id, token) {
            return MonitorStep::Terminate("monitoring disabled");
        }
        let Some(player) = self.registry.get(player_id) else {
            self.runtime.remove(player_id);
            return MonitorStep::Terminate("player removed");
        };
        let url = match self.runtime.get(player_id) {
            Some(state) if !state.last_url.is_empty() => state.last_url,
            _ => return MonitorStep::Terminate("no url assigned"),
        };

        let endpoint = player.endpoint();
        let status = self.device.get_status(&endpoint).await;

        if !self.is_live(player_id, token) {
            return MonitorStep::Terminate("monitoring disabled");
        }

        let status = match status {
            Ok(status) => status,
            Err(e) => {
                if e.is_transient() {
                    log::debug!(
                        "[Monitor] Status check for {} failed ({}), backing off: {}",
                        player_id,
                        e.code(),
                        e
                    );
                } else {
                    log::warn!(
                        "[Monitor] {} answered badly ({}), backing off: {}",
                        player_id,
                        e.code(),
                        e
                    );
                }
                return MonitorStep::Continue(self.timings.error_backoff());
            }
        };

        match decide(&status, &self.timings) {
            MonitorDecision::Poll(next) => MonitorStep::Continue(next),
            MonitorDecision::Restart => {
                log::info!(
                    "[Monitor] {} finished track ({}/{} ms), restarting",
                    player.name,
                    status.position_ms,
                    status.duration_ms
                );
                if let Err(e) = self.device.play_url(&endpoint, &url).await {
                    log::warn!("[Monitor] Restart of {} failed: {}", player_id, e);
                }
                MonitorStep::Continue(self.timings.after_restart())
            }
        }
    }

    fn is_live(&self, player_id: &str, token: &CancellationToken) -> bool {
        !token.is_cancelled() && self.runtime.should_enforce(player_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::mock::{MockCall, MockDevice, Scripted};
    use crate::services::player_registry::NewPlayer;
    use tempfile::TempDir;

    const URL: &str = "http://192.168.1.10:3000/media/a.mp3";

    struct Fixture {
        _dir: TempDir,
        mock: Arc<MockDevice>,
        runtime: Arc<RuntimeState>,
        registry: Arc<PlayerRegistry>,
        monitor: Arc<PlayerMonitor>,
        player_id: String,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let mock = Arc::new(MockDevice::new());
        let runtime = Arc::new(RuntimeState::new(CancellationToken::new()));
        let registry = Arc::new(PlayerRegistry::load(dir.path()));
        let (player, _) = registry.upsert(NewPlayer {
            ip: "10.0.0.2".into(),
            name: Some("Kitchen".into()),
            uuid: None,
            use_https: true,
        });
        let monitor = Arc::new(PlayerMonitor::new(
            runtime.clone(),
            registry.clone(),
            mock.clone(),
            TokioSpawner::current(),
            MonitorTimings::default(),
        ));
        Fixture {
            _dir: dir,
            mock,
            runtime,
            registry,
            monitor,
            player_id: player.id,
        }
    }

    fn status(state: PlaybackState, pos: u64, dur: u64) -> Scripted {
        Scripted::Status(PlayerStatus::new(state, pos, dur))
    }

    #[test]
    fn decide_follows_state_table() {
        let t = MonitorTimings::default();
        let d = |s, p, l| decide(&PlayerStatus::new(s, p, l), &t);

        assert_eq!(d(PlaybackState::Stopped, 180_000, 180_000), MonitorDecision::Restart);
        assert_eq!(
            d(PlaybackState::Stopped, 10_000, 180_000),
            MonitorDecision::Poll(Duration::from_millis(500))
        );
        assert_eq!(
            d(PlaybackState::Playing, 10_000, 180_000),
            MonitorDecision::Poll(Duration::from_millis(500))
        );
        assert_eq!(
            d(PlaybackState::Loading, 0, 0),
            MonitorDecision::Poll(Duration::from_millis(500))
        );
        assert_eq!(
            d(PlaybackState::Paused, 10_000, 180_000),
            MonitorDecision::Poll(Duration::from_secs(1))
        );
        assert_eq!(
            d(PlaybackState::Unknown, 0, 0),
            MonitorDecision::Poll(Duration::from_secs(1))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn finished_track_is_replayed_exactly_once() {
        let f = fixture();
        f.mock.script(
            "10.0.0.2",
            [
                status(PlaybackState::Playing, 179_000, 180_000),
                status(PlaybackState::Stopped, 180_000, 180_000),
            ],
        );

        f.monitor.start_monitoring(&f.player_id, URL, None);
        tokio::time::sleep(Duration::from_secs(10)).await;

        assert_eq!(f.mock.plays_for("10.0.0.2"), vec![URL.to_string()]);

        // The replay comes right after the finished status, and the next poll
        // waits for the post-restart delay.
        let calls = f.mock.calls();
        let play_idx = calls
            .iter()
            .position(|c| matches!(c.call, MockCall::PlayUrl(_)))
            .unwrap();
        assert_eq!(play_idx, 2);
        assert_eq!(calls[play_idx + 1].call, MockCall::GetStatus);
        assert!(calls[play_idx + 1].at - calls[play_idx].at >= Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn status_errors_back_off_without_killing_the_monitor() {
        let f = fixture();
        f.mock.script(
            "10.0.0.2",
            [
                Scripted::Unreachable,
                Scripted::Unreachable,
                status(PlaybackState::Stopped, 180_000, 180_000),
            ],
        );

        f.monitor.start_monitoring(&f.player_id, URL, None);
        tokio::time::sleep(Duration::from_secs(10)).await;

        let statuses: Vec<_> = f
            .mock
            .calls()
            .into_iter()
            .filter(|c| c.call == MockCall::GetStatus)
            .collect();
        assert!(statuses[1].at - statuses[0].at >= Duration::from_secs(2));
        assert_eq!(f.mock.play_count("10.0.0.2"), 1);
        assert!(f.runtime.is_monitoring(&f.player_id));
    }

    #[tokio::test(start_paused = true)]
    async fn manual_stop_suppresses_restart() {
        let f = fixture();
        f.mock
            .set_status("10.0.0.2", PlayerStatus::new(PlaybackState::Stopped, 180_000, 180_000));

        f.monitor.start_monitoring(&f.player_id, URL, None);
        f.monitor.stop_monitoring(&f.player_id);
        f.runtime.mark_manual_stop(&f.player_id);
        tokio::time::sleep(Duration::from_secs(10)).await;

        assert_eq!(f.mock.play_count("10.0.0.2"), 0);
        assert_eq!(f.mock.count("10.0.0.2", &MockCall::GetStatus), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn disarmed_player_is_not_restarted() {
        let f = fixture();
        f.mock
            .set_status("10.0.0.2", PlayerStatus::new(PlaybackState::Stopped, 180_000, 180_000));
        let token = f.runtime.arm(&f.player_id, URL, None);

        f.runtime.disarm(&f.player_id);
        let step = f.monitor.step(&f.player_id, &token).await;

        assert_eq!(step, MonitorStep::Terminate("monitoring disabled"));
        assert_eq!(f.mock.play_count("10.0.0.2"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn removed_player_terminates_monitor() {
        let f = fixture();
        let token = f.runtime.arm(&f.player_id, URL, None);
        f.registry.remove(&f.player_id).unwrap();

        let step = f.monitor.step(&f.player_id, &token).await;
        assert_eq!(step, MonitorStep::Terminate("player removed"));
        assert!(f.runtime.get(&f.player_id).is_none());
    }
}
