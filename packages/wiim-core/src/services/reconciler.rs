//! Global reconciliation: the slow safety net behind the per-player monitors.
//!
//! Every cycle looks at all enforced players. A solo player that reports a
//! stalled stop is restarted on its own. If any member of a group is stalled,
//! the whole group is restarted, staggered, so members stay in step.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::device::WiimDevice;
use crate::error::ErrorCode;
use crate::services::player_registry::{Player, PlayerRegistry};
use crate::services::runtime_state::{MonitorState, RuntimeState};
use crate::state::ReconcilerTimings;

/// Counters from one reconciliation cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleReport {
    pub solo_checked: usize,
    pub solo_restarted: usize,
    pub groups_checked: usize,
    pub groups_resynced: usize,
    pub failures: usize,
}

impl CycleReport {
    fn absorb(&mut self, other: CycleReport) {
        self.solo_checked += other.solo_checked;
        self.solo_restarted += other.solo_restarted;
        self.groups_checked += other.groups_checked;
        self.groups_resynced += other.groups_resynced;
        self.failures += other.failures;
    }
}

struct Enforced {
    player: Player,
}

pub struct Reconciler {
    registry: Arc<PlayerRegistry>,
    runtime: Arc<RuntimeState>,
    device: Arc<dyn WiimDevice>,
    timings: ReconcilerTimings,
    stagger: Duration,
}

impl Reconciler {
    pub fn new(
        registry: Arc<PlayerRegistry>,
        runtime: Arc<RuntimeState>,
        device: Arc<dyn WiimDevice>,
        timings: ReconcilerTimings,
        stagger: Duration,
    ) -> Self {
        Self {
            registry,
            runtime,
            device,
            timings,
            stagger,
        }
    }

    /// Runs cycles on the configured schedule until `cancel` fires.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let mut delay = Duration::from_secs(self.timings.first_cycle_secs);
        let interval = Duration::from_secs(self.timings.interval_secs);
        log::info!(
            "[Reconciler] Started (first cycle in {:?}, then every {:?})",
            delay,
            interval
        );
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    log::info!("[Reconciler] Shutting down");
                    return;
                }
                _ = tokio::time::sleep(delay) => {}
            }
            let report = self.run_cycle().await;
            if report.solo_restarted > 0 || report.groups_resynced > 0 || report.failures > 0 {
                log::info!("[Reconciler] Cycle: {:?}", report);
            } else {
                log::debug!("[Reconciler] Cycle: {:?}", report);
            }
            delay = interval;
        }
    }

    /// One pass over every enforced player.
    pub async fn run_cycle(&self) -> CycleReport {
        let (solo, groups) = self.partition(self.runtime.monitored());

        let solo_checks = join_all(solo.iter().map(|m| self.check_solo(m)));
        let group_checks = join_all(groups.iter().map(|(id, members)| self.check_group(id, members)));
        let (solo_reports, group_reports) = futures::join!(solo_checks, group_checks);

        let mut report = CycleReport::default();
        for r in solo_reports.into_iter().chain(group_reports) {
            report.absorb(r);
        }
        report
    }

    /// Splits enforced players into solo players and groups (in order of
    /// first appearance).
    fn partition(
        &self,
        monitored: Vec<(String, MonitorState)>,
    ) -> (Vec<Enforced>, Vec<(String, Vec<Enforced>)>) {
        let mut solo = Vec::new();
        let mut groups: Vec<(String, Vec<Enforced>)> = Vec::new();

        for (id, state) in monitored {
            if !self.runtime.should_enforce(&id) || state.last_url.is_empty() {
                continue;
            }
            let Some(player) = self.registry.get(&id) else {
                continue;
            };
            let entry = Enforced { player };
            match state.group_id {
                None => solo.push(entry),
                Some(group_id) => match groups.iter_mut().find(|(g, _)| *g == group_id) {
                    Some((_, members)) => members.push(entry),
                    None => groups.push((group_id, vec![entry])),
                },
            }
        }
        (solo, groups)
    }

    /// The URL to restart with, read from the live monitor record.
    ///
    /// `None` when the player is no longer enforced or has moved to another
    /// group (or out of one) since the cycle started.
    fn current_url(&self, player_id: &str, group_id: Option<&str>) -> Option<String> {
        if !self.runtime.should_enforce(player_id) {
            return None;
        }
        let state = self.runtime.get(player_id)?;
        if state.group_id.as_deref() != group_id || state.last_url.is_empty() {
            return None;
        }
        Some(state.last_url)
    }

    async fn check_solo(&self, m: &Enforced) -> CycleReport {
        let mut report = CycleReport {
            solo_checked: 1,
            ..Default::default()
        };
        let status = match self.device.get_status(&m.player.endpoint()).await {
            Ok(status) => status,
            Err(e) => {
                log::debug!(
                    "[Reconciler] {} unreachable ({}): {}",
                    m.player.name,
                    e.code(),
                    e
                );
                return report;
            }
        };
        if !status.is_stalled() {
            return report;
        }

        log::info!(
            "[Reconciler] {} stalled at {}/{} ms, restarting",
            m.player.name,
            status.position_ms,
            status.duration_ms
        );
        let Some(url) = self.current_url(&m.player.id, None) else {
            return report;
        };
        match self.device.play_url(&m.player.endpoint(), &url).await {
            Ok(()) => report.solo_restarted = 1,
            Err(e) => {
                log::warn!("[Reconciler] Restart of {} failed: {}", m.player.name, e);
                report.failures = 1;
            }
        }
        report
    }

    async fn check_group(&self, group_id: &str, members: &[Enforced]) -> CycleReport {
        let mut report = CycleReport {
            groups_checked: 1,
            ..Default::default()
        };

        let statuses = join_all(
            members
                .iter()
                .map(|m| async move { self.device.get_status(&m.player.endpoint()).await }),
        )
        .await;

        let stalled: Vec<&str> = members
            .iter()
            .zip(&statuses)
            .filter(|(m, s)| {
                self.runtime.should_enforce(&m.player.id)
                    && matches!(s, Ok(status) if status.is_stalled())
            })
            .map(|(m, _)| m.player.name.as_str())
            .collect();
        if stalled.is_empty() {
            return report;
        }

        log::info!(
            "[Reconciler] Group {} has stalled members ({}), restarting all {}",
            group_id,
            stalled.join(", "),
            members.len()
        );

        let mut issued = false;
        for m in members {
            // A member may have been stopped, re-played or regrouped while
            // earlier members restarted.
            if self.current_url(&m.player.id, Some(group_id)).is_none() {
                continue;
            }
            if issued && !self.stagger.is_zero() {
                tokio::time::sleep(self.stagger).await;
            }
            issued = true;
            let Some(url) = self.current_url(&m.player.id, Some(group_id)) else {
                continue;
            };
            if let Err(e) = self.device.play_url(&m.player.endpoint(), &url).await {
                log::warn!(
                    "[Reconciler] Restart of {} in group {} failed: {}",
                    m.player.name,
                    group_id,
                    e
                );
                report.failures += 1;
            }
        }
        report.groups_resynced = 1;
        report
    }
}
