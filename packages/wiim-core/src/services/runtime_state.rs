//! In-process runtime state: armed monitors and manual-stop marks.
//!
//! Nothing here is persisted. Startup recovery rebuilds it from the
//! desired-state store.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::{DashMap, DashSet};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

/// What a monitor is enforcing for one player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorState {
    /// Device-reachable URL the player should be playing.
    pub last_url: String,
    /// `false` suppresses every automatic restart for this player.
    pub monitoring: bool,
    /// Set when the player was started as part of a group or play-all.
    pub group_id: Option<String>,
}

struct MonitorEntry {
    state: MonitorState,
    cancel: CancellationToken,
    armed_seq: u64,
}

/// Serializable view for `/api/monitors`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorSnapshot {
    pub player_id: String,
    #[serde(flatten)]
    pub state: MonitorState,
    pub manually_stopped: bool,
}

/// Injectable container for monitor states and manual-stop marks.
///
/// Each armed monitor owns a child of the root token, so cancelling the root
/// on shutdown stops every monitor loop.
pub struct RuntimeState {
    root: CancellationToken,
    monitors: DashMap<String, MonitorEntry>,
    manual_stops: DashSet<String>,
    seq: AtomicU64,
}

impl RuntimeState {
    pub fn new(root: CancellationToken) -> Self {
        Self {
            root,
            monitors: DashMap::new(),
            manual_stops: DashSet::new(),
            seq: AtomicU64::new(0),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Monitors
    // ─────────────────────────────────────────────────────────────────────────

    /// Arms (or re-arms) the monitor record for a player.
    ///
    /// Any previous loop for the player is cancelled; the returned token
    /// belongs to the new loop.
    pub fn arm(&self, player_id: &str, url: &str, group_id: Option<&str>) -> CancellationToken {
        let token = self.root.child_token();
        let entry = MonitorEntry {
            state: MonitorState {
                last_url: url.to_string(),
                monitoring: true,
                group_id: group_id.map(str::to_string),
            },
            cancel: token.clone(),
            armed_seq: self.seq.fetch_add(1, Ordering::Relaxed),
        };
        if let Some(previous) = self.monitors.insert(player_id.to_string(), entry) {
            previous.cancel.cancel();
        }
        token
    }

    /// Turns monitoring off and cancels the loop. The record is kept so the
    /// last URL stays visible.
    pub fn disarm(&self, player_id: &str) -> bool {
        match self.monitors.get_mut(player_id) {
            Some(mut entry) => {
                entry.state.monitoring = false;
                entry.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Drops the record entirely (player removed).
    pub fn remove(&self, player_id: &str) {
        if let Some((_, entry)) = self.monitors.remove(player_id) {
            entry.cancel.cancel();
        }
        self.manual_stops.remove(player_id);
    }

    #[must_use]
    pub fn get(&self, player_id: &str) -> Option<MonitorState> {
        self.monitors.get(player_id).map(|e| e.state.clone())
    }

    #[must_use]
    pub fn is_monitoring(&self, player_id: &str) -> bool {
        self.monitors
            .get(player_id)
            .map(|e| e.state.monitoring)
            .unwrap_or(false)
    }

    /// Monitored players in arming order.
    #[must_use]
    pub fn monitored(&self) -> Vec<(String, MonitorState)> {
        let mut entries: Vec<_> = self
            .monitors
            .iter()
            .filter(|e| e.state.monitoring)
            .map(|e| (e.armed_seq, e.key().clone(), e.state.clone()))
            .collect();
        entries.sort_by_key(|(seq, _, _)| *seq);
        entries.into_iter().map(|(_, id, state)| (id, state)).collect()
    }

    #[must_use]
    pub fn snapshot(&self) -> Vec<MonitorSnapshot> {
        let mut entries: Vec<_> = self
            .monitors
            .iter()
            .map(|e| {
                (
                    e.armed_seq,
                    MonitorSnapshot {
                        player_id: e.key().clone(),
                        state: e.state.clone(),
                        manually_stopped: self.manual_stops.contains(e.key()),
                    },
                )
            })
            .collect();
        entries.sort_by_key(|(seq, _)| *seq);
        entries.into_iter().map(|(_, s)| s).collect()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Manual stops
    // ─────────────────────────────────────────────────────────────────────────

    pub fn mark_manual_stop(&self, player_id: &str) {
        self.manual_stops.insert(player_id.to_string());
    }

    pub fn clear_manual_stop(&self, player_id: &str) -> bool {
        self.manual_stops.remove(player_id).is_some()
    }

    #[must_use]
    pub fn is_manually_stopped(&self, player_id: &str) -> bool {
        self.manual_stops.contains(player_id)
    }

    #[must_use]
    pub fn manual_stops(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.manual_stops.iter().map(|id| id.key().clone()).collect();
        ids.sort();
        ids
    }

    /// Monitoring and not manually stopped: eligible for automatic restarts.
    #[must_use]
    pub fn should_enforce(&self, player_id: &str) -> bool {
        self.is_monitoring(player_id) && !self.is_manually_stopped(player_id)
    }
}
