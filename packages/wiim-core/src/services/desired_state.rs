//! Desired-state store.
//!
//! Records what each player should be playing (`playerSelections`), the
//! persisted player groups and per-player volumes. A selection means "this
//! player should be playing this media path"; its absence means "stopped".

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{WiimError, WiimResult};
use crate::persistence::JsonDocument;
use crate::protocol_constants::PLAYBACK_FILE;
use crate::utils::generate_group_id;

/// Named set of players that play, stop and change volume together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerGroup {
    pub id: String,
    pub name: String,
    /// Member ids in creation order; start order follows this list.
    pub player_ids: Vec<String>,
}

/// On-disk shape of `playback.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackConfig {
    /// Player id to media path (e.g. `/media/a.mp3`).
    #[serde(default)]
    pub player_selections: BTreeMap<String, String>,
    #[serde(default)]
    pub player_groups: Vec<PlayerGroup>,
    #[serde(default)]
    pub player_volumes: BTreeMap<String, u8>,
}

/// Counts reported by [`DesiredStateStore::cleanup`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupReport {
    pub removed_selections: usize,
    pub removed_volumes: usize,
    pub pruned_members: usize,
    pub removed_groups: usize,
}

impl CleanupReport {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Durable desired-state store.
pub struct DesiredStateStore {
    doc: JsonDocument<PlaybackConfig>,
}

impl DesiredStateStore {
    /// Loads `playback.json` from `data_dir`.
    pub fn load(data_dir: &Path) -> Self {
        let store = Self {
            doc: JsonDocument::load(data_dir.join(PLAYBACK_FILE)),
        };
        store.doc.read(|d| {
            log::info!(
                "[DesiredState] Loaded {} selection(s), {} group(s)",
                d.player_selections.len(),
                d.player_groups.len()
            );
        });
        store
    }

    #[must_use]
    pub fn snapshot(&self) -> PlaybackConfig {
        self.doc.snapshot()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Selections
    // ─────────────────────────────────────────────────────────────────────────

    #[must_use]
    pub fn selection(&self, player_id: &str) -> Option<String> {
        self.doc
            .read(|d| d.player_selections.get(player_id).cloned())
    }

    #[must_use]
    pub fn selections(&self) -> BTreeMap<String, String> {
        self.doc.read(|d| d.player_selections.clone())
    }

    pub fn set_selection(&self, player_id: &str, media_path: &str) {
        self.doc.update_logged("DesiredState", |d| {
            d.player_selections
                .insert(player_id.to_string(), media_path.to_string());
        });
    }

    pub fn remove_selection(&self, player_id: &str) -> bool {
        self.doc.update_logged("DesiredState", |d| {
            d.player_selections.remove(player_id).is_some()
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Volumes
    // ─────────────────────────────────────────────────────────────────────────

    pub fn set_volume(&self, player_id: &str, volume: u8) {
        self.doc.update_logged("DesiredState", |d| {
            d.player_volumes.insert(player_id.to_string(), volume.min(100));
        });
    }

    pub fn set_volumes(&self, player_ids: &[String], volume: u8) {
        self.doc.update_logged("DesiredState", |d| {
            for id in player_ids {
                d.player_volumes.insert(id.clone(), volume.min(100));
            }
        });
    }

    #[must_use]
    pub fn volume(&self, player_id: &str) -> Option<u8> {
        self.doc.read(|d| d.player_volumes.get(player_id).copied())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Groups
    // ─────────────────────────────────────────────────────────────────────────

    #[must_use]
    pub fn groups(&self) -> Vec<PlayerGroup> {
        self.doc.read(|d| d.player_groups.clone())
    }

    #[must_use]
    pub fn group(&self, group_id: &str) -> Option<PlayerGroup> {
        self.doc
            .read(|d| d.player_groups.iter().find(|g| g.id == group_id).cloned())
    }

    pub fn require_group(&self, group_id: &str) -> WiimResult<PlayerGroup> {
        self.group(group_id)
            .ok_or_else(|| WiimError::UnknownGroup(group_id.to_string()))
    }

    /// Creates a group from registered players.
    ///
    /// Duplicate ids are collapsed (first occurrence wins). Fewer than two
    /// distinct registered members is rejected.
    pub fn create_group(
        &self,
        name: &str,
        player_ids: &[String],
        known_ids: &HashSet<String>,
    ) -> WiimResult<PlayerGroup> {
        let mut seen = HashSet::new();
        let mut members = Vec::new();
        for id in player_ids {
            if !known_ids.contains(id) {
                return Err(WiimError::InvalidGroupComposition(format!(
                    "unknown player {}",
                    id
                )));
            }
            if seen.insert(id.as_str()) {
                members.push(id.clone());
            }
        }
        if members.len() < 2 {
            return Err(WiimError::InvalidGroupComposition(
                "a group needs at least 2 distinct players".to_string(),
            ));
        }
        let name = name.trim();
        if name.is_empty() {
            return Err(WiimError::InvalidRequest("group name is required".to_string()));
        }

        let group = PlayerGroup {
            id: generate_group_id(),
            name: name.to_string(),
            player_ids: members,
        };
        self.doc.update_logged("DesiredState", |d| {
            d.player_groups.push(group.clone());
        });
        log::info!(
            "[DesiredState] Created group {} ({}) with {} members",
            group.name,
            group.id,
            group.player_ids.len()
        );
        Ok(group)
    }

    pub fn delete_group(&self, group_id: &str) -> WiimResult<PlayerGroup> {
        self.doc
            .update_logged("DesiredState", |d| {
                let idx = d.player_groups.iter().position(|g| g.id == group_id)?;
                Some(d.player_groups.remove(idx))
            })
            .ok_or_else(|| WiimError::UnknownGroup(group_id.to_string()))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Bulk operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Replaces selections and groups (and volumes, when given) in one write.
    ///
    /// Unlike the per-item mutators, a failed write is returned to the caller.
    pub fn replace(
        &self,
        selections: BTreeMap<String, String>,
        groups: Vec<PlayerGroup>,
        volumes: Option<BTreeMap<String, u8>>,
    ) -> WiimResult<()> {
        let (_, saved) = self.doc.update(|d| {
            d.player_selections = selections;
            d.player_groups = groups;
            if let Some(volumes) = volumes {
                d.player_volumes = volumes.into_iter().map(|(k, v)| (k, v.min(100))).collect();
            }
        });
        saved.map_err(|e| {
            log::error!("[DesiredState] Failed to persist synced config: {}", e);
            WiimError::from(e)
        })
    }

    /// Drops a removed player's selection and volume. Group membership is
    /// left to [`cleanup`](Self::cleanup).
    pub fn purge_player(&self, player_id: &str) {
        self.doc.update_logged("DesiredState", |d| {
            d.player_selections.remove(player_id);
            d.player_volumes.remove(player_id);
        });
    }

    /// Removes entries referring to players that are no longer registered.
    ///
    /// Groups lose unknown members; groups left without members are deleted.
    pub fn cleanup(&self, known_ids: &HashSet<String>) -> CleanupReport {
        let report = self.doc.update_logged("DesiredState", |d| {
            let mut report = CleanupReport::default();

            let before = d.player_selections.len();
            d.player_selections.retain(|id, _| known_ids.contains(id));
            report.removed_selections = before - d.player_selections.len();

            let before = d.player_volumes.len();
            d.player_volumes.retain(|id, _| known_ids.contains(id));
            report.removed_volumes = before - d.player_volumes.len();

            for group in &mut d.player_groups {
                let before = group.player_ids.len();
                group.player_ids.retain(|id| known_ids.contains(id));
                report.pruned_members += before - group.player_ids.len();
            }

            let before = d.player_groups.len();
            d.player_groups.retain(|g| !g.player_ids.is_empty());
            report.removed_groups = before - d.player_groups.len();

            report
        });

        if !report.is_empty() {
            log::info!(
                "[DesiredState] Cleanup removed {} selection(s), {} volume(s), {} group member(s), {} group(s)",
                report.removed_selections,
                report.removed_volumes,
                report.pruned_members,
                report.removed_groups
            );
        }
        report
    }
}
