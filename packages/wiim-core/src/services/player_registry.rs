//! Durable registry of players.
//!
//! Maps stable player ids to network addresses. Re-registration matches an
//! existing record by uuid, then ip, then name, and updates it in place so the
//! id never changes.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::device::DeviceEndpoint;
use crate::error::{WiimError, WiimResult};
use crate::persistence::JsonDocument;
use crate::protocol_constants::PLAYERS_FILE;
use crate::utils::generate_player_id;

/// A registered device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    pub id: String,
    pub ip: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    #[serde(default = "default_use_https")]
    pub use_https: bool,
    pub added_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

fn default_use_https() -> bool {
    true
}

impl Player {
    #[must_use]
    pub fn endpoint(&self) -> DeviceEndpoint {
        DeviceEndpoint::new(self.ip.clone(), self.use_https)
    }
}

/// On-disk shape of `players.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayersDocument {
    #[serde(default)]
    pub players: Vec<Player>,
    #[serde(default)]
    pub active_player: Option<String>,
}

/// Registration request from a manual add or a discovery match.
#[derive(Debug, Clone)]
pub struct NewPlayer {
    pub ip: String,
    pub name: Option<String>,
    pub uuid: Option<String>,
    pub use_https: bool,
}

impl NewPlayer {
    fn display_name(&self) -> String {
        match &self.name {
            Some(name) if !name.trim().is_empty() => name.trim().to_string(),
            _ => format!("WiiM Player ({})", self.ip),
        }
    }
}

/// Whether an upsert created a record or updated one in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UpsertOutcome {
    Created,
    Updated,
}

/// Durable player registry.
pub struct PlayerRegistry {
    doc: JsonDocument<PlayersDocument>,
}

impl PlayerRegistry {
    /// Loads `players.json` from `data_dir`.
    pub fn load(data_dir: &Path) -> Self {
        let registry = Self {
            doc: JsonDocument::load(data_dir.join(PLAYERS_FILE)),
        };
        log::info!(
            "[Registry] Loaded {} player(s)",
            registry.doc.read(|d| d.players.len())
        );
        registry
    }

    #[must_use]
    pub fn document(&self) -> PlayersDocument {
        self.doc.snapshot()
    }

    #[must_use]
    pub fn list(&self) -> Vec<Player> {
        self.doc.read(|d| d.players.clone())
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<Player> {
        self.doc
            .read(|d| d.players.iter().find(|p| p.id == id).cloned())
    }

    /// Like [`get`](Self::get), but an unknown id is an error.
    pub fn require(&self, id: &str) -> WiimResult<Player> {
        self.get(id)
            .ok_or_else(|| WiimError::UnknownPlayer(id.to_string()))
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.doc.read(|d| d.players.iter().any(|p| p.id == id))
    }

    #[must_use]
    pub fn ids(&self) -> Vec<String> {
        self.doc
            .read(|d| d.players.iter().map(|p| p.id.clone()).collect())
    }

    /// Registers a player or updates the matching record.
    ///
    /// Matching priority: uuid, then ip, then name. A match keeps its id and
    /// `addedAt`; ip, name, uuid and scheme are refreshed.
    pub fn upsert(&self, new: NewPlayer) -> (Player, UpsertOutcome) {
        let name = new.display_name();
        self.doc.update_logged("Registry", |doc| {
            let now = Utc::now();
            let existing = find_match(&doc.players, &new, &name);

            let (player, outcome) = match existing {
                Some(idx) => {
                    let player = &mut doc.players[idx];
                    player.ip = new.ip.clone();
                    player.name = name;
                    if new.uuid.is_some() {
                        player.uuid = new.uuid.clone();
                    }
                    player.use_https = new.use_https;
                    player.updated_at = Some(now);
                    log::info!("[Registry] Updated {} ({}) at {}", player.name, player.id, player.ip);
                    (player.clone(), UpsertOutcome::Updated)
                }
                None => {
                    let player = Player {
                        id: generate_player_id(),
                        ip: new.ip.clone(),
                        name,
                        uuid: new.uuid.clone(),
                        use_https: new.use_https,
                        added_at: now,
                        updated_at: None,
                    };
                    log::info!("[Registry] Added {} ({}) at {}", player.name, player.id, player.ip);
                    doc.players.push(player.clone());
                    (player, UpsertOutcome::Created)
                }
            };

            if doc.active_player.is_none() {
                doc.active_player = doc.players.first().map(|p| p.id.clone());
            }
            (player, outcome)
        })
    }

    /// Removes a player. Returns the removed record.
    ///
    /// If it was the active player, the first remaining player becomes active.
    pub fn remove(&self, id: &str) -> WiimResult<Player> {
        self.doc
            .update_logged("Registry", |doc| {
                let idx = doc.players.iter().position(|p| p.id == id)?;
                let removed = doc.players.remove(idx);
                if doc.active_player.as_deref() == Some(id) {
                    doc.active_player = doc.players.first().map(|p| p.id.clone());
                }
                log::info!("[Registry] Removed {} ({})", removed.name, removed.id);
                Some(removed)
            })
            .ok_or_else(|| WiimError::UnknownPlayer(id.to_string()))
    }

    pub fn set_active(&self, id: &str) -> WiimResult<()> {
        if !self.contains(id) {
            return Err(WiimError::UnknownPlayer(id.to_string()));
        }
        self.doc.update_logged("Registry", |doc| {
            doc.active_player = Some(id.to_string());
        });
        Ok(())
    }

    #[must_use]
    pub fn active(&self) -> Option<Player> {
        self.doc.read(|d| {
            let id = d.active_player.as_deref()?;
            d.players.iter().find(|p| p.id == id).cloned()
        })
    }
}

fn find_match(players: &[Player], new: &NewPlayer, name: &str) -> Option<usize> {
    if let Some(uuid) = new.uuid.as_deref().filter(|u| !u.is_empty()) {
        if let Some(idx) = players
            .iter()
            .position(|p| p.uuid.as_deref() == Some(uuid))
        {
            return Some(idx);
        }
    }
    if let Some(idx) = players.iter().position(|p| p.ip == new.ip) {
        return Some(idx);
    }
    // Only an explicit name identifies a device; the generated default
    // embeds the ip and was already covered above.
    new.name.as_ref()?;
    players.iter().position(|p| p.name == name)
}
