//! UI and miscellaneous settings (`settings.json`).
//!
//! The document is free-form: the server stores whatever object the web UI
//! posts and hands it back unchanged.

use std::path::Path;

use serde_json::{Map, Value};

use crate::error::{WiimError, WiimResult};
use crate::persistence::JsonDocument;
use crate::protocol_constants::SETTINGS_FILE;

pub type Settings = Map<String, Value>;

pub struct SettingsStore {
    doc: JsonDocument<Settings>,
}

impl SettingsStore {
    pub fn load(data_dir: &Path) -> Self {
        Self {
            doc: JsonDocument::load(data_dir.join(SETTINGS_FILE)),
        }
    }

    #[must_use]
    pub fn get(&self) -> Settings {
        self.doc.snapshot()
    }

    /// Replaces the whole document. Only JSON objects are accepted.
    pub fn replace(&self, value: Value) -> WiimResult<()> {
        let Value::Object(settings) = value else {
            return Err(WiimError::InvalidRequest(
                "settings must be a JSON object".to_string(),
            ));
        };
        let ((), saved) = self.doc.update(|doc| *doc = settings);
        saved.map_err(|e| {
            log::error!("[Settings] Failed to save: {}", e);
            WiimError::from(e)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn settings_round_trip_through_disk() {
        let dir = TempDir::new().unwrap();
        let store = SettingsStore::load(dir.path());
        assert!(store.get().is_empty());

        store
            .replace(json!({ "theme": "dark", "autoRefresh": 5 }))
            .unwrap();
        let reloaded = SettingsStore::load(dir.path());
        assert_eq!(reloaded.get()["theme"], "dark");
    }

    #[test]
    fn non_objects_are_rejected() {
        let dir = TempDir::new().unwrap();
        let store = SettingsStore::load(dir.path());
        assert!(matches!(
            store.replace(json!([1, 2])),
            Err(WiimError::InvalidRequest(_))
        ));
    }
}
