//! Durable JSON documents.
//!
//! Each document lives in one file under the data directory and is mirrored in
//! memory. Mutations take the write lock, change the in-memory copy and write
//! the file before releasing the lock, so the on-disk order of writes always
//! matches the in-memory order.

use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

use crate::error::ErrorCode;

/// Errors from reading or writing a persisted document.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize {path}: {source}")]
    Serialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

pub type PersistenceResult<T> = Result<T, PersistenceError>;

/// A JSON document mirrored in memory and saved atomically on every change.
pub struct JsonDocument<T> {
    path: PathBuf,
    doc: RwLock<T>,
}

impl<T> JsonDocument<T>
where
    T: Serialize + DeserializeOwned + Default,
{
    /// Loads the document at `path`.
    ///
    /// A missing file loads as the default document. An unreadable or corrupt
    /// file also loads as the default, with a warning.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let doc = match std::fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(doc) => doc,
                Err(e) => {
                    log::warn!(
                        "[Persistence] {} is not valid, starting empty: {}",
                        path.display(),
                        e
                    );
                    T::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => T::default(),
            Err(e) => {
                log::warn!(
                    "[Persistence] Could not read {}, starting empty: {}",
                    path.display(),
                    e
                );
                T::default()
            }
        };
        Self {
            path,
            doc: RwLock::new(doc),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Runs `f` against the current document.
    pub fn read<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.doc.read())
    }

    /// Mutates the document and writes it to disk under one lock.
    ///
    /// The in-memory change is kept even if the write fails; the returned
    /// result reports the write outcome alongside `f`'s value.
    pub fn update<R>(&self, f: impl FnOnce(&mut T) -> R) -> (R, PersistenceResult<()>) {
        let mut doc = self.doc.write();
        let value = f(&mut doc);
        let saved = write_atomic(&self.path, &*doc);
        (value, saved)
    }

    /// Like [`update`](Self::update), but logs a failed write instead of
    /// returning it.
    pub fn update_logged<R>(&self, component: &str, f: impl FnOnce(&mut T) -> R) -> R {
        let (value, saved) = self.update(f);
        if let Err(e) = saved {
            log::error!(
                "[{}] Failed to persist {} ({}); in-memory state kept: {}",
                component,
                self.path.display(),
                e.code(),
                e
            );
        }
        value
    }
}

impl<T: Clone> JsonDocument<T> {
    #[must_use]
    pub fn snapshot(&self) -> T {
        self.doc.read().clone()
    }
}

/// Writes `value` as pretty JSON via a temp file and rename.
///
/// Creates the parent directory if needed.
pub fn write_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> PersistenceResult<()> {
    let io_err = |source| PersistenceError::Io {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
    }

    let contents =
        serde_json::to_string_pretty(value).map_err(|source| PersistenceError::Serialize {
            path: path.to_path_buf(),
            source,
        })?;

    let mut temp_path = path.as_os_str().to_owned();
    temp_path.push(".tmp");
    let temp_path = PathBuf::from(temp_path);

    std::fs::write(&temp_path, contents).map_err(io_err)?;
    std::fs::rename(&temp_path, path).map_err(io_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::TempDir;

    #[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
    struct Counter {
        value: u32,
    }

    #[test]
    fn missing_file_loads_default() {
        let dir = TempDir::new().unwrap();
        let doc: JsonDocument<Counter> = JsonDocument::load(dir.path().join("counter.json"));
        assert_eq!(doc.snapshot(), Counter::default());
    }

    #[test]
    fn corrupt_file_loads_default() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("counter.json");
        std::fs::write(&path, "{ not json").unwrap();
        let doc: JsonDocument<Counter> = JsonDocument::load(&path);
        assert_eq!(doc.snapshot().value, 0);
    }

    #[test]
    fn update_persists_and_reloads() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("counter.json");
        let doc: JsonDocument<Counter> = JsonDocument::load(&path);

        let (value, saved) = doc.update(|c| {
            c.value = 7;
            c.value
        });
        assert_eq!(value, 7);
        assert!(saved.is_ok());
        assert!(!dir.path().join("nested").join("counter.json.tmp").exists());

        let reloaded: JsonDocument<Counter> = JsonDocument::load(&path);
        assert_eq!(reloaded.read(|c| c.value), 7);
    }

    #[test]
    fn failed_write_keeps_memory() {
        let dir = TempDir::new().unwrap();
        // A directory where the file should be makes the rename fail.
        let path = dir.path().join("counter.json");
        std::fs::create_dir_all(path.join("occupied")).unwrap();
        let doc: JsonDocument<Counter> = JsonDocument::load(&path);

        let (_, saved) = doc.update(|c| c.value = 3);
        assert!(matches!(saved, Err(PersistenceError::Io { .. })));
        assert_eq!(doc.read(|c| c.value), 3);
    }
}
