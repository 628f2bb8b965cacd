//! Media library: uploaded audio files and their index.
//!
//! Files live flat in the media directory and are served under `/media`.
//! `media.json` keeps one record per filename.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{WiimError, WiimResult};
use crate::persistence::JsonDocument;
use crate::protocol_constants::{MEDIA_INDEX_FILE, MEDIA_URL_PREFIX};
use crate::utils::now_millis;

/// One uploaded media file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaFile {
    pub id: String,
    /// Display name (the original upload name).
    pub name: String,
    /// Name on disk.
    pub filename: String,
    /// URL path, e.g. `/media/1700000000000-song.mp3`.
    pub path: String,
    pub size: u64,
    pub mimetype: String,
    pub added_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MediaIndex {
    #[serde(default)]
    pub files: Vec<MediaFile>,
}

pub struct MediaLibrary {
    media_dir: PathBuf,
    index: JsonDocument<MediaIndex>,
}

impl MediaLibrary {
    pub fn load(data_dir: &Path, media_dir: impl Into<PathBuf>) -> Self {
        Self {
            media_dir: media_dir.into(),
            index: JsonDocument::load(data_dir.join(MEDIA_INDEX_FILE)),
        }
    }

    #[must_use]
    pub fn media_dir(&self) -> &Path {
        &self.media_dir
    }

    #[must_use]
    pub fn list(&self) -> Vec<MediaFile> {
        self.index.read(|i| i.files.clone())
    }

    /// True if `filename` is a safe flat name and exists on disk.
    pub async fn exists(&self, filename: &str) -> bool {
        if validate_filename(filename).is_err() {
            return false;
        }
        tokio::fs::metadata(self.media_dir.join(filename))
            .await
            .map(|m| m.is_file())
            .unwrap_or(false)
    }

    /// M3U playlist wrapping a stored file, with the media URL rooted at
    /// `base_url` (e.g. `http://192.168.1.10:3000`).
    pub async fn playlist(&self, filename: &str, base_url: &str) -> WiimResult<String> {
        validate_filename(filename)?;
        if !self.exists(filename).await {
            return Err(WiimError::MediaNotFound(filename.to_string()));
        }
        let file_url = format!("{}{}", base_url.trim_end_matches('/'), media_path(filename));
        log::info!("[Media] Generated playlist for {}: {}", filename, file_url);
        Ok(m3u_playlist(filename, &file_url))
    }

    /// Stores an upload as `{millis}-{sanitized name}` and indexes it.
    pub async fn store_upload(
        &self,
        original_name: &str,
        content_type: Option<&str>,
        bytes: &[u8],
    ) -> WiimResult<MediaFile> {
        let sanitized = sanitize_filename(original_name);
        if sanitized.is_empty() {
            return Err(WiimError::InvalidRequest("file name is empty".to_string()));
        }
        let filename = format!("{}-{}", now_millis(), sanitized);

        tokio::fs::create_dir_all(&self.media_dir)
            .await
            .map_err(|e| WiimError::Internal(format!("media dir: {}", e)))?;
        tokio::fs::write(self.media_dir.join(&filename), bytes)
            .await
            .map_err(|e| WiimError::Internal(format!("writing {}: {}", filename, e)))?;

        let mimetype = content_type
            .filter(|c| !c.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| guess_mimetype(&filename).to_string());

        let file = self.upsert(MediaFile {
            id: now_millis().to_string(),
            name: original_name.to_string(),
            path: media_path(&filename),
            filename,
            size: bytes.len() as u64,
            mimetype,
            added_at: Utc::now(),
            updated_at: None,
        });
        log::info!("[Media] Stored {} ({} bytes)", file.filename, file.size);
        Ok(file)
    }

    /// Inserts a record, or refreshes the record with the same filename
    /// (keeping its id and `addedAt`).
    pub fn upsert(&self, file: MediaFile) -> MediaFile {
        self.index.update_logged("Media", |i| {
            match i.files.iter_mut().find(|f| f.filename == file.filename) {
                Some(existing) => {
                    existing.name = file.name;
                    existing.path = file.path;
                    existing.size = file.size;
                    existing.mimetype = file.mimetype;
                    existing.updated_at = Some(Utc::now());
                    existing.clone()
                }
                None => {
                    i.files.push(file.clone());
                    file
                }
            }
        })
    }

    /// Deletes a file and its record.
    pub async fn remove(&self, filename: &str) -> WiimResult<()> {
        validate_filename(filename)?;

        let indexed = self
            .index
            .read(|i| i.files.iter().any(|f| f.filename == filename));
        let path = self.media_dir.join(filename);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                if !indexed {
                    return Err(WiimError::MediaNotFound(filename.to_string()));
                }
            }
            Err(e) => {
                return Err(WiimError::Internal(format!("deleting {}: {}", filename, e)));
            }
        }

        if indexed {
            self.index.update_logged("Media", |i| {
                i.files.retain(|f| f.filename != filename);
            });
        }
        log::info!("[Media] Deleted {}", filename);
        Ok(())
    }
}

/// Single-entry extended M3U playlist for `file_url`.
#[must_use]
pub fn m3u_playlist(title: &str, file_url: &str) -> String {
    format!("#EXTM3U\n#EXTINF:-1,{}\n{}\n", title, file_url)
}

/// URL path under which a stored file is served.
#[must_use]
pub fn media_path(filename: &str) -> String {
    format!("{}/{}", MEDIA_URL_PREFIX, urlencoding::encode(filename))
}

/// Extracts the stored filename from a media URL or path.
///
/// Returns `None` if the last segment is empty or not valid UTF-8 after
/// percent-decoding.
#[must_use]
pub fn filename_from_url(url: &str) -> Option<String> {
    let path = crate::context::url_path(url);
    let last = path.rsplit('/').next().filter(|s| !s.is_empty())?;
    urlencoding::decode(last).ok().map(|s| s.into_owned())
}

fn validate_filename(filename: &str) -> WiimResult<()> {
    if filename.is_empty()
        || filename.contains('/')
        || filename.contains('\\')
        || filename.contains("..")
    {
        return Err(WiimError::InvalidRequest(format!(
            "invalid file name: {}",
            filename
        )));
    }
    Ok(())
}

fn sanitize_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    cleaned.trim_start_matches('.').replace("..", "_")
}

fn guess_mimetype(filename: &str) -> &'static str {
    let ext = filename
        .rsplit('.')
        .next()
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "mp3" => "audio/mpeg",
        "flac" => "audio/flac",
        "wav" => "audio/wav",
        "ogg" | "oga" => "audio/ogg",
        "m4a" | "aac" => "audio/aac",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn library(dir: &TempDir) -> MediaLibrary {
        MediaLibrary::load(dir.path(), dir.path().join("media"))
    }

    #[tokio::test]
    async fn upload_is_stored_indexed_and_deletable() {
        let dir = TempDir::new().unwrap();
        let lib = library(&dir);

        let file = lib
            .store_upload("My Song.mp3", None, b"ID3 fake audio")
            .await
            .unwrap();
        assert!(file.filename.ends_with("-My_Song.mp3"));
        assert_eq!(file.mimetype, "audio/mpeg");
        assert_eq!(file.size, 14);
        assert!(lib.exists(&file.filename).await);
        assert_eq!(lib.list().len(), 1);

        lib.remove(&file.filename).await.unwrap();
        assert!(!lib.exists(&file.filename).await);
        assert!(lib.list().is_empty());
        assert!(matches!(
            lib.remove(&file.filename).await,
            Err(WiimError::MediaNotFound(_))
        ));
    }

    #[tokio::test]
    async fn playlist_points_at_the_served_file() {
        let dir = TempDir::new().unwrap();
        let lib = library(&dir);
        let file = lib.store_upload("loop.mp3", None, b"audio").await.unwrap();

        let m3u = lib
            .playlist(&file.filename, "http://192.168.1.10:3000/")
            .await
            .unwrap();
        let lines: Vec<&str> = m3u.lines().collect();
        assert_eq!(lines[0], "#EXTM3U");
        assert_eq!(lines[1], format!("#EXTINF:-1,{}", file.filename));
        assert_eq!(
            lines[2],
            format!("http://192.168.1.10:3000/media/{}", file.filename)
        );
        assert!(m3u.ends_with('\n'));

        assert!(matches!(
            lib.playlist("missing.mp3", "http://192.168.1.10:3000").await,
            Err(WiimError::MediaNotFound(_))
        ));
        assert!(matches!(
            lib.playlist("../secret", "http://192.168.1.10:3000").await,
            Err(WiimError::InvalidRequest(_))
        ));
    }

    #[tokio::test]
    async fn remove_rejects_traversal() {
        let dir = TempDir::new().unwrap();
        let lib = library(&dir);
        for name in ["../players.json", "a/b.mp3", "..", ""] {
            assert!(matches!(
                lib.remove(name).await,
                Err(WiimError::InvalidRequest(_))
            ));
        }
        assert!(!lib.exists("../players.json").await);
    }

    #[test]
    fn upsert_matches_by_filename() {
        let dir = TempDir::new().unwrap();
        let lib = library(&dir);
        let record = |size| MediaFile {
            id: "1".into(),
            name: "a.mp3".into(),
            filename: "1-a.mp3".into(),
            path: media_path("1-a.mp3"),
            size,
            mimetype: "audio/mpeg".into(),
            added_at: Utc::now(),
            updated_at: None,
        };
        let first = lib.upsert(record(10));
        let second = lib.upsert(record(20));
        assert_eq!(lib.list().len(), 1);
        assert_eq!(second.size, 20);
        assert_eq!(second.added_at, first.added_at);
        assert!(second.updated_at.is_some());
    }

    #[test]
    fn filename_is_taken_from_last_url_segment() {
        assert_eq!(
            filename_from_url("http://10.0.0.2:3000/media/1-my%20song.mp3").as_deref(),
            Some("1-my song.mp3")
        );
        assert_eq!(filename_from_url("/media/a.mp3").as_deref(), Some("a.mp3"));
        assert_eq!(filename_from_url("http://10.0.0.2:3000/media/"), None);
    }

    #[test]
    fn sanitize_strips_paths_and_odd_characters() {
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("a b?.mp3"), "a_b_.mp3");
        assert_eq!(sanitize_filename(".hidden"), "hidden");
    }
}
