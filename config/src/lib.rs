//! Settings store for the media server.
//!
//! Loads and saves the typed configuration document: `server_name`,
//! `server_port`, `media_folders`, and the cache/thumbnail/transcoding
//! toggles. A missing file or malformed JSON is recoverable — the store
//! falls back to [`Settings::default`] and logs a warning rather than
//! failing startup.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::warn;

mod defaults {
    pub const SERVER_NAME: &str = "MediaServer";
    pub const SERVER_PORT: u16 = 9005;
    pub const THUMBNAIL_TIMESTAMP: u32 = 4;
}

/// Position-bookmark storage mode, see `PlaybackCache`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum CacheMode {
    Off,
    #[default]
    Global,
    PerClient,
}

/// The configuration document persisted at `settings.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_server_name")]
    pub server_name: String,

    #[serde(default = "default_server_port")]
    pub server_port: u16,

    #[serde(default)]
    pub media_folders: Vec<PathBuf>,

    #[serde(default)]
    pub start_on_startup: bool,

    #[serde(default = "default_true")]
    pub generate_thumbnails: bool,

    #[serde(default = "default_thumbnail_timestamp")]
    pub thumbnail_timestamp: u32,

    #[serde(default)]
    pub enable_upnp: bool,

    #[serde(default)]
    pub server_icon_path: Option<PathBuf>,

    #[serde(default)]
    pub cache_mode: CacheMode,

    #[serde(default)]
    pub enable_transcoding: bool,

    #[serde(default = "default_transcode_formats")]
    pub transcode_formats: Vec<String>,
}

fn default_server_name() -> String {
    defaults::SERVER_NAME.to_string()
}

fn default_server_port() -> u16 {
    defaults::SERVER_PORT
}

fn default_thumbnail_timestamp() -> u32 {
    defaults::THUMBNAIL_TIMESTAMP
}

fn default_true() -> bool {
    true
}

fn default_transcode_formats() -> Vec<String> {
    vec![".mkv".into(), ".avi".into(), ".webm".into(), ".mov".into()]
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_name: default_server_name(),
            server_port: default_server_port(),
            media_folders: Vec::new(),
            start_on_startup: false,
            generate_thumbnails: true,
            thumbnail_timestamp: default_thumbnail_timestamp(),
            enable_upnp: false,
            server_icon_path: None,
            cache_mode: CacheMode::default(),
            enable_transcoding: false,
            transcode_formats: default_transcode_formats(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io error accessing {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to serialize settings: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Thread-safe handle owning the active configuration document and the path
/// it is persisted to.
pub struct SettingsStore {
    path: PathBuf,
    data: Mutex<Settings>,
}

impl SettingsStore {
    /// Loads `settings.json` from `path`. Missing file or malformed JSON is
    /// logged and falls back to defaults rather than failing startup.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let settings = match fs::read(&path) {
            Ok(bytes) => match serde_json::from_slice::<Settings>(&bytes) {
                Ok(settings) => settings,
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "malformed settings.json, using defaults");
                    Settings::default()
                }
            },
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                warn!(path = %path.display(), "settings.json not found, using defaults");
                Settings::default()
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "failed to read settings.json, using defaults");
                Settings::default()
            }
        };

        Self {
            path,
            data: Mutex::new(settings),
        }
    }

    /// Returns a clone of the currently active settings.
    pub fn get(&self) -> Settings {
        self.data.lock().unwrap().clone()
    }

    /// Replaces the active settings and persists them before returning.
    pub fn replace(&self, settings: Settings) -> Result<(), Error> {
        self.write_atomic(&settings)?;
        *self.data.lock().unwrap() = settings;
        Ok(())
    }

    /// Persists the currently active settings.
    pub fn save(&self) -> Result<(), Error> {
        let settings = self.data.lock().unwrap().clone();
        self.write_atomic(&settings)
    }

    fn write_atomic(&self, settings: &Settings) -> Result<(), Error> {
        let json = serde_json::to_vec_pretty(settings)?;

        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir).map_err(|source| Error::Io {
            path: dir.to_path_buf(),
            source,
        })?;

        let tmp_path = tmp_path_for(&self.path);
        fs::write(&tmp_path, &json).map_err(|source| Error::Io {
            path: tmp_path.clone(),
            source,
        })?;
        fs::rename(&tmp_path, &self.path).map_err(|source| Error::Io {
            path: self.path.clone(),
            source,
        })?;
        Ok(())
    }
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::load(dir.path().join("settings.json"));
        assert_eq!(store.get(), Settings::default());
    }

    #[test]
    fn malformed_json_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, b"{ not json").unwrap();

        let store = SettingsStore::load(&path);
        assert_eq!(store.get(), Settings::default());
    }

    #[test]
    fn missing_keys_use_documented_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, br#"{"server_port": 12345}"#).unwrap();

        let store = SettingsStore::load(&path);
        let settings = store.get();
        assert_eq!(settings.server_port, 12345);
        assert_eq!(settings.server_name, defaults::SERVER_NAME);
        assert!(settings.generate_thumbnails);
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let store = SettingsStore::load(&path);

        let mut settings = store.get();
        settings.server_name = "Living Room".into();
        settings.media_folders.push(PathBuf::from("/mnt/videos"));
        store.replace(settings.clone()).unwrap();

        let reloaded = SettingsStore::load(&path);
        assert_eq!(reloaded.get(), settings);
    }

    #[test]
    fn save_is_atomic_via_rename() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let store = SettingsStore::load(&path);
        store.save().unwrap();

        assert!(path.exists());
        assert!(!tmp_path_for(&path).exists());
    }
}
