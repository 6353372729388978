//! JSON-file-backed caches keyed by the MD5 fingerprint of a media file's
//! absolute path. Each cache is a plain `HashMap` guarded by a mutex and
//! persisted atomically (temp file + rename), mirroring the settings store's
//! save discipline rather than reaching for an embedded database.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use md5::{Digest, Md5};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::error::{Error, Result};

/// Computes the fingerprint used as a cache key and thumbnail filename stem:
/// the hex MD5 digest of the file's absolute path, as a string.
pub fn fingerprint(path: &Path) -> String {
    let mut hasher = Md5::new();
    hasher.update(path.to_string_lossy().as_bytes());
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

/// A `HashMap<String, V>` persisted as JSON, keyed by [`fingerprint`].
pub struct JsonCache<V> {
    path: PathBuf,
    entries: Mutex<HashMap<String, V>>,
}

impl<V> JsonCache<V>
where
    V: Serialize + DeserializeOwned + Clone,
{
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_default(),
            Err(_) => HashMap::new(),
        };

        Self {
            path,
            entries: Mutex::new(entries),
        }
    }

    pub fn get(&self, key: &str) -> Option<V> {
        self.entries.lock().unwrap().get(key).cloned()
    }

    pub fn set(&self, key: String, value: V) -> Result<()> {
        self.entries.lock().unwrap().insert(key, value);
        self.save()
    }

    pub fn remove(&self, key: &str) -> Result<()> {
        self.entries.lock().unwrap().remove(key);
        self.save()
    }

    fn save(&self) -> Result<()> {
        let entries = self.entries.lock().unwrap();
        let json = serde_json::to_vec_pretty(&*entries).map_err(|source| Error::Cache {
            path: self.path.clone(),
            source,
        })?;
        drop(entries);

        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir).map_err(|source| Error::Io {
                path: dir.to_path_buf(),
                source,
            })?;
        }

        let mut tmp = self.path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp_path = PathBuf::from(tmp);
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

/// A probed media duration, persisted per-fingerprint as `{"duration": n}`
/// to match the on-disk cache's documented external shape.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DurationEntry {
    pub duration: f64,
}

/// Caches the probed duration of a media file.
pub type DurationCache = JsonCache<DurationEntry>;

/// Tracks which fingerprints already have a generated thumbnail on disk.
pub type ThumbnailCache = JsonCache<bool>;

/// Playback position per client, in seconds. The key inside the map is the
/// client identifier, or the literal `"global"` when the store is configured
/// for `CacheMode::Global`.
pub type PlaybackCache = JsonCache<HashMap<String, f64>>;

/// Resolves the client key to use for a playback cache entry, collapsing to
/// a single shared bookmark when per-client tracking is disabled.
pub fn playback_client_key(mode: mediaserver_config::CacheMode, client_id: &str) -> String {
    match mode {
        mediaserver_config::CacheMode::PerClient => client_id.to_string(),
        _ => "global".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_stable_and_path_sensitive() {
        let a = fingerprint(Path::new("/mnt/videos/a.mp4"));
        let b = fingerprint(Path::new("/mnt/videos/a.mp4"));
        let c = fingerprint(Path::new("/mnt/videos/b.mp4"));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 32);
    }

    #[test]
    fn duration_cache_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("durations.json");

        let cache = DurationCache::load(&path);
        let key = fingerprint(Path::new("/mnt/videos/a.mp4"));
        cache.set(key.clone(), DurationEntry { duration: 3600.0 }).unwrap();

        let reloaded = DurationCache::load(&path);
        assert_eq!(reloaded.get(&key), Some(DurationEntry { duration: 3600.0 }));
    }

    #[test]
    fn removing_a_missing_key_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DurationCache::load(dir.path().join("durations.json"));
        assert!(cache.remove("does-not-exist").is_ok());
    }

    #[test]
    fn global_mode_collapses_every_client_to_one_key() {
        let mode = mediaserver_config::CacheMode::Global;
        assert_eq!(playback_client_key(mode, "client-a"), "global");
        assert_eq!(playback_client_key(mode, "client-b"), "global");
    }

    #[test]
    fn per_client_mode_keeps_clients_distinct() {
        let mode = mediaserver_config::CacheMode::PerClient;
        assert_eq!(playback_client_key(mode, "client-a"), "client-a");
        assert_ne!(
            playback_client_key(mode, "client-a"),
            playback_client_key(mode, "client-b")
        );
    }
}
