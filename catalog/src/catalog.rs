//! Ties together directory scanning, the duration/thumbnail/playback
//! caches, and the filesystem watcher into one `Catalog` handle shared by
//! the HTTP/DLNA layer.
//!
//! The catalog never reaches into the eventing layer directly: every
//! mutation is published on a `tokio::sync::broadcast` change feed, and
//! whichever component cares (GENA eventing, a future UI) subscribes to it.
//! This keeps the dependency one-directional.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use mediaserver_config::CacheMode;

use crate::cache::{self, DurationCache, PlaybackCache, ThumbnailCache};
use crate::error::{Error, Result};
use crate::probe::{self, MediaProbe};
use crate::types::{Container, DirectoryListing, MediaItem, guess_mime_type, is_video_file};
use crate::watcher::{CatalogWatcher, WatchEvent, is_safe_path};

/// A change broadcast to every subscriber of the catalog's update feed.
#[derive(Debug, Clone)]
pub enum ChangeEvent {
    Added(PathBuf),
    Removed(PathBuf),
    Moved { from: PathBuf, to: PathBuf },
    /// Fires once background metadata (duration, thumbnail) becomes available.
    MetadataReady(PathBuf),
}

pub struct Catalog {
    roots: Vec<PathBuf>,
    thumbnail_dir: PathBuf,
    generate_thumbnails: bool,
    thumbnail_timestamp: u32,
    cache_mode: CacheMode,

    duration_cache: DurationCache,
    thumbnail_cache: ThumbnailCache,
    playback_cache: PlaybackCache,

    probe: MediaProbe,
    update_id: AtomicU64,
    change_tx: broadcast::Sender<ChangeEvent>,
    enrich_tx: mpsc::Sender<PathBuf>,
}

pub struct CatalogHandles {
    pub catalog: Arc<Catalog>,
    pub enrich_rx: mpsc::Receiver<PathBuf>,
}

impl Catalog {
    /// Builds a new catalog. Returns both the catalog handle and the
    /// receiving half of the enrichment queue — the caller is expected to
    /// drive it with [`Catalog::run_enrichment_worker`].
    pub fn new(
        roots: Vec<PathBuf>,
        cache_dir: &Path,
        thumbnail_dir: PathBuf,
        generate_thumbnails: bool,
        thumbnail_timestamp: u32,
        cache_mode: CacheMode,
    ) -> CatalogHandles {
        let duration_cache = DurationCache::load(cache_dir.join("media_info_cache.json"));
        let thumbnail_cache = ThumbnailCache::load(cache_dir.join("thumbnail_cache.json"));
        let playback_cache = PlaybackCache::load(cache_dir.join("playback_cache.json"));

        let (change_tx, _) = broadcast::channel(256);
        let (enrich_tx, enrich_rx) = mpsc::channel(256);

        let catalog = Arc::new(Catalog {
            roots,
            thumbnail_dir,
            generate_thumbnails,
            thumbnail_timestamp,
            cache_mode,
            duration_cache,
            thumbnail_cache,
            playback_cache,
            probe: MediaProbe::new(),
            update_id: AtomicU64::new(1),
            change_tx,
            enrich_tx,
        });

        CatalogHandles {
            catalog,
            enrich_rx,
        }
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    pub fn subscribe_changes(&self) -> broadcast::Receiver<ChangeEvent> {
        self.change_tx.subscribe()
    }

    /// Monotonically increasing `SystemUpdateID`, bumped on every catalog
    /// mutation and reported verbatim in `GetSystemUpdateID` responses.
    pub fn current_update_id(&self) -> u64 {
        self.update_id.load(Ordering::SeqCst)
    }

    fn bump_update_id(&self) -> u64 {
        self.update_id.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn is_safe(&self, path: &Path) -> bool {
        is_safe_path(&self.roots, path)
    }

    /// Lists the immediate children (sub-folders and video files) of `dir`.
    pub fn list_dir(&self, dir: &Path) -> Result<DirectoryListing> {
        if !self.is_safe(dir) {
            return Err(Error::UnsafePath(dir.to_path_buf()));
        }

        let mut listing = DirectoryListing::default();
        let read_dir = fs::read_dir(dir).map_err(|source| Error::Io {
            path: dir.to_path_buf(),
            source,
        })?;

        for entry in read_dir {
            let entry = entry.map_err(|source| Error::Io {
                path: dir.to_path_buf(),
                source,
            })?;
            let path = entry.path();
            let metadata = entry.metadata().map_err(|source| Error::Io {
                path: path.clone(),
                source,
            })?;

            if metadata.is_dir() {
                let child_count = fs::read_dir(&path)
                    .map(|rd| rd.count())
                    .unwrap_or_default();
                listing.containers.push(Container {
                    title: path
                        .file_name()
                        .and_then(|n| n.to_str())
                        .unwrap_or("")
                        .to_string(),
                    path,
                    child_count,
                });
            } else if is_video_file(&path) {
                listing.items.push(self.build_media_item(&path, &metadata));
            }
        }

        listing.containers.sort_by(|a, b| a.title.cmp(&b.title));
        listing.items.sort_by(|a, b| a.title.cmp(&b.title));
        Ok(listing)
    }

    fn build_media_item(&self, path: &Path, metadata: &fs::Metadata) -> MediaItem {
        let fp = cache::fingerprint(path);
        MediaItem {
            title: path
                .file_stem()
                .and_then(|n| n.to_str())
                .unwrap_or("")
                .to_string(),
            size: metadata.len(),
            modified: metadata.modified().ok(),
            mime_type: guess_mime_type(path),
            duration_secs: self.duration_cache.get(&fp).map(|entry| entry.duration.round() as u64),
            path: path.to_path_buf(),
        }
    }

    /// Recursively walks every configured root, enqueuing each discovered
    /// video file for background duration/thumbnail enrichment.
    pub async fn scan_all(&self) {
        let roots = self.roots.clone();
        for root in roots {
            self.scan_dir(&root).await;
        }
    }

    pub async fn scan_dir(&self, dir: &Path) {
        let mut stack = vec![dir.to_path_buf()];
        while let Some(current) = stack.pop() {
            let Ok(mut entries) = tokio::fs::read_dir(&current).await else {
                continue;
            };
            while let Ok(Some(entry)) = entries.next_entry().await {
                let path = entry.path();
                match entry.file_type().await {
                    Ok(ft) if ft.is_dir() => stack.push(path),
                    Ok(ft) if ft.is_file() && is_video_file(&path) => {
                        self.enqueue_enrichment(path).await;
                    }
                    _ => {}
                }
            }
        }
    }

    async fn enqueue_enrichment(&self, path: PathBuf) {
        if self.enrich_tx.send(path).await.is_err() {
            warn!("enrichment queue receiver dropped");
        }
    }

    /// Returns a duration if already cached, otherwise queues a background
    /// probe and returns `None` for this call.
    pub async fn get_duration(&self, path: &Path) -> Option<u64> {
        let fp = cache::fingerprint(path);
        if let Some(entry) = self.duration_cache.get(&fp) {
            return Some(entry.duration.round() as u64);
        }
        self.enqueue_enrichment(path.to_path_buf()).await;
        None
    }

    pub fn thumbnail_path_for(&self, path: &Path) -> PathBuf {
        probe::thumbnail_path(&self.thumbnail_dir, &cache::fingerprint(path))
    }

    /// The directory thumbnails are rendered into, for building a
    /// fingerprint-keyed serving path.
    pub fn thumbnail_dir(&self) -> &Path {
        &self.thumbnail_dir
    }

    pub fn has_thumbnail(&self, path: &Path) -> bool {
        self.thumbnail_cache
            .get(&cache::fingerprint(path))
            .unwrap_or(false)
    }

    /// Drains the enrichment queue, probing duration and (if enabled)
    /// generating a thumbnail for each file, one at a time. Intended to be
    /// spawned as a single background task.
    pub async fn run_enrichment_worker(self: Arc<Self>, mut rx: mpsc::Receiver<PathBuf>) {
        while let Some(path) = rx.recv().await {
            let fp = cache::fingerprint(&path);

            if self.duration_cache.get(&fp).is_none() {
                match self.probe.probe_duration(&path).await {
                    Ok(secs) => {
                        let entry = cache::DurationEntry { duration: secs as f64 };
                        if let Err(err) = self.duration_cache.set(fp.clone(), entry) {
                            warn!(error = %err, "failed to persist duration cache");
                        }
                    }
                    Err(err) => debug!(path = %path.display(), error = %err, "duration probe failed"),
                }
            }

            if self.generate_thumbnails && !self.has_thumbnail(&path) {
                let dest = self.thumbnail_path_for(&path);
                match self
                    .probe
                    .generate_thumbnail(&path, self.thumbnail_timestamp, &dest)
                    .await
                {
                    Ok(()) => {
                        if let Err(err) = self.thumbnail_cache.set(fp.clone(), true) {
                            warn!(error = %err, "failed to persist thumbnail cache");
                        }
                    }
                    Err(err) => {
                        debug!(path = %path.display(), error = %err, "thumbnail generation failed")
                    }
                }
            }

            let _ = self.change_tx.send(ChangeEvent::MetadataReady(path));
        }
    }

    /// Starts the recursive filesystem watcher over every configured root.
    /// The returned [`CatalogWatcher`] must be kept alive for watching to
    /// continue; dropping it stops the watch.
    pub fn start_watching(self: &Arc<Self>) -> Result<(CatalogWatcher, tokio::task::JoinHandle<()>)> {
        let (tx, mut rx) = mpsc::channel(256);
        let watcher = CatalogWatcher::start(&self.roots, tx)?;

        let catalog = Arc::clone(self);
        let driver = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                catalog.apply_watch_event(event).await;
            }
        });

        Ok((watcher, driver))
    }

    async fn apply_watch_event(&self, event: WatchEvent) {
        match event {
            WatchEvent::Created(path) => {
                info!(path = %path.display(), "media file created");
                self.enqueue_enrichment(path.clone()).await;
                self.bump_update_id();
                let _ = self.change_tx.send(ChangeEvent::Added(path));
            }
            WatchEvent::Removed(path) => {
                info!(path = %path.display(), "media file removed");
                self.forget(&path);
                self.bump_update_id();
                let _ = self.change_tx.send(ChangeEvent::Removed(path));
            }
            WatchEvent::Moved { from, to } => {
                info!(from = %from.display(), to = %to.display(), "media file moved");
                self.rename_entry(&from, &to);
                self.enqueue_enrichment(to.clone()).await;
                self.bump_update_id();
                let _ = self.change_tx.send(ChangeEvent::Moved { from, to });
            }
        }
    }

    /// Clears every cache entry associated with `path` — duration,
    /// thumbnail, and playback bookmark alike.
    fn forget(&self, path: &Path) {
        let fp = cache::fingerprint(path);
        let _ = self.duration_cache.remove(&fp);
        let _ = self.thumbnail_cache.remove(&fp);
        let _ = self.playback_cache.remove(&fp);
        let thumb = self.thumbnail_path_for(path);
        let _ = fs::remove_file(thumb);
    }

    fn rename_entry(&self, from: &Path, to: &Path) {
        let from_fp = cache::fingerprint(from);
        let to_fp = cache::fingerprint(to);

        if let Some(entry) = self.duration_cache.get(&from_fp) {
            let _ = self.duration_cache.set(to_fp.clone(), entry);
        }
        let _ = self.duration_cache.remove(&from_fp);

        if self.thumbnail_cache.get(&from_fp).unwrap_or(false) {
            let old_thumb = probe::thumbnail_path(&self.thumbnail_dir, &from_fp);
            let new_thumb = probe::thumbnail_path(&self.thumbnail_dir, &to_fp);
            let _ = fs::rename(&old_thumb, &new_thumb);
            let _ = self.thumbnail_cache.set(to_fp, true);
        }
        let _ = self.thumbnail_cache.remove(&from_fp);
    }

    /// Reads the stored playback position for `path`, in seconds.
    pub fn get_progress(&self, path: &Path, client_id: &str) -> Option<f64> {
        let fp = cache::fingerprint(path);
        let key = cache::playback_client_key(self.cache_mode, client_id);
        if self.cache_mode == CacheMode::Off {
            return None;
        }
        self.playback_cache.get(&fp).and_then(|m| m.get(&key).copied())
    }

    /// Records the playback position for `path`, in seconds.
    pub fn report_progress(&self, path: &Path, client_id: &str, position_secs: f64) -> Result<()> {
        if self.cache_mode == CacheMode::Off {
            return Ok(());
        }
        let fp = cache::fingerprint(path);
        let key = cache::playback_client_key(self.cache_mode, client_id);
        let mut entry = self.playback_cache.get(&fp).unwrap_or_default();
        entry.insert(key, position_secs);
        self.playback_cache.set(fp, entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn new_catalog(root: &Path, cache_dir: &Path) -> CatalogHandles {
        Catalog::new(
            vec![root.to_path_buf()],
            cache_dir,
            cache_dir.join("thumbs"),
            false,
            4,
            CacheMode::Global,
        )
    }

    #[test]
    fn listing_rejects_paths_outside_every_root() {
        let root = tempfile::tempdir().unwrap();
        let cache_dir = tempfile::tempdir().unwrap();
        let outside = tempfile::tempdir().unwrap();
        let handles = new_catalog(root.path(), cache_dir.path());

        let err = handles.catalog.list_dir(outside.path()).unwrap_err();
        assert!(matches!(err, Error::UnsafePath(_)));
    }

    #[test]
    fn listing_separates_containers_from_items() {
        let root = tempfile::tempdir().unwrap();
        let cache_dir = tempfile::tempdir().unwrap();
        fs::create_dir(root.path().join("Season 1")).unwrap();
        fs::write(root.path().join("movie.mp4"), b"data").unwrap();
        fs::write(root.path().join("poster.jpg"), b"data").unwrap();

        let handles = new_catalog(root.path(), cache_dir.path());
        let listing = handles.catalog.list_dir(root.path()).unwrap();

        assert_eq!(listing.containers.len(), 1);
        assert_eq!(listing.items.len(), 1);
        assert_eq!(listing.items[0].title, "movie");
    }

    #[test]
    fn forgetting_a_path_clears_every_cache() {
        let root = tempfile::tempdir().unwrap();
        let cache_dir = tempfile::tempdir().unwrap();
        let handles = new_catalog(root.path(), cache_dir.path());
        let catalog = handles.catalog;

        let file = root.path().join("movie.mp4");
        fs::write(&file, b"data").unwrap();
        let fp = cache::fingerprint(&file);
        catalog.duration_cache.set(fp.clone(), cache::DurationEntry { duration: 120.0 }).unwrap();
        catalog.thumbnail_cache.set(fp.clone(), true).unwrap();
        catalog.playback_cache.set(fp.clone(), HashMap::from([("global".to_string(), 30.0)])).unwrap();

        catalog.forget(&file);

        assert_eq!(catalog.duration_cache.get(&fp), None);
        assert_eq!(catalog.thumbnail_cache.get(&fp), None);
        assert_eq!(catalog.playback_cache.get(&fp), None);
    }

    #[test]
    fn global_mode_ignores_client_id_for_progress() {
        let root = tempfile::tempdir().unwrap();
        let cache_dir = tempfile::tempdir().unwrap();
        let handles = new_catalog(root.path(), cache_dir.path());
        let catalog = handles.catalog;

        let file = root.path().join("movie.mp4");
        fs::write(&file, b"data").unwrap();
        catalog.report_progress(&file, "client-a", 42.0).unwrap();

        assert_eq!(catalog.get_progress(&file, "client-b"), Some(42.0));
    }

    #[test]
    fn update_id_starts_at_one_and_only_moves_forward() {
        let root = tempfile::tempdir().unwrap();
        let cache_dir = tempfile::tempdir().unwrap();
        let handles = new_catalog(root.path(), cache_dir.path());
        let catalog = handles.catalog;

        assert_eq!(catalog.current_update_id(), 1);
        assert_eq!(catalog.bump_update_id(), 2);
        assert_eq!(catalog.bump_update_id(), 3);
    }
}
