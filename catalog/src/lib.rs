//! Live media catalog: directory scanning, duration/thumbnail/playback
//! caches, and filesystem watching for a set of configured video folders.

pub mod cache;
pub mod catalog;
pub mod error;
pub mod probe;
pub mod types;
pub mod watcher;

pub use cache::{DurationCache, DurationEntry, PlaybackCache, ThumbnailCache, fingerprint};
pub use catalog::{Catalog, CatalogHandles, ChangeEvent};
pub use error::{Error, Result};
pub use probe::MediaProbe;
pub use types::{Container, DirectoryListing, MediaItem, MediaRoot, guess_mime_type, is_video_file};
pub use watcher::{CatalogWatcher, WatchEvent, is_safe_path};
