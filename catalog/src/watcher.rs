//! Recursive filesystem watching over the configured media folders.
//!
//! `notify` delivers raw OS events on a background thread; this module
//! coalesces them into the three catalog-level events the server actually
//! reacts to (file created, file removed, file moved) and forwards them
//! across a channel into the async catalog driver.

use std::path::{Path, PathBuf};

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher, event::RenameMode};
use tokio::sync::mpsc;
use tracing::warn;

use crate::error::Result;
use crate::types::is_video_file;

#[derive(Debug, Clone)]
pub enum WatchEvent {
    Created(PathBuf),
    Removed(PathBuf),
    Moved { from: PathBuf, to: PathBuf },
}

/// Owns the live `notify` watcher; dropping it stops watching.
pub struct CatalogWatcher {
    _inner: RecommendedWatcher,
}

impl CatalogWatcher {
    /// Starts watching every root in `roots`, emitting coalesced events on
    /// `tx`. A bounded channel applies backpressure to the OS event stream
    /// rather than buffering unboundedly during a burst of file changes.
    pub fn start(roots: &[PathBuf], tx: mpsc::Sender<WatchEvent>) -> Result<Self> {
        let mut pending_rename_from: Option<PathBuf> = None;

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let event = match res {
                Ok(event) => event,
                Err(err) => {
                    warn!(error = %err, "filesystem watch error");
                    return;
                }
            };

            for translated in translate(&mut pending_rename_from, event) {
                if tx.blocking_send(translated).is_err() {
                    warn!("catalog watch receiver dropped, stopping forward");
                }
            }
        })?;

        for root in roots {
            watcher.watch(root, RecursiveMode::Recursive)?;
        }

        Ok(Self { _inner: watcher })
    }
}

fn translate(pending_rename_from: &mut Option<PathBuf>, event: Event) -> Vec<WatchEvent> {
    let mut out = Vec::new();

    let video_paths = |paths: &[PathBuf]| -> Vec<PathBuf> {
        paths
            .iter()
            .filter(|p| is_video_file(p))
            .cloned()
            .collect()
    };

    match event.kind {
        EventKind::Create(_) => {
            for path in video_paths(&event.paths) {
                out.push(WatchEvent::Created(path));
            }
        }
        EventKind::Remove(_) => {
            for path in video_paths(&event.paths) {
                out.push(WatchEvent::Removed(path));
            }
        }
        EventKind::Modify(notify::event::ModifyKind::Name(RenameMode::From)) => {
            if let Some(path) = event.paths.first() {
                *pending_rename_from = Some(path.clone());
            }
        }
        EventKind::Modify(notify::event::ModifyKind::Name(RenameMode::To)) => {
            if let Some(to) = event.paths.first() {
                if let Some(from) = pending_rename_from.take() {
                    if is_video_file(&from) || is_video_file(to) {
                        out.push(WatchEvent::Moved {
                            from,
                            to: to.clone(),
                        });
                    }
                } else if is_video_file(to) {
                    out.push(WatchEvent::Created(to.clone()));
                }
            }
        }
        EventKind::Modify(notify::event::ModifyKind::Name(RenameMode::Both)) => {
            if event.paths.len() == 2 {
                let (from, to) = (event.paths[0].clone(), event.paths[1].clone());
                if is_video_file(&from) || is_video_file(&to) {
                    out.push(WatchEvent::Moved { from, to });
                }
            }
        }
        _ => {}
    }

    out
}

/// Whether `path` lies inside one of the configured media roots. Used to
/// reject browse/stream requests that try to escape the served folders via
/// `..` components or symlinks pointing outside.
pub fn is_safe_path(roots: &[PathBuf], path: &Path) -> bool {
    let Ok(canonical) = path.canonicalize() else {
        return false;
    };

    roots.iter().any(|root| {
        let Ok(root_canonical) = root.canonicalize() else {
            return false;
        };
        canonical.starts_with(&root_canonical)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn safe_path_accepts_descendants_of_a_root() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("a/b");
        fs::create_dir_all(&sub).unwrap();
        let file = sub.join("movie.mp4");
        fs::write(&file, b"data").unwrap();

        assert!(is_safe_path(&[dir.path().to_path_buf()], &file));
    }

    #[test]
    fn safe_path_rejects_paths_outside_every_root() {
        let dir = tempfile::tempdir().unwrap();
        let outside = tempfile::tempdir().unwrap();
        let file = outside.path().join("movie.mp4");
        fs::write(&file, b"data").unwrap();

        assert!(!is_safe_path(&[dir.path().to_path_buf()], &file));
    }

    #[test]
    fn safe_path_rejects_nonexistent_paths() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("gone.mp4");
        assert!(!is_safe_path(&[dir.path().to_path_buf()], &missing));
    }
}
