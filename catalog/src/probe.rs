//! Invokes `ffprobe`/`ffmpeg` as external processes to discover a media
//! file's duration and extract a thumbnail frame. Both are genuinely
//! blocking, so each call is wrapped for use from an async worker loop.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Thin wrapper over the `ffprobe`/`ffmpeg` binaries found on `PATH`.
#[derive(Debug, Clone, Default)]
pub struct MediaProbe;

impl MediaProbe {
    pub fn new() -> Self {
        Self
    }

    /// Runs `ffprobe` and returns the container duration in whole seconds.
    pub async fn probe_duration(&self, path: &Path) -> Result<u64> {
        let output = Command::new("ffprobe")
            .args([
                "-v",
                "error",
                "-show_entries",
                "format=duration",
                "-of",
                "default=noprint_wrappers=1:nokey=1",
            ])
            .arg(path)
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .output()
            .await
            .map_err(|err| Error::ProbeFailed {
                path: path.to_path_buf(),
                reason: format!("failed to spawn ffprobe: {err}"),
            })?;

        if !output.status.success() {
            return Err(Error::ProbeFailed {
                path: path.to_path_buf(),
                reason: format!("ffprobe exited with {}", output.status),
            });
        }

        let text = String::from_utf8_lossy(&output.stdout);
        let seconds: f64 = text.trim().parse().map_err(|_| Error::ProbeFailed {
            path: path.to_path_buf(),
            reason: format!("unparseable ffprobe output: {text:?}"),
        })?;

        Ok(seconds.round() as u64)
    }

    /// Extracts a single JPEG frame at `timestamp_secs` into `dest`,
    /// creating the parent directory if needed.
    pub async fn generate_thumbnail(
        &self,
        path: &Path,
        timestamp_secs: u32,
        dest: &Path,
    ) -> Result<()> {
        if let Some(dir) = dest.parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|source| Error::Io {
                    path: dir.to_path_buf(),
                    source,
                })?;
        }

        let status = Command::new("ffmpeg")
            .args(["-y", "-ss"])
            .arg(timestamp_secs.to_string())
            .arg("-i")
            .arg(path)
            .args(["-frames:v", "1", "-q:v", "4"])
            .arg(dest)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map_err(|err| Error::ProbeFailed {
                path: path.to_path_buf(),
                reason: format!("failed to spawn ffmpeg: {err}"),
            })?;

        if !status.success() {
            return Err(Error::ProbeFailed {
                path: path.to_path_buf(),
                reason: format!("ffmpeg exited with {status}"),
            });
        }

        debug!(path = %path.display(), dest = %dest.display(), "generated thumbnail");
        Ok(())
    }

    /// Lists the subtitle stream indices embedded in the container, for the
    /// embedded-subtitle extraction endpoint.
    pub async fn list_subtitle_streams(&self, path: &Path) -> Result<Vec<u32>> {
        let output = Command::new("ffprobe")
            .args([
                "-v",
                "error",
                "-select_streams",
                "s",
                "-show_entries",
                "stream=index",
                "-of",
                "csv=p=0",
            ])
            .arg(path)
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .output()
            .await
            .map_err(|err| Error::ProbeFailed {
                path: path.to_path_buf(),
                reason: format!("failed to spawn ffprobe: {err}"),
            })?;

        if !output.status.success() {
            warn!(path = %path.display(), "ffprobe subtitle stream listing failed");
            return Ok(Vec::new());
        }

        let text = String::from_utf8_lossy(&output.stdout);
        Ok(text
            .lines()
            .filter_map(|line| line.trim().parse::<u32>().ok())
            .collect())
    }
}

/// Computes the on-disk path of a fingerprint's thumbnail file.
pub fn thumbnail_path(thumbnail_dir: &Path, fingerprint: &str) -> PathBuf {
    thumbnail_dir.join(format!("{fingerprint}.jpg"))
}
