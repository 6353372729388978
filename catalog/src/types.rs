use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

/// A directory entry inside a media folder, as seen by a browse request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Container {
    pub path: PathBuf,
    pub title: String,
    pub child_count: usize,
}

/// A single playable video file inside the catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaItem {
    pub path: PathBuf,
    pub title: String,
    pub size: u64,
    pub modified: Option<SystemTime>,
    pub mime_type: String,
    /// Duration in whole seconds, when known (populated asynchronously by the probe worker).
    pub duration_secs: Option<u64>,
}

impl MediaItem {
    pub fn file_name(&self) -> &str {
        self.path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("")
    }
}

/// A configured top-level media folder the catalog scans and watches.
#[derive(Debug, Clone)]
pub struct MediaRoot {
    pub path: PathBuf,
}

/// Result of listing a single directory: its sub-folders and video files.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DirectoryListing {
    pub containers: Vec<Container>,
    pub items: Vec<MediaItem>,
}

const VIDEO_EXTENSIONS: &[&str] = &[
    "mp4", "mkv", "avi", "mov", "webm", "m4v", "ts", "mpg", "mpeg", "wmv", "flv",
];

/// Whether `path` has an extension the catalog treats as video content.
pub fn is_video_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| VIDEO_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

pub fn guess_mime_type(path: &Path) -> String {
    match path
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("")
        .to_ascii_lowercase()
        .as_str()
    {
        "mp4" | "m4v" => "video/mp4",
        "mkv" => "video/x-matroska",
        "avi" => "video/x-msvideo",
        "mov" => "video/quicktime",
        "webm" => "video/webm",
        "ts" => "video/mp2t",
        "mpg" | "mpeg" => "video/mpeg",
        "wmv" => "video/x-ms-wmv",
        "flv" => "video/x-flv",
        _ => "application/octet-stream",
    }
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_video_extensions_case_insensitively() {
        assert!(is_video_file(Path::new("/a/Movie.MKV")));
        assert!(is_video_file(Path::new("/a/clip.mp4")));
        assert!(!is_video_file(Path::new("/a/cover.jpg")));
        assert!(!is_video_file(Path::new("/a/readme")));
    }

    #[test]
    fn guesses_mime_by_extension() {
        assert_eq!(guess_mime_type(Path::new("a.mp4")), "video/mp4");
        assert_eq!(guess_mime_type(Path::new("a.mkv")), "video/x-matroska");
        assert_eq!(
            guess_mime_type(Path::new("a.xyz")),
            "application/octet-stream"
        );
    }
}
