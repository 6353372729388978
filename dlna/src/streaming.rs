//! HTTP range-streaming of video files, on-the-fly transcoding to MPEG-TS,
//! and subtitle delivery (external SRT/VTT files and embedded ffmpeg-extracted
//! tracks).

use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Path as AxumPath, Query, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::process::Command;
use tokio_util::io::ReaderStream;
use tracing::warn;

use mediaserver_catalog::Catalog;
use mediaserver_didl::decode_object_id;

const SEEKING_FLAGS: &str = "DLNA.ORG_FLAGS=01700000000000000000000000000000";

pub struct StreamContext {
    pub catalog: Arc<Catalog>,
    pub enable_transcoding: bool,
    pub transcode_formats: Vec<String>,
    pub ffmpeg_path: String,
}

#[derive(Debug, Deserialize)]
pub struct StreamParams {
    #[serde(default)]
    pub transcode: Option<String>,
}

/// `GET /stream/:object_id` — serves a byte-range slice of the underlying
/// file, or pipes a transcoded MPEG-TS stream when `?transcode=true` (only
/// honored when the server-side config both enables transcoding and lists
/// the file's extension). HEAD requests are handled automatically by axum
/// stripping the body of this same handler.
pub async fn stream(
    AxumPath(object_id): AxumPath<String>,
    Query(params): Query<StreamParams>,
    headers: HeaderMap,
    State(ctx): State<Arc<StreamContext>>,
) -> Response {
    let path = match resolve_object_id(&ctx.catalog, &object_id) {
        Ok(path) => path,
        Err(resp) => return resp,
    };

    let wants_transcode = params.transcode.as_deref() == Some("true");
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e.to_ascii_lowercase()))
        .unwrap_or_default();
    let should_transcode =
        wants_transcode && ctx.enable_transcoding && ctx.transcode_formats.iter().any(|f| f == &extension);

    if should_transcode {
        return transcode_response(&ctx.ffmpeg_path, &path).await;
    }

    range_response(&path, &headers).await
}

fn resolve_object_id(catalog: &Catalog, object_id: &str) -> Result<PathBuf, Response> {
    let decoded = decode_object_id(object_id)
        .map_err(|_| (StatusCode::FORBIDDEN, "invalid object id").into_response())?;
    let path = PathBuf::from(decoded);
    if !mediaserver_catalog::is_safe_path(catalog.roots(), &path) {
        return Err((StatusCode::FORBIDDEN, "access denied").into_response());
    }
    if !path.is_file() {
        return Err((StatusCode::NOT_FOUND, "not found").into_response());
    }
    Ok(path)
}

async fn transcode_response(ffmpeg_path: &str, path: &Path) -> Response {
    let mut child = match Command::new(ffmpeg_path)
        .arg("-i")
        .arg(path)
        .args(["-c:v", "mpeg2video", "-q:v", "4", "-c:a", "ac3", "-b:a", "192k", "-f", "mpegts", "-"])
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::null())
        .spawn()
    {
        Ok(child) => child,
        Err(err) => {
            warn!(error = %err, "failed to start transcoder");
            return (StatusCode::INTERNAL_SERVER_ERROR, "failed to start transcoder").into_response();
        }
    };

    let Some(stdout) = child.stdout.take() else {
        return (StatusCode::INTERNAL_SERVER_ERROR, "transcoder has no stdout").into_response();
    };

    tokio::spawn(async move {
        let _ = child.wait().await;
    });

    let stream = ReaderStream::new(stdout);
    let body = Body::from_stream(stream);

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "video/mpeg")
        .header("transferMode.dlna.org", "Streaming")
        .body(body)
        .unwrap_or_else(|_| (StatusCode::INTERNAL_SERVER_ERROR, "response build failed").into_response())
}

async fn range_response(path: &Path, headers: &HeaderMap) -> Response {
    let mime_type = mediaserver_catalog::guess_mime_type(path);

    let metadata = match tokio::fs::metadata(path).await {
        Ok(m) => m,
        Err(_) => return (StatusCode::NOT_FOUND, "not found").into_response(),
    };
    let file_size = metadata.len();

    let mut file = match tokio::fs::File::open(path).await {
        Ok(f) => f,
        Err(_) => return (StatusCode::INTERNAL_SERVER_ERROR, "could not open file").into_response(),
    };

    let range = headers.get(header::RANGE).and_then(|v| v.to_str().ok()).and_then(parse_range);

    let dlna_features = format!("DLNA.ORG_PN=MPEG_PS_NTSC;DLNA.ORG_OP=01;DLNA.ORG_CI=0;{SEEKING_FLAGS}");

    let (status, start, length) = match range {
        None => (StatusCode::OK, 0, file_size),
        Some((start, end)) => {
            let end = end.unwrap_or(file_size.saturating_sub(1)).min(file_size.saturating_sub(1));
            if start >= file_size || start > end {
                return (StatusCode::RANGE_NOT_SATISFIABLE, "invalid range").into_response();
            }
            (StatusCode::PARTIAL_CONTENT, start, end - start + 1)
        }
    };

    if start > 0 && file.seek(std::io::SeekFrom::Start(start)).await.is_err() {
        return (StatusCode::INTERNAL_SERVER_ERROR, "seek failed").into_response();
    }

    let body = Body::from_stream(ReaderStream::new(file.take(length)));

    let mut response = Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, mime_type)
        .header(header::ACCEPT_RANGES, "bytes")
        .header(header::CONTENT_LENGTH, length)
        .header("contentFeatures.dlna.org", &dlna_features)
        .header("transferMode.dlna.org", "Streaming");

    if status == StatusCode::PARTIAL_CONTENT {
        let content_range = format!("bytes {}-{}/{}", start, start + length - 1, file_size);
        response = response.header(
            header::CONTENT_RANGE,
            HeaderValue::from_str(&content_range).unwrap_or_else(|_| HeaderValue::from_static("")),
        );
    }

    response
        .body(body)
        .unwrap_or_else(|_| (StatusCode::INTERNAL_SERVER_ERROR, "response build failed").into_response())
}

/// Parses a single-range `Range: bytes=start-end` header, returning
/// `(start, Some(end))` or `(start, None)` for an open-ended range.
fn parse_range(header_value: &str) -> Option<(u64, Option<u64>)> {
    let spec = header_value.strip_prefix("bytes=")?;
    let (start_str, end_str) = spec.split_once('-')?;
    let start: u64 = start_str.trim().parse().ok()?;
    let end = if end_str.trim().is_empty() {
        None
    } else {
        Some(end_str.trim().parse().ok()?)
    };
    Some((start, end))
}

/// `GET /thumbnail/:fingerprint` — serves a generated thumbnail JPEG, as
/// linked from a DIDL item's `<upnp:albumArtURI>`.
pub async fn thumbnail(AxumPath(fingerprint): AxumPath<String>, State(ctx): State<Arc<StreamContext>>) -> Response {
    if fingerprint.is_empty() || !fingerprint.chars().all(|c| c.is_ascii_hexdigit()) {
        return (StatusCode::NOT_FOUND, "not found").into_response();
    }

    let path = ctx.catalog.thumbnail_dir().join(format!("{fingerprint}.jpg"));
    match tokio::fs::read(&path).await {
        Ok(bytes) => ([(header::CONTENT_TYPE, "image/jpeg")], bytes).into_response(),
        Err(_) => (StatusCode::NOT_FOUND, "not found").into_response(),
    }
}

/// `GET /subtitle/:object_id` — serves an external subtitle file, converting
/// SRT to WebVTT on the fly.
pub async fn subtitle(AxumPath(object_id): AxumPath<String>, State(ctx): State<Arc<StreamContext>>) -> Response {
    let path = match resolve_object_id(&ctx.catalog, &object_id) {
        Ok(path) => path,
        Err(resp) => return resp,
    };

    let content = match tokio::fs::read_to_string(&path).await {
        Ok(content) => content,
        Err(err) => {
            warn!(error = %err, path = %path.display(), "failed to read subtitle file");
            return (StatusCode::INTERNAL_SERVER_ERROR, "failed to read subtitle").into_response();
        }
    };

    let is_srt = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("srt"))
        .unwrap_or(false);

    let vtt = if is_srt { srt_to_vtt(&content) } else { content };

    ([(header::CONTENT_TYPE, "text/vtt")], vtt).into_response()
}

/// `GET /subtitle/embedded/:object_id/:stream_index` — extracts an embedded
/// subtitle track as WebVTT via ffmpeg, streamed as it's produced.
pub async fn embedded_subtitle(
    AxumPath((object_id, stream_index)): AxumPath<(String, u32)>,
    State(ctx): State<Arc<StreamContext>>,
) -> Response {
    let path = match resolve_object_id(&ctx.catalog, &object_id) {
        Ok(path) => path,
        Err(resp) => return resp,
    };

    let map_arg = format!("0:s:{stream_index}");
    let mut child = match Command::new(&ctx.ffmpeg_path)
        .arg("-i")
        .arg(&path)
        .args(["-map", &map_arg, "-f", "webvtt", "-"])
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::null())
        .spawn()
    {
        Ok(child) => child,
        Err(err) => {
            warn!(error = %err, "failed to start subtitle extraction");
            return (StatusCode::INTERNAL_SERVER_ERROR, "failed to extract subtitle").into_response();
        }
    };

    let Some(stdout) = child.stdout.take() else {
        return (StatusCode::INTERNAL_SERVER_ERROR, "ffmpeg has no stdout").into_response();
    };

    tokio::spawn(async move {
        let _ = child.wait().await;
    });

    let body = Body::from_stream(ReaderStream::new(stdout));
    ([(header::CONTENT_TYPE, "text/vtt")], body).into_response()
}

/// Minimal SRT -> WebVTT conversion: swap the `,` millisecond separator for
/// `.` in timestamp lines and prepend the `WEBVTT` header.
fn srt_to_vtt(srt: &str) -> String {
    let mut out = String::from("WEBVTT\n\n");
    for line in srt.lines() {
        if line.contains("-->") {
            out.push_str(&line.replace(',', "."));
        } else {
            out.push_str(line);
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_bounded_range_header() {
        assert_eq!(parse_range("bytes=100-199"), Some((100, Some(199))));
    }

    #[test]
    fn parses_an_open_ended_range_header() {
        assert_eq!(parse_range("bytes=500-"), Some((500, None)));
    }

    #[test]
    fn rejects_a_malformed_range_header() {
        assert_eq!(parse_range("not-a-range"), None);
    }

    #[test]
    fn srt_timestamps_use_a_dot_separator_in_vtt() {
        let srt = "1\n00:00:01,000 --> 00:00:02,500\nHello\n";
        let vtt = srt_to_vtt(srt);
        assert!(vtt.starts_with("WEBVTT\n\n"));
        assert!(vtt.contains("00:00:01.000 --> 00:00:02.500"));
        assert!(!vtt.contains(','));
    }
}
