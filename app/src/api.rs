//! JSON API consumed by the bundled web player: a plain directory-tree view
//! of the catalog, independent of the UPnP/DIDL object-id scheme.

use std::net::SocketAddr;
use std::path::{Path as StdPath, PathBuf};
use std::sync::Arc;

use axum::extract::{ConnectInfo, Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use axum::routing::{get, post};
use serde::{Deserialize, Serialize};

use mediaserver_catalog::Catalog;

#[derive(Clone)]
pub struct ApiState {
    pub catalog: Arc<Catalog>,
    pub cache_mode: mediaserver_config::CacheMode,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/api/get_structure", get(get_structure))
        .route("/api/browse/{*subpath}", get(browse))
        .route("/api/browse/", get(browse_root))
        .route("/api/get_tracks/{*path}", get(get_tracks))
        .route("/api/report_progress", post(report_progress))
        .route("/api/get_progress", post(get_progress))
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct StructureNode {
    name: String,
    path: String,
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    children: Vec<StructureNode>,
}

/// `GET /api/get_structure` — the full tree of every configured root,
/// folders first then files, recursively.
async fn get_structure(State(state): State<ApiState>) -> Response {
    let mut roots = Vec::new();
    for root in state.catalog.roots() {
        match build_structure_node(&state.catalog, root) {
            Ok(node) => roots.push(node),
            Err(err) => {
                tracing::warn!(path = %root.display(), error = %err, "failed to walk media root");
            }
        }
    }
    Json(roots).into_response()
}

fn build_structure_node(catalog: &Catalog, path: &StdPath) -> Result<StructureNode, mediaserver_catalog::Error> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("")
        .to_string();

    if path.is_dir() {
        let listing = catalog.list_dir(path)?;
        let mut children = Vec::new();
        for container in &listing.containers {
            if let Ok(node) = build_structure_node(catalog, &container.path) {
                children.push(node);
            }
        }
        for item in &listing.items {
            children.push(StructureNode {
                name: item.file_name().to_string(),
                path: item.path.to_string_lossy().to_string(),
                kind: "file",
                children: Vec::new(),
            });
        }
        Ok(StructureNode {
            name,
            path: path.to_string_lossy().to_string(),
            kind: "folder",
            children,
        })
    } else {
        Ok(StructureNode {
            name,
            path: path.to_string_lossy().to_string(),
            kind: "file",
            children: Vec::new(),
        })
    }
}

#[derive(Debug, Serialize)]
struct BrowseEntry {
    name: String,
    path: String,
}

#[derive(Debug, Serialize)]
struct BrowseResponse {
    folders: Vec<BrowseEntry>,
    files: Vec<BrowseEntry>,
}

/// `GET /api/browse/` (empty subpath) — lists the configured roots.
async fn browse_root(State(state): State<ApiState>) -> Response {
    let folders = state
        .catalog
        .roots()
        .iter()
        .map(|root| BrowseEntry {
            name: root.file_name().and_then(|n| n.to_str()).unwrap_or("").to_string(),
            path: root.to_string_lossy().to_string(),
        })
        .collect();
    Json(BrowseResponse { folders, files: Vec::new() }).into_response()
}

/// `GET /api/browse/<subpath>` — lists one directory's immediate children.
async fn browse(State(state): State<ApiState>, Path(subpath): Path<String>) -> Response {
    let dir = PathBuf::from(subpath);
    let listing = match state.catalog.list_dir(&dir) {
        Ok(listing) => listing,
        Err(mediaserver_catalog::Error::UnsafePath(_)) => {
            return (StatusCode::FORBIDDEN, "access denied").into_response();
        }
        Err(err) => return (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response(),
    };

    let folders = listing
        .containers
        .into_iter()
        .map(|c| BrowseEntry { name: c.title, path: c.path.to_string_lossy().to_string() })
        .collect();
    let files = listing
        .items
        .into_iter()
        .map(|i| BrowseEntry { name: i.title.clone(), path: i.path.to_string_lossy().to_string() })
        .collect();

    Json(BrowseResponse { folders, files }).into_response()
}

#[derive(Debug, Serialize)]
struct TracksResponse {
    duration_secs: Option<u64>,
    subtitle_streams: Vec<u32>,
}

/// `GET /api/get_tracks/<path>` — duration plus embedded subtitle stream
/// indices, for the web player's track-selection UI.
async fn get_tracks(State(state): State<ApiState>, Path(path): Path<String>) -> Response {
    let file = PathBuf::from(path);
    if !mediaserver_catalog::is_safe_path(state.catalog.roots(), &file) {
        return (StatusCode::FORBIDDEN, "access denied").into_response();
    }

    let probe = mediaserver_catalog::MediaProbe::new();
    let subtitle_streams = probe.list_subtitle_streams(&file).await.unwrap_or_default();
    let duration_secs = state.catalog.get_duration(&file).await;

    Json(TracksResponse { duration_secs, subtitle_streams }).into_response()
}

#[derive(Debug, Deserialize)]
struct ReportProgressRequest {
    path: String,
    position: f64,
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    status: &'static str,
}

/// `POST /api/report_progress` — writes the playback position keyed by the
/// caller's own connection address, never a client-supplied header.
async fn report_progress(
    State(state): State<ApiState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(body): Json<ReportProgressRequest>,
) -> Response {
    if state.cache_mode == mediaserver_config::CacheMode::Off {
        return Json(StatusResponse { status: "cache_disabled" }).into_response();
    }

    let client_id = addr.ip().to_string();
    let path = PathBuf::from(&body.path);
    match state.catalog.report_progress(&path, &client_id, body.position) {
        Ok(()) => Json(StatusResponse { status: "ok" }).into_response(),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response(),
    }
}

#[derive(Debug, Deserialize)]
struct GetProgressRequest {
    path: String,
}

#[derive(Debug, Serialize)]
struct ProgressResponse {
    position: f64,
}

/// `POST /api/get_progress` — reads back the stored playback position.
async fn get_progress(
    State(state): State<ApiState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(body): Json<GetProgressRequest>,
) -> Response {
    let client_id = addr.ip().to_string();
    let path = PathBuf::from(&body.path);
    let position = state.catalog.get_progress(&path, &client_id).unwrap_or(0.0);
    Json(ProgressResponse { position }).into_response()
}
