//! Assembles the axum `Router` serving UPnP device/service descriptions,
//! SOAP control, GENA eventing, and media streaming endpoints.

use std::sync::Arc;

use axum::Router;
use axum::body::Bytes;
use axum::extract::{ConnectInfo, Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{MethodFilter, get, on, post};
use tracing::warn;

use mediaserver_catalog::Catalog;

use crate::contentdirectory::{self, ActionOutcome, ServiceContext};
use crate::device_description::{build_device_description, scpd_for};
use crate::eventing::{EventingState, SubscribeError};
use crate::soap::parse_soap_action;
use crate::ssdp::SERVER_BANNER;
use crate::streaming::{self, StreamContext};

#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<Catalog>,
    pub friendly_name: String,
    pub uuid: String,
    pub base_url: String,
    pub icon_path: Option<String>,
    pub eventing: Arc<EventingState>,
    pub stream_ctx: Arc<StreamContext>,
}

pub fn router(state: AppState) -> Router {
    let stream_ctx = state.stream_ctx.clone();

    let app_routes = Router::new()
        .route("/", get(index))
        .route("/device.xml", get(device_xml))
        .route("/scpd/{service}", get(scpd))
        .route("/upnp/control/{service}", post(control))
        .route(
            "/upnp/event/{service}",
            on(MethodFilter::from_bytes(b"SUBSCRIBE").unwrap(), subscribe)
                .on(MethodFilter::from_bytes(b"UNSUBSCRIBE").unwrap(), unsubscribe),
        )
        .with_state(state);

    let stream_routes = Router::new()
        .route("/stream/{object_id}", get(streaming::stream))
        .route("/subtitle/{object_id}", get(streaming::subtitle))
        .route("/subtitle/embedded/{object_id}/{stream_index}", get(streaming::embedded_subtitle))
        .route("/thumbnail/{fingerprint}", get(streaming::thumbnail))
        .with_state(stream_ctx);

    app_routes.merge(stream_routes)
}

async fn index(State(state): State<AppState>) -> impl IntoResponse {
    let body = format!(
        "<html><head><title>{name}</title></head><body><h1>{name}</h1><p>UPnP MediaServer is running.</p></body></html>",
        name = state.friendly_name,
    );
    ([(header::CONTENT_TYPE, "text/html; charset=utf-8")], body)
}

async fn device_xml(State(state): State<AppState>) -> impl IntoResponse {
    let xml = build_device_description(
        &state.friendly_name,
        &state.uuid,
        &state.base_url,
        state.icon_path.as_deref(),
    );
    (
        [(header::CONTENT_TYPE, "application/xml; charset=utf-8"), (header::SERVER, SERVER_BANNER)],
        xml,
    )
}

async fn scpd(Path(service): Path<String>) -> Response {
    let name = service.strip_suffix(".xml").unwrap_or(&service);
    match scpd_for(name) {
        Some(xml) => ([(header::CONTENT_TYPE, "application/xml; charset=utf-8")], xml).into_response(),
        None => (StatusCode::NOT_FOUND, "unknown service").into_response(),
    }
}

async fn control(
    State(state): State<AppState>,
    Path(service): Path<String>,
    ConnectInfo(addr): ConnectInfo<std::net::SocketAddr>,
    body: Bytes,
) -> Response {
    let action = match parse_soap_action(&body) {
        Ok(action) => action,
        Err(err) => {
            warn!(error = %err, "failed to parse SOAP action");
            return (StatusCode::BAD_REQUEST, "malformed SOAP request").into_response();
        }
    };

    let ctx = ServiceContext {
        catalog: state.catalog.clone(),
        base_url: state.base_url.clone(),
        client_id: addr.ip().to_string(),
        enable_transcoding: state.stream_ctx.enable_transcoding,
        transcode_formats: state.stream_ctx.transcode_formats.clone(),
    };

    let (status, xml) = match contentdirectory::dispatch(&service, action, &ctx) {
        ActionOutcome::Response(xml) => (StatusCode::OK, xml),
        ActionOutcome::Fault(xml) => (StatusCode::INTERNAL_SERVER_ERROR, xml),
    };

    (
        status,
        [(header::CONTENT_TYPE, "text/xml; charset=\"utf-8\""), (header::SERVER, SERVER_BANNER)],
        xml,
    )
        .into_response()
}

async fn subscribe(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let callback_url = headers
        .get("CALLBACK")
        .and_then(|v| v.to_str().ok())
        .and_then(|raw| raw.trim().strip_prefix('<'))
        .and_then(|raw| raw.strip_suffix('>'))
        .map(str::to_string);

    let timeout_secs = headers
        .get("TIMEOUT")
        .and_then(|v| v.to_str().ok())
        .and_then(|raw| raw.strip_prefix("Second-"))
        .and_then(|secs| secs.parse().ok())
        .unwrap_or(crate::eventing::DEFAULT_TIMEOUT_SECS);

    // A subscription renewal omits CALLBACK and carries an existing SID.
    if callback_url.is_none() {
        if let Some(sid) = headers.get("SID").and_then(|v| v.to_str().ok()) {
            return match state.eventing.renew(sid, timeout_secs).await {
                Ok(timeout) => subscribe_ok(sid, timeout),
                Err(_) => (StatusCode::PRECONDITION_FAILED, "unknown subscription").into_response(),
            };
        }
    }

    match state
        .eventing
        .subscribe(callback_url, timeout_secs, state.catalog.current_update_id())
        .await
    {
        Ok((sid, timeout)) => subscribe_ok(&sid, timeout),
        Err(SubscribeError::MissingCallback) => (StatusCode::PRECONDITION_FAILED, "missing CALLBACK header").into_response(),
    }
}

fn subscribe_ok(sid: &str, timeout_secs: u64) -> Response {
    (
        StatusCode::OK,
        [
            ("SID", sid.to_string()),
            ("TIMEOUT", format!("Second-{timeout_secs}")),
            (header::SERVER.as_str(), SERVER_BANNER.to_string()),
        ],
    )
        .into_response()
}

async fn unsubscribe(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let Some(sid) = headers.get("SID").and_then(|v| v.to_str().ok()) else {
        return (StatusCode::PRECONDITION_FAILED, "missing SID header").into_response();
    };
    state.eventing.unsubscribe(sid).await;
    StatusCode::OK.into_response()
}
