mod api;
mod firewall;

use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::sync::Arc;

use md5::{Digest, Md5};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use mediaserver_catalog::Catalog;
use mediaserver_config::SettingsStore;
use mediaserver_dlna::eventing::EventingState;
use mediaserver_dlna::ssdp::{SsdpDevice, SsdpServer};
use mediaserver_dlna::streaming::StreamContext;
use mediaserver_dlna::AppState;

use crate::firewall::{FirewallHint, NullFirewallHint};

const DEVICE_TYPE: &str = "urn:schemas-upnp-org:device:MediaServer:1";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config_dir = config_dir();
    tokio::fs::create_dir_all(&config_dir).await.ok();

    let settings_store = SettingsStore::load(config_dir.join("settings.json"));
    let settings = settings_store.get();

    let device_uuid = device_uuid();
    info!(uuid = %device_uuid, name = %settings.server_name, "starting media server");

    let roots: Vec<PathBuf> = settings.media_folders.clone();
    if roots.is_empty() {
        warn!("no media folders configured, ContentDirectory will be empty until settings.json lists some");
    }

    let handles = Catalog::new(
        roots,
        &config_dir,
        config_dir.join("thumbnails"),
        settings.generate_thumbnails,
        settings.thumbnail_timestamp,
        settings.cache_mode,
    );
    let catalog = handles.catalog;

    catalog.scan_all().await;
    tokio::spawn(catalog.clone().run_enrichment_worker(handles.enrich_rx));

    let (_watcher, _watch_driver) = catalog.start_watching()?;

    let port = settings.server_port;
    let base_url_for = move |ip: Ipv4Addr| format!("http://{ip}:{port}");

    let eventing = Arc::new(EventingState::new(format!("0.0.0.0:{port}")));
    tokio::spawn(eventing.clone().run_change_listener(catalog.clone()));
    tokio::spawn(eventing.clone().run_expiry_sweeper());

    let stream_ctx = Arc::new(StreamContext {
        catalog: catalog.clone(),
        enable_transcoding: settings.enable_transcoding,
        transcode_formats: settings.transcode_formats.clone(),
        ffmpeg_path: "ffmpeg".to_string(),
    });

    // The advertised base_url has no single correct interface address when
    // multiple NICs are up; the loopback-reachable form is good enough for
    // same-host SOAP control and is overwritten per-interface in LOCATION.
    let app_state = AppState {
        catalog: catalog.clone(),
        friendly_name: settings.server_name.clone(),
        uuid: device_uuid.clone(),
        base_url: format!("http://127.0.0.1:{port}"),
        icon_path: settings
            .server_icon_path
            .as_ref()
            .map(|p| p.to_string_lossy().to_string()),
        eventing: eventing.clone(),
        stream_ctx: stream_ctx.clone(),
    };

    let api_state = api::ApiState {
        catalog: catalog.clone(),
        cache_mode: settings.cache_mode,
    };

    let router = mediaserver_dlna::router(app_state).merge(api::router(api_state));

    let firewall = NullFirewallHint;
    firewall.ensure_open(port);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    info!(%port, "HTTP server listening");

    let make_service = router.into_make_service_with_connect_info::<std::net::SocketAddr>();
    let http_server = tokio::spawn(async move {
        if let Err(err) = axum::serve(listener, make_service).await {
            warn!(error = %err, "HTTP server exited with an error");
        }
    });

    let ssdp_server = if settings.enable_upnp {
        let device = SsdpDevice::new(device_uuid.clone(), DEVICE_TYPE.to_string(), mediaserver_dlna::ssdp::SERVER_BANNER.to_string());
        match SsdpServer::bind(device, move |ip| format!("{}/device.xml", base_url_for(ip))).await {
            Ok(server) => {
                let server = Arc::new(server);
                server.announce_alive().await;
                let run_handle = tokio::spawn(server.clone().run());
                Some((server, run_handle))
            }
            Err(err) => {
                warn!(error = %err, "failed to bind SSDP sockets, discovery disabled");
                None
            }
        }
    } else {
        info!("UPnP discovery disabled in settings");
        None
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
        }
        _ = http_server => {
            warn!("HTTP server task ended unexpectedly");
        }
    }

    if let Some((server, run_handle)) = ssdp_server {
        server.announce_byebye().await;
        run_handle.abort();
    }

    Ok(())
}

fn device_uuid() -> String {
    let host = hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "mediaserver".to_string());
    let digest = Md5::digest(host.as_bytes());
    let hex = digest.iter().map(|b| format!("{b:02x}")).collect::<String>();
    format!(
        "{}-{}-{}-{}-{}",
        &hex[0..8],
        &hex[8..12],
        &hex[12..16],
        &hex[16..20],
        &hex[20..32]
    )
}

fn config_dir() -> PathBuf {
    std::env::var_os("MEDIASERVER_CONFIG_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
}
