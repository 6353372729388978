//! `ContentDirectory` and `ConnectionManager` SOAP action dispatch.
//!
//! Actions are dispatched with a plain `match` on the parsed action name
//! rather than a reflective lookup table — there are a handful of actions
//! and each has a concrete, differently-shaped response, so a generic
//! dispatcher would only add indirection.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::warn;

use mediaserver_catalog::Catalog;
use mediaserver_didl::{Container, DidlLite, Item, ROOT_OBJECT_ID, decode_object_id, encode_object_id};

use crate::soap::{SoapAction, SoapFault, build_soap_fault, build_soap_response, error_codes};

pub const CONTENT_DIRECTORY_URN: &str = "urn:schemas-upnp-org:service:ContentDirectory:1";
pub const CONNECTION_MANAGER_URN: &str = "urn:schemas-upnp-org:service:ConnectionManager:1";
pub const MEDIA_RECEIVER_REGISTRAR_URN: &str = "urn:microsoft.com:service:X_MS_MediaReceiverRegistrar:1";

const DIRECT_SEEKING_FLAGS: &str = "DLNA.ORG_FLAGS=01700000000000000000000000000000";

/// Shared state the SOAP handlers need: the live catalog, the stream base
/// URL, the SOAP caller's IP (the client identifier for per-client playback
/// bookmarks), and the transcoding settings that decide which `protocolInfo`
/// a given item is advertised with.
pub struct ServiceContext {
    pub catalog: Arc<Catalog>,
    pub base_url: String,
    pub client_id: String,
    pub enable_transcoding: bool,
    pub transcode_formats: Vec<String>,
}

/// Outcome of dispatching one SOAP action: either a `<...Response>` body or
/// a SOAP `Fault`, both already serialized and ready to write to the HTTP
/// response (a fault still gets HTTP 500 per the SOAP/UPnP convention).
pub enum ActionOutcome {
    Response(String),
    Fault(String),
}

pub fn dispatch(service: &str, action: SoapAction, ctx: &ServiceContext) -> ActionOutcome {
    match service {
        "ContentDirectory" => dispatch_content_directory(action, ctx),
        "ConnectionManager" => dispatch_connection_manager(action),
        "X_MS_MediaReceiverRegistrar" => dispatch_media_receiver_registrar(action),
        _ => fault_invalid_action(&format!("unknown service {service}")),
    }
}

fn dispatch_content_directory(action: SoapAction, ctx: &ServiceContext) -> ActionOutcome {
    match action.name.as_str() {
        "Browse" => handle_browse(&action.args, ctx),
        "GetSystemUpdateID" => {
            let mut values = HashMap::new();
            values.insert(
                "Id".to_string(),
                ctx.catalog.current_update_id().to_string(),
            );
            respond(CONTENT_DIRECTORY_URN, "GetSystemUpdateID", values)
        }
        "GetSearchCapabilities" => {
            let mut values = HashMap::new();
            values.insert("SearchCaps".to_string(), String::new());
            respond(CONTENT_DIRECTORY_URN, "GetSearchCapabilities", values)
        }
        "GetSortCapabilities" => {
            let mut values = HashMap::new();
            values.insert("SortCaps".to_string(), "dc:title".to_string());
            respond(CONTENT_DIRECTORY_URN, "GetSortCapabilities", values)
        }
        "X_SetBookmark" => handle_set_bookmark(&action.args, ctx),
        other => unknown_action(CONTENT_DIRECTORY_URN, other),
    }
}

fn dispatch_connection_manager(action: SoapAction) -> ActionOutcome {
    match action.name.as_str() {
        "GetProtocolInfo" => {
            let mut values = HashMap::new();
            values.insert("Source".to_string(), String::new());
            values.insert(
                "Sink".to_string(),
                "http-get:*:video/mp4:*,http-get:*:video/x-matroska:*,http-get:*:video/mpeg:*".to_string(),
            );
            respond(CONNECTION_MANAGER_URN, "GetProtocolInfo", values)
        }
        "GetCurrentConnectionIDs" => {
            let mut values = HashMap::new();
            values.insert("ConnectionIDs".to_string(), "0".to_string());
            respond(CONNECTION_MANAGER_URN, "GetCurrentConnectionIDs", values)
        }
        other => unknown_action(CONNECTION_MANAGER_URN, other),
    }
}

fn dispatch_media_receiver_registrar(action: SoapAction) -> ActionOutcome {
    match action.name.as_str() {
        "IsAuthorized" | "IsValidated" => {
            let mut values = HashMap::new();
            values.insert("Result".to_string(), "1".to_string());
            respond(MEDIA_RECEIVER_REGISTRAR_URN, &action.name, values)
        }
        other => unknown_action(MEDIA_RECEIVER_REGISTRAR_URN, other),
    }
}

/// A well-formed but unrecognized action gets an empty
/// `<u:{Action}Response>`, not a fault — only a malformed envelope is an
/// error. Matches clients that probe for optional actions before using them.
fn unknown_action(service_urn: &str, action: &str) -> ActionOutcome {
    warn!(action, "received unrecognized SOAP action");
    respond(service_urn, action, HashMap::new())
}

fn handle_browse(args: &HashMap<String, String>, ctx: &ServiceContext) -> ActionOutcome {
    let object_id = args
        .get("ObjectID")
        .map(String::as_str)
        .unwrap_or(ROOT_OBJECT_ID);
    let browse_flag = args.get("BrowseFlag").map(String::as_str).unwrap_or("BrowseDirectChildren");
    let starting_index: usize = args.get("StartingIndex").and_then(|s| s.parse().ok()).unwrap_or(0);
    let requested_count: usize = args.get("RequestedCount").and_then(|s| s.parse().ok()).unwrap_or(0);

    let (didl, total_matches) = match build_didl(object_id, browse_flag, starting_index, requested_count, ctx) {
        Ok(result) => result,
        Err(fault) => return fault,
    };
    let number_returned = didl.total_matches();

    let xml = match didl.to_xml() {
        Ok(xml) => xml,
        Err(err) => return fault_action_failed(&err.to_string()),
    };

    let mut values = HashMap::new();
    values.insert("Result".to_string(), xml);
    values.insert("NumberReturned".to_string(), number_returned.to_string());
    values.insert("TotalMatches".to_string(), total_matches.to_string());
    values.insert(
        "UpdateID".to_string(),
        ctx.catalog.current_update_id().to_string(),
    );
    respond(CONTENT_DIRECTORY_URN, "Browse", values)
}

fn build_didl(
    object_id: &str,
    browse_flag: &str,
    starting_index: usize,
    requested_count: usize,
    ctx: &ServiceContext,
) -> Result<(DidlLite, usize), ActionOutcome> {
    let mut didl = DidlLite::default();

    if object_id == ROOT_OBJECT_ID {
        if browse_flag == "BrowseMetadata" {
            didl.containers.push(Container::new(
                ROOT_OBJECT_ID.to_string(),
                "-1".to_string(),
                "root".to_string(),
                ctx.catalog.roots().len(),
            ));
            return Ok((didl, 1));
        }

        for root in ctx.catalog.roots() {
            let title = root
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("root")
                .to_string();
            didl.containers.push(Container::new(
                encode_object_id(&root.to_string_lossy()),
                ROOT_OBJECT_ID.to_string(),
                title,
                0,
            ));
        }
        let total = didl.total_matches();
        paginate(&mut didl, starting_index, requested_count);
        return Ok((didl, total));
    }

    let path: PathBuf = match decode_object_id(object_id) {
        Ok(p) => PathBuf::from(p),
        Err(_) => return Err(fault_invalid_args("malformed ObjectID")),
    };

    if path.is_dir() {
        if browse_flag == "BrowseMetadata" {
            let title = path.file_name().and_then(|n| n.to_str()).unwrap_or("").to_string();
            let listing = ctx.catalog.list_dir(&path).map_err(|err| fault_from_catalog_error(&err))?;
            let child_count = listing.containers.len() + listing.items.len();
            let parent_id = parent_object_id(&path, ctx);
            didl.containers.push(Container::new(object_id.to_string(), parent_id, title, child_count));
            return Ok((didl, 1));
        }

        let listing = ctx
            .catalog
            .list_dir(&path)
            .map_err(|err| fault_from_catalog_error(&err))?;

        for container in listing.containers {
            didl.containers.push(Container::new(
                encode_object_id(&container.path.to_string_lossy()),
                object_id.to_string(),
                container.title,
                container.child_count,
            ));
        }
        for item in listing.items {
            didl.items.push(build_item(&item, object_id, ctx));
        }
        let total = didl.total_matches();
        paginate(&mut didl, starting_index, requested_count);
        return Ok((didl, total));
    }

    if !mediaserver_catalog::is_safe_path(ctx.catalog.roots(), &path) {
        return Err(fault_invalid_args("ObjectID escapes the configured media folders"));
    }

    if !path.is_file() {
        return Err(fault_object_not_found());
    }

    let metadata = std::fs::metadata(&path).map_err(|_| fault_object_not_found())?;
    let media_item = mediaserver_catalog::MediaItem {
        title: path.file_stem().and_then(|n| n.to_str()).unwrap_or("").to_string(),
        size: metadata.len(),
        modified: metadata.modified().ok(),
        mime_type: mediaserver_catalog::guess_mime_type(&path),
        duration_secs: None,
        path: path.clone(),
    };
    let parent_id = parent_object_id(&path, ctx);
    didl.items.push(build_item(&media_item, &parent_id, ctx));
    Ok((didl, 1))
}

/// The `parentID` a browse container should report for `path`: `"0"` when
/// `path`'s parent is itself one of the configured media roots, otherwise
/// the parent directory's own `ObjectID`.
fn parent_object_id(path: &Path, ctx: &ServiceContext) -> String {
    match path.parent() {
        Some(parent) if ctx.catalog.roots().iter().any(|root| root == parent) => ROOT_OBJECT_ID.to_string(),
        Some(parent) => encode_object_id(&parent.to_string_lossy()),
        None => ROOT_OBJECT_ID.to_string(),
    }
}

fn build_item(item: &mediaserver_catalog::MediaItem, parent_id: &str, ctx: &ServiceContext) -> Item {
    let object_id = encode_object_id(&item.path.to_string_lossy());

    let extension = item
        .path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e.to_ascii_lowercase()))
        .unwrap_or_default();
    let needs_transcoding = ctx.enable_transcoding && ctx.transcode_formats.iter().any(|f| f == &extension);

    let mut url = format!("{}/stream/{}", ctx.base_url, object_id);
    let (protocol_info, size) = if needs_transcoding {
        url.push_str("?transcode=true");
        ("http-get:*:video/mpeg:DLNA.ORG_OP=01;DLNA.ORG_CI=1".to_string(), None)
    } else {
        (
            format!("http-get:*:{}:DLNA.ORG_OP=01;DLNA.ORG_CI=0;{DIRECT_SEEKING_FLAGS}", item.mime_type),
            Some(item.size),
        )
    };

    let duration = item.duration_secs.map(format_upnp_duration);
    let bookmark_secs = ctx.catalog.get_progress(&item.path, &ctx.client_id).filter(|secs| *secs > 1.0);
    let resume_position = bookmark_secs.map(format_dlna_duration);
    let bookmark_millis = bookmark_secs.map(|secs| (secs * 1000.0).round() as i64);

    let album_art_uri = ctx
        .catalog
        .has_thumbnail(&item.path)
        .then(|| format!("{}/thumbnail/{}.jpg", ctx.base_url, mediaserver_catalog::fingerprint(&item.path)));

    Item::new_video(
        object_id,
        parent_id.to_string(),
        item.title.clone(),
        protocol_info,
        size,
        duration,
        resume_position,
        url,
        album_art_uri,
        bookmark_millis,
    )
}

/// Formats a duration in `H:MM:SS` form, as `res@duration` expects.
fn format_upnp_duration(total_secs: u64) -> String {
    let h = total_secs / 3600;
    let m = (total_secs % 3600) / 60;
    let s = total_secs % 60;
    format!("{h}:{m:02}:{s:02}")
}

/// Formats a position in `HH:MM:SS.mmm` form, as `res@resumePosition` expects.
fn format_dlna_duration(total_secs: f64) -> String {
    let whole = total_secs.trunc() as u64;
    let h = whole / 3600;
    let m = (whole % 3600) / 60;
    let s = (whole % 60) as f64 + total_secs.fract();
    format!("{h:02}:{m:02}:{s:06.3}")
}

/// Applies `StartingIndex`/`RequestedCount` over containers-then-items as
/// one conceptual sequence, matching how `TotalMatches` counts them together.
fn paginate(didl: &mut DidlLite, starting_index: usize, requested_count: usize) {
    let total_containers = didl.containers.len();

    let skip_containers = starting_index.min(total_containers);
    let skip_items = starting_index.saturating_sub(total_containers).min(didl.items.len());
    didl.containers.drain(..skip_containers);
    didl.items.drain(..skip_items);

    if requested_count == 0 {
        return;
    }
    let container_keep = requested_count.min(didl.containers.len());
    let items_keep = (requested_count - container_keep).min(didl.items.len());
    didl.containers.truncate(container_keep);
    didl.items.truncate(items_keep);
}

fn handle_set_bookmark(args: &HashMap<String, String>, ctx: &ServiceContext) -> ActionOutcome {
    let Some(object_id) = args.get("ObjectID") else {
        return fault_invalid_args("missing ObjectID");
    };
    let Some(pos_arg) = args.get("PosSecond") else {
        return fault_invalid_args("missing PosSecond");
    };

    // PosSecond is misleadingly named: UPnP clients send milliseconds here.
    let Ok(pos_millis) = pos_arg.parse::<f64>() else {
        return fault_invalid_args("PosSecond is not numeric");
    };
    let pos_secs = pos_millis / 1000.0;

    let Ok(path) = decode_object_id(object_id) else {
        return fault_invalid_args("malformed ObjectID");
    };

    if let Err(err) = ctx.catalog.report_progress(std::path::Path::new(&path), &ctx.client_id, pos_secs) {
        warn!(error = %err, "failed to persist bookmark");
        return fault_action_failed(&err.to_string());
    }

    respond(CONTENT_DIRECTORY_URN, "X_SetBookmark", HashMap::new())
}

fn respond(service_urn: &str, action: &str, values: HashMap<String, String>) -> ActionOutcome {
    match build_soap_response(service_urn, action, values) {
        Ok(xml) => ActionOutcome::Response(xml),
        Err(err) => fault_action_failed_outcome(&err.to_string()),
    }
}

fn fault_invalid_action(action: &str) -> ActionOutcome {
    build_fault(SoapFault::with_upnp_error(
        "s:Client".to_string(),
        "Invalid Action".to_string(),
        error_codes::INVALID_ACTION.to_string(),
        format!("unknown action {action}"),
    ))
}

fn fault_invalid_args(reason: &str) -> ActionOutcome {
    build_fault(SoapFault::with_upnp_error(
        "s:Client".to_string(),
        "Invalid Args".to_string(),
        error_codes::INVALID_ARGS.to_string(),
        reason.to_string(),
    ))
}

fn fault_object_not_found() -> ActionOutcome {
    build_fault(SoapFault::with_upnp_error(
        "s:Client".to_string(),
        "No such object".to_string(),
        "701".to_string(),
        "No such object".to_string(),
    ))
}

fn fault_action_failed(reason: &str) -> ActionOutcome {
    build_fault(SoapFault::with_upnp_error(
        "s:Server".to_string(),
        "Action Failed".to_string(),
        error_codes::ACTION_FAILED.to_string(),
        reason.to_string(),
    ))
}

fn fault_action_failed_outcome(reason: &str) -> ActionOutcome {
    fault_action_failed(reason)
}

fn fault_from_catalog_error(err: &mediaserver_catalog::Error) -> ActionOutcome {
    match err {
        mediaserver_catalog::Error::UnsafePath(_) => fault_invalid_args("path escapes media folders"),
        other => fault_action_failed(&other.to_string()),
    }
}

fn build_fault(fault: SoapFault) -> ActionOutcome {
    let upnp = fault.upnp_error.as_ref();
    match build_soap_fault(
        &fault.fault_code,
        &fault.fault_string,
        upnp.map(|e| e.error_code.as_str()),
        upnp.map(|e| e.error_description.as_str()),
    ) {
        Ok(xml) => ActionOutcome::Fault(xml),
        Err(_) => ActionOutcome::Fault(format!(
            "<s:Fault><faultcode>{}</faultcode><faultstring>{}</faultstring></s:Fault>",
            fault.fault_code, fault.fault_string
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upnp_duration_formats_hours_minutes_seconds() {
        assert_eq!(format_upnp_duration(3661), "1:01:01");
        assert_eq!(format_upnp_duration(59), "0:00:59");
    }

    #[test]
    fn dlna_duration_formats_fractional_seconds() {
        assert_eq!(format_dlna_duration(45.5), "00:00:45.500");
        assert_eq!(format_dlna_duration(3661.25), "01:01:01.250");
    }

    #[test]
    fn unknown_action_produces_a_fault() {
        let outcome = fault_invalid_action("FooBar");
        match outcome {
            ActionOutcome::Fault(xml) => {
                assert!(xml.contains("401"));
                assert!(xml.contains("s:Fault"));
            }
            ActionOutcome::Response(_) => panic!("expected a fault"),
        }
    }

    #[test]
    fn set_bookmark_converts_pos_second_from_milliseconds() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("movie.mp4"), b"data").unwrap();
        let handles = mediaserver_catalog::Catalog::new(
            vec![dir.path().to_path_buf()],
            dir.path(),
            dir.path().join("thumbs"),
            false,
            4,
            mediaserver_config::CacheMode::Global,
        );
        let ctx = ServiceContext {
            catalog: handles.catalog,
            base_url: "http://localhost:9005".to_string(),
            client_id: "192.168.1.50".to_string(),
            enable_transcoding: false,
            transcode_formats: Vec::new(),
        };

        let object_id = encode_object_id(&dir.path().join("movie.mp4").to_string_lossy());
        let mut args = HashMap::new();
        args.insert("ObjectID".to_string(), object_id);
        args.insert("PosSecond".to_string(), "30500".to_string());

        let outcome = handle_set_bookmark(&args, &ctx);
        assert!(matches!(outcome, ActionOutcome::Response(_)));

        let pos = ctx.catalog.get_progress(&dir.path().join("movie.mp4"), "192.168.1.50");
        assert_eq!(pos, Some(30.5));
    }

    #[test]
    fn per_client_bookmark_uses_the_soap_callers_ip_not_a_shared_key() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("movie.mp4"), b"data").unwrap();
        let handles = mediaserver_catalog::Catalog::new(
            vec![dir.path().to_path_buf()],
            dir.path(),
            dir.path().join("thumbs"),
            false,
            4,
            mediaserver_config::CacheMode::PerClient,
        );
        let catalog = handles.catalog;
        let object_id = encode_object_id(&dir.path().join("movie.mp4").to_string_lossy());

        let ctx_a = ServiceContext {
            catalog: catalog.clone(),
            base_url: "http://localhost:9005".to_string(),
            client_id: "10.0.0.5".to_string(),
            enable_transcoding: false,
            transcode_formats: Vec::new(),
        };
        let mut args = HashMap::new();
        args.insert("ObjectID".to_string(), object_id);
        args.insert("PosSecond".to_string(), "10000".to_string());
        handle_set_bookmark(&args, &ctx_a);

        assert_eq!(catalog.get_progress(&dir.path().join("movie.mp4"), "10.0.0.5"), Some(10.0));
        assert_eq!(catalog.get_progress(&dir.path().join("movie.mp4"), "10.0.0.9"), None);
    }

    #[test]
    fn unrecognized_action_returns_an_empty_response_not_a_fault() {
        let outcome = unknown_action(CONTENT_DIRECTORY_URN, "X_SomeVendorAction");
        match outcome {
            ActionOutcome::Response(xml) => {
                assert!(xml.contains("X_SomeVendorActionResponse"));
            }
            ActionOutcome::Fault(_) => panic!("expected an empty response, not a fault"),
        }
    }

    #[test]
    fn direct_item_gets_the_full_dlna_protocol_info_string() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("movie.mp4");
        std::fs::write(&file, b"data").unwrap();
        let handles = mediaserver_catalog::Catalog::new(
            vec![dir.path().to_path_buf()],
            dir.path(),
            dir.path().join("thumbs"),
            false,
            4,
            mediaserver_config::CacheMode::Global,
        );
        let ctx = ServiceContext {
            catalog: handles.catalog,
            base_url: "http://localhost:9005".to_string(),
            client_id: "global".to_string(),
            enable_transcoding: true,
            transcode_formats: vec![".avi".to_string()],
        };
        let item = mediaserver_catalog::MediaItem {
            title: "movie".to_string(),
            size: 4,
            modified: None,
            mime_type: "video/mp4".to_string(),
            duration_secs: Some(120),
            path: file,
        };

        let built = build_item(&item, ROOT_OBJECT_ID, &ctx);
        assert_eq!(
            built.res.protocol_info,
            "http-get:*:video/mp4:DLNA.ORG_OP=01;DLNA.ORG_CI=0;DLNA.ORG_FLAGS=01700000000000000000000000000000"
        );
        assert_eq!(built.res.size, Some(4));
        assert!(!built.res.url.contains("transcode"));
    }

    #[test]
    fn transcoded_item_gets_the_transcoded_protocol_info_and_no_size() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("movie.avi");
        std::fs::write(&file, b"data").unwrap();
        let handles = mediaserver_catalog::Catalog::new(
            vec![dir.path().to_path_buf()],
            dir.path(),
            dir.path().join("thumbs"),
            false,
            4,
            mediaserver_config::CacheMode::Global,
        );
        let ctx = ServiceContext {
            catalog: handles.catalog,
            base_url: "http://localhost:9005".to_string(),
            client_id: "global".to_string(),
            enable_transcoding: true,
            transcode_formats: vec![".avi".to_string()],
        };
        let item = mediaserver_catalog::MediaItem {
            title: "movie".to_string(),
            size: 4,
            modified: None,
            mime_type: "video/x-msvideo".to_string(),
            duration_secs: Some(120),
            path: file,
        };

        let built = build_item(&item, ROOT_OBJECT_ID, &ctx);
        assert_eq!(built.res.protocol_info, "http-get:*:video/mpeg:DLNA.ORG_OP=01;DLNA.ORG_CI=1");
        assert_eq!(built.res.size, None);
        assert!(built.res.url.ends_with("?transcode=true"));
    }

    #[test]
    fn browse_rejects_an_object_id_pointing_outside_the_media_folders() {
        let root = tempfile::tempdir().unwrap();
        let outside = tempfile::tempdir().unwrap();
        let secret = outside.path().join("secret.mp4");
        std::fs::write(&secret, b"data").unwrap();

        let handles = mediaserver_catalog::Catalog::new(
            vec![root.path().to_path_buf()],
            root.path(),
            root.path().join("thumbs"),
            false,
            4,
            mediaserver_config::CacheMode::Global,
        );
        let ctx = ServiceContext {
            catalog: handles.catalog,
            base_url: "http://localhost:9005".to_string(),
            client_id: "global".to_string(),
            enable_transcoding: false,
            transcode_formats: Vec::new(),
        };

        let object_id = encode_object_id(&secret.to_string_lossy());
        let mut args = HashMap::new();
        args.insert("ObjectID".to_string(), object_id);
        args.insert("BrowseFlag".to_string(), "BrowseMetadata".to_string());

        let outcome = handle_browse(&args, &ctx);
        assert!(matches!(outcome, ActionOutcome::Fault(_)), "expected a fault, not a 200 leaking the file outside the media folders");
    }
}
