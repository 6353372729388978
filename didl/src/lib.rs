//! DIDL-Lite metadata: the XML vocabulary UPnP `ContentDirectory` Browse
//! responses are built from, plus the base64 encoding used to turn an
//! absolute filesystem path into an opaque UPnP `ObjectID`.

use serde::{Deserialize, Serialize};

pub mod error;
pub use error::Error;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;

/// The synthetic id of the browse root, matching `ContentDirectory`'s
/// convention of `"0"` for the top of the tree.
pub const ROOT_OBJECT_ID: &str = "0";

/// Encodes an absolute filesystem path into an opaque, URL-safe `ObjectID`.
pub fn encode_object_id(path: &str) -> String {
    URL_SAFE_NO_PAD.encode(path.as_bytes())
}

/// Decodes an `ObjectID` back into the absolute filesystem path it names.
pub fn decode_object_id(id: &str) -> Result<String, Error> {
    let bytes = URL_SAFE_NO_PAD
        .decode(id.as_bytes())
        .map_err(Error::InvalidObjectId)?;
    String::from_utf8(bytes).map_err(|_| Error::InvalidObjectId(base64::DecodeError::InvalidPadding))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Container {
    #[serde(rename = "@id")]
    pub id: String,
    #[serde(rename = "@parentID")]
    pub parent_id: String,
    #[serde(rename = "@restricted")]
    pub restricted: u8,
    #[serde(rename = "@childCount")]
    pub child_count: usize,
    #[serde(rename = "@searchable")]
    pub searchable: u8,
    #[serde(rename = "dc:title")]
    pub title: String,
    #[serde(rename = "upnp:class")]
    pub class: String,
}

impl Container {
    pub fn new(id: String, parent_id: String, title: String, child_count: usize) -> Self {
        Self {
            id,
            parent_id,
            restricted: 1,
            child_count,
            searchable: 1,
            title,
            class: "object.container.storageFolder".to_string(),
        }
    }
}

/// The `<res>` element describing a video item's playable resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resource {
    #[serde(rename = "@protocolInfo")]
    pub protocol_info: String,
    #[serde(rename = "@size", skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(rename = "@duration", skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    #[serde(rename = "@resumePosition", skip_serializing_if = "Option::is_none")]
    pub resume_position: Option<String>,
    #[serde(rename = "$text")]
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    #[serde(rename = "@id")]
    pub id: String,
    #[serde(rename = "@parentID")]
    pub parent_id: String,
    #[serde(rename = "@restricted")]
    pub restricted: u8,
    #[serde(rename = "dc:title")]
    pub title: String,
    #[serde(rename = "upnp:class")]
    pub class: String,
    #[serde(rename = "upnp:albumArtURI", skip_serializing_if = "Option::is_none")]
    pub album_art_uri: Option<String>,
    #[serde(rename = "sec:dcmInfo", skip_serializing_if = "Option::is_none")]
    pub dcm_info: Option<String>,
    pub res: Resource,
}

impl Item {
    /// `size` is omitted for transcoded resources, which have no fixed byte
    /// length; `bookmark_millis` becomes `<sec:dcmInfo>BM=<ms></sec:dcmInfo>`
    /// when a playback bookmark exists for this item.
    pub fn new_video(
        id: String,
        parent_id: String,
        title: String,
        protocol_info: String,
        size: Option<u64>,
        duration: Option<String>,
        resume_position: Option<String>,
        url: String,
        album_art_uri: Option<String>,
        bookmark_millis: Option<i64>,
    ) -> Self {
        Self {
            id,
            parent_id,
            restricted: 1,
            title,
            class: "object.item.videoItem".to_string(),
            album_art_uri,
            dcm_info: bookmark_millis.map(|ms| format!("BM={ms}")),
            res: Resource {
                protocol_info,
                size,
                duration,
                resume_position,
                url,
            },
        }
    }
}

/// Root DIDL-Lite document wrapping a set of containers and items, as
/// returned in the `Result` argument of a `Browse` SOAP response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename = "DIDL-Lite")]
pub struct DidlLite {
    #[serde(rename = "@xmlns")]
    pub xmlns: String,
    #[serde(rename = "@xmlns:dc")]
    pub xmlns_dc: String,
    #[serde(rename = "@xmlns:upnp")]
    pub xmlns_upnp: String,
    #[serde(rename = "@xmlns:dlna", skip_serializing_if = "Option::is_none")]
    pub xmlns_dlna: Option<String>,
    #[serde(rename = "@xmlns:sec", skip_serializing_if = "Option::is_none")]
    pub xmlns_sec: Option<String>,

    #[serde(rename = "container", default, skip_serializing_if = "Vec::is_empty")]
    pub containers: Vec<Container>,
    #[serde(rename = "item", default, skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<Item>,
}

impl Default for DidlLite {
    fn default() -> Self {
        Self {
            xmlns: "urn:schemas-upnp-org:metadata-1-0/DIDL-Lite/".to_string(),
            xmlns_dc: "http://purl.org/dc/elements/1.1/".to_string(),
            xmlns_upnp: "urn:schemas-upnp-org:metadata-1-0/upnp/".to_string(),
            xmlns_dlna: Some("urn:schemas-dlna-org:metadata-1-0/".to_string()),
            xmlns_sec: Some("http://www.sec.co.kr/dlna/".to_string()),
            containers: Vec::new(),
            items: Vec::new(),
        }
    }
}

impl DidlLite {
    pub fn to_xml(&self) -> Result<String, Error> {
        quick_xml::se::to_string(self).map_err(Error::Xml)
    }

    pub fn total_matches(&self) -> usize {
        self.containers.len() + self.items.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_id_round_trips_an_absolute_path() {
        let path = "/mnt/videos/Season 1/episode 01.mkv";
        let id = encode_object_id(path);
        assert_eq!(decode_object_id(&id).unwrap(), path);
    }

    #[test]
    fn object_id_is_url_safe() {
        let id = encode_object_id("/mnt/a b/c+d");
        assert!(!id.contains('/'));
        assert!(!id.contains('+'));
    }

    #[test]
    fn browse_root_with_two_media_folders_has_two_containers() {
        let mut didl = DidlLite::default();
        for folder in ["/mnt/A", "/mnt/B"] {
            didl.containers.push(Container::new(
                encode_object_id(folder),
                ROOT_OBJECT_ID.to_string(),
                folder.trim_start_matches('/').to_string(),
                0,
            ));
        }

        let xml = didl.to_xml().unwrap();
        assert!(xml.contains("DIDL-Lite"));
        assert_eq!(didl.total_matches(), 2);
        assert!(xml.contains("object.container.storageFolder"));
    }

    #[test]
    fn video_item_xml_includes_res_and_protocol_info() {
        let item = Item::new_video(
            encode_object_id("/mnt/A/movie.mp4"),
            ROOT_OBJECT_ID.to_string(),
            "movie".to_string(),
            "http-get:*:video/mp4:DLNA.ORG_OP=01".to_string(),
            Some(123456),
            Some("0:10:00".to_string()),
            Some("30".to_string()),
            "http://192.168.1.10:9005/stream/abc".to_string(),
            None,
            None,
        );
        let mut didl = DidlLite::default();
        didl.items.push(item);

        let xml = didl.to_xml().unwrap();
        assert!(xml.contains("object.item.videoItem"));
        assert!(xml.contains("DLNA.ORG_OP=01"));
        assert!(xml.contains("resumePosition=\"30\""));
    }

    #[test]
    fn video_item_with_bookmark_emits_dcm_info_in_milliseconds() {
        let item = Item::new_video(
            encode_object_id("/mnt/A/movie.mp4"),
            ROOT_OBJECT_ID.to_string(),
            "movie".to_string(),
            "http-get:*:video/mp4:DLNA.ORG_OP=01".to_string(),
            Some(123456),
            Some("0:10:00".to_string()),
            Some("00:00:45.000".to_string()),
            "http://192.168.1.10:9005/stream/abc".to_string(),
            Some("http://192.168.1.10:9005/thumbnail/abc.jpg".to_string()),
            Some(45000),
        );
        let mut didl = DidlLite::default();
        didl.items.push(item);

        let xml = didl.to_xml().unwrap();
        assert!(xml.contains("<sec:dcmInfo>BM=45000</sec:dcmInfo>"));
        assert!(xml.contains("<upnp:albumArtURI>http://192.168.1.10:9005/thumbnail/abc.jpg</upnp:albumArtURI>"));
        assert!(xml.contains("xmlns:sec=\"http://www.sec.co.kr/dlna/\""));
    }
}
