//! Device identity advertised over SSDP.

/// The single root device this server advertises — a `MediaServer`, plus
/// its `ContentDirectory`, `ConnectionManager` and `X_MS_MediaReceiverRegistrar`
/// services. `location` is filled in per-interface by [`super::SsdpServer`]
/// since each interface needs its own reachable URL.
#[derive(Debug, Clone)]
pub struct SsdpDevice {
    /// Device UUID, without the `uuid:` prefix.
    pub uuid: String,
    pub device_type: String,
    pub server: String,
    notification_types: Vec<String>,
}

impl SsdpDevice {
    pub fn new(uuid: String, device_type: String, server: String) -> Self {
        let notification_types = vec![
            format!("uuid:{}", uuid),
            "upnp:rootdevice".to_string(),
            device_type.clone(),
            "urn:schemas-upnp-org:service:ContentDirectory:1".to_string(),
            "urn:schemas-upnp-org:service:ConnectionManager:1".to_string(),
        ];

        Self {
            uuid,
            device_type,
            server,
            notification_types,
        }
    }

    pub fn notification_types(&self) -> &[String] {
        &self.notification_types
    }

    pub fn usn_for(&self, nt: &str) -> String {
        if nt.starts_with("uuid:") {
            nt.to_string()
        } else {
            format!("uuid:{}::{}", self.uuid, nt)
        }
    }
}
