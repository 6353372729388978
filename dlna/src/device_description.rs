//! Static UPnP device and service description documents: `device.xml` and
//! the per-service SCPD documents referenced from it. These are fixed
//! boilerplate, so they're built as plain templated strings rather than an
//! XML tree — there's nothing here that benefits from a DOM.

const CONTENT_DIRECTORY_SCPD: &str = include_str!("scpd/content_directory.xml");
const CONNECTION_MANAGER_SCPD: &str = include_str!("scpd/connection_manager.xml");
const MEDIA_RECEIVER_REGISTRAR_SCPD: &str = include_str!("scpd/media_receiver_registrar.xml");

pub fn scpd_for(service_name: &str) -> Option<&'static str> {
    match service_name {
        "ContentDirectory" => Some(CONTENT_DIRECTORY_SCPD),
        "ConnectionManager" => Some(CONNECTION_MANAGER_SCPD),
        "X_MS_MediaReceiverRegistrar" => Some(MEDIA_RECEIVER_REGISTRAR_SCPD),
        _ => None,
    }
}

/// Builds `device.xml` advertising the root `MediaServer` device and its
/// three services, each with absolute control/event/SCPD URLs rooted at
/// `base_url` (e.g. `http://192.168.1.10:9005`).
pub fn build_device_description(friendly_name: &str, uuid: &str, base_url: &str, icon_path: Option<&str>) -> String {
    let icon_block = icon_path
        .map(|path| {
            format!(
                "    <iconList>\n      <icon>\n        <mimetype>image/png</mimetype>\n        <width>128</width>\n        <height>128</height>\n        <depth>24</depth>\n        <url>{base_url}{path}</url>\n      </icon>\n    </iconList>\n"
            )
        })
        .unwrap_or_default();

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<root xmlns="urn:schemas-upnp-org:device-1-0">
  <specVersion>
    <major>1</major>
    <minor>0</minor>
  </specVersion>
  <device>
    <deviceType>urn:schemas-upnp-org:device:MediaServer:1</deviceType>
    <friendlyName>{friendly_name}</friendlyName>
    <manufacturer>MediaServer</manufacturer>
    <modelName>MediaServer</modelName>
    <UDN>uuid:{uuid}</UDN>
{icon_block}    <serviceList>
      <service>
        <serviceType>urn:schemas-upnp-org:service:ContentDirectory:1</serviceType>
        <serviceId>urn:upnp-org:serviceId:ContentDirectory</serviceId>
        <SCPDURL>/scpd/ContentDirectory.xml</SCPDURL>
        <controlURL>/upnp/control/ContentDirectory</controlURL>
        <eventSubURL>/upnp/event/ContentDirectory</eventSubURL>
      </service>
      <service>
        <serviceType>urn:schemas-upnp-org:service:ConnectionManager:1</serviceType>
        <serviceId>urn:upnp-org:serviceId:ConnectionManager</serviceId>
        <SCPDURL>/scpd/ConnectionManager.xml</SCPDURL>
        <controlURL>/upnp/control/ConnectionManager</controlURL>
        <eventSubURL>/upnp/event/ConnectionManager</eventSubURL>
      </service>
      <service>
        <serviceType>urn:microsoft.com:service:X_MS_MediaReceiverRegistrar:1</serviceType>
        <serviceId>urn:microsoft.com:serviceId:X_MS_MediaReceiverRegistrar</serviceId>
        <SCPDURL>/scpd/X_MS_MediaReceiverRegistrar.xml</SCPDURL>
        <controlURL>/upnp/control/X_MS_MediaReceiverRegistrar</controlURL>
        <eventSubURL>/upnp/event/X_MS_MediaReceiverRegistrar</eventSubURL>
      </service>
    </serviceList>
  </device>
</root>"#,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_description_advertises_all_three_services() {
        let xml = build_device_description("Living Room", "abc-123", "http://192.168.1.10:9005", None);
        assert!(xml.contains("ContentDirectory"));
        assert!(xml.contains("ConnectionManager"));
        assert!(xml.contains("X_MS_MediaReceiverRegistrar"));
        assert!(xml.contains("uuid:abc-123"));
    }

    #[test]
    fn scpd_lookup_is_case_sensitive_and_exact() {
        assert!(scpd_for("ContentDirectory").is_some());
        assert!(scpd_for("contentdirectory").is_none());
        assert!(scpd_for("Nonexistent").is_none());
    }
}
