//! SOAP faults for UPnP control errors.

use xmltree::{Element, XMLNode};

#[derive(Debug, Clone)]
pub struct SoapFault {
    /// e.g. "s:Client"
    pub fault_code: String,
    pub fault_string: String,
    pub upnp_error: Option<UpnpError>,
}

#[derive(Debug, Clone)]
pub struct UpnpError {
    /// e.g. "401", "501"
    pub error_code: String,
    pub error_description: String,
}

impl SoapFault {
    pub fn new(fault_code: String, fault_string: String) -> Self {
        Self {
            fault_code,
            fault_string,
            upnp_error: None,
        }
    }

    pub fn with_upnp_error(
        fault_code: String,
        fault_string: String,
        error_code: String,
        error_description: String,
    ) -> Self {
        Self {
            fault_code,
            fault_string,
            upnp_error: Some(UpnpError {
                error_code,
                error_description,
            }),
        }
    }
}

/// Builds a SOAP `<s:Fault>` envelope, with a `<detail><UPnPError>` block
/// when a UPnP error code/description pair is given.
pub fn build_soap_fault(
    fault_code: &str,
    fault_string: &str,
    upnp_error_code: Option<&str>,
    upnp_error_desc: Option<&str>,
) -> Result<String, xmltree::Error> {
    let mut fault = Element::new("s:Fault");

    // faultcode
    let mut faultcode_elem = Element::new("faultcode");
    faultcode_elem
        .children
        .push(XMLNode::Text(fault_code.to_string()));
    fault.children.push(XMLNode::Element(faultcode_elem));

    // faultstring
    let mut faultstring_elem = Element::new("faultstring");
    faultstring_elem
        .children
        .push(XMLNode::Text(fault_string.to_string()));
    fault.children.push(XMLNode::Element(faultstring_elem));

    if let (Some(code), Some(desc)) = (upnp_error_code, upnp_error_desc) {
        let mut detail = Element::new("detail");

        let mut upnp_error = Element::new("UPnPError");
        upnp_error.attributes.insert(
            "xmlns".to_string(),
            "urn:schemas-upnp-org:control-1-0".to_string(),
        );

        let mut error_code_elem = Element::new("errorCode");
        error_code_elem
            .children
            .push(XMLNode::Text(code.to_string()));
        upnp_error
            .children
            .push(XMLNode::Element(error_code_elem));

        let mut error_desc_elem = Element::new("errorDescription");
        error_desc_elem
            .children
            .push(XMLNode::Text(desc.to_string()));
        upnp_error
            .children
            .push(XMLNode::Element(error_desc_elem));

        detail.children.push(XMLNode::Element(upnp_error));
        fault.children.push(XMLNode::Element(detail));
    }

    let mut body = Element::new("s:Body");
    body.children.push(XMLNode::Element(fault));

    let mut envelope = Element::new("s:Envelope");
    envelope.attributes.insert(
        "xmlns:s".to_string(),
        "http://schemas.xmlsoap.org/soap/envelope/".to_string(),
    );
    envelope.children.push(XMLNode::Element(body));

    let mut buf = Vec::new();
    let config = xmltree::EmitterConfig::new()
        .perform_indent(true)
        .indent_string("  ");
    envelope.write_with_config(&mut buf, config)?;

    Ok(String::from_utf8(buf).unwrap())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_simple_fault() {
        let xml = build_soap_fault("s:Client", "Invalid Action", None, None).unwrap();

        assert!(xml.contains("<s:Fault>"));
        assert!(xml.contains("<faultcode>s:Client</faultcode>"));
        assert!(xml.contains("<faultstring>Invalid Action</faultstring>"));
        assert!(!xml.contains("UPnPError"));
    }

    #[test]
    fn test_build_upnp_fault() {
        let xml = build_soap_fault(
            "s:Client",
            "UPnP Error",
            Some("401"),
            Some("Invalid Action"),
        )
        .unwrap();

        assert!(xml.contains("<s:Fault>"));
        assert!(xml.contains("<detail>"));
        assert!(xml.contains("<UPnPError"));
        assert!(xml.contains("<errorCode>401</errorCode>"));
        assert!(xml.contains("<errorDescription>Invalid Action</errorDescription>"));
    }
}
