//! SOAP envelope parsing and response/fault construction for UPnP control
//! requests: extracting an action name and its arguments from an incoming
//! envelope, and building the matching response or fault envelope.
//!
//! ```ignore
//! use mediaserver_dlna::soap::{parse_soap_action, build_soap_response};
//!
//! let body = r#"<?xml version="1.0"?>
//! <s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/">
//!   <s:Body>
//!     <u:Browse xmlns:u="urn:schemas-upnp-org:service:ContentDirectory:1">
//!       <ObjectID>0</ObjectID>
//!     </u:Browse>
//!   </s:Body>
//! </s:Envelope>"#;
//!
//! let action = parse_soap_action(body.as_bytes()).unwrap();
//! assert_eq!(action.name, "Browse");
//! assert_eq!(action.args.get("ObjectID"), Some(&"0".to_string()));
//! ```

mod builder;
mod envelope;
mod fault;
mod parser;

pub use builder::build_soap_response;
pub use envelope::{SoapBody, SoapEnvelope, SoapHeader};
pub use fault::{SoapFault, build_soap_fault};
pub use parser::{SoapAction, parse_soap_action};

/// Standard UPnP SOAP fault codes.
pub mod error_codes {
    pub const INVALID_ACTION: &str = "401";
    pub const INVALID_ARGS: &str = "402";
    pub const ACTION_FAILED: &str = "501";
    pub const ARGUMENT_VALUE_INVALID: &str = "600";
    pub const ARGUMENT_VALUE_OUT_OF_RANGE: &str = "601";
    pub const OPTIONAL_ACTION_NOT_IMPLEMENTED: &str = "602";
    pub const OUT_OF_MEMORY: &str = "603";
    pub const HUMAN_INTERVENTION_REQUIRED: &str = "604";
    pub const STRING_ARGUMENT_TOO_LONG: &str = "605";
}
