//! UPnP/DLNA protocol surface: SSDP discovery, SOAP control for
//! `ContentDirectory`/`ConnectionManager`/`X_MS_MediaReceiverRegistrar`, GENA
//! eventing, and HTTP media streaming — wired together behind one axum
//! `Router`.

pub mod contentdirectory;
pub mod device_description;
pub mod error;
pub mod eventing;
pub mod http;
pub mod soap;
pub mod ssdp;
pub mod streaming;

pub use error::Error;
pub use http::{AppState, router};
