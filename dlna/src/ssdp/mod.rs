//! Simple Service Discovery Protocol.
//!
//! Advertises the media server and answers `M-SEARCH` discovery requests on
//! every non-loopback IPv4 interface, each bound to its own multicast
//! socket so the `LOCATION` header always points back at a reachable
//! address for that interface.

mod device;
mod server;

pub use device::SsdpDevice;
pub use server::SsdpServer;

pub const SSDP_MULTICAST_ADDR: &str = "239.255.255.250";
pub const SSDP_PORT: u16 = 1900;

/// CACHE-CONTROL max-age advertised in every NOTIFY/M-SEARCH response.
pub const MAX_AGE: u32 = 1800;

/// Identifies this server the way Windows Media Player expects to see a
/// DLNA-compliant device announce itself.
pub const SERVER_BANNER: &str = "Microsoft-Windows/10.0 UPnP/1.0 WMP/12.0";
