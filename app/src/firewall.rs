//! Seam for platform firewall bootstrapping.
//!
//! A real Windows deployment needs to open the chosen port before SSDP and
//! HTTP become reachable from other devices on the LAN. That step is a
//! PowerShell/`netsh` collaborator outside this crate's scope; the trait
//! exists so `main` has a single place to call it without hard-coding a
//! platform assumption.

/// Ensures `port` is reachable from the LAN. Implementations are expected to
/// be idempotent and to log, not panic, on failure — a blocked port is a
/// degraded-but-running server, not a fatal condition.
pub trait FirewallHint {
    fn ensure_open(&self, port: u16);
}

/// Default used on every platform this crate builds and tests on.
pub struct NullFirewallHint;

impl FirewallHint for NullFirewallHint {
    fn ensure_open(&self, _port: u16) {}
}
