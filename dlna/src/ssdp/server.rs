//! Multi-interface SSDP server.
//!
//! One UDP socket is bound per non-loopback IPv4 interface, each joined to
//! the SSDP multicast group. `M-SEARCH` responses and `ssdp:all` sweeps
//! carry that interface's own address in `LOCATION`, and `ssdp:all`
//! responses are jittered by 100-300ms so a flood of control points doesn't
//! get a synchronized storm of replies back.
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use super::{MAX_AGE, SSDP_MULTICAST_ADDR, SSDP_PORT, SsdpDevice};

/// One bound interface: its local address and the socket used both to
/// multicast NOTIFYs and to answer unicast M-SEARCH replies.
struct Interface {
    socket: Arc<UdpSocket>,
    location: String,
}

pub struct SsdpServer {
    device: SsdpDevice,
    interfaces: Vec<Interface>,
}

impl SsdpServer {
    /// Binds one SSDP socket per local IPv4 interface returned by
    /// `get_if_addrs`, using `location_for(ip)` to build each interface's
    /// `LOCATION` header (typically `http://<ip>:<port>/device.xml`).
    pub async fn bind(
        device: SsdpDevice,
        location_for: impl Fn(Ipv4Addr) -> String,
    ) -> std::io::Result<Self> {
        let mut interfaces = Vec::new();

        for iface in get_if_addrs::get_if_addrs()? {
            if iface.is_loopback() {
                continue;
            }
            let Some(ipv4) = (match iface.addr {
                get_if_addrs::IfAddr::V4(v4) => Some(v4.ip),
                _ => None,
            }) else {
                continue;
            };

            let socket = match bind_interface(ipv4).await {
                Ok(socket) => socket,
                Err(err) => {
                    warn!(interface = %iface.name, error = %err, "failed to bind SSDP socket");
                    continue;
                }
            };

            info!(interface = %iface.name, addr = %ipv4, "SSDP listening");
            interfaces.push(Interface {
                socket: Arc::new(socket),
                location: location_for(ipv4),
            });
        }

        Ok(Self { device, interfaces })
    }

    /// Sends `ssdp:alive` NOTIFYs for every notification type, on every
    /// bound interface.
    pub async fn announce_alive(&self) {
        for iface in &self.interfaces {
            for nt in self.device.notification_types() {
                self.send_notify(iface, nt, "ssdp:alive").await;
            }
        }
    }

    /// Sends `ssdp:byebye` NOTIFYs for every notification type, on every
    /// bound interface. Called once at shutdown.
    pub async fn announce_byebye(&self) {
        for iface in &self.interfaces {
            for nt in self.device.notification_types() {
                self.send_notify(iface, nt, "ssdp:byebye").await;
            }
        }
    }

    async fn send_notify(&self, iface: &Interface, nt: &str, nts: &str) {
        let usn = self.device.usn_for(nt);
        let msg = if nts == "ssdp:alive" {
            format!(
                "NOTIFY * HTTP/1.1\r\n\
                 HOST: {addr}:{port}\r\n\
                 CACHE-CONTROL: max-age={max_age}\r\n\
                 LOCATION: {location}\r\n\
                 NT: {nt}\r\n\
                 NTS: ssdp:alive\r\n\
                 SERVER: {server}\r\n\
                 USN: {usn}\r\n\
                 \r\n",
                addr = SSDP_MULTICAST_ADDR,
                port = SSDP_PORT,
                max_age = MAX_AGE,
                location = iface.location,
                server = self.device.server,
            )
        } else {
            format!(
                "NOTIFY * HTTP/1.1\r\n\
                 HOST: {addr}:{port}\r\n\
                 NT: {nt}\r\n\
                 NTS: ssdp:byebye\r\n\
                 USN: {usn}\r\n\
                 \r\n",
                addr = SSDP_MULTICAST_ADDR,
                port = SSDP_PORT,
            )
        };

        let dest: SocketAddr = SocketAddrV4::new(SSDP_MULTICAST_ADDR.parse().unwrap(), SSDP_PORT).into();
        if let Err(err) = iface.socket.send_to(msg.as_bytes(), dest).await {
            warn!(error = %err, usn, "failed to send SSDP NOTIFY");
        }
    }

    /// Runs the periodic re-announcement and M-SEARCH response loops for
    /// every bound interface. Does not return; intended to be spawned.
    pub async fn run(self: Arc<Self>) {
        let periodic = Arc::clone(&self);
        tokio::spawn(async move {
            let period = Duration::from_secs((MAX_AGE / 2) as u64);
            loop {
                sleep(period).await;
                periodic.announce_alive().await;
            }
        });

        let mut handles = Vec::new();
        for idx in 0..self.interfaces.len() {
            let this = Arc::clone(&self);
            handles.push(tokio::spawn(async move {
                this.listen_on_interface(idx).await;
            }));
        }
        futures::future::join_all(handles).await;
    }

    async fn listen_on_interface(&self, idx: usize) {
        let iface = &self.interfaces[idx];
        let mut buf = [0u8; 8192];
        loop {
            let (n, src) = match iface.socket.recv_from(&mut buf).await {
                Ok(v) => v,
                Err(err) => {
                    warn!(error = %err, "SSDP read error");
                    continue;
                }
            };

            let data = String::from_utf8_lossy(&buf[..n]);
            if !data.starts_with("M-SEARCH") {
                continue;
            }
            let Some(st) = parse_st(&data) else {
                continue;
            };

            self.handle_msearch(iface, src, &st).await;
        }
    }

    async fn handle_msearch(&self, iface: &Interface, src: SocketAddr, st: &str) {
        let matched: Vec<String> = if st == "ssdp:all" {
            self.device.notification_types().to_vec()
        } else if self.device.notification_types().contains(&st.to_string()) {
            vec![st.to_string()]
        } else {
            Vec::new()
        };

        for nt in matched {
            if st == "ssdp:all" {
                let jitter = 100 + (fastrand_jitter() % 200);
                sleep(Duration::from_millis(jitter)).await;
            }

            let usn = self.device.usn_for(&nt);
            let date = chrono::Utc::now().format("%a, %d %b %Y %H:%M:%S GMT");
            let resp = format!(
                "HTTP/1.1 200 OK\r\n\
                 CACHE-CONTROL: max-age={max_age}\r\n\
                 DATE: {date}\r\n\
                 EXT:\r\n\
                 LOCATION: {location}\r\n\
                 SERVER: {server}\r\n\
                 ST: {nt}\r\n\
                 USN: {usn}\r\n\
                 \r\n",
                max_age = MAX_AGE,
                location = iface.location,
                server = self.device.server,
            );

            if let Err(err) = iface.socket.send_to(resp.as_bytes(), src).await {
                warn!(error = %err, %src, "failed to send M-SEARCH response");
            } else {
                debug!(%src, st = %nt, "M-SEARCH response sent");
            }
        }
    }
}

/// Cheap, dependency-free jitter source — the exact distribution doesn't
/// matter, only that concurrent control points don't get synchronized replies.
fn fastrand_jitter() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos() as u64)
        .unwrap_or(0)
}

fn parse_st(data: &str) -> Option<String> {
    data.lines()
        .find(|line| line.to_uppercase().starts_with("ST:"))
        .map(|line| line[3..].trim().to_string())
}

async fn bind_interface(ip: Ipv4Addr) -> std::io::Result<UdpSocket> {
    let socket = socket2::Socket::new(
        socket2::Domain::IPV4,
        socket2::Type::DGRAM,
        Some(socket2::Protocol::UDP),
    )?;
    socket.set_reuse_address(true)?;
    #[cfg(unix)]
    socket.set_reuse_port(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, SSDP_PORT).into())?;
    socket.join_multicast_v4(&SSDP_MULTICAST_ADDR.parse().unwrap(), &ip)?;
    socket.set_multicast_loop_v4(false)?;

    UdpSocket::from_std(socket.into())
}
