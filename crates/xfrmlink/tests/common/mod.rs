//! Common test utilities for integration tests.
//!
//! Provides `TestNamespace` for isolated network namespace testing
//! and helper macros for conditional test execution.

use std::io::{self, Read};
use std::net::{IpAddr, SocketAddr, UdpSocket};
use std::process::Command;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use xfrmlink::esp::{EspHeader, IpPacket};
use xfrmlink::ipsec::IPPROTO_ESP;
use xfrmlink::netlink::namespace;
use xfrmlink::{Connection, PfKeyConnection, Result, Xfrm};

/// How long a capture waits for the next packet before giving up.
#[allow(dead_code)]
pub const CAPTURE_TIMEOUT: Duration = Duration::from_millis(500);

/// Global counter for unique namespace names.
static NAMESPACE_COUNTER: AtomicU32 = AtomicU32::new(0);

/// Generate a unique namespace name for this test.
fn unique_ns_name(prefix: &str) -> String {
    let id = NAMESPACE_COUNTER.fetch_add(1, Ordering::SeqCst);
    let pid = std::process::id();
    format!("xfrmlink-test-{}-{}-{}", prefix, pid, id)
}

/// A test network namespace with automatic cleanup.
///
/// Every namespace has its own SA and policy databases, so tests never see
/// each other's state. The namespace is deleted when the struct is dropped.
///
/// # Example
///
/// ```ignore
/// let ns = TestNamespace::new("sa")?;
/// let conn = ns.connection()?;
/// conn.add_sa(&sa).await?;
/// ```
pub struct TestNamespace {
    name: String,
}

impl TestNamespace {
    /// Create a new test namespace with a unique name and loopback up.
    pub fn new(prefix: &str) -> Result<Self> {
        let name = unique_ns_name(prefix);

        let status = Command::new("ip")
            .args(["netns", "add", &name])
            .status()
            .map_err(|e| xfrmlink::Error::Io(io::Error::from(e.kind())))?;

        if !status.success() {
            return Err(xfrmlink::Error::InvalidMessage(format!(
                "failed to create namespace: {}",
                name
            )));
        }

        let ns = Self { name };
        ns.exec("ip", &["link", "set", "lo", "up"])?;
        Ok(ns)
    }

    /// Get the namespace name.
    #[allow(dead_code)]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get an XFRM connection to this namespace.
    pub fn connection(&self) -> Result<Connection<Xfrm>> {
        Connection::<Xfrm>::new_in_namespace_path(namespace::netns_path(&self.name))
    }

    /// Get a PF_KEY connection to this namespace.
    #[allow(dead_code)]
    pub fn pfkey(&self) -> Result<PfKeyConnection> {
        PfKeyConnection::new_in_namespace_path(namespace::netns_path(&self.name))
    }

    /// Open a UDP socket inside the namespace bound to `addr`.
    #[allow(dead_code)]
    pub fn udp_socket(&self, addr: &str) -> Result<UdpSocket> {
        namespace::run_in_namespace_path(namespace::netns_path(&self.name), || {
            Ok(UdpSocket::bind(addr)?)
        })
    }

    /// Add a host address to `lo`. IPv6 addresses skip DAD so they are usable
    /// at once.
    #[allow(dead_code)]
    pub fn add_loopback_addr(&self, addr: IpAddr) -> Result<()> {
        let cidr = match addr {
            IpAddr::V4(_) => format!("{}/32", addr),
            IpAddr::V6(_) => format!("{}/128", addr),
        };
        let mut args = vec!["addr", "add", cidr.as_str(), "dev", "lo"];
        if addr.is_ipv6() {
            args.push("nodad");
        }
        self.exec("ip", &args)?;
        Ok(())
    }

    /// Open a header-including raw socket for injecting whole IP packets.
    #[allow(dead_code)]
    pub fn raw_ip_socket(&self, ipv6: bool) -> Result<Socket> {
        let domain = if ipv6 { Domain::IPV6 } else { Domain::IPV4 };
        namespace::run_in_namespace_path(namespace::netns_path(&self.name), || {
            Ok(Socket::new(
                domain,
                Type::RAW,
                Some(Protocol::from(libc::IPPROTO_RAW)),
            )?)
        })
    }

    /// Open a packet socket seeing every IP packet on every interface of the
    /// namespace, link headers stripped.
    #[allow(dead_code)]
    pub fn packet_capture(&self) -> Result<Socket> {
        let eth_p_all = i32::from((libc::ETH_P_ALL as u16).to_be());
        let sock = namespace::run_in_namespace_path(namespace::netns_path(&self.name), || {
            Ok(Socket::new(
                Domain::from(libc::AF_PACKET),
                Type::DGRAM,
                Some(Protocol::from(eth_p_all)),
            )?)
        })?;
        sock.set_read_timeout(Some(CAPTURE_TIMEOUT))?;
        Ok(sock)
    }

    /// Run a command in the namespace and return its output.
    pub fn exec(&self, cmd: &str, args: &[&str]) -> Result<String> {
        let output = Command::new("ip")
            .args(["netns", "exec", &self.name, cmd])
            .args(args)
            .output()
            .map_err(|e| xfrmlink::Error::Io(io::Error::from(e.kind())))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(xfrmlink::Error::InvalidMessage(format!(
                "command failed: {} {:?}: {}",
                cmd, args, stderr
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl Drop for TestNamespace {
    fn drop(&mut self) {
        let _ = Command::new("ip")
            .args(["netns", "del", &self.name])
            .status();
    }
}

/// Send a complete IP packet through a socket from [`TestNamespace::raw_ip_socket`].
#[allow(dead_code)]
pub fn inject(raw: &Socket, packet: &[u8]) -> Result<()> {
    let dst = IpPacket::parse(packet)?.dst();
    raw.send_to(packet, &SockAddr::from(SocketAddr::new(dst, 0)))?;
    Ok(())
}

/// Drain a capture socket and return the ESP packets carrying `spi`.
///
/// Loopback traffic may be seen twice, once leaving and once arriving, so
/// identical packets are returned once.
#[allow(dead_code)]
pub fn captured_esp(capture: &Socket, spi: u32) -> Vec<Vec<u8>> {
    let mut packets: Vec<Vec<u8>> = Vec::new();
    let mut buf = vec![0u8; 65536];
    for _ in 0..256 {
        let n = match (&*capture).read(&mut buf) {
            Ok(n) => n,
            Err(_) => break,
        };
        let Ok(ip) = IpPacket::parse(&buf[..n]) else {
            continue;
        };
        if ip.protocol() != IPPROTO_ESP {
            continue;
        }
        match EspHeader::unpack(ip.payload()) {
            Ok(hdr) if hdr.spi() == spi => {}
            _ => continue,
        }
        if !packets.iter().any(|p| p.as_slice() == ip.as_bytes()) {
            packets.push(ip.as_bytes().to_vec());
        }
    }
    packets
}

/// Check if running as root.
pub fn is_root() -> bool {
    unsafe { libc::geteuid() == 0 }
}

/// Skip the test if not running as root.
///
/// Use this at the beginning of integration tests that require root privileges.
#[macro_export]
macro_rules! require_root {
    () => {
        if !crate::common::is_root() {
            eprintln!("Skipping test: requires root");
            return Ok(());
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_ns_name() {
        let name1 = unique_ns_name("test");
        let name2 = unique_ns_name("test");
        assert_ne!(name1, name2);
        assert!(name1.starts_with("xfrmlink-test-test-"));
    }
}
