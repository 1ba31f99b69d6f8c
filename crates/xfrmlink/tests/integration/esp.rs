//! ESP on the wire: null-transform packets exchanged with the kernel, and
//! tunnel routing by output mark.

use std::net::{IpAddr, SocketAddr, UdpSocket};
use std::time::Duration;

use xfrmlink::esp::{
    EspHeader, EspMode, EspTransform, IpPacket, NullTransform, UdpHeader, decapsulate_null,
    encapsulate_null, esp_packet_length, udp_packet,
};
use xfrmlink::ipsec::{
    Algorithm, AuthAlgorithm, Family, Mark, Mode, PolicyDirection, SaId, SecurityAssociation,
};
use xfrmlink::netlink::xfrm::apply_socket_policy;
use xfrmlink::{Error, ErrorKind, Result, WireStruct};

use crate::common::{TestNamespace, captured_esp, inject};

const OUT_SPI: u32 = 0xabcd;
const OUT_REQID: u32 = 123;
const IN_SPI: u32 = 0x9876;
const IN_REQID: u32 = 456;
const PEER_PORT: u16 = 5555;
const MARK: u32 = 100;

fn addr(s: &str) -> IpAddr {
    s.parse().unwrap()
}

fn null_sa(src: IpAddr, dst: IpAddr, spi: u32, reqid: u32, mode: Mode) -> SecurityAssociation {
    SecurityAssociation::new(SaId::esp(src, dst, spi))
        .mode(mode)
        .reqid(reqid)
        .encryption(Algorithm::cipher_null())
        .auth(AuthAlgorithm::digest_null())
}

/// Addresses of one null-transform exchange. `tunnel` holds the local and
/// remote tunnel endpoints.
struct Endpoints {
    local: IpAddr,
    remote: IpAddr,
    tunnel: Option<(IpAddr, IpAddr)>,
}

impl Endpoints {
    fn v4(tunnel: bool) -> Self {
        Self {
            local: addr("127.0.0.1"),
            remote: addr("127.0.0.2"),
            tunnel: tunnel.then(|| (addr("127.0.0.3"), addr("127.0.0.4"))),
        }
    }

    fn v6(tunnel: bool) -> Self {
        Self {
            local: addr("2001:db8::1"),
            remote: addr("2001:db8::2"),
            tunnel: tunnel.then(|| (addr("2001:db8:ffff::1"), addr("2001:db8:ffff::2"))),
        }
    }

    fn mode(&self) -> Mode {
        match self.tunnel {
            Some(_) => Mode::Tunnel,
            None => Mode::Transport,
        }
    }

    /// Outer addresses of outbound packets.
    fn outer(&self) -> (IpAddr, IpAddr) {
        self.tunnel.unwrap_or((self.local, self.remote))
    }

    fn loopback_addrs(&self) -> Vec<IpAddr> {
        let mut addrs = Vec::new();
        if self.local.is_ipv6() {
            addrs.extend([self.local, self.remote]);
            if let Some((l, r)) = self.tunnel {
                addrs.extend([l, r]);
            }
        }
        addrs
    }
}

/// Pair of null SAs plus socket policies in both directions; checks that an
/// injected ESP packet reaches the socket and that the kernel's own ESP
/// output decapsulates to what the socket sent.
async fn null_exchange_scenario(ep: Endpoints) -> Result<()> {
    let ns = TestNamespace::new("espnull")?;
    for a in ep.loopback_addrs() {
        ns.add_loopback_addr(a)?;
    }
    let conn = ns.connection()?;
    let family = Family::of(&ep.local);
    let mode = ep.mode();
    let (outer_local, outer_remote) = ep.outer();

    conn.add_sa(&null_sa(outer_local, outer_remote, OUT_SPI, OUT_REQID, mode))
        .await?;
    conn.add_sa(&null_sa(outer_remote, outer_local, IN_SPI, IN_REQID, mode))
        .await?;

    let sock = ns.udp_socket(&SocketAddr::new(ep.local, 0).to_string())?;
    sock.set_read_timeout(Some(Duration::from_secs(2)))?;
    let port = sock.local_addr()?.port();
    apply_socket_policy(
        &sock,
        family,
        PolicyDirection::Out,
        OUT_SPI,
        OUT_REQID,
        ep.tunnel,
    )?;
    apply_socket_policy(
        &sock,
        family,
        PolicyDirection::In,
        IN_SPI,
        IN_REQID,
        ep.tunnel.map(|(l, r)| (r, l)),
    )?;

    // Inbound.
    let inner = udp_packet(ep.remote, ep.local, PEER_PORT, port, b"input hello")?;
    let esp_mode = match ep.tunnel {
        Some((l, r)) => EspMode::Tunnel { src: r, dst: l },
        None => EspMode::Transport,
    };
    let packet = encapsulate_null(&inner, IN_SPI, 1, esp_mode, &NullTransform::new())?;
    let raw = ns.raw_ip_socket(ep.local.is_ipv6())?;
    inject(&raw, &packet)?;

    let mut buf = [0u8; 64];
    let (n, from) = sock.recv_from(&mut buf)?;
    assert_eq!(&buf[..n], b"input hello");
    assert_eq!(from, SocketAddr::new(ep.remote, PEER_PORT));

    // Outbound.
    let capture = ns.packet_capture()?;
    sock.send_to(b"output hello", SocketAddr::new(ep.remote, PEER_PORT))?;
    let packets = captured_esp(&capture, OUT_SPI);
    assert_eq!(packets.len(), 1, "expected one ESP packet, saw {:?}", packets);

    let outer = IpPacket::parse(&packets[0])?;
    assert_eq!(outer.src(), outer_local);
    assert_eq!(outer.dst(), outer_remote);

    let dec = decapsulate_null(&packets[0], mode, &NullTransform::new())?;
    assert_eq!(dec.header, EspHeader::new(OUT_SPI, 1));
    match ep.tunnel {
        Some((l, r)) => assert_eq!(dec.mode, EspMode::Tunnel { src: l, dst: r }),
        None => assert_eq!(dec.mode, EspMode::Transport),
    }

    let inner = dec.inner()?;
    assert_eq!(inner.src(), ep.local);
    assert_eq!(inner.dst(), ep.remote);
    let (udp, used) = UdpHeader::decode(inner.payload())?;
    assert_eq!(udp.sport(), port);
    assert_eq!(udp.dport(), PEER_PORT);
    assert_eq!(&inner.payload()[used..], b"output hello");

    Ok(())
}

#[tokio::test]
async fn test_null_transport_v4() -> Result<()> {
    require_root!();
    null_exchange_scenario(Endpoints::v4(false)).await
}

#[tokio::test]
async fn test_null_transport_v6() -> Result<()> {
    require_root!();
    null_exchange_scenario(Endpoints::v6(false)).await
}

#[tokio::test]
async fn test_null_tunnel_v4() -> Result<()> {
    require_root!();
    null_exchange_scenario(Endpoints::v4(true)).await
}

#[tokio::test]
async fn test_null_tunnel_v6() -> Result<()> {
    require_root!();
    null_exchange_scenario(Endpoints::v6(true)).await
}

/// Tunnel whose outer destination is only routable in table `MARK`.
struct MarkedTunnel {
    ns: TestNamespace,
    local: IpAddr,
    remote: IpAddr,
    tun_src: IpAddr,
    tun_dst: IpAddr,
}

impl MarkedTunnel {
    fn new(ipv6: bool) -> Result<Self> {
        let ns = TestNamespace::new("espmark")?;
        ns.exec("ip", &["link", "add", "dummy0", "type", "dummy"])?;
        ns.exec("ip", &["link", "set", "dummy0", "up"])?;

        let table = MARK.to_string();
        let t = if ipv6 {
            ns.exec("ip", &["-6", "addr", "add", "2001:db8:99::1/64", "dev", "dummy0", "nodad"])?;
            ns.exec("ip", &["-6", "route", "add", "2001:db8:1::/64", "dev", "dummy0"])?;
            ns.exec(
                "ip",
                &["-6", "route", "add", "2001:db8:ffff::/64", "dev", "dummy0", "table", &table],
            )?;
            ns.exec("ip", &["-6", "rule", "add", "fwmark", &table, "table", &table])?;
            Self {
                ns,
                local: addr("2001:db8:99::1"),
                remote: addr("2001:db8:1::1"),
                tun_src: addr("2001:db8:99::1"),
                tun_dst: addr("2001:db8:ffff::1"),
            }
        } else {
            ns.exec("ip", &["addr", "add", "10.99.0.1/24", "dev", "dummy0"])?;
            ns.exec("ip", &["route", "add", "192.0.2.0/24", "dev", "dummy0"])?;
            ns.exec(
                "ip",
                &["route", "add", "198.51.100.0/24", "dev", "dummy0", "table", &table],
            )?;
            ns.exec("ip", &["rule", "add", "fwmark", &table, "table", &table])?;
            Self {
                ns,
                local: addr("10.99.0.1"),
                remote: addr("192.0.2.1"),
                tun_src: addr("10.99.0.1"),
                tun_dst: addr("198.51.100.1"),
            }
        };
        Ok(t)
    }

    fn sa(&self, mark: Option<u32>) -> SecurityAssociation {
        let sa = SecurityAssociation::new(SaId::esp(self.tun_src, self.tun_dst, OUT_SPI))
            .mode(Mode::Tunnel)
            .reqid(OUT_REQID)
            .encryption(Algorithm::cbc_aes(vec![0x11; 32]))
            .auth(AuthAlgorithm::hmac_sha1(vec![0x22; 20]));
        match mark {
            Some(m) => sa.output_mark(Mark::exact(m)),
            None => sa,
        }
    }

    /// Install the SA and return a socket whose traffic must use it.
    async fn socket(&self, sa: &SecurityAssociation) -> Result<UdpSocket> {
        self.ns.connection()?.add_sa(sa).await?;
        let sock = self
            .ns
            .udp_socket(&SocketAddr::new(self.local, 0).to_string())?;
        apply_socket_policy(
            &sock,
            Family::of(&self.local),
            PolicyDirection::Out,
            OUT_SPI,
            OUT_REQID,
            Some((self.tun_src, self.tun_dst)),
        )?;
        Ok(sock)
    }

    fn dst(&self) -> SocketAddr {
        SocketAddr::new(self.remote, 53)
    }
}

async fn output_mark_routes_scenario(ipv6: bool) -> Result<()> {
    let t = MarkedTunnel::new(ipv6)?;
    let sa = t.sa(Some(MARK));
    let sock = t.socket(&sa).await?;

    let capture = t.ns.packet_capture()?;
    let payload = b"marked";
    sock.send_to(payload, t.dst())?;

    let packets = captured_esp(&capture, OUT_SPI);
    assert_eq!(packets.len(), 1, "expected one ESP packet, saw {:?}", packets);
    let outer = IpPacket::parse(&packets[0])?;
    assert_eq!(outer.src(), t.tun_src);
    assert_eq!(outer.dst(), t.tun_dst);
    assert_eq!(EspHeader::unpack(outer.payload())?, EspHeader::new(OUT_SPI, 1));

    let inner_len = udp_packet(t.local, t.remote, 1, 53, payload)?.len();
    let expected = esp_packet_length(&EspTransform::for_sa(&sa)?, inner_len);
    assert_eq!(outer.payload().len(), expected);

    Ok(())
}

async fn output_mark_unreachable_scenario(ipv6: bool, mark: Option<u32>) -> Result<()> {
    let t = MarkedTunnel::new(ipv6)?;
    let sock = t.socket(&t.sa(mark)).await?;

    let err = Error::from(sock.send_to(b"lost", t.dst()).unwrap_err());
    assert_eq!(err.kind(), ErrorKind::Unreachable, "{}", err);

    Ok(())
}

#[tokio::test]
async fn test_output_mark_routes_tunnel_v4() -> Result<()> {
    require_root!();
    output_mark_routes_scenario(false).await
}

#[tokio::test]
async fn test_output_mark_routes_tunnel_v6() -> Result<()> {
    require_root!();
    output_mark_routes_scenario(true).await
}

#[tokio::test]
async fn test_output_mark_missing_v4() -> Result<()> {
    require_root!();
    output_mark_unreachable_scenario(false, None).await
}

#[tokio::test]
async fn test_output_mark_missing_v6() -> Result<()> {
    require_root!();
    output_mark_unreachable_scenario(true, None).await
}

#[tokio::test]
async fn test_output_mark_invalid_v4() -> Result<()> {
    require_root!();
    output_mark_unreachable_scenario(false, Some(9999)).await
}

#[tokio::test]
async fn test_output_mark_invalid_v6() -> Result<()> {
    require_root!();
    output_mark_unreachable_scenario(true, Some(9999)).await
}
