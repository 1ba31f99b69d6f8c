//! Per-socket policy integration tests.

use std::net::{IpAddr, UdpSocket};

use xfrmlink::esp::{EspHeader, IpPacket};
use xfrmlink::ipsec::{
    Algorithm, AuthAlgorithm, Family, PolicyDirection, SaId, SecurityAssociation,
};
use xfrmlink::netlink::xfrm::{apply_socket_policy, clear_socket_policy, enable_udp_encap};
use xfrmlink::{Error, ErrorKind, Result};

use crate::common::{TestNamespace, captured_esp};

const TEST_SPI: u32 = 0x1234;
const PAYLOAD: &[u8] = b"hello";

fn send(sock: &UdpSocket, dst: &str) -> Result<()> {
    sock.send_to(PAYLOAD, dst)?;
    Ok(())
}

async fn socket_policy_scenario(
    family: Family,
    local: &str,
    remote: IpAddr,
    dst: &str,
) -> Result<()> {
    let ns = TestNamespace::new("sockpol")?;
    let conn = ns.connection()?;
    let sock = ns.udp_socket(local)?;

    // Cleartext works before any policy.
    send(&sock, dst)?;

    apply_socket_policy(&sock, family, PolicyDirection::Out, TEST_SPI, 0, None)?;

    // The policy requires ESP and no SA matches it.
    let err = send(&sock, dst).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Blocked);

    let sa = SecurityAssociation::new(SaId::esp(family.any_addr(), remote, TEST_SPI))
        .encryption(Algorithm::cbc_aes([0x11u8; 32]))
        .auth(AuthAlgorithm::hmac_sha1([0x22u8; 16]));
    conn.add_sa(&sa).await?;
    send(&sock, dst)?;

    conn.delete_sa(&sa.id).await?;
    let err = send(&sock, dst).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Blocked);

    clear_socket_policy(&sock, family)?;
    send(&sock, dst)?;

    // Clearing twice is safe.
    clear_socket_policy(&sock, family)?;
    send(&sock, dst)?;

    Ok(())
}

#[tokio::test]
async fn test_socket_policy_v4() -> Result<()> {
    require_root!();
    socket_policy_scenario(
        Family::Inet,
        "127.0.0.1:0",
        "127.0.0.1".parse().unwrap(),
        "127.0.0.1:53",
    )
    .await
}

#[tokio::test]
async fn test_socket_policy_v6() -> Result<()> {
    require_root!();
    socket_policy_scenario(Family::Inet6, "[::1]:0", "::1".parse().unwrap(), "[::1]:53").await
}

/// Outbound ESP carries the configured SPI and counts sequence numbers from 1.
async fn esp_sequence_scenario(local: IpAddr, remote: IpAddr) -> Result<()> {
    let ns = TestNamespace::new("espseq")?;
    if local.is_ipv6() {
        ns.add_loopback_addr(local)?;
        ns.add_loopback_addr(remote)?;
    }
    let conn = ns.connection()?;
    let family = Family::of(&local);

    let sa = SecurityAssociation::new(SaId::esp(local, remote, TEST_SPI))
        .reqid(7)
        .encryption(Algorithm::cipher_null())
        .auth(AuthAlgorithm::digest_null());
    conn.add_sa(&sa).await?;

    let sock = ns.udp_socket(&std::net::SocketAddr::new(local, 0).to_string())?;
    apply_socket_policy(&sock, family, PolicyDirection::Out, TEST_SPI, 7, None)?;

    let capture = ns.packet_capture()?;
    let dst = std::net::SocketAddr::new(remote, 53);
    sock.send_to(PAYLOAD, dst)?;
    sock.send_to(PAYLOAD, dst)?;

    let packets = captured_esp(&capture, TEST_SPI);
    assert_eq!(packets.len(), 2, "expected two ESP packets, saw {:?}", packets);

    let headers = packets
        .iter()
        .map(|p| EspHeader::unpack(IpPacket::parse(p)?.payload()))
        .collect::<Result<Vec<_>>>()?;
    assert_eq!(headers[0], EspHeader::new(TEST_SPI, 1));
    assert_eq!(headers[1], EspHeader::new(TEST_SPI, 2));

    let ip = IpPacket::parse(&packets[0])?;
    assert_eq!(ip.src(), local);
    assert_eq!(ip.dst(), remote);

    Ok(())
}

#[tokio::test]
async fn test_esp_sequence_numbers_v4() -> Result<()> {
    require_root!();
    esp_sequence_scenario("127.0.0.1".parse().unwrap(), "127.0.0.2".parse().unwrap()).await
}

#[tokio::test]
async fn test_esp_sequence_numbers_v6() -> Result<()> {
    require_root!();
    esp_sequence_scenario("2001:db8::1".parse().unwrap(), "2001:db8::2".parse().unwrap()).await
}

#[test]
fn test_policy_invalidates_connected_route() -> Result<()> {
    require_root!();

    let ns = TestNamespace::new("dstcache")?;
    let sock = ns.udp_socket("127.0.0.1:0")?;

    // connect() caches the route on the socket.
    sock.connect("127.0.0.1:53")?;
    apply_socket_policy(&sock, Family::Inet, PolicyDirection::Out, TEST_SPI, 123, None)?;

    let err: Error = sock.send(PAYLOAD).unwrap_err().into();
    assert_eq!(err.kind(), ErrorKind::Blocked);

    Ok(())
}

#[test]
fn test_clear_without_policy() -> Result<()> {
    require_root!();

    let ns = TestNamespace::new("sockclear")?;
    let sock = ns.udp_socket("[::1]:0")?;
    clear_socket_policy(&sock, Family::Inet6)?;

    Ok(())
}

#[test]
fn test_udp_encap_socket() -> Result<()> {
    require_root!();

    let ns = TestNamespace::new("encap")?;
    let sock = ns.udp_socket("127.0.0.1:4500")?;
    enable_udp_encap(&sock)?;

    Ok(())
}
