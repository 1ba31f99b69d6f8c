//! XFRM SA integration tests.

use std::net::IpAddr;

use tokio_stream::StreamExt;
use xfrmlink::ipsec::sa::UDP_ENCAP_ESPINUDP;
use xfrmlink::ipsec::{
    Algorithm, AuthAlgorithm, EncapTemplate, IpsecProtocol, Mark, Mode, SaId, SecurityAssociation,
};
use xfrmlink::{ErrorKind, Result, SaLifecycle};

use crate::common::TestNamespace;

const ENCRYPTION_KEY: [u8; 32] = [
    0x30, 0x8b, 0x33, 0x1f, 0x45, 0x55, 0x8d, 0x7a, 0x0a, 0xe3, 0x59, 0xab, 0x2c, 0xdc, 0x65,
    0x40, 0x53, 0x45, 0x74, 0x9b, 0xe8, 0x6b, 0x98, 0x09, 0x03, 0xf5, 0x77, 0xdf, 0xb1, 0x21,
    0x8c, 0x4e,
];
const AUTH_KEY: [u8; 16] = [
    0xaf, 0x44, 0x28, 0x92, 0xcd, 0xcd, 0x0e, 0xf6, 0x50, 0xe9, 0xc2, 0x99, 0xf9, 0xa8, 0x43,
    0x6a,
];

fn addr(s: &str) -> IpAddr {
    s.parse().unwrap()
}

fn aes_sha1_sa(src: &str, dst: &str, spi: u32, reqid: u32) -> SecurityAssociation {
    SecurityAssociation::new(SaId::esp(addr(src), addr(dst), spi))
        .reqid(reqid)
        .encryption(Algorithm::cbc_aes(ENCRYPTION_KEY))
        .auth(AuthAlgorithm::hmac_sha1(AUTH_KEY))
}

#[tokio::test]
async fn test_add_sa_and_render() -> Result<()> {
    require_root!();

    let ns = TestNamespace::new("addsa")?;
    let conn = ns.connection()?;

    conn.add_sa(&aes_sha1_sa("::", "2001:4860:4860::8888", 0x1234, 3320))
        .await?;

    let sa = conn.find_sa(0x1234).await?.expect("SA should exist");
    let expected = format!(
        "src :: dst 2001:4860:4860::8888\n\
         \tproto esp spi 0x00001234 reqid 3320 mode transport\n\
         \treplay-window 4 \n\
         \tauth-trunc hmac(sha1) 0x{} 96\n\
         \tenc cbc(aes) 0x{}\n\
         \tsel src ::/0 dst ::/0 \n",
        hex(&AUTH_KEY),
        hex(&ENCRYPTION_KEY)
    );
    assert_eq!(sa.to_string(), expected);

    Ok(())
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

#[tokio::test]
async fn test_duplicate_sa_rejected() -> Result<()> {
    require_root!();

    let ns = TestNamespace::new("dupsa")?;
    let conn = ns.connection()?;

    let sa = aes_sha1_sa("192.0.2.1", "192.0.2.2", 0x1234, 1);
    conn.add_sa(&sa).await?;
    let err = conn.add_sa(&sa).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AlreadyExists);

    // Update replaces it in place.
    let updated = aes_sha1_sa("192.0.2.1", "192.0.2.2", 0x1234, 2);
    conn.update_sa(&updated).await?;
    let sa = conn.find_sa(0x1234).await?.unwrap();
    assert_eq!(sa.reqid, 2);
    assert_eq!(conn.dump_sa_all().await?.len(), 1);

    Ok(())
}

#[tokio::test]
async fn test_flush() -> Result<()> {
    require_root!();

    let ns = TestNamespace::new("flush")?;
    let conn = ns.connection()?;

    assert!(conn.dump_sa_all().await?.is_empty());
    conn.add_sa(&aes_sha1_sa("::", "2000::", 0x1234, 1234)).await?;
    conn.add_sa(&aes_sha1_sa("0.0.0.0", "192.0.2.1", 0x1234, 4321))
        .await?;
    assert_eq!(conn.dump_sa_all().await?.len(), 2);

    conn.flush_sa().await?;
    assert!(conn.dump_sa_all().await?.is_empty());

    // Flushing an empty table is fine.
    conn.flush_sa().await?;

    Ok(())
}

#[tokio::test]
async fn test_delete_sa() -> Result<()> {
    require_root!();

    let ns = TestNamespace::new("delsa")?;
    let conn = ns.connection()?;

    let sa = aes_sha1_sa("192.0.2.1", "192.0.2.2", 0xabcd, 1);
    conn.add_sa(&sa).await?;
    conn.delete_sa(&sa.id).await?;
    assert!(conn.find_sa(0xabcd).await?.is_none());

    let err = conn.delete_sa(&sa.id).await.unwrap_err();
    assert!(err.is_not_found());

    Ok(())
}

#[tokio::test]
async fn test_dump_stream_many_entries() -> Result<()> {
    require_root!();

    let ns = TestNamespace::new("bigdump")?;
    let conn = ns.connection()?;

    // Enough SAs that the dump spans several datagrams.
    for spi in 0x100..0x1a0u32 {
        conn.add_sa(&aes_sha1_sa("192.0.2.1", "192.0.2.2", spi, spi))
            .await?;
    }

    let mut stream = conn.dump_sa().await?;
    let mut spis = Vec::new();
    while let Some(entry) = stream.next().await {
        let (sa, _attrs) = entry?;
        spis.push(sa.spi());
    }
    spis.sort_unstable();
    assert_eq!(spis, (0x100..0x1a0u32).collect::<Vec<_>>());

    Ok(())
}

#[tokio::test]
async fn test_invalid_algorithms() -> Result<()> {
    require_root!();

    let ns = TestNamespace::new("badalg")?;
    let conn = ns.connection()?;

    let invalid_auth = AuthAlgorithm::new(Algorithm::new("invalid(algo)", AUTH_KEY), Some(96));
    let sa = SecurityAssociation::new(SaId::esp(addr("::1"), addr("::2"), 0x1234))
        .encryption(Algorithm::cbc_aes(ENCRYPTION_KEY))
        .auth(invalid_auth);
    let err = conn.add_sa(&sa).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidAlgorithm);

    let sa = SecurityAssociation::new(SaId::esp(addr("::1"), addr("::2"), 0x1234))
        .encryption(Algorithm::new("invalid(algo)", AUTH_KEY))
        .auth(AuthAlgorithm::hmac_sha1(AUTH_KEY));
    let err = conn.add_sa(&sa).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidAlgorithm);

    Ok(())
}

#[tokio::test]
async fn test_output_mark_and_encap_attributes() -> Result<()> {
    require_root!();

    let ns = TestNamespace::new("attrs")?;
    let conn = ns.connection()?;

    let encap = EncapTemplate::esp_in_udp(34567, 4500, addr("0.0.0.0"));
    let sa = aes_sha1_sa("2001:4860:4860::8888", "2001:4860:4860::8844", 0x1234, 100)
        .mode(Mode::Tunnel)
        .output_mark(Mark::exact(1234567));
    conn.add_sa(&sa).await?;

    let v4 = aes_sha1_sa("192.0.2.1", "192.0.2.2", 0x5678, 100).encap(encap);
    conn.add_sa(&v4).await?;

    let dump = conn.dump_sa_all().await?;
    assert_eq!(dump.len(), 2);

    let (tunnel, attrs) = dump.iter().find(|(sa, _)| sa.spi() == 0x1234).unwrap();
    assert_eq!(tunnel.mode, Mode::Tunnel);
    assert_eq!(attrs.output_mark().map(|m| m.value), Some(1234567));

    let (encapped, attrs) = dump.iter().find(|(sa, _)| sa.spi() == 0x5678).unwrap();
    let got = attrs.encap().copied().unwrap();
    assert_eq!(got.encap_type, UDP_ENCAP_ESPINUDP);
    assert_eq!((got.sport, got.dport), (34567, 4500));
    assert_eq!(encapped.encap, Some(encap));

    Ok(())
}

#[tokio::test]
async fn test_lifecycle_trait() -> Result<()> {
    require_root!();

    async fn roundtrip(client: &impl SaLifecycle, sa: &SecurityAssociation) -> Result<usize> {
        client.add_sa(sa).await?;
        let count = client.dump_sas().await?.len();
        client.flush_sa().await?;
        Ok(count)
    }

    let ns = TestNamespace::new("trait")?;
    let conn = ns.connection()?;
    let sa = aes_sha1_sa("192.0.2.1", "192.0.2.2", 0x42, 1);
    assert_eq!(roundtrip(&conn, &sa).await?, 1);
    assert!(conn.dump_sa_all().await?.is_empty());
    assert_eq!(sa.id.protocol, IpsecProtocol::Esp);

    Ok(())
}
