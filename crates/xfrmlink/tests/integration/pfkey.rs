//! PF_KEY integration tests, cross-checked through XFRM.

use std::net::IpAddr;

use xfrmlink::ipsec::algorithm::{CBC_AES, HMAC_SHA256};
use xfrmlink::ipsec::{
    AeadAlgorithm, Algorithm, AuthAlgorithm, Family, IpsecProtocol, SaId, SecurityAssociation,
};
use xfrmlink::pfkey::message::SADB_SATYPE_ESP;
use xfrmlink::{ErrorKind, Result, SaLifecycle};

use crate::common::TestNamespace;

const KEY: [u8; 32] = [
    0x30, 0x8b, 0x33, 0x1f, 0x45, 0x55, 0x8d, 0x7a, 0x0a, 0xe3, 0x59, 0xab, 0x2c, 0xdc, 0x65,
    0x40, 0x53, 0x45, 0x74, 0x9b, 0xe8, 0x6b, 0x98, 0x09, 0x03, 0xf5, 0x77, 0xdf, 0xb1, 0x21,
    0x8c, 0x4e,
];

fn addr(s: &str) -> IpAddr {
    s.parse().unwrap()
}

fn aes_sha256_sa(src: &str, dst: &str, spi: u32, reqid: u32) -> SecurityAssociation {
    SecurityAssociation::new(SaId::esp(addr(src), addr(dst), spi))
        .reqid(reqid)
        .encryption(Algorithm::cbc_aes(KEY))
        .auth(AuthAlgorithm::hmac_sha256(KEY))
}

#[tokio::test]
async fn test_add_del_sa() -> Result<()> {
    require_root!();

    let ns = TestNamespace::new("pfkey")?;
    let pfkey = ns.pfkey()?;
    let xfrm = ns.connection()?;

    let sa4 = aes_sha256_sa("192.0.2.1", "192.0.2.2", 0xdeadbeef, 54321);
    let sa6 = aes_sha256_sa("2001:db8::1", "2001:db8::2", 0xbeefdead, 12345);
    pfkey.add_sa(&sa4).await?;
    pfkey.add_sa(&sa6).await?;

    let dump = xfrm.dump_sa_all().await?;
    assert_eq!(dump.len(), 2);

    let pfkey_dump = pfkey.dump_sa().await?;
    assert_eq!(pfkey_dump.len(), 2);
    assert!(pfkey_dump.iter().all(|m| m.header.satype == SADB_SATYPE_ESP));

    for (expected, family) in [(&sa4, Family::Inet), (&sa6, Family::Inet6)] {
        let (state, attrs) = dump
            .iter()
            .find(|(sa, _)| sa.family() == family)
            .expect("SA of each family");

        assert_eq!(state.id.protocol, IpsecProtocol::Esp);
        assert_eq!(state.id.spi, expected.id.spi);
        assert_eq!(state.reqid, expected.reqid);
        assert_eq!(state.id.src, expected.id.src);
        assert_eq!(state.id.dst, expected.id.dst);

        let crypt = attrs.crypt().expect("encryption algorithm");
        assert!(crypt.is(CBC_AES));
        assert_eq!(crypt.key_len, 256);

        let auth = attrs.auth().expect("auth algorithm");
        assert!(auth.is(HMAC_SHA256));
        assert_eq!(auth.key_len, 256);

        // 96 on kernels without RFC 4868 truncation, 128 with it.
        let trunc = attrs.auth_trunc().expect("truncated auth algorithm");
        assert_eq!(trunc.algorithm.key_len, 256);
        assert!(matches!(trunc.trunc_len, Some(96) | Some(128)));
        assert!(trunc.truncation_is_valid());
    }

    pfkey.delete_sa(&sa4.id).await?;
    assert_eq!(xfrm.dump_sa_all().await?.len(), 1);
    pfkey.delete_sa(&sa6.id).await?;
    assert!(xfrm.dump_sa_all().await?.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_dump_empty_table() -> Result<()> {
    require_root!();

    let ns = TestNamespace::new("pfkeyempty")?;
    let pfkey = ns.pfkey()?;
    assert!(pfkey.dump_sa().await?.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_delete_missing_sa() -> Result<()> {
    require_root!();

    let ns = TestNamespace::new("pfkeydel")?;
    let pfkey = ns.pfkey()?;
    let id = SaId::esp(addr("192.0.2.1"), addr("192.0.2.2"), 0x1234);
    let err = pfkey.delete_sa(&id).await.unwrap_err();
    assert!(err.is_not_found());

    Ok(())
}

#[tokio::test]
async fn test_duplicate_sa() -> Result<()> {
    require_root!();

    let ns = TestNamespace::new("pfkeydup")?;
    let pfkey = ns.pfkey()?;
    let sa = aes_sha256_sa("192.0.2.1", "192.0.2.2", 0x1234, 1);
    pfkey.add_sa(&sa).await?;
    let err = pfkey.add_sa(&sa).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AlreadyExists);

    Ok(())
}

#[tokio::test]
async fn test_unsupported_descriptor_rejected_before_send() -> Result<()> {
    require_root!();

    let ns = TestNamespace::new("pfkeyaead")?;
    let pfkey = ns.pfkey()?;

    let sa = SecurityAssociation::new(SaId::esp(addr("192.0.2.1"), addr("192.0.2.2"), 1))
        .aead(AeadAlgorithm::rfc4106_gcm_aes([0u8; 20], 128));
    let err = pfkey.add_sa(&sa).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidAlgorithm);

    let sa = SecurityAssociation::new(SaId::esp(addr("192.0.2.1"), addr("192.0.2.2"), 1))
        .encryption(Algorithm::new("invalid(algo)", KEY));
    let err = pfkey.add_sa(&sa).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidAlgorithm);

    Ok(())
}

#[tokio::test]
async fn test_both_clients_see_same_table() -> Result<()> {
    require_root!();

    async fn spis(client: &impl SaLifecycle) -> Result<Vec<u32>> {
        let mut spis: Vec<u32> = client.dump_sas().await?.iter().map(|sa| sa.spi()).collect();
        spis.sort_unstable();
        Ok(spis)
    }

    let ns = TestNamespace::new("pfkeycross")?;
    let pfkey = ns.pfkey()?;
    let xfrm = ns.connection()?;

    xfrm.add_sa(&aes_sha256_sa("192.0.2.1", "192.0.2.2", 0x100, 1))
        .await?;
    pfkey
        .add_sa(&aes_sha256_sa("192.0.2.1", "192.0.2.2", 0x200, 2))
        .await?;

    assert_eq!(spis(&pfkey).await?, vec![0x100, 0x200]);
    assert_eq!(spis(&xfrm).await?, vec![0x100, 0x200]);

    SaLifecycle::flush_sa(&pfkey).await?;
    assert!(spis(&xfrm).await?.is_empty());

    Ok(())
}
