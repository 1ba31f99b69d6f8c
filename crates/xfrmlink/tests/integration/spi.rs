//! SPI allocation integration tests.

use std::collections::HashSet;
use std::net::IpAddr;

use xfrmlink::ipsec::{Family, IpsecProtocol, Mode};
use xfrmlink::{ErrorKind, Result};

use crate::common::TestNamespace;

fn any6() -> IpAddr {
    "::".parse().unwrap()
}

#[tokio::test]
async fn test_alloc_specific_spi() -> Result<()> {
    require_root!();

    let ns = TestNamespace::new("spi")?;
    let conn = ns.connection()?;

    let shell = conn
        .alloc_spi(any6(), IpsecProtocol::Esp, 0xabcd, 0xabcd)
        .await?;
    assert_eq!(shell.id.spi, 0xabcd);
    assert_eq!(shell.id.dst, any6());
    assert_eq!(shell.id.protocol, IpsecProtocol::Esp);
    assert_eq!(shell.family(), Family::Inet6);
    assert_eq!(shell.mode, Mode::Transport);

    // The larval SA shows up in a dump.
    assert!(conn.find_sa(0xabcd).await?.is_some());

    Ok(())
}

#[tokio::test]
async fn test_alloc_specific_spi_unavailable() -> Result<()> {
    require_root!();

    let ns = TestNamespace::new("spitaken")?;
    let conn = ns.connection()?;

    conn.alloc_spi(any6(), IpsecProtocol::Esp, 0xabcd, 0xabcd)
        .await?;
    let err = conn
        .alloc_spi(any6(), IpsecProtocol::Esp, 0xabcd, 0xabcd)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::RangeExhausted);

    Ok(())
}

#[tokio::test]
async fn test_alloc_range_spi() -> Result<()> {
    require_root!();

    let ns = TestNamespace::new("spirange")?;
    let conn = ns.connection()?;

    let (start, end) = (0xabcd0, 0xabcdf);
    let dst: IpAddr = "192.0.2.1".parse().unwrap();
    let shell = conn.alloc_spi(dst, IpsecProtocol::Ah, start, end).await?;
    assert!((start..=end).contains(&shell.id.spi));
    assert_eq!(shell.id.dst, dst);
    assert_eq!(shell.id.protocol, IpsecProtocol::Ah);
    assert_eq!(shell.family(), Family::Inet);

    Ok(())
}

#[tokio::test]
async fn test_alloc_range_spi_exhausted() -> Result<()> {
    require_root!();

    let ns = TestNamespace::new("spifull")?;
    let conn = ns.connection()?;

    let (start, end) = (0xabcd0u32, 0xabcdfu32);
    let range_size = end - start + 1;
    let mut spis = HashSet::new();

    // The kernel picks SPIs at random, so it may give up before the range is
    // actually full. Asking for one more than fits always fails.
    let mut exhausted = false;
    for _ in 0..=range_size {
        match conn.alloc_spi(any6(), IpsecProtocol::Esp, start, end).await {
            Ok(shell) => {
                let spi = shell.id.spi;
                assert!(spis.insert(spi), "SPI 0x{:x} handed out twice", spi);
            }
            Err(e) => {
                assert_eq!(e.kind(), ErrorKind::RangeExhausted);
                exhausted = true;
                break;
            }
        }
    }
    assert!(exhausted);

    Ok(())
}

#[tokio::test]
async fn test_alloc_empty_range_rejected_locally() -> Result<()> {
    require_root!();

    let ns = TestNamespace::new("spiempty")?;
    let conn = ns.connection()?;

    let err = conn
        .alloc_spi(any6(), IpsecProtocol::Esp, 0x200, 0x100)
        .await
        .unwrap_err();
    assert!(err.is_format());

    Ok(())
}
