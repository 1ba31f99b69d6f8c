//! Minimal IPv4/IPv6 header handling for ESP framing.
//!
//! Only the fixed headers are understood. IPv6 extension headers are treated
//! as payload, which matches what the null-transform packets carry.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use crate::ipsec::Family;
use crate::netlink::{Error, Result};

pub const IPPROTO_IPIP: u8 = 4;
pub const IPPROTO_UDP: u8 = 17;
pub const IPPROTO_IPV6: u8 = 41;

const IPV4_MIN_HEADER_LEN: usize = 20;
const IPV6_HEADER_LEN: usize = 40;
const DEFAULT_TTL: u8 = 64;

/// Internet checksum accumulator (RFC 1071).
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Checksum(u32);

impl Checksum {
    pub(crate) fn new() -> Self {
        Self(0)
    }

    pub(crate) fn add_slice(&mut self, data: &[u8]) {
        let mut iter = data.chunks_exact(2);
        let full_sum = iter
            .by_ref()
            .map(|bytes| ((bytes[0] as u32) << 8) | (bytes[1] as u32))
            .sum::<u32>();
        let remain_sum = match *iter.remainder() {
            [high] => (high as u32) << 8,
            _ => 0u32,
        };
        self.0 += full_sum + remain_sum;
    }

    /// Fold carries and return the one's complement.
    pub(crate) fn finish(mut self) -> u16 {
        // Two folds are enough: 0xffff + 0xffff = 0x1fffe, 0x1 + 0xfffe = 0xffff.
        self.0 = (self.0 >> 16) + (self.0 & 0xffff);
        self.0 = (self.0 >> 16) + (self.0 & 0xffff);
        !(self.0 as u16)
    }
}

/// Checksum of a transport segment including the pseudo-header.
///
/// Returns 0xffff where the computed value is zero, as UDP requires.
pub(crate) fn transport_checksum(src: IpAddr, dst: IpAddr, protocol: u8, segment: &[u8]) -> u16 {
    let mut checksum = Checksum::new();
    match (src, dst) {
        (IpAddr::V4(src), IpAddr::V4(dst)) => {
            checksum.add_slice(&src.octets());
            checksum.add_slice(&dst.octets());
            checksum.add_slice(&[0u8, protocol]);
            checksum.add_slice(&(segment.len() as u16).to_be_bytes());
        }
        _ => {
            checksum.add_slice(&v6_octets(src));
            checksum.add_slice(&v6_octets(dst));
            checksum.add_slice(&(segment.len() as u32).to_be_bytes());
            checksum.add_slice(&[0u8, 0, 0, protocol]);
        }
    }
    checksum.add_slice(segment);
    match checksum.finish() {
        0 => 0xffff,
        value => value,
    }
}

fn v6_octets(addr: IpAddr) -> [u8; 16] {
    match addr {
        IpAddr::V4(v4) => v4.to_ipv6_mapped().octets(),
        IpAddr::V6(v6) => v6.octets(),
    }
}

/// A parsed view over an IP packet.
#[derive(Debug, Clone, Copy)]
pub struct IpPacket<'a> {
    data: &'a [u8],
    header_len: usize,
    total_len: usize,
}

impl<'a> IpPacket<'a> {
    /// Parse the fixed header. Bytes past the length the header declares are
    /// ignored.
    pub fn parse(data: &'a [u8]) -> Result<Self> {
        let Some(&first) = data.first() else {
            return Err(Error::Truncated {
                expected: IPV4_MIN_HEADER_LEN,
                actual: 0,
            });
        };
        let (header_len, total_len) = match first >> 4 {
            4 => {
                check_len(data, IPV4_MIN_HEADER_LEN)?;
                let header_len = (first & 0x0f) as usize * 4;
                if header_len < IPV4_MIN_HEADER_LEN {
                    return Err(Error::InvalidMessage(format!(
                        "IPv4 header length {} too small",
                        header_len
                    )));
                }
                let total_len = u16::from_be_bytes([data[2], data[3]]) as usize;
                if total_len < header_len {
                    return Err(Error::InvalidMessage(format!(
                        "IPv4 total length {} below header length {}",
                        total_len, header_len
                    )));
                }
                (header_len, total_len)
            }
            6 => {
                check_len(data, IPV6_HEADER_LEN)?;
                let payload_len = u16::from_be_bytes([data[4], data[5]]) as usize;
                (IPV6_HEADER_LEN, IPV6_HEADER_LEN + payload_len)
            }
            version => {
                return Err(Error::InvalidMessage(format!(
                    "unknown IP version {}",
                    version
                )));
            }
        };
        check_len(data, total_len)?;
        Ok(Self {
            data,
            header_len,
            total_len,
        })
    }

    pub fn version(&self) -> u8 {
        self.data[0] >> 4
    }

    pub fn family(&self) -> Family {
        if self.version() == 4 {
            Family::Inet
        } else {
            Family::Inet6
        }
    }

    /// Protocol (IPv4) or next header (IPv6).
    pub fn protocol(&self) -> u8 {
        if self.version() == 4 {
            self.data[9]
        } else {
            self.data[6]
        }
    }

    pub fn src(&self) -> IpAddr {
        if self.version() == 4 {
            IpAddr::V4(Ipv4Addr::from(octets::<4>(&self.data[12..16])))
        } else {
            IpAddr::V6(Ipv6Addr::from(octets::<16>(&self.data[8..24])))
        }
    }

    pub fn dst(&self) -> IpAddr {
        if self.version() == 4 {
            IpAddr::V4(Ipv4Addr::from(octets::<4>(&self.data[16..20])))
        } else {
            IpAddr::V6(Ipv6Addr::from(octets::<16>(&self.data[24..40])))
        }
    }

    pub fn header(&self) -> &'a [u8] {
        &self.data[..self.header_len]
    }

    pub fn payload(&self) -> &'a [u8] {
        &self.data[self.header_len..self.total_len]
    }

    /// The whole packet, without trailing bytes.
    pub fn as_bytes(&self) -> &'a [u8] {
        &self.data[..self.total_len]
    }

    /// Whether the IPv4 header checksum verifies. Always true for IPv6.
    pub fn header_checksum_ok(&self) -> bool {
        if self.version() != 4 {
            return true;
        }
        let mut checksum = Checksum::new();
        checksum.add_slice(self.header());
        checksum.finish() == 0
    }

    /// Whether the UDP checksum verifies.
    ///
    /// Other protocols are not checked and report true, as does an IPv4 UDP
    /// datagram sent without a checksum.
    pub fn transport_checksum_ok(&self) -> bool {
        if self.protocol() != IPPROTO_UDP {
            return true;
        }
        let segment = self.payload();
        if segment.len() < 8 {
            return false;
        }
        let stored = u16::from_be_bytes([segment[6], segment[7]]);
        if stored == 0 && self.version() == 4 {
            return true;
        }
        let mut zeroed = segment.to_vec();
        zeroed[6] = 0;
        zeroed[7] = 0;
        transport_checksum(self.src(), self.dst(), IPPROTO_UDP, &zeroed) == stored
    }
}

fn check_len(data: &[u8], expected: usize) -> Result<()> {
    if data.len() < expected {
        return Err(Error::Truncated {
            expected,
            actual: data.len(),
        });
    }
    Ok(())
}

fn octets<const N: usize>(data: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(data);
    out
}

fn v4_total_len(header_len: usize, payload_len: usize) -> Result<u16> {
    u16::try_from(header_len + payload_len).map_err(|_| {
        Error::InvalidMessage(format!(
            "IPv4 packet of {} bytes too large",
            header_len + payload_len
        ))
    })
}

fn v6_payload_len(payload_len: usize) -> Result<u16> {
    u16::try_from(payload_len).map_err(|_| {
        Error::InvalidMessage(format!("IPv6 payload of {} bytes too large", payload_len))
    })
}

fn fill_v4_checksum(header: &mut [u8]) {
    header[10] = 0;
    header[11] = 0;
    let mut checksum = Checksum::new();
    checksum.add_slice(header);
    header[10..12].copy_from_slice(&checksum.finish().to_be_bytes());
}

/// Copy of `header` carrying a new protocol and payload length.
pub(crate) fn rewrite_header(header: &[u8], protocol: u8, payload_len: usize) -> Result<Vec<u8>> {
    let mut out = header.to_vec();
    if out[0] >> 4 == 4 {
        let total_len = v4_total_len(out.len(), payload_len)?;
        out[2..4].copy_from_slice(&total_len.to_be_bytes());
        out[9] = protocol;
        fill_v4_checksum(&mut out);
    } else {
        out[4..6].copy_from_slice(&v6_payload_len(payload_len)?.to_be_bytes());
        out[6] = protocol;
    }
    Ok(out)
}

/// A fresh header from `src` to `dst`.
pub(crate) fn new_header(
    src: IpAddr,
    dst: IpAddr,
    protocol: u8,
    payload_len: usize,
) -> Result<Vec<u8>> {
    match (src, dst) {
        (IpAddr::V4(src), IpAddr::V4(dst)) => {
            let mut out = vec![0u8; IPV4_MIN_HEADER_LEN];
            out[0] = 0x45;
            out[2..4].copy_from_slice(&v4_total_len(IPV4_MIN_HEADER_LEN, payload_len)?.to_be_bytes());
            out[8] = DEFAULT_TTL;
            out[9] = protocol;
            out[12..16].copy_from_slice(&src.octets());
            out[16..20].copy_from_slice(&dst.octets());
            fill_v4_checksum(&mut out);
            Ok(out)
        }
        (IpAddr::V6(src), IpAddr::V6(dst)) => {
            let mut out = vec![0u8; IPV6_HEADER_LEN];
            out[0] = 0x60;
            out[4..6].copy_from_slice(&v6_payload_len(payload_len)?.to_be_bytes());
            out[6] = protocol;
            out[7] = DEFAULT_TTL;
            out[8..24].copy_from_slice(&src.octets());
            out[24..40].copy_from_slice(&dst.octets());
            Ok(out)
        }
        _ => Err(Error::InvalidMessage(format!(
            "endpoints {} and {} differ in family",
            src, dst
        ))),
    }
}

/// Build an IP/UDP packet. Used by tests and the CLI to produce inner
/// packets.
pub fn udp_packet(
    src: IpAddr,
    dst: IpAddr,
    sport: u16,
    dport: u16,
    payload: &[u8],
) -> Result<Vec<u8>> {
    let udp_len = u16::try_from(8 + payload.len())
        .map_err(|_| Error::InvalidMessage("UDP payload too large".into()))?;
    let mut segment = Vec::with_capacity(udp_len as usize);
    segment.extend_from_slice(&sport.to_be_bytes());
    segment.extend_from_slice(&dport.to_be_bytes());
    segment.extend_from_slice(&udp_len.to_be_bytes());
    segment.extend_from_slice(&[0, 0]);
    segment.extend_from_slice(payload);
    let checksum = transport_checksum(src, dst, IPPROTO_UDP, &segment);
    segment[6..8].copy_from_slice(&checksum.to_be_bytes());

    let mut packet = new_header(src, dst, IPPROTO_UDP, segment.len())?;
    packet.extend_from_slice(&segment);
    Ok(packet)
}
