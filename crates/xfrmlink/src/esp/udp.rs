//! ESP-in-UDP encapsulation (RFC 3948).

use zerocopy::network_endian::U16;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use super::ip::{self, IPPROTO_UDP, IpPacket};
use crate::codec::WireStruct;
use crate::ipsec::IPPROTO_ESP;
use crate::ipsec::sa::EncapTemplate;
use crate::netlink::{Error, Result};

/// The NAT traversal port.
pub const NAT_T_PORT: u16 = 4500;

/// UDP header, all fields big-endian.
#[repr(C)]
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout,
)]
pub struct UdpHeader {
    pub sport: U16,
    pub dport: U16,
    pub len: U16,
    pub checksum: U16,
}

impl WireStruct for UdpHeader {}

impl UdpHeader {
    pub const LEN: usize = 8;

    fn for_payload(sport: u16, dport: u16, payload_len: usize) -> Result<Self> {
        let len = u16::try_from(Self::LEN + payload_len).map_err(|_| {
            Error::InvalidMessage(format!("UDP payload of {} bytes too large", payload_len))
        })?;
        Ok(Self {
            sport: U16::new(sport),
            dport: U16::new(dport),
            len: U16::new(len),
            checksum: U16::ZERO,
        })
    }

    pub fn sport(&self) -> u16 {
        self.sport.get()
    }

    pub fn dport(&self) -> u16 {
        self.dport.get()
    }
}

/// Prepend a UDP header to an ESP payload. The checksum is left zero, which
/// RFC 3948 allows for ESP-in-UDP.
pub fn wrap_udp_encap(esp: &[u8], sport: u16, dport: u16) -> Result<Vec<u8>> {
    let header = UdpHeader::for_payload(sport, dport, esp.len())?;
    let mut out = header.encode();
    out.extend_from_slice(esp);
    Ok(out)
}

/// [`wrap_udp_encap`] using the ports of an SA's encapsulation template.
pub fn wrap_udp_encap_with(esp: &[u8], encap: &EncapTemplate) -> Result<Vec<u8>> {
    wrap_udp_encap(esp, encap.sport, encap.dport)
}

/// Strip the UDP header from an ESP-in-UDP datagram.
///
/// Keepalives and IKE packets (non-ESP marker) are not ESP and fail.
pub fn unwrap_udp_encap(datagram: &[u8]) -> Result<(UdpHeader, &[u8])> {
    let (header, used) = UdpHeader::decode(datagram)?;
    let len = header.len.get() as usize;
    if len < UdpHeader::LEN || len > datagram.len() {
        return Err(Error::InvalidMessage(format!(
            "UDP length {} does not fit datagram of {} bytes",
            len,
            datagram.len()
        )));
    }
    let payload = &datagram[used..len];
    match payload {
        [0xff] => Err(Error::InvalidMessage("NAT-T keepalive".into())),
        [0, 0, 0, 0, ..] => Err(Error::InvalidMessage("non-ESP marker".into())),
        _ => Ok((header, payload)),
    }
}

/// Turn an ESP packet into ESP-in-UDP, fixing the IP header and filling in
/// the UDP checksum.
pub fn encap_ip_packet(packet: &[u8], sport: u16, dport: u16) -> Result<Vec<u8>> {
    let ip = IpPacket::parse(packet)?;
    if ip.protocol() != IPPROTO_ESP {
        return Err(Error::InvalidMessage(format!(
            "not an ESP packet: protocol {}",
            ip.protocol()
        )));
    }
    let mut segment = wrap_udp_encap(ip.payload(), sport, dport)?;
    let checksum = ip::transport_checksum(ip.src(), ip.dst(), IPPROTO_UDP, &segment);
    segment[6..8].copy_from_slice(&checksum.to_be_bytes());

    let mut out = ip::rewrite_header(ip.header(), IPPROTO_UDP, segment.len())?;
    out.extend_from_slice(&segment);
    Ok(out)
}

/// Undo [`encap_ip_packet`], returning the plain ESP packet and the UDP
/// header that carried it.
pub fn decap_ip_packet(packet: &[u8]) -> Result<(Vec<u8>, UdpHeader)> {
    let ip = IpPacket::parse(packet)?;
    if ip.protocol() != IPPROTO_UDP {
        return Err(Error::InvalidMessage(format!(
            "not a UDP packet: protocol {}",
            ip.protocol()
        )));
    }
    let (header, esp) = unwrap_udp_encap(ip.payload())?;
    let mut out = ip::rewrite_header(ip.header(), IPPROTO_ESP, esp.len())?;
    out.extend_from_slice(esp);
    Ok((out, header))
}
