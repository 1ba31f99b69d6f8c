//! ESP with the null transform.
//!
//! The payload travels in clear text and the ICV is all zeros, so packets can
//! be built and taken apart without a crypto engine. The kernel accepts them
//! on SAs configured with `ecb(cipher_null)` and `digest_null`.

use std::net::IpAddr;

use super::header::EspHeader;
use super::ip::{self, IPPROTO_IPIP, IPPROTO_IPV6, IpPacket};
use crate::ipsec::algorithm::{
    CBC_AES, CIPHER_NULL, DIGEST_NULL, RFC4106_GCM_AES, accepted_trunc_lens,
};
use crate::ipsec::sa::SecurityAssociation;
use crate::ipsec::{IPPROTO_ESP, Mode};
use crate::netlink::{Error, Result};

/// ESP payloads end on a 4-byte boundary whatever the cipher.
const ESP_ALIGN: usize = 4;
/// Pad length and next header.
const TRAILER_LEN: usize = 2;

/// How the ESP packet relates to the packet it protects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EspMode {
    /// The original IP header is kept and only its protocol changes.
    Transport,
    /// The whole packet is wrapped in a new header between the endpoints.
    Tunnel { src: IpAddr, dst: IpAddr },
}

impl EspMode {
    pub fn mode(&self) -> Mode {
        match self {
            Self::Transport => Mode::Transport,
            Self::Tunnel { .. } => Mode::Tunnel,
        }
    }
}

/// Parameters of the null transform.
///
/// The ICV is a run of zero bytes whose length follows the SA's auth
/// algorithm: none for `digest_null`, or the truncation length of whatever
/// the peer was configured with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NullTransform {
    icv_len: usize,
}

impl NullTransform {
    /// No ICV, as with `digest_null`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `len` zero bytes as ICV.
    pub fn icv_len(mut self, len: usize) -> Self {
        self.icv_len = len;
        self
    }

    pub fn icv(&self) -> usize {
        self.icv_len
    }
}

fn pad_len(inner_len: usize, align: usize) -> usize {
    (inner_len + TRAILER_LEN).next_multiple_of(align) - inner_len - TRAILER_LEN
}

fn esp_payload(
    spi: u32,
    seq: u32,
    inner: &[u8],
    next_header: u8,
    transform: &NullTransform,
) -> Vec<u8> {
    let pad = pad_len(inner.len(), ESP_ALIGN);
    let mut out =
        Vec::with_capacity(EspHeader::LEN + inner.len() + pad + TRAILER_LEN + transform.icv_len);
    out.extend_from_slice(&EspHeader::new(spi, seq).pack());
    out.extend_from_slice(inner);
    // RFC 4303 padding: 1, 2, 3, ...
    out.extend((1..=pad).map(|b| b as u8));
    out.push(pad as u8);
    out.push(next_header);
    out.resize(out.len() + transform.icv_len, 0);
    out
}

/// Encapsulate an IP packet in ESP using the null transform.
///
/// In transport mode the packet's own header is reused with protocol 50 and
/// the lengths and IPv4 checksum fixed up. In tunnel mode the packet becomes
/// the payload of a new header between the tunnel endpoints.
pub fn encapsulate_null(
    packet: &[u8],
    spi: u32,
    seq: u32,
    mode: EspMode,
    transform: &NullTransform,
) -> Result<Vec<u8>> {
    let ip = IpPacket::parse(packet)?;
    let (mut out, esp) = match mode {
        EspMode::Transport => {
            let esp = esp_payload(spi, seq, ip.payload(), ip.protocol(), transform);
            (ip::rewrite_header(ip.header(), IPPROTO_ESP, esp.len())?, esp)
        }
        EspMode::Tunnel { src, dst } => {
            let next_header = if ip.version() == 4 {
                IPPROTO_IPIP
            } else {
                IPPROTO_IPV6
            };
            let esp = esp_payload(spi, seq, ip.as_bytes(), next_header, transform);
            (ip::new_header(src, dst, IPPROTO_ESP, esp.len())?, esp)
        }
    };
    out.extend_from_slice(&esp);
    Ok(out)
}

/// An ESP packet taken apart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decapsulated {
    /// The protected packet as it was before encapsulation.
    pub packet: Vec<u8>,
    pub header: EspHeader,
    pub next_header: u8,
    pub mode: EspMode,
    pub icv: Vec<u8>,
}

impl Decapsulated {
    pub fn inner(&self) -> Result<IpPacket<'_>> {
        IpPacket::parse(&self.packet)
    }

    /// Whether the inner UDP checksum still verifies.
    ///
    /// The null transform has no MAC, so this is how a modified payload shows
    /// up.
    pub fn inner_checksum_ok(&self) -> bool {
        self.inner()
            .map(|ip| ip.transport_checksum_ok())
            .unwrap_or(false)
    }
}

/// Split ESP payload bytes (header onwards) into header, inner bytes, next
/// header and ICV.
fn split_esp<'a>(
    esp: &'a [u8],
    transform: &NullTransform,
) -> Result<(EspHeader, &'a [u8], u8, &'a [u8])> {
    let header = EspHeader::unpack(esp)?;
    let body = &esp[EspHeader::LEN..];
    if body.len() < transform.icv_len + TRAILER_LEN {
        return Err(Error::Truncated {
            expected: EspHeader::LEN + transform.icv_len + TRAILER_LEN,
            actual: esp.len(),
        });
    }
    let (body, icv) = body.split_at(body.len() - transform.icv_len);
    let next_header = body[body.len() - 1];
    let pad = body[body.len() - 2] as usize;
    if pad + TRAILER_LEN > body.len() {
        return Err(Error::InvalidMessage(format!(
            "ESP pad length {} exceeds payload of {} bytes",
            pad,
            body.len() - TRAILER_LEN
        )));
    }
    let inner_len = body.len() - TRAILER_LEN - pad;
    let padding = &body[inner_len..inner_len + pad];
    if padding.iter().enumerate().any(|(i, &b)| b as usize != i + 1) {
        return Err(Error::InvalidMessage("ESP padding is not monotonic".into()));
    }
    Ok((header, &body[..inner_len], next_header, icv))
}

/// Undo [`encapsulate_null`] for an SA in `mode`.
///
/// In tunnel mode the next header must be 4 or 41 and the inner packet is
/// returned as is. In transport mode the outer header is rebuilt around the
/// payload whatever the next header says, IP-in-IP included.
pub fn decapsulate_null(
    packet: &[u8],
    mode: Mode,
    transform: &NullTransform,
) -> Result<Decapsulated> {
    let outer = IpPacket::parse(packet)?;
    if outer.protocol() != IPPROTO_ESP {
        return Err(Error::InvalidMessage(format!(
            "not an ESP packet: protocol {}",
            outer.protocol()
        )));
    }
    let (header, inner, next_header, icv) = split_esp(outer.payload(), transform)?;

    let (packet, mode) = match mode {
        Mode::Tunnel => {
            if !matches!(next_header, IPPROTO_IPIP | IPPROTO_IPV6) {
                return Err(Error::InvalidMessage(format!(
                    "tunnel mode ESP carries next header {}, not IP",
                    next_header
                )));
            }
            let inner_ip = IpPacket::parse(inner)?;
            let mode = EspMode::Tunnel {
                src: outer.src(),
                dst: outer.dst(),
            };
            (inner_ip.as_bytes().to_vec(), mode)
        }
        Mode::Transport => {
            let mut rebuilt = ip::rewrite_header(outer.header(), next_header, inner.len())?;
            rebuilt.extend_from_slice(inner);
            (rebuilt, EspMode::Transport)
        }
        other => {
            return Err(Error::InvalidMessage(format!(
                "no null ESP decapsulation for mode {:?}",
                other
            )));
        }
    };

    Ok(Decapsulated {
        packet,
        header,
        next_header,
        mode,
        icv: icv.to_vec(),
    })
}

/// Sizes a cipher/auth pair adds to an ESP packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EspTransform {
    pub iv_len: usize,
    pub block_size: usize,
    pub icv_len: usize,
}

impl EspTransform {
    /// `ecb(cipher_null)` with `digest_null`.
    pub fn null() -> Self {
        Self {
            iv_len: 0,
            block_size: 1,
            icv_len: 0,
        }
    }

    /// `cbc(aes)` with `hmac(sha1)` truncated to 96 bits.
    pub fn cbc_aes_hmac_sha1_96() -> Self {
        Self {
            iv_len: 16,
            block_size: 16,
            icv_len: 12,
        }
    }

    /// The transform an SA's algorithms produce.
    pub fn for_sa(sa: &SecurityAssociation) -> Result<Self> {
        let mut transform = Self::null();

        if let Some(aead) = &sa.aead {
            if !aead.algorithm.is(RFC4106_GCM_AES) {
                return Err(Error::InvalidAlgorithm(format!(
                    "no ESP sizes known for {}",
                    aead.algorithm.name
                )));
            }
            transform.iv_len = 8;
            transform.icv_len = aead.icv_len as usize / 8;
            return Ok(transform);
        }

        if let Some(enc) = &sa.encryption {
            if enc.is(CBC_AES) {
                transform.iv_len = 16;
                transform.block_size = 16;
            } else if !enc.is(CIPHER_NULL) {
                return Err(Error::InvalidAlgorithm(format!(
                    "no ESP sizes known for {}",
                    enc.name
                )));
            }
        }

        if let Some(auth) = &sa.auth {
            let bits = match auth.trunc_len {
                Some(bits) => bits,
                None if auth.algorithm.is(DIGEST_NULL) => 0,
                None => accepted_trunc_lens(auth.name())
                    .first()
                    .copied()
                    .ok_or_else(|| {
                        Error::InvalidAlgorithm(format!("no ICV length known for {}", auth.name()))
                    })?,
            };
            transform.icv_len = bits as usize / 8;
        }
        Ok(transform)
    }
}

/// Length of the ESP payload (header to ICV) protecting `inner_len` bytes.
pub fn esp_packet_length(transform: &EspTransform, inner_len: usize) -> usize {
    let align = transform.block_size.max(ESP_ALIGN);
    EspHeader::LEN
        + transform.iv_len
        + (inner_len + TRAILER_LEN).next_multiple_of(align)
        + transform.icv_len
}
