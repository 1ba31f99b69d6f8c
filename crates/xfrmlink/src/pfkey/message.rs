//! PF_KEY v2 message format (RFC 2367, plus the Linux `SADB_X_EXT_SA2`).
//!
//! A message is a 16-byte `sadb_msg` followed by extensions. Every length on
//! the wire counts 8-byte units, and every extension is padded to 8 bytes.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use winnow::binary::{Endianness, u16 as winnow_u16, u32 as winnow_u32};
use winnow::error::{ContextError, ErrMode};
use winnow::prelude::*;
use winnow::token::take;
use zerocopy::native_endian::{U32 as NeU32, U64 as NeU64};
use zerocopy::network_endian::U32;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::codec::WireStruct;
use crate::ipsec::algorithm::{
    Algorithm, AuthAlgorithm, CBC_AES, CIPHER_NULL, DIGEST_NULL, HMAC_MD5, HMAC_SHA1, HMAC_SHA256,
    HMAC_SHA384, HMAC_SHA512,
};
use crate::ipsec::sa::{LifetimeCurrent, SaId, SecurityAssociation};
use crate::ipsec::{Family, IpsecProtocol, Mode};
use crate::netlink::{Error, Result};

/// Result type for winnow parsers.
pub type PResult<T> = core::result::Result<T, ErrMode<ContextError>>;

pub const PF_KEY_V2: u8 = 2;

// Message types
pub const SADB_GETSPI: u8 = 1;
pub const SADB_UPDATE: u8 = 2;
pub const SADB_ADD: u8 = 3;
pub const SADB_DELETE: u8 = 4;
pub const SADB_GET: u8 = 5;
pub const SADB_FLUSH: u8 = 9;
pub const SADB_DUMP: u8 = 10;

// SA types
pub const SADB_SATYPE_UNSPEC: u8 = 0;
pub const SADB_SATYPE_AH: u8 = 2;
pub const SADB_SATYPE_ESP: u8 = 3;
pub const SADB_X_SATYPE_IPCOMP: u8 = 9;

// Extension types
pub const SADB_EXT_SA: u16 = 1;
pub const SADB_EXT_LIFETIME_CURRENT: u16 = 2;
pub const SADB_EXT_LIFETIME_HARD: u16 = 3;
pub const SADB_EXT_LIFETIME_SOFT: u16 = 4;
pub const SADB_EXT_ADDRESS_SRC: u16 = 5;
pub const SADB_EXT_ADDRESS_DST: u16 = 6;
pub const SADB_EXT_KEY_AUTH: u16 = 8;
pub const SADB_EXT_KEY_ENCRYPT: u16 = 9;
pub const SADB_X_EXT_SA2: u16 = 19;

// IPsec modes as PF_KEY numbers them
pub const IPSEC_MODE_ANY: u8 = 0;
pub const IPSEC_MODE_TRANSPORT: u8 = 1;
pub const IPSEC_MODE_TUNNEL: u8 = 2;
pub const IPSEC_MODE_BEET: u8 = 3;

pub const SADB_SASTATE_MATURE: u8 = 1;

// Algorithm identifiers
pub const SADB_AALG_NONE: u8 = 0;
pub const SADB_AALG_MD5HMAC: u8 = 2;
pub const SADB_AALG_SHA1HMAC: u8 = 3;
pub const SADB_X_AALG_SHA2_256HMAC: u8 = 5;
pub const SADB_X_AALG_SHA2_384HMAC: u8 = 6;
pub const SADB_X_AALG_SHA2_512HMAC: u8 = 7;
pub const SADB_X_AALG_NULL: u8 = 251;

pub const SADB_EALG_NONE: u8 = 0;
pub const SADB_EALG_DESCBC: u8 = 2;
pub const SADB_EALG_3DESCBC: u8 = 3;
pub const SADB_EALG_NULL: u8 = 11;
pub const SADB_X_EALG_AESCBC: u8 = 12;

const AUTH_ALGORITHMS: &[(u8, &str)] = &[
    (SADB_AALG_MD5HMAC, HMAC_MD5),
    (SADB_AALG_SHA1HMAC, HMAC_SHA1),
    (SADB_X_AALG_SHA2_256HMAC, HMAC_SHA256),
    (SADB_X_AALG_SHA2_384HMAC, HMAC_SHA384),
    (SADB_X_AALG_SHA2_512HMAC, HMAC_SHA512),
    (SADB_X_AALG_NULL, DIGEST_NULL),
];

const ENCRYPT_ALGORITHMS: &[(u8, &str)] = &[
    (SADB_EALG_DESCBC, "cbc(des)"),
    (SADB_EALG_3DESCBC, "cbc(des3_ede)"),
    (SADB_EALG_NULL, CIPHER_NULL),
    (SADB_X_EALG_AESCBC, CBC_AES),
];

fn lookup_id(table: &[(u8, &str)], alg: &Algorithm) -> Result<u8> {
    table
        .iter()
        .find(|(_, name)| alg.is(name))
        .map(|(id, _)| *id)
        .ok_or_else(|| {
            Error::InvalidAlgorithm(format!("{} has no PF_KEY identifier", alg.name))
        })
}

fn lookup_name(table: &[(u8, &str)], id: u8) -> String {
    table
        .iter()
        .find(|(known, _)| *known == id)
        .map(|(_, name)| name.to_string())
        .unwrap_or_else(|| format!("sadb_alg_{}", id))
}

/// SADB identifier of an authentication algorithm.
pub fn auth_id(alg: &Algorithm) -> Result<u8> {
    lookup_id(AUTH_ALGORITHMS, alg)
}

/// SADB identifier of an encryption algorithm.
pub fn encrypt_id(alg: &Algorithm) -> Result<u8> {
    lookup_id(ENCRYPT_ALGORITHMS, alg)
}

/// Kernel name of an SADB authentication identifier.
pub fn auth_name(id: u8) -> String {
    lookup_name(AUTH_ALGORITHMS, id)
}

/// Kernel name of an SADB encryption identifier.
pub fn encrypt_name(id: u8) -> String {
    lookup_name(ENCRYPT_ALGORITHMS, id)
}

/// SA type carried in `sadb_msg.satype`.
pub fn satype(protocol: IpsecProtocol) -> Result<u8> {
    match protocol {
        IpsecProtocol::Esp => Ok(SADB_SATYPE_ESP),
        IpsecProtocol::Ah => Ok(SADB_SATYPE_AH),
        IpsecProtocol::Comp => Ok(SADB_X_SATYPE_IPCOMP),
        IpsecProtocol::Other(p) => Err(Error::InvalidMessage(format!(
            "protocol {} has no PF_KEY SA type",
            p
        ))),
    }
}

fn protocol_of(satype: u8) -> IpsecProtocol {
    match satype {
        SADB_SATYPE_AH => IpsecProtocol::Ah,
        SADB_X_SATYPE_IPCOMP => IpsecProtocol::Comp,
        _ => IpsecProtocol::Esp,
    }
}

/// PF_KEY mode number of an XFRM mode.
pub fn mode_number(mode: Mode) -> u8 {
    match mode {
        Mode::Transport => IPSEC_MODE_TRANSPORT,
        Mode::Tunnel => IPSEC_MODE_TUNNEL,
        Mode::Beet => IPSEC_MODE_BEET,
        Mode::Other(_) => IPSEC_MODE_ANY,
    }
}

fn mode_of(number: u8) -> Mode {
    match number {
        IPSEC_MODE_TUNNEL => Mode::Tunnel,
        IPSEC_MODE_BEET => Mode::Beet,
        _ => Mode::Transport,
    }
}

fn parse_u8(input: &mut &[u8]) -> PResult<u8> {
    winnow::binary::u8.parse_next(input)
}

fn parse_u16_ne(input: &mut &[u8]) -> PResult<u16> {
    winnow_u16(Endianness::Native).parse_next(input)
}

fn parse_u16_be(input: &mut &[u8]) -> PResult<u16> {
    winnow_u16(Endianness::Big).parse_next(input)
}

fn parse_u32_ne(input: &mut &[u8]) -> PResult<u32> {
    winnow_u32(Endianness::Native).parse_next(input)
}

fn parse_bytes<'a>(input: &mut &'a [u8], len: usize) -> PResult<&'a [u8]> {
    take(len).parse_next(input)
}

/// Length in 8-byte units of `bytes` bytes.
fn units(bytes: usize) -> u16 {
    (bytes / 8) as u16
}

fn pad8(len: usize) -> usize {
    (len + 7) & !7
}

/// struct sadb_msg.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct SadbMsg {
    pub version: u8,
    pub msg_type: u8,
    /// Positive errno set by the kernel on failure.
    pub errno: u8,
    pub satype: u8,
    /// Whole message length in 8-byte units.
    pub len: u16,
    pub reserved: u16,
    pub seq: u32,
    pub pid: u32,
}

impl SadbMsg {
    pub fn new(msg_type: u8, satype: u8, seq: u32, pid: u32) -> Self {
        Self {
            version: PF_KEY_V2,
            msg_type,
            satype,
            seq,
            pid,
            ..Default::default()
        }
    }
}

/// struct sadb_sa without its extension header.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct SadbSa {
    pub spi: U32,
    pub replay: u8,
    pub state: u8,
    pub auth: u8,
    pub encrypt: u8,
    pub flags: u32,
}

/// struct sadb_lifetime without its extension header.
///
/// The 64-bit counters sit at offset 4 here, so they are unaligned.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct SadbLifetime {
    pub allocations: NeU32,
    pub bytes: NeU64,
    pub addtime: NeU64,
    pub usetime: NeU64,
}

/// struct sadb_x_sa2 without its extension header.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct SadbXSa2 {
    pub mode: u8,
    pub reserved1: u8,
    pub reserved2: u16,
    pub sequence: u32,
    pub reqid: u32,
}

impl WireStruct for SadbMsg {}
impl WireStruct for SadbSa {}
impl WireStruct for SadbLifetime {}
impl WireStruct for SadbXSa2 {}

/// An address extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SadbAddress {
    pub proto: u8,
    pub prefix_len: u8,
    pub addr: IpAddr,
    pub port: u16,
}

impl SadbAddress {
    /// Host address with the full prefix length and any protocol.
    pub fn host(addr: IpAddr) -> Self {
        Self {
            proto: 0,
            prefix_len: Family::of(&addr).max_prefix_len(),
            addr,
            port: 0,
        }
    }

    fn sockaddr(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(32);
        match self.addr {
            IpAddr::V4(v4) => {
                buf.extend_from_slice(&(libc::AF_INET as u16).to_ne_bytes());
                buf.extend_from_slice(&self.port.to_be_bytes());
                buf.extend_from_slice(&v4.octets());
                buf.extend_from_slice(&[0; 8]);
            }
            IpAddr::V6(v6) => {
                buf.extend_from_slice(&(libc::AF_INET6 as u16).to_ne_bytes());
                buf.extend_from_slice(&self.port.to_be_bytes());
                buf.extend_from_slice(&0u32.to_ne_bytes());
                buf.extend_from_slice(&v6.octets());
                buf.extend_from_slice(&0u32.to_ne_bytes());
            }
        }
        buf
    }

    fn encode_body(&self) -> Vec<u8> {
        let mut body = vec![self.proto, self.prefix_len, 0, 0];
        body.extend_from_slice(&self.sockaddr());
        body
    }

    fn parse(input: &mut &[u8]) -> PResult<Self> {
        let proto = parse_u8(input)?;
        let prefix_len = parse_u8(input)?;
        let _reserved = parse_u16_ne(input)?;
        let family = parse_u16_ne(input)?;
        let port = parse_u16_be(input)?;
        let addr = match family as i32 {
            libc::AF_INET => {
                let octets = parse_bytes(input, 4)?;
                IpAddr::V4(Ipv4Addr::new(octets[0], octets[1], octets[2], octets[3]))
            }
            libc::AF_INET6 => {
                let _flowinfo = parse_u32_ne(input)?;
                let octets = parse_bytes(input, 16)?;
                let mut raw = [0u8; 16];
                raw.copy_from_slice(octets);
                IpAddr::V6(Ipv6Addr::from(raw))
            }
            _ => return Err(ErrMode::Cut(ContextError::new())),
        };
        Ok(Self {
            proto,
            prefix_len,
            addr,
            port,
        })
    }
}

/// A key extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SadbKey {
    /// Key length in bits.
    pub bits: u16,
    pub key: Vec<u8>,
}

impl SadbKey {
    pub fn new(key: &[u8], bits: u32) -> Self {
        Self {
            bits: bits as u16,
            key: key.to_vec(),
        }
    }

    fn encode_body(&self) -> Vec<u8> {
        let mut body = Vec::with_capacity(4 + self.key.len());
        body.extend_from_slice(&self.bits.to_ne_bytes());
        body.extend_from_slice(&0u16.to_ne_bytes());
        body.extend_from_slice(&self.key);
        body
    }

    fn parse(input: &mut &[u8]) -> PResult<Self> {
        let bits = parse_u16_ne(input)?;
        let _reserved = parse_u16_ne(input)?;
        let key = parse_bytes(input, (bits as usize).div_ceil(8))?;
        Ok(Self {
            bits,
            key: key.to_vec(),
        })
    }
}

/// A decoded extension. Types this crate does not model are kept raw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SadbExt {
    Sa(SadbSa),
    LifetimeCurrent(SadbLifetime),
    LifetimeHard(SadbLifetime),
    LifetimeSoft(SadbLifetime),
    SrcAddress(SadbAddress),
    DstAddress(SadbAddress),
    AuthKey(SadbKey),
    EncryptKey(SadbKey),
    Sa2(SadbXSa2),
    Unknown { ext_type: u16, body: Vec<u8> },
}

fn fixed<T: WireStruct>(input: &mut &[u8]) -> PResult<T> {
    let raw = parse_bytes(input, T::SIZE)?;
    T::decode(raw)
        .map(|(value, _)| value)
        .map_err(|_| ErrMode::Cut(ContextError::new()))
}

impl SadbExt {
    pub fn ext_type(&self) -> u16 {
        match self {
            Self::Sa(_) => SADB_EXT_SA,
            Self::LifetimeCurrent(_) => SADB_EXT_LIFETIME_CURRENT,
            Self::LifetimeHard(_) => SADB_EXT_LIFETIME_HARD,
            Self::LifetimeSoft(_) => SADB_EXT_LIFETIME_SOFT,
            Self::SrcAddress(_) => SADB_EXT_ADDRESS_SRC,
            Self::DstAddress(_) => SADB_EXT_ADDRESS_DST,
            Self::AuthKey(_) => SADB_EXT_KEY_AUTH,
            Self::EncryptKey(_) => SADB_EXT_KEY_ENCRYPT,
            Self::Sa2(_) => SADB_X_EXT_SA2,
            Self::Unknown { ext_type, .. } => *ext_type,
        }
    }

    fn body(&self) -> Vec<u8> {
        match self {
            Self::Sa(sa) => sa.encode(),
            Self::LifetimeCurrent(lt) | Self::LifetimeHard(lt) | Self::LifetimeSoft(lt) => {
                lt.encode()
            }
            Self::SrcAddress(addr) | Self::DstAddress(addr) => addr.encode_body(),
            Self::AuthKey(key) | Self::EncryptKey(key) => key.encode_body(),
            Self::Sa2(sa2) => sa2.encode(),
            Self::Unknown { body, .. } => body.clone(),
        }
    }

    /// Encode with the extension header, padded to 8 bytes.
    pub fn encode(&self) -> Vec<u8> {
        let body = self.body();
        let total = pad8(4 + body.len());
        let mut buf = Vec::with_capacity(total);
        buf.extend_from_slice(&units(total).to_ne_bytes());
        buf.extend_from_slice(&self.ext_type().to_ne_bytes());
        buf.extend_from_slice(&body);
        buf.resize(total, 0);
        buf
    }

    fn parse(input: &mut &[u8]) -> PResult<Self> {
        let len = parse_u16_ne(input)? as usize * 8;
        let ext_type = parse_u16_ne(input)?;
        if len < 8 {
            return Err(ErrMode::Cut(ContextError::new()));
        }
        let mut body = parse_bytes(input, len - 4)?;
        let body = &mut body;

        let ext = match ext_type {
            SADB_EXT_SA => Self::Sa(fixed(body)?),
            SADB_EXT_LIFETIME_CURRENT => Self::LifetimeCurrent(fixed(body)?),
            SADB_EXT_LIFETIME_HARD => Self::LifetimeHard(fixed(body)?),
            SADB_EXT_LIFETIME_SOFT => Self::LifetimeSoft(fixed(body)?),
            SADB_EXT_ADDRESS_SRC => Self::SrcAddress(SadbAddress::parse(body)?),
            SADB_EXT_ADDRESS_DST => Self::DstAddress(SadbAddress::parse(body)?),
            SADB_EXT_KEY_AUTH => Self::AuthKey(SadbKey::parse(body)?),
            SADB_EXT_KEY_ENCRYPT => Self::EncryptKey(SadbKey::parse(body)?),
            SADB_X_EXT_SA2 => Self::Sa2(fixed(body)?),
            _ => Self::Unknown {
                ext_type,
                body: body.to_vec(),
            },
        };
        Ok(ext)
    }
}

/// A PF_KEY message: header plus extensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PfKeyMessage {
    pub header: SadbMsg,
    pub extensions: Vec<SadbExt>,
}

impl PfKeyMessage {
    pub fn new(header: SadbMsg) -> Self {
        Self {
            header,
            extensions: Vec::new(),
        }
    }

    pub fn ext(mut self, ext: SadbExt) -> Self {
        self.extensions.push(ext);
        self
    }

    /// Encode, filling in the header length.
    pub fn encode(&self) -> Vec<u8> {
        let mut body = Vec::new();
        for ext in &self.extensions {
            body.extend(ext.encode());
        }
        let mut header = self.header;
        header.len = units(SadbMsg::SIZE + body.len());

        let mut buf = header.encode();
        buf.extend(body);
        buf
    }

    fn parse(input: &mut &[u8]) -> PResult<Self> {
        let header: SadbMsg = fixed(input)?;
        let total = header.len as usize * 8;
        if total < SadbMsg::SIZE {
            return Err(ErrMode::Cut(ContextError::new()));
        }
        let mut rest = parse_bytes(input, total - SadbMsg::SIZE)?;
        let mut extensions = Vec::new();
        while !rest.is_empty() {
            extensions.push(SadbExt::parse(&mut rest)?);
        }
        Ok(Self { header, extensions })
    }

    /// Decode one message. Bytes after the declared length are ignored.
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < SadbMsg::SIZE {
            return Err(Error::Truncated {
                expected: SadbMsg::SIZE,
                actual: data.len(),
            });
        }
        let mut input = data;
        Self::parse(&mut input).map_err(|e| Error::Parse(format!("PF_KEY message: {}", e)))
    }

    pub fn find(&self, ext_type: u16) -> Option<&SadbExt> {
        self.extensions.iter().find(|e| e.ext_type() == ext_type)
    }

    /// Interpret an ADD/GET/DUMP reply as an SA.
    pub fn to_sa(&self) -> Result<SecurityAssociation> {
        let sa = match self.find(SADB_EXT_SA) {
            Some(SadbExt::Sa(sa)) => *sa,
            _ => return Err(Error::InvalidMessage("PF_KEY reply has no SA extension".into())),
        };
        let src = match self.find(SADB_EXT_ADDRESS_SRC) {
            Some(SadbExt::SrcAddress(a)) => a.addr,
            _ => return Err(Error::InvalidMessage("PF_KEY reply has no source".into())),
        };
        let dst = match self.find(SADB_EXT_ADDRESS_DST) {
            Some(SadbExt::DstAddress(a)) => a.addr,
            _ => return Err(Error::InvalidMessage("PF_KEY reply has no destination".into())),
        };

        let id = SaId::new(protocol_of(self.header.satype), src, dst, sa.spi.get());
        let mut out = SecurityAssociation::new(id).replay_window(sa.replay);

        if let Some(SadbExt::Sa2(sa2)) = self.find(SADB_X_EXT_SA2) {
            out = out.mode(mode_of(sa2.mode)).reqid(sa2.reqid);
        }
        if sa.encrypt != SADB_EALG_NONE {
            let key = match self.find(SADB_EXT_KEY_ENCRYPT) {
                Some(SadbExt::EncryptKey(k)) => k.clone(),
                _ => SadbKey::new(&[], 0),
            };
            out = out.encryption(Algorithm::with_key_len(
                encrypt_name(sa.encrypt),
                key.bits as u32,
                key.key,
            ));
        }
        if sa.auth != SADB_AALG_NONE {
            let key = match self.find(SADB_EXT_KEY_AUTH) {
                Some(SadbExt::AuthKey(k)) => k.clone(),
                _ => SadbKey::new(&[], 0),
            };
            out = out.auth(AuthAlgorithm::new(
                Algorithm::with_key_len(auth_name(sa.auth), key.bits as u32, key.key),
                None,
            ));
        }
        if let Some(SadbExt::LifetimeCurrent(lt)) = self.find(SADB_EXT_LIFETIME_CURRENT) {
            out.current = LifetimeCurrent {
                bytes: lt.bytes.get(),
                packets: 0,
                add_time: lt.addtime.get(),
                use_time: lt.usetime.get(),
            };
        }
        Ok(out)
    }
}

/// Build an SADB_ADD message for an SA.
///
/// Fails with `InvalidAlgorithm` for descriptors PF_KEY cannot express.
pub fn add_message(sa: &SecurityAssociation, seq: u32, pid: u32) -> Result<PfKeyMessage> {
    sa.validate()?;
    if sa.aead.is_some() || sa.compression.is_some() {
        return Err(Error::InvalidAlgorithm(
            "AEAD and compression SAs cannot be added through PF_KEY".into(),
        ));
    }
    let auth = sa.auth.as_ref().map(|a| &a.algorithm);
    let auth = auth.map(|a| auth_id(a).map(|id| (id, a))).transpose()?;
    let enc = sa
        .encryption
        .as_ref()
        .map(|e| encrypt_id(e).map(|id| (id, e)))
        .transpose()?;

    let header = SadbMsg::new(SADB_ADD, satype(sa.id.protocol)?, seq, pid);
    let mut msg = PfKeyMessage::new(header)
        .ext(SadbExt::Sa(SadbSa {
            spi: U32::new(sa.id.spi),
            replay: sa.replay_window,
            state: SADB_SASTATE_MATURE,
            auth: auth.map(|(id, _)| id).unwrap_or(SADB_AALG_NONE),
            encrypt: enc.map(|(id, _)| id).unwrap_or(SADB_EALG_NONE),
            flags: 0,
        }))
        .ext(SadbExt::Sa2(SadbXSa2 {
            mode: mode_number(sa.mode),
            reqid: sa.reqid,
            ..Default::default()
        }))
        .ext(SadbExt::SrcAddress(SadbAddress::host(sa.id.src)))
        .ext(SadbExt::DstAddress(SadbAddress::host(sa.id.dst)));

    if let Some((_, alg)) = auth
        && !alg.key.is_empty()
    {
        msg = msg.ext(SadbExt::AuthKey(SadbKey::new(&alg.key, alg.key_len)));
    }
    if let Some((_, alg)) = enc
        && !alg.key.is_empty()
    {
        msg = msg.ext(SadbExt::EncryptKey(SadbKey::new(&alg.key, alg.key_len)));
    }
    Ok(msg)
}

/// Build an SADB_DELETE message.
pub fn delete_message(id: &SaId, seq: u32, pid: u32) -> Result<PfKeyMessage> {
    let header = SadbMsg::new(SADB_DELETE, satype(id.protocol)?, seq, pid);
    Ok(PfKeyMessage::new(header)
        .ext(SadbExt::Sa(SadbSa {
            spi: U32::new(id.spi),
            ..Default::default()
        }))
        .ext(SadbExt::SrcAddress(SadbAddress::host(id.src)))
        .ext(SadbExt::DstAddress(SadbAddress::host(id.dst))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipsec::algorithm::AuthAlgorithm;

    const ENC_KEY: [u8; 32] = [0x30; 32];

    fn sample_sa() -> SecurityAssociation {
        SecurityAssociation::new(SaId::esp(
            "192.0.2.1".parse().unwrap(),
            "192.0.2.2".parse().unwrap(),
            0xdeadbeef,
        ))
        .reqid(54321)
        .encryption(Algorithm::cbc_aes(ENC_KEY))
        .auth(AuthAlgorithm::new(Algorithm::new(HMAC_SHA256, ENC_KEY), None))
    }

    #[test]
    fn struct_sizes() {
        assert_eq!(SadbMsg::SIZE, 16);
        assert_eq!(SadbSa::SIZE, 12);
        assert_eq!(SadbLifetime::SIZE, 28);
        assert_eq!(SadbXSa2::SIZE, 12);
    }

    #[test]
    fn add_message_layout() {
        let msg = add_message(&sample_sa(), 1, 42).unwrap();
        let bytes = msg.encode();
        assert_eq!(bytes.len() % 8, 0);
        assert_eq!(bytes[0], PF_KEY_V2);
        assert_eq!(bytes[1], SADB_ADD);
        assert_eq!(bytes[3], SADB_SATYPE_ESP);
        assert_eq!(u16::from_ne_bytes([bytes[4], bytes[5]]) as usize * 8, bytes.len());

        // sadb_sa follows the header: len 2 units, type 1, big-endian SPI.
        assert_eq!(u16::from_ne_bytes([bytes[16], bytes[17]]), 2);
        assert_eq!(u16::from_ne_bytes([bytes[18], bytes[19]]), SADB_EXT_SA);
        assert_eq!(&bytes[20..24], &[0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(bytes[24], 4);
        assert_eq!(bytes[25], SADB_SASTATE_MATURE);
        assert_eq!(bytes[26], SADB_X_AALG_SHA2_256HMAC);
        assert_eq!(bytes[27], SADB_X_EALG_AESCBC);
    }

    #[test]
    fn decode_what_was_encoded() {
        let msg = add_message(&sample_sa(), 7, 42).unwrap();
        let decoded = PfKeyMessage::decode(&msg.encode()).unwrap();
        assert_eq!(decoded.header.len as usize * 8, msg.encode().len());
        assert_eq!(decoded.extensions, msg.extensions);

        let sa = decoded.to_sa().unwrap();
        assert_eq!(sa.spi(), 0xdeadbeef);
        assert_eq!(sa.reqid, 54321);
        assert_eq!(sa.mode, Mode::Transport);
        assert_eq!(sa.encryption.as_ref().unwrap().key_len, 256);
        assert!(sa.auth.as_ref().unwrap().algorithm.is(HMAC_SHA256));
    }

    #[test]
    fn ipv6_address_padded() {
        let addr = SadbExt::SrcAddress(SadbAddress::host("2001:db8::1".parse().unwrap()));
        let bytes = addr.encode();
        // 4 header + 4 address fields + 28 sockaddr_in6, padded to 40.
        assert_eq!(bytes.len(), 40);
        assert_eq!(u16::from_ne_bytes([bytes[0], bytes[1]]), 5);
        assert_eq!(bytes[5], 128);
    }

    #[test]
    fn unknown_algorithm_rejected_before_send() {
        let sa = sample_sa().encryption(Algorithm::new("cbc(camellia)", [0u8; 16]));
        let err = add_message(&sa, 1, 1).unwrap_err();
        assert!(matches!(err, Error::InvalidAlgorithm(_)));

        let sa = sample_sa().aead(crate::ipsec::algorithm::AeadAlgorithm::rfc4106_gcm_aes(
            [0u8; 20], 128,
        ));
        assert!(add_message(&sa, 1, 1).is_err());
    }

    #[test]
    fn unknown_extension_kept_raw() {
        let msg = PfKeyMessage::new(SadbMsg::new(SADB_DUMP, 0, 0, 1)).ext(SadbExt::Unknown {
            ext_type: 200,
            body: vec![1, 2, 3, 4],
        });
        let decoded = PfKeyMessage::decode(&msg.encode()).unwrap();
        assert_eq!(decoded.extensions, msg.extensions);
    }

    #[test]
    fn truncated_extension_is_format_error() {
        let bytes = add_message(&sample_sa(), 1, 1).unwrap().encode();
        let mut cut = bytes[..40].to_vec();
        // Keep the header length pointing past the end.
        cut[4..6].copy_from_slice(&units(bytes.len()).to_ne_bytes());
        assert!(PfKeyMessage::decode(&cut).unwrap_err().is_format());
    }

    #[test]
    fn algorithm_names() {
        assert_eq!(encrypt_name(SADB_EALG_NULL), "ecb(cipher_null)");
        assert_eq!(auth_name(SADB_X_AALG_NULL), "digest_null");
        assert_eq!(auth_name(99), "sadb_alg_99");
        assert_eq!(mode_number(Mode::Beet), 3);
        assert_eq!(mode_of(2), Mode::Tunnel);
    }

    #[test]
    fn delete_carries_only_identity() {
        let id = sample_sa().id;
        let msg = delete_message(&id, 3, 9).unwrap();
        assert_eq!(msg.header.msg_type, SADB_DELETE);
        assert_eq!(msg.extensions.len(), 3);
        let Some(SadbExt::Sa(sa)) = msg.find(SADB_EXT_SA) else {
            panic!("missing SA extension");
        };
        assert_eq!(sa.spi.get(), 0xdeadbeef);
        assert_eq!(sa.encrypt, 0);
    }
}
