//! Security associations and their components.

use std::fmt;
use std::net::IpAddr;

#[cfg(feature = "output")]
use serde::Serialize;

use super::algorithm::{AeadAlgorithm, Algorithm, AuthAlgorithm};
use super::{Family, IpsecProtocol, Mode};
use crate::netlink::{Error, Result};

/// ESP-in-UDP encapsulation (RFC 3948).
pub const UDP_ENCAP_ESPINUDP: u16 = 2;

/// SA flag: the selector may have a different family than the SA.
pub const XFRM_STATE_AF_UNSPEC: u8 = 32;

/// Replay window the kernel tests use unless told otherwise.
pub const DEFAULT_REPLAY_WINDOW: u8 = 4;

/// SA identity: protocol, endpoints and SPI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "output", derive(Serialize))]
pub struct SaId {
    pub protocol: IpsecProtocol,
    pub src: IpAddr,
    pub dst: IpAddr,
    pub spi: u32,
}

impl SaId {
    pub fn new(protocol: IpsecProtocol, src: IpAddr, dst: IpAddr, spi: u32) -> Self {
        Self {
            protocol,
            src,
            dst,
            spi,
        }
    }

    /// ESP SA id.
    pub fn esp(src: IpAddr, dst: IpAddr, spi: u32) -> Self {
        Self::new(IpsecProtocol::Esp, src, dst, spi)
    }

    /// Address family, taken from the destination.
    pub fn family(&self) -> Family {
        Family::of(&self.dst)
    }
}

/// Traffic selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "output", derive(Serialize))]
pub struct Selector {
    pub family: Family,
    pub src: IpAddr,
    pub src_prefix_len: u8,
    pub dst: IpAddr,
    pub dst_prefix_len: u8,
    /// Host-order port; zero with a zero mask matches any.
    pub sport: u16,
    pub sport_mask: u16,
    pub dport: u16,
    pub dport_mask: u16,
    /// Upper-layer protocol, zero for any.
    pub proto: u8,
    pub ifindex: i32,
    pub user: u32,
}

impl Selector {
    /// The empty selector of a family: matches all of its traffic.
    pub fn any(family: Family) -> Self {
        let addr = family.any_addr();
        Self {
            family,
            src: addr,
            src_prefix_len: 0,
            dst: addr,
            dst_prefix_len: 0,
            sport: 0,
            sport_mask: 0,
            dport: 0,
            dport_mask: 0,
            proto: 0,
            ifindex: 0,
            user: 0,
        }
    }

    /// Selector matching exactly one source and destination host.
    pub fn host(src: IpAddr, dst: IpAddr) -> Self {
        let family = Family::of(&dst);
        Self {
            src,
            src_prefix_len: family.max_prefix_len(),
            dst,
            dst_prefix_len: family.max_prefix_len(),
            ..Self::any(family)
        }
    }

    /// Restrict to an upper-layer protocol.
    pub fn proto(mut self, proto: u8) -> Self {
        self.proto = proto;
        self
    }

    /// Restrict to exact source and destination ports.
    pub fn ports(mut self, sport: u16, dport: u16) -> Self {
        self.sport = sport;
        self.sport_mask = if sport == 0 { 0 } else { 0xffff };
        self.dport = dport;
        self.dport_mask = if dport == 0 { 0 } else { 0xffff };
        self
    }
}

fn proto_name(proto: u8) -> Option<&'static str> {
    match proto {
        1 => Some("icmp"),
        6 => Some("tcp"),
        17 => Some("udp"),
        58 => Some("ipv6-icmp"),
        _ => None,
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "src {}/{} dst {}/{} ",
            self.src, self.src_prefix_len, self.dst, self.dst_prefix_len
        )?;
        if self.proto != 0 {
            match proto_name(self.proto) {
                Some(name) => write!(f, "proto {} ", name)?,
                None => write!(f, "proto {} ", self.proto)?,
            }
        }
        if self.sport_mask != 0 {
            write!(f, "sport {} ", self.sport)?;
        }
        if self.dport_mask != 0 {
            write!(f, "dport {} ", self.dport)?;
        }
        if self.ifindex != 0 {
            write!(f, "dev {} ", self.ifindex)?;
        }
        Ok(())
    }
}

/// UDP encapsulation template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "output", derive(Serialize))]
pub struct EncapTemplate {
    pub encap_type: u16,
    /// Host-order source port.
    pub sport: u16,
    /// Host-order destination port.
    pub dport: u16,
    /// Original address before NAT, usually unspecified.
    pub original_address: IpAddr,
}

impl EncapTemplate {
    /// ESP-in-UDP between the given ports.
    pub fn esp_in_udp(sport: u16, dport: u16, original_address: IpAddr) -> Self {
        Self {
            encap_type: UDP_ENCAP_ESPINUDP,
            sport,
            dport,
            original_address,
        }
    }

    /// Template for the SA in the opposite direction.
    pub fn mirrored(&self) -> Self {
        Self {
            sport: self.dport,
            dport: self.sport,
            ..*self
        }
    }
}

/// Packet mark and mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "output", derive(Serialize))]
pub struct Mark {
    pub value: u32,
    pub mask: u32,
}

impl Mark {
    pub fn new(value: u32, mask: u32) -> Self {
        Self { value, mask }
    }

    /// Match the full mark value.
    pub fn exact(value: u32) -> Self {
        Self::new(value, u32::MAX)
    }
}

/// SA and policy lifetime limits. Zero means no limit to the kernel;
/// the default is effectively infinite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "output", derive(Serialize))]
pub struct LifetimeConfig {
    pub soft_byte_limit: u64,
    pub hard_byte_limit: u64,
    pub soft_packet_limit: u64,
    pub hard_packet_limit: u64,
    pub soft_add_expires_seconds: u64,
    pub hard_add_expires_seconds: u64,
    pub soft_use_expires_seconds: u64,
    pub hard_use_expires_seconds: u64,
}

impl Default for LifetimeConfig {
    fn default() -> Self {
        Self {
            soft_byte_limit: u64::MAX,
            hard_byte_limit: u64::MAX,
            soft_packet_limit: u64::MAX,
            hard_packet_limit: u64::MAX,
            soft_add_expires_seconds: 0,
            hard_add_expires_seconds: 0,
            soft_use_expires_seconds: 0,
            hard_use_expires_seconds: 0,
        }
    }
}

/// Usage counters reported by the kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "output", derive(Serialize))]
pub struct LifetimeCurrent {
    pub bytes: u64,
    pub packets: u64,
    pub add_time: u64,
    pub use_time: u64,
}

/// Replay and integrity counters reported by the kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "output", derive(Serialize))]
pub struct SaStats {
    pub replay_window: u32,
    pub replay: u32,
    pub integrity_failed: u32,
}

/// A security association.
///
/// # Example
///
/// ```ignore
/// use xfrmlink::ipsec::{Algorithm, AuthAlgorithm, Mode, SaId, SecurityAssociation};
///
/// let sa = SecurityAssociation::new(SaId::esp(src, dst, 0x1234))
///     .mode(Mode::Transport)
///     .reqid(3320)
///     .encryption(Algorithm::cbc_aes(enc_key))
///     .auth(AuthAlgorithm::hmac_sha1(auth_key));
/// conn.add_sa(&sa).await?;
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "output", derive(Serialize))]
pub struct SecurityAssociation {
    pub id: SaId,
    pub mode: Mode,
    pub reqid: u32,
    pub replay_window: u8,
    pub flags: u8,
    pub selector: Selector,
    pub encryption: Option<Algorithm>,
    pub auth: Option<AuthAlgorithm>,
    pub aead: Option<AeadAlgorithm>,
    pub compression: Option<Algorithm>,
    pub encap: Option<EncapTemplate>,
    pub mark: Option<Mark>,
    /// Mark applied to packets after transformation.
    pub output_mark: Option<Mark>,
    pub if_id: Option<u32>,
    pub lifetime: LifetimeConfig,
    pub current: LifetimeCurrent,
    pub stats: SaStats,
    pub seq: u32,
}

impl SecurityAssociation {
    /// Transport-mode SA with no algorithms and the empty selector of the
    /// id's family.
    pub fn new(id: SaId) -> Self {
        Self {
            selector: Selector::any(id.family()),
            id,
            mode: Mode::Transport,
            reqid: 0,
            replay_window: DEFAULT_REPLAY_WINDOW,
            flags: 0,
            encryption: None,
            auth: None,
            aead: None,
            compression: None,
            encap: None,
            mark: None,
            output_mark: None,
            if_id: None,
            lifetime: LifetimeConfig::default(),
            current: LifetimeCurrent::default(),
            stats: SaStats::default(),
            seq: 0,
        }
    }

    pub fn mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    pub fn reqid(mut self, reqid: u32) -> Self {
        self.reqid = reqid;
        self
    }

    pub fn replay_window(mut self, window: u8) -> Self {
        self.replay_window = window;
        self
    }

    pub fn flags(mut self, flags: u8) -> Self {
        self.flags = flags;
        self
    }

    pub fn selector(mut self, selector: Selector) -> Self {
        self.selector = selector;
        self
    }

    pub fn encryption(mut self, alg: Algorithm) -> Self {
        self.encryption = Some(alg);
        self
    }

    pub fn auth(mut self, alg: AuthAlgorithm) -> Self {
        self.auth = Some(alg);
        self
    }

    pub fn aead(mut self, alg: AeadAlgorithm) -> Self {
        self.aead = Some(alg);
        self
    }

    pub fn compression(mut self, alg: Algorithm) -> Self {
        self.compression = Some(alg);
        self
    }

    pub fn encap(mut self, encap: EncapTemplate) -> Self {
        self.encap = Some(encap);
        self
    }

    pub fn mark(mut self, mark: Mark) -> Self {
        self.mark = Some(mark);
        self
    }

    pub fn output_mark(mut self, mark: Mark) -> Self {
        self.output_mark = Some(mark);
        self
    }

    pub fn if_id(mut self, if_id: u32) -> Self {
        self.if_id = Some(if_id);
        self
    }

    pub fn lifetime(mut self, lifetime: LifetimeConfig) -> Self {
        self.lifetime = lifetime;
        self
    }

    pub fn spi(&self) -> u32 {
        self.id.spi
    }

    pub fn family(&self) -> Family {
        self.id.family()
    }

    /// Reject SAs the kernel would refuse because of a malformed descriptor.
    pub fn validate(&self) -> Result<()> {
        if Family::of(&self.id.src) != Family::of(&self.id.dst) {
            return Err(Error::InvalidMessage(format!(
                "SA endpoints {} and {} are of different families",
                self.id.src, self.id.dst
            )));
        }
        if let Some(alg) = &self.encryption {
            alg.validate()?;
        }
        if let Some(alg) = &self.auth {
            alg.validate()?;
        }
        if let Some(alg) = &self.aead {
            alg.validate()?;
        }
        if let Some(alg) = &self.compression {
            alg.validate()?;
        }
        Ok(())
    }
}

/// Renders the SA the way `ip xfrm state` does.
impl fmt::Display for SecurityAssociation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "src {} dst {}", self.id.src, self.id.dst)?;
        writeln!(
            f,
            "\tproto {} spi 0x{:08x} reqid {} mode {}",
            self.id.protocol, self.id.spi, self.reqid, self.mode
        )?;
        write!(f, "\treplay-window {} ", self.replay_window)?;
        if self.flags & XFRM_STATE_AF_UNSPEC != 0 {
            write!(f, "flag af-unspec")?;
        }
        writeln!(f)?;
        if let Some(mark) = &self.mark {
            writeln!(f, "\tmark 0x{:x}/0x{:x}", mark.value, mark.mask)?;
        }
        if let Some(auth) = &self.auth {
            match auth.trunc_len {
                Some(trunc) => writeln!(
                    f,
                    "\tauth-trunc {} {} {}",
                    auth.name(),
                    auth.algorithm.hex_key(),
                    trunc
                )?,
                None => writeln!(f, "\tauth {} {}", auth.name(), auth.algorithm.hex_key())?,
            }
        }
        if let Some(aead) = &self.aead {
            writeln!(
                f,
                "\taead {} {} {}",
                aead.algorithm.name,
                aead.algorithm.hex_key(),
                aead.icv_len
            )?;
        }
        if let Some(enc) = &self.encryption {
            writeln!(f, "\tenc {} {}", enc.name, enc.hex_key())?;
        }
        if let Some(comp) = &self.compression {
            writeln!(f, "\tcomp {}", comp.name)?;
        }
        if let Some(encap) = &self.encap {
            let kind = if encap.encap_type == UDP_ENCAP_ESPINUDP {
                "espinudp".to_string()
            } else {
                encap.encap_type.to_string()
            };
            writeln!(
                f,
                "\tencap type {} sport {} dport {} addr {}",
                kind, encap.sport, encap.dport, encap.original_address
            )?;
        }
        if let Some(mark) = &self.output_mark {
            writeln!(f, "\toutput-mark 0x{:x}/0x{:x}", mark.value, mark.mask)?;
        }
        if let Some(if_id) = self.if_id {
            writeln!(f, "\tif_id 0x{:x}", if_id)?;
        }
        writeln!(f, "\tsel {}", self.selector)
    }
}
