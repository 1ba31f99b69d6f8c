//! XFRM kernel structures (from linux/xfrm.h).
//!
//! Layouts match x86_64 and other LP64 targets. Padding is explicit so every
//! struct is `IntoBytes`.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use zerocopy::network_endian::{U16, U32};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::codec::WireStruct;
use crate::ipsec::policy::{PolicyAction, PolicyDirection, PolicyTemplate, SecurityPolicy};
use crate::ipsec::sa::{EncapTemplate, LifetimeConfig, LifetimeCurrent, Mark, SaStats, Selector};
use crate::ipsec::{Family, IpsecProtocol, Mode};

// XFRM attribute types
pub const XFRMA_ALG_AUTH: u16 = 1;
pub const XFRMA_ALG_CRYPT: u16 = 2;
pub const XFRMA_ALG_COMP: u16 = 3;
pub const XFRMA_ENCAP: u16 = 4;
pub const XFRMA_TMPL: u16 = 5;
pub const XFRMA_ALG_AEAD: u16 = 18;
pub const XFRMA_ALG_AUTH_TRUNC: u16 = 20;
pub const XFRMA_MARK: u16 = 21;
/// Also known as XFRMA_SET_MARK.
pub const XFRMA_OUTPUT_MARK: u16 = 29;
pub const XFRMA_SET_MARK_MASK: u16 = 30;
pub const XFRMA_IF_ID: u16 = 31;

/// XFRM address (16 bytes, can hold IPv4 or IPv6).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct XfrmAddress {
    /// Raw address bytes (4 bytes for IPv4, 16 for IPv6).
    pub bytes: [u8; 16],
}

impl XfrmAddress {
    pub fn from_ip(addr: IpAddr) -> Self {
        let mut bytes = [0u8; 16];
        match addr {
            IpAddr::V4(v4) => bytes[..4].copy_from_slice(&v4.octets()),
            IpAddr::V6(v6) => bytes = v6.octets(),
        }
        Self { bytes }
    }

    /// Interpret according to `family`: IPv4 uses the first four bytes,
    /// anything else is read as IPv6.
    pub fn to_ip(&self, family: Family) -> IpAddr {
        match family {
            Family::Inet => IpAddr::V4(Ipv4Addr::new(
                self.bytes[0],
                self.bytes[1],
                self.bytes[2],
                self.bytes[3],
            )),
            _ => IpAddr::V6(Ipv6Addr::from(self.bytes)),
        }
    }
}

/// XFRM ID (identifies an SA by destination, SPI, and protocol).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct XfrmId {
    pub daddr: XfrmAddress,
    pub spi: U32,
    pub proto: u8,
    pub _pad: [u8; 3],
}

/// XFRM selector (traffic selector for policies/SAs).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct XfrmSelector {
    pub daddr: XfrmAddress,
    pub saddr: XfrmAddress,
    pub dport: U16,
    pub dport_mask: U16,
    pub sport: U16,
    pub sport_mask: U16,
    pub family: u16,
    pub prefixlen_d: u8,
    pub prefixlen_s: u8,
    pub proto: u8,
    pub _pad1: [u8; 3],
    pub ifindex: i32,
    pub user: u32,
}

impl From<&Selector> for XfrmSelector {
    fn from(sel: &Selector) -> Self {
        Self {
            daddr: XfrmAddress::from_ip(sel.dst),
            saddr: XfrmAddress::from_ip(sel.src),
            dport: U16::new(sel.dport),
            dport_mask: U16::new(sel.dport_mask),
            sport: U16::new(sel.sport),
            sport_mask: U16::new(sel.sport_mask),
            family: sel.family.number(),
            prefixlen_d: sel.dst_prefix_len,
            prefixlen_s: sel.src_prefix_len,
            proto: sel.proto,
            _pad1: [0; 3],
            ifindex: sel.ifindex,
            user: sel.user,
        }
    }
}

impl XfrmSelector {
    pub fn to_selector(&self) -> Selector {
        let family = Family::from_u16(self.family);
        Selector {
            family,
            src: self.saddr.to_ip(family),
            src_prefix_len: self.prefixlen_s,
            dst: self.daddr.to_ip(family),
            dst_prefix_len: self.prefixlen_d,
            sport: self.sport.get(),
            sport_mask: self.sport_mask.get(),
            dport: self.dport.get(),
            dport_mask: self.dport_mask.get(),
            proto: self.proto,
            ifindex: self.ifindex,
            user: self.user,
        }
    }
}

/// XFRM lifetime configuration.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct XfrmLifetimeCfg {
    pub soft_byte_limit: u64,
    pub hard_byte_limit: u64,
    pub soft_packet_limit: u64,
    pub hard_packet_limit: u64,
    pub soft_add_expires_seconds: u64,
    pub hard_add_expires_seconds: u64,
    pub soft_use_expires_seconds: u64,
    pub hard_use_expires_seconds: u64,
}

impl From<&LifetimeConfig> for XfrmLifetimeCfg {
    fn from(lft: &LifetimeConfig) -> Self {
        Self {
            soft_byte_limit: lft.soft_byte_limit,
            hard_byte_limit: lft.hard_byte_limit,
            soft_packet_limit: lft.soft_packet_limit,
            hard_packet_limit: lft.hard_packet_limit,
            soft_add_expires_seconds: lft.soft_add_expires_seconds,
            hard_add_expires_seconds: lft.hard_add_expires_seconds,
            soft_use_expires_seconds: lft.soft_use_expires_seconds,
            hard_use_expires_seconds: lft.hard_use_expires_seconds,
        }
    }
}

impl From<&XfrmLifetimeCfg> for LifetimeConfig {
    fn from(lft: &XfrmLifetimeCfg) -> Self {
        Self {
            soft_byte_limit: lft.soft_byte_limit,
            hard_byte_limit: lft.hard_byte_limit,
            soft_packet_limit: lft.soft_packet_limit,
            hard_packet_limit: lft.hard_packet_limit,
            soft_add_expires_seconds: lft.soft_add_expires_seconds,
            hard_add_expires_seconds: lft.hard_add_expires_seconds,
            soft_use_expires_seconds: lft.soft_use_expires_seconds,
            hard_use_expires_seconds: lft.hard_use_expires_seconds,
        }
    }
}

/// XFRM lifetime current values.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct XfrmLifetimeCur {
    pub bytes: u64,
    pub packets: u64,
    pub add_time: u64,
    pub use_time: u64,
}

impl From<&XfrmLifetimeCur> for LifetimeCurrent {
    fn from(cur: &XfrmLifetimeCur) -> Self {
        Self {
            bytes: cur.bytes,
            packets: cur.packets,
            add_time: cur.add_time,
            use_time: cur.use_time,
        }
    }
}

/// XFRM statistics.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct XfrmStats {
    pub replay_window: u32,
    pub replay: u32,
    pub integrity_failed: u32,
}

impl From<&XfrmStats> for SaStats {
    fn from(stats: &XfrmStats) -> Self {
        Self {
            replay_window: stats.replay_window,
            replay: stats.replay,
            integrity_failed: stats.integrity_failed,
        }
    }
}

/// struct xfrm_usersa_info: body of NEWSA/UPDSA and of SA dump entries.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct XfrmUsersaInfo {
    pub sel: XfrmSelector,
    pub id: XfrmId,
    pub saddr: XfrmAddress,
    pub lft: XfrmLifetimeCfg,
    pub curlft: XfrmLifetimeCur,
    pub stats: XfrmStats,
    pub seq: u32,
    pub reqid: u32,
    pub family: u16,
    pub mode: u8,
    pub replay_window: u8,
    pub flags: u8,
    pub _pad: [u8; 7],
}

/// struct xfrm_usersa_id: key of DELSA/GETSA.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct XfrmUsersaId {
    pub daddr: XfrmAddress,
    pub spi: U32,
    pub family: u16,
    pub proto: u8,
    pub _pad: u8,
}

/// struct xfrm_userspi_info: body of ALLOCSPI.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct XfrmUserspiInfo {
    pub info: XfrmUsersaInfo,
    pub min: u32,
    pub max: u32,
}

/// struct xfrm_usersa_flush.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct XfrmUsersaFlush {
    pub proto: u8,
}

/// struct xfrm_userpolicy_info: body of NEWPOLICY/UPDPOLICY, of policy dump
/// entries and of socket policies.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct XfrmUserpolicyInfo {
    pub sel: XfrmSelector,
    pub lft: XfrmLifetimeCfg,
    pub curlft: XfrmLifetimeCur,
    pub priority: u32,
    pub index: u32,
    pub dir: u8,
    pub action: u8,
    pub flags: u8,
    pub share: u8,
    pub _pad: [u8; 4],
}

impl From<&SecurityPolicy> for XfrmUserpolicyInfo {
    fn from(pol: &SecurityPolicy) -> Self {
        Self {
            sel: XfrmSelector::from(&pol.selector),
            lft: XfrmLifetimeCfg::from(&pol.lifetime),
            curlft: XfrmLifetimeCur::default(),
            priority: pol.priority,
            index: pol.index,
            dir: pol.direction.number(),
            action: pol.action.number(),
            flags: pol.flags,
            share: pol.share,
            _pad: [0; 4],
        }
    }
}

impl XfrmUserpolicyInfo {
    /// Policy fields; templates, mark and interface id come from attributes.
    pub fn to_policy(&self) -> SecurityPolicy {
        SecurityPolicy {
            selector: self.sel.to_selector(),
            direction: PolicyDirection::from_u8(self.dir),
            action: PolicyAction::from_u8(self.action),
            priority: self.priority,
            index: self.index,
            flags: self.flags,
            share: self.share,
            lifetime: LifetimeConfig::from(&self.lft),
            current: LifetimeCurrent {
                bytes: self.curlft.bytes,
                packets: self.curlft.packets,
                add_time: self.curlft.add_time,
                use_time: self.curlft.use_time,
            },
            templates: Vec::new(),
            mark: None,
            if_id: None,
        }
    }
}

/// struct xfrm_userpolicy_id: key of DELPOLICY/GETPOLICY.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct XfrmUserpolicyId {
    pub sel: XfrmSelector,
    pub index: u32,
    pub dir: u8,
    pub _pad: [u8; 3],
}

/// struct xfrm_user_tmpl: one entry of XFRMA_TMPL.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct XfrmUserTmpl {
    pub id: XfrmId,
    pub family: u16,
    pub _pad1: [u8; 2],
    pub saddr: XfrmAddress,
    pub reqid: u32,
    pub mode: u8,
    pub share: u8,
    pub optional: u8,
    pub _pad2: u8,
    pub aalgos: u32,
    pub ealgos: u32,
    pub calgos: u32,
}

impl From<&PolicyTemplate> for XfrmUserTmpl {
    fn from(tmpl: &PolicyTemplate) -> Self {
        Self {
            id: XfrmId {
                daddr: XfrmAddress::from_ip(tmpl.dst),
                spi: U32::new(tmpl.spi),
                proto: tmpl.protocol.number(),
                _pad: [0; 3],
            },
            family: tmpl.family.number(),
            _pad1: [0; 2],
            saddr: XfrmAddress::from_ip(tmpl.src),
            reqid: tmpl.reqid,
            mode: tmpl.mode.number(),
            share: tmpl.share,
            optional: tmpl.optional as u8,
            _pad2: 0,
            aalgos: tmpl.aalgos,
            ealgos: tmpl.ealgos,
            calgos: tmpl.calgos,
        }
    }
}

impl XfrmUserTmpl {
    pub fn to_template(&self) -> PolicyTemplate {
        let family = Family::from_u16(self.family);
        PolicyTemplate {
            family,
            src: self.saddr.to_ip(family),
            dst: self.id.daddr.to_ip(family),
            spi: self.id.spi.get(),
            protocol: IpsecProtocol::from_u8(self.id.proto),
            reqid: self.reqid,
            mode: Mode::from_u8(self.mode),
            share: self.share,
            optional: self.optional != 0,
            aalgos: self.aalgos,
            ealgos: self.ealgos,
            calgos: self.calgos,
        }
    }
}

/// struct xfrm_algo header; the key follows.
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct XfrmAlgo {
    pub alg_name: [u8; 64],
    /// Key length in bits.
    pub alg_key_len: u32,
}

/// struct xfrm_algo_auth header; the key follows.
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct XfrmAlgoAuth {
    pub alg_name: [u8; 64],
    pub alg_key_len: u32,
    /// Truncated ICV length in bits.
    pub alg_trunc_len: u32,
}

/// struct xfrm_algo_aead header; the key follows.
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct XfrmAlgoAead {
    pub alg_name: [u8; 64],
    pub alg_key_len: u32,
    /// ICV length in bits.
    pub alg_icv_len: u32,
}

/// Fill a fixed name field. The caller checks the name fits.
pub(crate) fn name_field(name: &str) -> [u8; 64] {
    let mut field = [0u8; 64];
    let len = name.len().min(63);
    field[..len].copy_from_slice(&name.as_bytes()[..len]);
    field
}

/// XFRM encapsulation template.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct XfrmEncapTmpl {
    pub encap_type: u16,
    pub encap_sport: U16,
    pub encap_dport: U16,
    pub _pad: u16,
    pub encap_oa: XfrmAddress,
}

impl From<&EncapTemplate> for XfrmEncapTmpl {
    fn from(encap: &EncapTemplate) -> Self {
        Self {
            encap_type: encap.encap_type,
            encap_sport: U16::new(encap.sport),
            encap_dport: U16::new(encap.dport),
            _pad: 0,
            encap_oa: XfrmAddress::from_ip(encap.original_address),
        }
    }
}

impl XfrmEncapTmpl {
    pub fn to_template(&self, family: Family) -> EncapTemplate {
        EncapTemplate {
            encap_type: self.encap_type,
            sport: self.encap_sport.get(),
            dport: self.encap_dport.get(),
            original_address: self.encap_oa.to_ip(family),
        }
    }
}

/// XFRM mark.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct XfrmMark {
    pub v: u32,
    pub m: u32,
}

impl From<&Mark> for XfrmMark {
    fn from(mark: &Mark) -> Self {
        Self {
            v: mark.value,
            m: mark.mask,
        }
    }
}

impl From<&XfrmMark> for Mark {
    fn from(mark: &XfrmMark) -> Self {
        Self::new(mark.v, mark.m)
    }
}

impl WireStruct for XfrmAddress {}
impl WireStruct for XfrmId {}
impl WireStruct for XfrmSelector {}
impl WireStruct for XfrmLifetimeCfg {}
impl WireStruct for XfrmLifetimeCur {}
impl WireStruct for XfrmStats {}
impl WireStruct for XfrmUsersaInfo {}
impl WireStruct for XfrmUsersaId {}
impl WireStruct for XfrmUserspiInfo {}
impl WireStruct for XfrmUsersaFlush {}
impl WireStruct for XfrmUserpolicyInfo {}
impl WireStruct for XfrmUserpolicyId {}
impl WireStruct for XfrmUserTmpl {}
impl WireStruct for XfrmAlgo {}
impl WireStruct for XfrmAlgoAuth {}
impl WireStruct for XfrmAlgoAead {}
impl WireStruct for XfrmEncapTmpl {}
impl WireStruct for XfrmMark {}
