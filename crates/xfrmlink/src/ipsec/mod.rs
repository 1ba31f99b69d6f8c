//! Protocol-independent IPsec model.
//!
//! These types describe SAs and policies the same way regardless of which
//! control protocol (XFRM netlink or PF_KEY) carries them.

pub mod algorithm;
pub mod lifecycle;
pub mod policy;
pub mod sa;

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

#[cfg(feature = "output")]
use serde::Serialize;

pub use algorithm::{AeadAlgorithm, Algorithm, AuthAlgorithm};
pub use lifecycle::SaLifecycle;
pub use policy::{PolicyAction, PolicyDirection, PolicyTemplate, SecurityPolicy};
pub use sa::{
    EncapTemplate, LifetimeConfig, LifetimeCurrent, Mark, SaId, SaStats, SecurityAssociation,
    Selector,
};

/// Address family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "output", derive(Serialize), serde(rename_all = "lowercase"))]
pub enum Family {
    Unspec,
    Inet,
    Inet6,
    Other(u16),
}

impl Family {
    /// Family of an address.
    pub fn of(addr: &IpAddr) -> Self {
        match addr {
            IpAddr::V4(_) => Self::Inet,
            IpAddr::V6(_) => Self::Inet6,
        }
    }

    pub fn from_u16(val: u16) -> Self {
        match val as i32 {
            libc::AF_UNSPEC => Self::Unspec,
            libc::AF_INET => Self::Inet,
            libc::AF_INET6 => Self::Inet6,
            _ => Self::Other(val),
        }
    }

    /// Get the `AF_*` number.
    pub fn number(&self) -> u16 {
        match self {
            Self::Unspec => libc::AF_UNSPEC as u16,
            Self::Inet => libc::AF_INET as u16,
            Self::Inet6 => libc::AF_INET6 as u16,
            Self::Other(n) => *n,
        }
    }

    /// The all-zero address of this family. IPv4 unless the family is IPv6.
    pub fn any_addr(&self) -> IpAddr {
        match self {
            Self::Inet6 => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
            _ => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        }
    }

    /// Full-length prefix for host selectors.
    pub fn max_prefix_len(&self) -> u8 {
        match self {
            Self::Inet6 => 128,
            _ => 32,
        }
    }
}

/// IPsec protocol numbers.
pub const IPPROTO_ESP: u8 = 50;
pub const IPPROTO_AH: u8 = 51;
pub const IPPROTO_COMP: u8 = 108;
/// Matches any IPsec protocol in flush requests.
pub const IPSEC_PROTO_ANY: u8 = 255;

/// IPsec protocol type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "output", derive(Serialize), serde(rename_all = "lowercase"))]
pub enum IpsecProtocol {
    /// Encapsulating Security Payload.
    Esp,
    /// Authentication Header.
    Ah,
    /// IP Compression.
    Comp,
    /// Other protocol.
    Other(u8),
}

impl IpsecProtocol {
    pub fn from_u8(val: u8) -> Self {
        match val {
            IPPROTO_ESP => Self::Esp,
            IPPROTO_AH => Self::Ah,
            IPPROTO_COMP => Self::Comp,
            other => Self::Other(other),
        }
    }

    /// Get the protocol number.
    pub fn number(&self) -> u8 {
        match self {
            Self::Esp => IPPROTO_ESP,
            Self::Ah => IPPROTO_AH,
            Self::Comp => IPPROTO_COMP,
            Self::Other(n) => *n,
        }
    }
}

impl fmt::Display for IpsecProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Esp => write!(f, "esp"),
            Self::Ah => write!(f, "ah"),
            Self::Comp => write!(f, "comp"),
            Self::Other(n) => write!(f, "{}", n),
        }
    }
}

// XFRM modes
const XFRM_MODE_TRANSPORT: u8 = 0;
const XFRM_MODE_TUNNEL: u8 = 1;
const XFRM_MODE_BEET: u8 = 4;

/// SA mode, using the XFRM numbering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "output", derive(Serialize), serde(rename_all = "lowercase"))]
pub enum Mode {
    #[default]
    Transport,
    Tunnel,
    Beet,
    Other(u8),
}

impl Mode {
    pub fn from_u8(val: u8) -> Self {
        match val {
            XFRM_MODE_TRANSPORT => Self::Transport,
            XFRM_MODE_TUNNEL => Self::Tunnel,
            XFRM_MODE_BEET => Self::Beet,
            other => Self::Other(other),
        }
    }

    pub fn number(&self) -> u8 {
        match self {
            Self::Transport => XFRM_MODE_TRANSPORT,
            Self::Tunnel => XFRM_MODE_TUNNEL,
            Self::Beet => XFRM_MODE_BEET,
            Self::Other(n) => *n,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport => write!(f, "transport"),
            Self::Tunnel => write!(f, "tunnel"),
            Self::Beet => write!(f, "beet"),
            Self::Other(n) => write!(f, "{}", n),
        }
    }
}
