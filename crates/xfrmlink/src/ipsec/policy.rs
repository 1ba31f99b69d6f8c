//! Security policies and their SA templates.

use std::fmt;
use std::net::IpAddr;

#[cfg(feature = "output")]
use serde::Serialize;

use super::sa::{LifetimeConfig, LifetimeCurrent, Mark, Selector};
use super::{Family, IpsecProtocol, Mode};

// Policy directions
const XFRM_POLICY_IN: u8 = 0;
const XFRM_POLICY_OUT: u8 = 1;
const XFRM_POLICY_FWD: u8 = 2;

// Policy actions
const XFRM_POLICY_ALLOW: u8 = 0;
const XFRM_POLICY_BLOCK: u8 = 1;

/// Policy flag: permit locally generated traffic that matches no SA.
pub const XFRM_POLICY_LOCALOK: u8 = 1;

/// Template share modes.
pub const XFRM_SHARE_ANY: u8 = 0;
pub const XFRM_SHARE_UNIQUE: u8 = 3;

/// Policy direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "output", derive(Serialize), serde(rename_all = "lowercase"))]
pub enum PolicyDirection {
    /// Incoming traffic.
    In,
    /// Outgoing traffic.
    Out,
    /// Forwarded traffic.
    Forward,
    /// Unknown direction.
    Unknown(u8),
}

impl PolicyDirection {
    pub fn from_u8(val: u8) -> Self {
        match val {
            XFRM_POLICY_IN => Self::In,
            XFRM_POLICY_OUT => Self::Out,
            XFRM_POLICY_FWD => Self::Forward,
            other => Self::Unknown(other),
        }
    }

    pub fn number(&self) -> u8 {
        match self {
            Self::In => XFRM_POLICY_IN,
            Self::Out => XFRM_POLICY_OUT,
            Self::Forward => XFRM_POLICY_FWD,
            Self::Unknown(n) => *n,
        }
    }
}

impl fmt::Display for PolicyDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::In => write!(f, "in"),
            Self::Out => write!(f, "out"),
            Self::Forward => write!(f, "fwd"),
            Self::Unknown(n) => write!(f, "{}", n),
        }
    }
}

/// Policy action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "output", derive(Serialize), serde(rename_all = "lowercase"))]
pub enum PolicyAction {
    /// Allow traffic.
    #[default]
    Allow,
    /// Block traffic.
    Block,
    /// Unknown action.
    Unknown(u8),
}

impl PolicyAction {
    pub fn from_u8(val: u8) -> Self {
        match val {
            XFRM_POLICY_ALLOW => Self::Allow,
            XFRM_POLICY_BLOCK => Self::Block,
            other => Self::Unknown(other),
        }
    }

    pub fn number(&self) -> u8 {
        match self {
            Self::Allow => XFRM_POLICY_ALLOW,
            Self::Block => XFRM_POLICY_BLOCK,
            Self::Unknown(n) => *n,
        }
    }
}

impl fmt::Display for PolicyAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Allow => write!(f, "allow"),
            Self::Block => write!(f, "block"),
            Self::Unknown(n) => write!(f, "{}", n),
        }
    }
}

/// A reference from a policy to the SA that must process its traffic.
///
/// Matches SAs by SPI, protocol, mode and reqid; never carries keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "output", derive(Serialize))]
pub struct PolicyTemplate {
    pub family: Family,
    /// Tunnel source, unspecified in transport mode.
    pub src: IpAddr,
    /// Tunnel destination, unspecified in transport mode.
    pub dst: IpAddr,
    pub spi: u32,
    pub protocol: IpsecProtocol,
    pub reqid: u32,
    pub mode: Mode,
    pub share: u8,
    /// Traffic may bypass this template when no SA matches.
    pub optional: bool,
    /// Allowed algorithm bitmaps.
    pub aalgos: u32,
    pub ealgos: u32,
    pub calgos: u32,
}

impl PolicyTemplate {
    /// ESP template; tunnel mode when endpoints are given, transport otherwise.
    pub fn new(family: Family, spi: u32, reqid: u32, tunnel: Option<(IpAddr, IpAddr)>) -> Self {
        let (src, dst, mode) = match tunnel {
            Some((src, dst)) => (src, dst, Mode::Tunnel),
            None => (family.any_addr(), family.any_addr(), Mode::Transport),
        };
        Self {
            family: tunnel.map(|(_, dst)| Family::of(&dst)).unwrap_or(family),
            src,
            dst,
            spi,
            protocol: IpsecProtocol::Esp,
            reqid,
            mode,
            share: XFRM_SHARE_ANY,
            optional: false,
            aalgos: u32::MAX,
            ealgos: u32::MAX,
            calgos: u32::MAX,
        }
    }
}

/// A security policy.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "output", derive(Serialize))]
pub struct SecurityPolicy {
    pub selector: Selector,
    pub direction: PolicyDirection,
    pub action: PolicyAction,
    pub priority: u32,
    /// Kernel-assigned index; ignored on add.
    pub index: u32,
    pub flags: u8,
    pub share: u8,
    pub lifetime: LifetimeConfig,
    pub current: LifetimeCurrent,
    pub templates: Vec<PolicyTemplate>,
    pub mark: Option<Mark>,
    pub if_id: Option<u32>,
}

impl SecurityPolicy {
    /// Allow policy with no templates.
    pub fn new(direction: PolicyDirection, selector: Selector) -> Self {
        Self {
            selector,
            direction,
            action: PolicyAction::Allow,
            priority: 0,
            index: 0,
            flags: XFRM_POLICY_LOCALOK,
            share: XFRM_SHARE_UNIQUE,
            lifetime: LifetimeConfig::default(),
            current: LifetimeCurrent::default(),
            templates: Vec::new(),
            mark: None,
            if_id: None,
        }
    }

    pub fn action(mut self, action: PolicyAction) -> Self {
        self.action = action;
        self
    }

    pub fn priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    pub fn flags(mut self, flags: u8) -> Self {
        self.flags = flags;
        self
    }

    pub fn template(mut self, template: PolicyTemplate) -> Self {
        self.templates.push(template);
        self
    }

    pub fn mark(mut self, mark: Mark) -> Self {
        self.mark = Some(mark);
        self
    }

    pub fn if_id(mut self, if_id: u32) -> Self {
        self.if_id = Some(if_id);
        self
    }
}

/// Renders the policy the way `ip xfrm policy` does.
impl fmt::Display for SecurityPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.selector)?;
        write!(f, "\tdir {} priority {} ", self.direction, self.priority)?;
        if self.action != PolicyAction::Allow {
            write!(f, "action {} ", self.action)?;
        }
        writeln!(f)?;
        if let Some(mark) = &self.mark {
            writeln!(f, "\tmark 0x{:x}/0x{:x}", mark.value, mark.mask)?;
        }
        for tmpl in &self.templates {
            writeln!(f, "\ttmpl src {} dst {}", tmpl.src, tmpl.dst)?;
            writeln!(
                f,
                "\t\tproto {} spi 0x{:08x} reqid {} mode {}",
                tmpl.protocol, tmpl.spi, tmpl.reqid, tmpl.mode
            )?;
        }
        Ok(())
    }
}
