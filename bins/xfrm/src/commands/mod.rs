//! Command implementations.

pub mod esp;
pub mod pfkey;
pub mod policy;
pub mod state;

use clap::ValueEnum;
use xfrmlink::ipsec::IpsecProtocol;

/// IPsec protocol as given on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ProtoArg {
    Esp,
    Ah,
    Comp,
}

impl From<ProtoArg> for IpsecProtocol {
    fn from(proto: ProtoArg) -> Self {
        match proto {
            ProtoArg::Esp => IpsecProtocol::Esp,
            ProtoArg::Ah => IpsecProtocol::Ah,
            ProtoArg::Comp => IpsecProtocol::Comp,
        }
    }
}

/// Parse a decimal or `0x`-prefixed hex number.
pub fn parse_u32(s: &str) -> Result<u32, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid number '{}': {}", s, e))
}
