//! The 8-byte ESP header.

use std::fmt;

use zerocopy::network_endian::U32;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::codec::WireStruct;
use crate::netlink::Result;

/// ESP header (RFC 4303): SPI and sequence number, both big-endian.
#[repr(C)]
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout,
)]
pub struct EspHeader {
    pub spi: U32,
    pub seq: U32,
}

impl WireStruct for EspHeader {}

impl EspHeader {
    /// Encoded length.
    pub const LEN: usize = 8;

    pub fn new(spi: u32, seq: u32) -> Self {
        Self {
            spi: U32::new(spi),
            seq: U32::new(seq),
        }
    }

    pub fn spi(&self) -> u32 {
        self.spi.get()
    }

    pub fn seq(&self) -> u32 {
        self.seq.get()
    }

    pub fn pack(&self) -> [u8; Self::LEN] {
        let mut buf = [0u8; Self::LEN];
        buf.copy_from_slice(self.as_bytes());
        buf
    }

    /// Read the header from the front of `data`.
    pub fn unpack(data: &[u8]) -> Result<Self> {
        Self::decode(data).map(|(hdr, _)| hdr)
    }
}

impl fmt::Display for EspHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "spi 0x{:08x} seq {}", self.spi(), self.seq())
    }
}
