//! Fixed-layout wire records.
//!
//! Every kernel struct this crate exchanges is a `#[repr(C)]` zerocopy type
//! with explicit padding, so encoding is a byte copy and decoding a checked
//! read. Fields visible on the wire in network order (SPIs, ports) use
//! zerocopy's big-endian integers; everything else is host order.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::netlink::{Error, Result};

/// A fixed-size record with a defined byte layout.
pub trait WireStruct: FromBytes + IntoBytes + Immutable + KnownLayout + Copy {
    /// Encoded size in bytes.
    const SIZE: usize = std::mem::size_of::<Self>();

    /// Encode into a new buffer of exactly [`Self::SIZE`] bytes.
    fn encode(&self) -> Vec<u8> {
        self.as_bytes().to_vec()
    }

    /// Decode from the front of `data`, returning the record and the number
    /// of bytes consumed.
    fn decode(data: &[u8]) -> Result<(Self, usize)> {
        Self::read_from_prefix(data)
            .map(|(value, _)| (value, Self::SIZE))
            .map_err(|_| Error::Truncated {
                expected: Self::SIZE,
                actual: data.len(),
            })
    }
}
