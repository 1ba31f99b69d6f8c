//! Netlink attribute (nlattr) handling.

use std::collections::BTreeMap;

use super::error::{Error, Result};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

/// Netlink attribute alignment.
pub const NLA_ALIGNTO: usize = 4;

/// Align a length to NLA_ALIGNTO boundary.
#[inline]
pub const fn nla_align(len: usize) -> usize {
    (len + NLA_ALIGNTO - 1) & !(NLA_ALIGNTO - 1)
}

/// Size of the attribute header.
pub const NLA_HDRLEN: usize = 4; // nla_align(size_of::<NlAttr>())

/// Netlink attribute header (mirrors struct nlattr).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct NlAttr {
    /// Length including header.
    pub nla_len: u16,
    /// Attribute type.
    pub nla_type: u16,
}

/// Attribute type flags.
pub const NLA_F_NESTED: u16 = 1 << 15;
pub const NLA_F_NET_BYTEORDER: u16 = 1 << 14;
pub const NLA_TYPE_MASK: u16 = !(NLA_F_NESTED | NLA_F_NET_BYTEORDER);

impl NlAttr {
    /// Create a new attribute header.
    pub fn new(attr_type: u16, data_len: usize) -> Self {
        Self {
            nla_len: (NLA_HDRLEN + data_len) as u16,
            nla_type: attr_type,
        }
    }

    /// Get the attribute type without flags.
    pub fn kind(&self) -> u16 {
        self.nla_type & NLA_TYPE_MASK
    }

    /// Get the payload length (total length minus header).
    pub fn payload_len(&self) -> usize {
        (self.nla_len as usize).saturating_sub(NLA_HDRLEN)
    }

    /// Convert to bytes.
    pub fn as_bytes(&self) -> &[u8] {
        <Self as IntoBytes>::as_bytes(self)
    }

    /// Parse from bytes.
    pub fn from_bytes(data: &[u8]) -> Result<&Self> {
        Self::ref_from_prefix(data)
            .map(|(r, _)| r)
            .map_err(|_| Error::Truncated {
                expected: std::mem::size_of::<Self>(),
                actual: data.len(),
            })
    }
}

/// Iterator over netlink attributes in a buffer.
///
/// Every malformed attribute is reported as an error and ends the iteration.
/// A missing alignment pad after the final attribute is tolerated.
pub struct AttrIter<'a> {
    data: &'a [u8],
    failed: bool,
}

impl<'a> AttrIter<'a> {
    /// Create a new attribute iterator.
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            failed: false,
        }
    }

    fn fail(&mut self, err: Error) -> Option<Result<(u16, &'a [u8])>> {
        self.failed = true;
        self.data = &[];
        Some(Err(err))
    }
}

impl<'a> Iterator for AttrIter<'a> {
    /// Returns (attribute type, payload data).
    type Item = Result<(u16, &'a [u8])>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.data.is_empty() {
            return None;
        }

        let attr = match NlAttr::from_bytes(self.data) {
            Ok(a) => *a,
            Err(e) => return self.fail(e),
        };

        let len = attr.nla_len as usize;
        if len < NLA_HDRLEN {
            return self.fail(Error::InvalidAttribute(format!(
                "attribute {} declares length {} below header size",
                attr.kind(),
                len
            )));
        }
        if len > self.data.len() {
            return self.fail(Error::Truncated {
                expected: len,
                actual: self.data.len(),
            });
        }

        let payload = &self.data[NLA_HDRLEN..len];
        let aligned_len = nla_align(len);

        // Move to next attribute
        if aligned_len >= self.data.len() {
            self.data = &[];
        } else {
            self.data = &self.data[aligned_len..];
        }

        Some(Ok((attr.kind(), payload)))
    }
}

/// Attributes of one message keyed by type.
///
/// A repeated type overwrites the earlier payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttrMap<'a> {
    entries: BTreeMap<u16, &'a [u8]>,
}

impl<'a> AttrMap<'a> {
    /// Walk `data` and collect every attribute.
    pub fn parse(data: &'a [u8]) -> Result<Self> {
        let mut entries = BTreeMap::new();
        for attr in AttrIter::new(data) {
            let (kind, payload) = attr?;
            entries.insert(kind, payload);
        }
        Ok(Self { entries })
    }

    /// Payload of the attribute with the given type.
    pub fn get(&self, kind: u16) -> Option<&'a [u8]> {
        self.entries.get(&kind).copied()
    }

    /// Iterate over (type, payload) pairs in ascending type order.
    pub fn iter(&self) -> impl Iterator<Item = (u16, &'a [u8])> + '_ {
        self.entries.iter().map(|(k, v)| (*k, *v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Helper functions for extracting typed values from attribute payloads.
pub mod get {
    use super::*;

    /// Extract a u32 value (native endian).
    pub fn u32_ne(data: &[u8]) -> Result<u32> {
        if data.len() < 4 {
            return Err(Error::InvalidAttribute("truncated u32 attribute".into()));
        }
        Ok(u32::from_ne_bytes([data[0], data[1], data[2], data[3]]))
    }

    /// Extract a null-terminated string.
    ///
    /// Bytes after the first NUL are ignored, whatever they contain.
    pub fn string(data: &[u8]) -> Result<&str> {
        let len = data.iter().position(|&b| b == 0).unwrap_or(data.len());
        std::str::from_utf8(&data[..len])
            .map_err(|e| Error::InvalidAttribute(format!("invalid UTF-8: {}", e)))
    }
}
