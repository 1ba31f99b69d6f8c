//! Algorithm descriptors.
//!
//! Descriptors only name a kernel crypto algorithm and carry its key. No
//! cryptography happens in this crate.

#[cfg(feature = "output")]
use serde::{Serialize, Serializer};

use crate::netlink::{Error, Result};

/// Size of the kernel's fixed algorithm name field, including the NUL.
pub const ALGO_NAME_LEN: usize = 64;

pub const CBC_AES: &str = "cbc(aes)";
pub const CIPHER_NULL: &str = "ecb(cipher_null)";
pub const HMAC_MD5: &str = "hmac(md5)";
pub const HMAC_SHA1: &str = "hmac(sha1)";
pub const HMAC_SHA256: &str = "hmac(sha256)";
pub const HMAC_SHA384: &str = "hmac(sha384)";
pub const HMAC_SHA512: &str = "hmac(sha512)";
pub const DIGEST_NULL: &str = "digest_null";
pub const RFC4106_GCM_AES: &str = "rfc4106(gcm(aes))";

/// Truncation lengths (bits) the kernel may report for an auth algorithm.
///
/// `hmac(sha256)` installed through PF_KEY reads back as 96 on older kernels
/// and 128 on kernels with RFC 4868 truncation; both are valid.
pub fn accepted_trunc_lens(name: &str) -> &'static [u32] {
    match name {
        HMAC_MD5 | HMAC_SHA1 => &[96],
        HMAC_SHA256 => &[96, 128],
        HMAC_SHA384 => &[192],
        HMAC_SHA512 => &[256],
        DIGEST_NULL => &[0],
        _ => &[],
    }
}

#[cfg(feature = "output")]
fn serialize_hex<S: Serializer>(key: &[u8], s: S) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_str(&hex(key))
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// A named algorithm with its key.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "output", derive(Serialize))]
pub struct Algorithm {
    /// Kernel crypto API name.
    pub name: String,
    /// Key length in bits.
    pub key_len: u32,
    /// Key material, `key_len` rounded up to whole bytes.
    #[cfg_attr(feature = "output", serde(serialize_with = "serialize_hex"))]
    pub key: Vec<u8>,
}

impl Algorithm {
    /// Create a descriptor whose key length is the full key.
    pub fn new(name: impl Into<String>, key: impl Into<Vec<u8>>) -> Self {
        let key = key.into();
        Self {
            name: name.into(),
            key_len: (key.len() * 8) as u32,
            key,
        }
    }

    /// Create a descriptor with an explicit key length in bits.
    pub fn with_key_len(name: impl Into<String>, key_len: u32, key: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            key_len,
            key: key.into(),
        }
    }

    /// AES in CBC mode.
    pub fn cbc_aes(key: impl Into<Vec<u8>>) -> Self {
        Self::new(CBC_AES, key)
    }

    /// The null cipher.
    pub fn cipher_null() -> Self {
        Self::new(CIPHER_NULL, Vec::new())
    }

    /// Check the descriptor fits the kernel's fixed layout.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() || self.name.len() >= ALGO_NAME_LEN || self.name.contains('\0') {
            return Err(Error::InvalidAlgorithm(format!(
                "name {:?} does not fit a {}-byte field",
                self.name, ALGO_NAME_LEN
            )));
        }
        let expected = (self.key_len as usize).div_ceil(8);
        if self.key.len() != expected {
            return Err(Error::InvalidAlgorithm(format!(
                "{}: {} key bytes for a {}-bit key",
                self.name,
                self.key.len(),
                self.key_len
            )));
        }
        Ok(())
    }

    /// Compare names up to the first NUL.
    pub fn is(&self, name: &str) -> bool {
        self.name.split('\0').next() == Some(name)
    }

    /// Key as lowercase hex, `0x` prefixed.
    pub fn hex_key(&self) -> String {
        format!("0x{}", hex(&self.key))
    }
}

/// An authentication algorithm with optional ICV truncation.
///
/// Without a truncation length the kernel uses the algorithm's default.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "output", derive(Serialize))]
pub struct AuthAlgorithm {
    #[cfg_attr(feature = "output", serde(flatten))]
    pub algorithm: Algorithm,
    /// Truncated ICV length in bits.
    pub trunc_len: Option<u32>,
}

impl AuthAlgorithm {
    pub fn new(algorithm: Algorithm, trunc_len: Option<u32>) -> Self {
        Self {
            algorithm,
            trunc_len,
        }
    }

    /// HMAC-SHA1 truncated to 96 bits.
    pub fn hmac_sha1(key: impl Into<Vec<u8>>) -> Self {
        Self::new(Algorithm::new(HMAC_SHA1, key), Some(96))
    }

    /// HMAC-SHA256 truncated to 128 bits.
    pub fn hmac_sha256(key: impl Into<Vec<u8>>) -> Self {
        Self::new(Algorithm::new(HMAC_SHA256, key), Some(128))
    }

    /// The null digest.
    pub fn digest_null() -> Self {
        Self::new(Algorithm::new(DIGEST_NULL, Vec::new()), Some(0))
    }

    pub fn name(&self) -> &str {
        &self.algorithm.name
    }

    pub fn validate(&self) -> Result<()> {
        self.algorithm.validate()
    }

    /// Whether the truncation length is one the kernel reports for this
    /// algorithm. Unknown algorithms accept anything.
    pub fn truncation_is_valid(&self) -> bool {
        match self.trunc_len {
            None => true,
            Some(len) => {
                let accepted = accepted_trunc_lens(&self.algorithm.name);
                accepted.is_empty() || accepted.contains(&len)
            }
        }
    }
}

/// An AEAD algorithm with its ICV length.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "output", derive(Serialize))]
pub struct AeadAlgorithm {
    #[cfg_attr(feature = "output", serde(flatten))]
    pub algorithm: Algorithm,
    /// ICV length in bits.
    pub icv_len: u32,
}

impl AeadAlgorithm {
    pub fn new(algorithm: Algorithm, icv_len: u32) -> Self {
        Self { algorithm, icv_len }
    }

    /// AES-GCM for ESP; the key carries the 4-byte salt.
    pub fn rfc4106_gcm_aes(key: impl Into<Vec<u8>>, icv_len: u32) -> Self {
        Self::new(Algorithm::new(RFC4106_GCM_AES, key), icv_len)
    }

    pub fn validate(&self) -> Result<()> {
        self.algorithm.validate()
    }
}
