//! Typed XFRM attributes.

use std::collections::BTreeMap;

use zerocopy::IntoBytes;

use super::types::{
    XFRMA_ALG_AEAD, XFRMA_ALG_AUTH, XFRMA_ALG_AUTH_TRUNC, XFRMA_ALG_COMP, XFRMA_ALG_CRYPT,
    XFRMA_ENCAP, XFRMA_IF_ID, XFRMA_MARK, XFRMA_OUTPUT_MARK, XFRMA_SET_MARK_MASK, XFRMA_TMPL,
    XfrmAlgo, XfrmAlgoAead, XfrmAlgoAuth, XfrmEncapTmpl, XfrmMark, XfrmUserTmpl, name_field,
};
use crate::codec::WireStruct;
use crate::ipsec::algorithm::{AeadAlgorithm, Algorithm, AuthAlgorithm};
use crate::ipsec::policy::PolicyTemplate;
use crate::ipsec::sa::{EncapTemplate, Mark};
use crate::ipsec::Family;
use crate::netlink::attr::{AttrMap, get};
use crate::netlink::builder::MessageBuilder;
use crate::netlink::error::{Error, Result};

/// One recognized XFRM attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XfrmAttr {
    Auth(Algorithm),
    Crypt(Algorithm),
    Comp(Algorithm),
    Encap(EncapTemplate),
    Templates(Vec<PolicyTemplate>),
    Aead(AeadAlgorithm),
    AuthTrunc(AuthAlgorithm),
    Mark(Mark),
    OutputMark(u32),
    OutputMarkMask(u32),
    IfId(u32),
}

/// Split an algorithm payload into its fixed header and key bytes.
fn split_algo<T: WireStruct>(payload: &[u8], key_len: impl Fn(&T) -> u32) -> Result<(T, Vec<u8>)> {
    let (header, used) = T::decode(payload)?;
    let key_bytes = (key_len(&header) as usize).div_ceil(8);
    let rest = &payload[used..];
    if rest.len() < key_bytes {
        return Err(Error::Truncated {
            expected: used + key_bytes,
            actual: payload.len(),
        });
    }
    Ok((header, rest[..key_bytes].to_vec()))
}

fn algo_name(field: &[u8]) -> Result<String> {
    Ok(get::string(field)?.to_string())
}

fn decode_algo(payload: &[u8]) -> Result<Algorithm> {
    let (hdr, key) = split_algo::<XfrmAlgo>(payload, |h| h.alg_key_len)?;
    Ok(Algorithm::with_key_len(
        algo_name(&hdr.alg_name)?,
        hdr.alg_key_len,
        key,
    ))
}

fn encode_algo(alg: &Algorithm) -> Result<Vec<u8>> {
    alg.validate()?;
    let hdr = XfrmAlgo {
        alg_name: name_field(&alg.name),
        alg_key_len: alg.key_len,
    };
    let mut buf = hdr.encode();
    buf.extend_from_slice(&alg.key);
    Ok(buf)
}

impl XfrmAttr {
    /// Attribute type this variant is carried in.
    pub fn kind(&self) -> u16 {
        match self {
            Self::Auth(_) => XFRMA_ALG_AUTH,
            Self::Crypt(_) => XFRMA_ALG_CRYPT,
            Self::Comp(_) => XFRMA_ALG_COMP,
            Self::Encap(_) => XFRMA_ENCAP,
            Self::Templates(_) => XFRMA_TMPL,
            Self::Aead(_) => XFRMA_ALG_AEAD,
            Self::AuthTrunc(_) => XFRMA_ALG_AUTH_TRUNC,
            Self::Mark(_) => XFRMA_MARK,
            Self::OutputMark(_) => XFRMA_OUTPUT_MARK,
            Self::OutputMarkMask(_) => XFRMA_SET_MARK_MASK,
            Self::IfId(_) => XFRMA_IF_ID,
        }
    }

    /// Decode one attribute payload. Unrecognized types yield `None`.
    ///
    /// `family` is the family of the enclosing SA, used for addresses that
    /// carry no family of their own.
    pub fn decode(kind: u16, payload: &[u8], family: Family) -> Result<Option<Self>> {
        let attr = match kind {
            XFRMA_ALG_AUTH => Self::Auth(decode_algo(payload)?),
            XFRMA_ALG_CRYPT => Self::Crypt(decode_algo(payload)?),
            XFRMA_ALG_COMP => Self::Comp(decode_algo(payload)?),
            XFRMA_ALG_AUTH_TRUNC => {
                let (hdr, key) = split_algo::<XfrmAlgoAuth>(payload, |h| h.alg_key_len)?;
                Self::AuthTrunc(AuthAlgorithm::new(
                    Algorithm::with_key_len(algo_name(&hdr.alg_name)?, hdr.alg_key_len, key),
                    Some(hdr.alg_trunc_len),
                ))
            }
            XFRMA_ALG_AEAD => {
                let (hdr, key) = split_algo::<XfrmAlgoAead>(payload, |h| h.alg_key_len)?;
                Self::Aead(AeadAlgorithm::new(
                    Algorithm::with_key_len(algo_name(&hdr.alg_name)?, hdr.alg_key_len, key),
                    hdr.alg_icv_len,
                ))
            }
            XFRMA_ENCAP => {
                let (encap, _) = XfrmEncapTmpl::decode(payload)?;
                Self::Encap(encap.to_template(family))
            }
            XFRMA_TMPL => {
                if payload.len() % XfrmUserTmpl::SIZE != 0 {
                    return Err(Error::InvalidAttribute(format!(
                        "template list of {} bytes is not a multiple of {}",
                        payload.len(),
                        XfrmUserTmpl::SIZE
                    )));
                }
                let mut templates = Vec::with_capacity(payload.len() / XfrmUserTmpl::SIZE);
                for chunk in payload.chunks_exact(XfrmUserTmpl::SIZE) {
                    let (tmpl, _) = XfrmUserTmpl::decode(chunk)?;
                    templates.push(tmpl.to_template());
                }
                Self::Templates(templates)
            }
            XFRMA_MARK => {
                let (mark, _) = XfrmMark::decode(payload)?;
                Self::Mark(Mark::from(&mark))
            }
            XFRMA_OUTPUT_MARK => Self::OutputMark(get::u32_ne(payload)?),
            XFRMA_SET_MARK_MASK => Self::OutputMarkMask(get::u32_ne(payload)?),
            XFRMA_IF_ID => Self::IfId(get::u32_ne(payload)?),
            _ => return Ok(None),
        };
        Ok(Some(attr))
    }

    /// Append this attribute to a message.
    pub fn encode(&self, builder: &mut MessageBuilder) -> Result<()> {
        match self {
            Self::Auth(alg) | Self::Crypt(alg) | Self::Comp(alg) => {
                builder.append_attr(self.kind(), &encode_algo(alg)?);
            }
            Self::AuthTrunc(auth) => {
                auth.validate()?;
                let hdr = XfrmAlgoAuth {
                    alg_name: name_field(auth.name()),
                    alg_key_len: auth.algorithm.key_len,
                    alg_trunc_len: auth.trunc_len.unwrap_or(0),
                };
                let mut buf = hdr.encode();
                buf.extend_from_slice(&auth.algorithm.key);
                builder.append_attr(self.kind(), &buf);
            }
            Self::Aead(aead) => {
                aead.validate()?;
                let hdr = XfrmAlgoAead {
                    alg_name: name_field(&aead.algorithm.name),
                    alg_key_len: aead.algorithm.key_len,
                    alg_icv_len: aead.icv_len,
                };
                let mut buf = hdr.encode();
                buf.extend_from_slice(&aead.algorithm.key);
                builder.append_attr(self.kind(), &buf);
            }
            Self::Encap(encap) => {
                builder.append_attr_struct(self.kind(), &XfrmEncapTmpl::from(encap));
            }
            Self::Templates(templates) => {
                let mut buf = Vec::with_capacity(templates.len() * XfrmUserTmpl::SIZE);
                for tmpl in templates {
                    buf.extend_from_slice(XfrmUserTmpl::from(tmpl).as_bytes());
                }
                builder.append_attr(self.kind(), &buf);
            }
            Self::Mark(mark) => builder.append_attr_struct(self.kind(), &XfrmMark::from(mark)),
            Self::OutputMark(v) | Self::OutputMarkMask(v) | Self::IfId(v) => {
                builder.append_attr_u32(self.kind(), *v);
            }
        }
        Ok(())
    }
}

/// Recognized attributes of one XFRM message, keyed by type.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XfrmAttrs {
    attrs: BTreeMap<u16, XfrmAttr>,
}

impl XfrmAttrs {
    /// Parse the attribute area of a message. Malformed attributes fail the
    /// whole parse; unrecognized ones are skipped.
    pub fn parse(data: &[u8], family: Family) -> Result<Self> {
        let mut attrs = BTreeMap::new();
        for (kind, payload) in AttrMap::parse(data)?.iter() {
            if let Some(attr) = XfrmAttr::decode(kind, payload, family)? {
                attrs.insert(kind, attr);
            }
        }
        Ok(Self { attrs })
    }

    /// Attribute by type.
    pub fn get(&self, kind: u16) -> Option<&XfrmAttr> {
        self.attrs.get(&kind)
    }

    pub fn contains(&self, kind: u16) -> bool {
        self.attrs.contains_key(&kind)
    }

    pub fn iter(&self) -> impl Iterator<Item = &XfrmAttr> {
        self.attrs.values()
    }

    pub fn len(&self) -> usize {
        self.attrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attrs.is_empty()
    }

    pub fn crypt(&self) -> Option<&Algorithm> {
        match self.get(XFRMA_ALG_CRYPT) {
            Some(XfrmAttr::Crypt(alg)) => Some(alg),
            _ => None,
        }
    }

    pub fn auth(&self) -> Option<&Algorithm> {
        match self.get(XFRMA_ALG_AUTH) {
            Some(XfrmAttr::Auth(alg)) => Some(alg),
            _ => None,
        }
    }

    pub fn auth_trunc(&self) -> Option<&AuthAlgorithm> {
        match self.get(XFRMA_ALG_AUTH_TRUNC) {
            Some(XfrmAttr::AuthTrunc(alg)) => Some(alg),
            _ => None,
        }
    }

    pub fn aead(&self) -> Option<&AeadAlgorithm> {
        match self.get(XFRMA_ALG_AEAD) {
            Some(XfrmAttr::Aead(alg)) => Some(alg),
            _ => None,
        }
    }

    pub fn comp(&self) -> Option<&Algorithm> {
        match self.get(XFRMA_ALG_COMP) {
            Some(XfrmAttr::Comp(alg)) => Some(alg),
            _ => None,
        }
    }

    pub fn encap(&self) -> Option<&EncapTemplate> {
        match self.get(XFRMA_ENCAP) {
            Some(XfrmAttr::Encap(encap)) => Some(encap),
            _ => None,
        }
    }

    pub fn templates(&self) -> &[PolicyTemplate] {
        match self.get(XFRMA_TMPL) {
            Some(XfrmAttr::Templates(t)) => t,
            _ => &[],
        }
    }

    pub fn mark(&self) -> Option<Mark> {
        match self.get(XFRMA_MARK) {
            Some(XfrmAttr::Mark(mark)) => Some(*mark),
            _ => None,
        }
    }

    /// Output mark with its mask; the mask defaults to all ones.
    pub fn output_mark(&self) -> Option<Mark> {
        let value = match self.get(XFRMA_OUTPUT_MARK) {
            Some(XfrmAttr::OutputMark(v)) => *v,
            _ => return None,
        };
        let mask = match self.get(XFRMA_SET_MARK_MASK) {
            Some(XfrmAttr::OutputMarkMask(m)) => *m,
            _ => u32::MAX,
        };
        Some(Mark::new(value, mask))
    }

    pub fn if_id(&self) -> Option<u32> {
        match self.get(XFRMA_IF_ID) {
            Some(XfrmAttr::IfId(v)) => Some(*v),
            _ => None,
        }
    }
}
