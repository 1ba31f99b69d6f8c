//! Security policy operations on `Connection<Xfrm>`.

use super::attrs::{XfrmAttr, XfrmAttrs};
use super::types::{XfrmSelector, XfrmUserpolicyId, XfrmUserpolicyInfo};
use crate::codec::WireStruct;
use crate::ipsec::policy::{PolicyDirection, SecurityPolicy};
use crate::ipsec::sa::{Mark, Selector};
use crate::netlink::builder::MessageBuilder;
use crate::netlink::connection::{Connection, ack_request, dump_request};
use crate::netlink::error::{Error, Result};
use crate::netlink::message::{NlMsgType, nlmsg_align};
use crate::netlink::protocol::Xfrm;
use crate::netlink::stream::DumpStream;

/// Build a NEWPOLICY or UPDPOLICY request.
pub(crate) fn policy_request(msg_type: u16, policy: &SecurityPolicy) -> Result<MessageBuilder> {
    let mut builder = ack_request(msg_type);
    builder.append_struct(&XfrmUserpolicyInfo::from(policy));
    if !policy.templates.is_empty() {
        XfrmAttr::Templates(policy.templates.clone()).encode(&mut builder)?;
    }
    if let Some(mark) = policy.mark {
        XfrmAttr::Mark(mark).encode(&mut builder)?;
    }
    if let Some(if_id) = policy.if_id {
        XfrmAttr::IfId(if_id).encode(&mut builder)?;
    }
    Ok(builder)
}

/// Decode one policy message.
pub(crate) fn parse_policy(msg_type: u16, payload: &[u8]) -> Result<(SecurityPolicy, XfrmAttrs)> {
    if msg_type != NlMsgType::XFRM_NEWPOLICY {
        return Err(Error::InvalidMessage(format!(
            "unexpected message type {} in policy dump",
            msg_type
        )));
    }
    let (info, used) = XfrmUserpolicyInfo::decode(payload)?;
    let mut policy = info.to_policy();
    let rest = payload.get(nlmsg_align(used)..).unwrap_or(&[]);
    let attrs = XfrmAttrs::parse(rest, policy.selector.family)?;

    policy.templates = attrs.templates().to_vec();
    policy.mark = attrs.mark();
    policy.if_id = attrs.if_id();
    Ok((policy, attrs))
}

impl Connection<Xfrm> {
    /// Install a policy. Fails with `AlreadyExists` if a policy with the same
    /// selector, direction and mark is installed.
    pub async fn add_policy(&self, policy: &SecurityPolicy) -> Result<()> {
        let builder = policy_request(NlMsgType::XFRM_NEWPOLICY, policy)?;
        self.request_ack(builder)
            .await
            .map_err(|e| e.with_context(format!("adding {} policy", policy.direction)))
    }

    /// Install a policy, replacing one with the same key.
    pub async fn update_policy(&self, policy: &SecurityPolicy) -> Result<()> {
        let builder = policy_request(NlMsgType::XFRM_UPDPOLICY, policy)?;
        self.request_ack(builder)
            .await
            .map_err(|e| e.with_context(format!("updating {} policy", policy.direction)))
    }

    /// Remove the policy with the given key. Fails with `NotFound` if absent.
    pub async fn delete_policy(
        &self,
        selector: &Selector,
        direction: PolicyDirection,
        mark: Option<Mark>,
    ) -> Result<()> {
        let mut builder = ack_request(NlMsgType::XFRM_DELPOLICY);
        builder.append_struct(&XfrmUserpolicyId {
            sel: XfrmSelector::from(selector),
            index: 0,
            dir: direction.number(),
            _pad: [0; 3],
        });
        if let Some(mark) = mark {
            XfrmAttr::Mark(mark).encode(&mut builder)?;
        }
        self.request_ack(builder)
            .await
            .map_err(|e| e.with_context(format!("deleting {} policy", direction)))
    }

    /// Stream every installed policy with its raw attributes.
    pub async fn dump_policy(&self) -> Result<DumpStream<'_, Xfrm, (SecurityPolicy, XfrmAttrs)>> {
        let mut builder = dump_request(NlMsgType::XFRM_GETPOLICY);
        builder.append_struct(&XfrmUserpolicyInfo::default());
        self.dump(builder, parse_policy).await
    }

    /// Collect a full policy dump.
    pub async fn dump_policy_all(&self) -> Result<Vec<(SecurityPolicy, XfrmAttrs)>> {
        self.dump_policy().await?.try_collect().await
    }

    /// Remove every policy. Succeeds on an empty table.
    pub async fn flush_policy(&self) -> Result<()> {
        self.request_ack(ack_request(NlMsgType::XFRM_FLUSHPOLICY))
            .await
            .map_err(|e| e.with_context("flushing policies"))
    }
}
