//! Security association operations on `Connection<Xfrm>`.

use std::net::IpAddr;

use tokio_stream::StreamExt;
use zerocopy::network_endian::U32;

use super::attrs::{XfrmAttr, XfrmAttrs};
use super::types::{
    XfrmAddress, XfrmId, XfrmLifetimeCfg, XfrmLifetimeCur, XfrmStats, XfrmUsersaFlush,
    XfrmUsersaId, XfrmUsersaInfo, XfrmUserspiInfo,
};
use crate::codec::WireStruct;
use crate::ipsec::algorithm::AuthAlgorithm;
use crate::ipsec::sa::{LifetimeConfig, LifetimeCurrent, Mark, SaId, SaStats, SecurityAssociation};
use crate::ipsec::{Family, IPSEC_PROTO_ANY, IpsecProtocol, Mode};
use crate::netlink::builder::MessageBuilder;
use crate::netlink::connection::{Connection, ack_request, dump_request, reply_request};
use crate::netlink::error::{Error, ErrorKind, Result};
use crate::netlink::message::{NlMsgType, nlmsg_align};
use crate::netlink::protocol::Xfrm;
use crate::netlink::stream::DumpStream;

impl From<&SecurityAssociation> for XfrmUsersaInfo {
    fn from(sa: &SecurityAssociation) -> Self {
        Self {
            sel: (&sa.selector).into(),
            id: XfrmId {
                daddr: XfrmAddress::from_ip(sa.id.dst),
                spi: U32::new(sa.id.spi),
                proto: sa.id.protocol.number(),
                _pad: [0; 3],
            },
            saddr: XfrmAddress::from_ip(sa.id.src),
            lft: XfrmLifetimeCfg::from(&sa.lifetime),
            curlft: XfrmLifetimeCur::default(),
            stats: XfrmStats::default(),
            seq: sa.seq,
            reqid: sa.reqid,
            family: sa.family().number(),
            mode: sa.mode.number(),
            replay_window: sa.replay_window,
            flags: sa.flags,
            _pad: [0; 7],
        }
    }
}

impl XfrmUsersaInfo {
    /// SA fields; algorithms and marks are filled from attributes.
    pub fn to_sa(&self) -> SecurityAssociation {
        let family = Family::from_u16(self.family);
        let id = SaId::new(
            IpsecProtocol::from_u8(self.id.proto),
            self.saddr.to_ip(family),
            self.id.daddr.to_ip(family),
            self.id.spi.get(),
        );
        let mut sa = SecurityAssociation::new(id)
            .mode(Mode::from_u8(self.mode))
            .reqid(self.reqid)
            .replay_window(self.replay_window)
            .flags(self.flags)
            .selector(self.sel.to_selector())
            .lifetime(LifetimeConfig::from(&self.lft));
        sa.current = LifetimeCurrent::from(&self.curlft);
        sa.stats = SaStats::from(&self.stats);
        sa.seq = self.seq;
        sa
    }
}

/// Attributes carrying the SA's algorithms, encapsulation and marks.
fn sa_attrs(sa: &SecurityAssociation) -> Vec<XfrmAttr> {
    let mut attrs = Vec::new();
    if let Some(auth) = &sa.auth {
        match auth.trunc_len {
            Some(_) => attrs.push(XfrmAttr::AuthTrunc(auth.clone())),
            None => attrs.push(XfrmAttr::Auth(auth.algorithm.clone())),
        }
    }
    if let Some(enc) = &sa.encryption {
        attrs.push(XfrmAttr::Crypt(enc.clone()));
    }
    if let Some(aead) = &sa.aead {
        attrs.push(XfrmAttr::Aead(aead.clone()));
    }
    if let Some(comp) = &sa.compression {
        attrs.push(XfrmAttr::Comp(comp.clone()));
    }
    if let Some(encap) = &sa.encap {
        attrs.push(XfrmAttr::Encap(*encap));
    }
    if let Some(mark) = &sa.mark {
        attrs.push(XfrmAttr::Mark(*mark));
    }
    if let Some(mark) = &sa.output_mark {
        attrs.push(XfrmAttr::OutputMark(mark.value));
        if mark.mask != u32::MAX {
            attrs.push(XfrmAttr::OutputMarkMask(mark.mask));
        }
    }
    if let Some(if_id) = sa.if_id {
        attrs.push(XfrmAttr::IfId(if_id));
    }
    attrs
}

/// Build a NEWSA or UPDSA request.
pub(crate) fn sa_request(msg_type: u16, sa: &SecurityAssociation) -> Result<MessageBuilder> {
    sa.validate()?;
    let mut builder = ack_request(msg_type);
    builder.append_struct(&XfrmUsersaInfo::from(sa));
    for attr in sa_attrs(sa) {
        attr.encode(&mut builder)?;
    }
    Ok(builder)
}

/// Decode one SA message: the fixed body followed by attributes.
pub(crate) fn parse_sa(msg_type: u16, payload: &[u8]) -> Result<(SecurityAssociation, XfrmAttrs)> {
    if msg_type != NlMsgType::XFRM_NEWSA {
        return Err(Error::InvalidMessage(format!(
            "unexpected message type {} in SA dump",
            msg_type
        )));
    }
    let (info, used) = XfrmUsersaInfo::decode(payload)?;
    let mut sa = info.to_sa();
    let rest = payload.get(nlmsg_align(used)..).unwrap_or(&[]);
    let attrs = XfrmAttrs::parse(rest, sa.family())?;

    sa.encryption = attrs.crypt().cloned();
    sa.auth = match attrs.auth_trunc() {
        Some(auth) => Some(auth.clone()),
        None => attrs
            .auth()
            .map(|alg| AuthAlgorithm::new(alg.clone(), None)),
    };
    sa.aead = attrs.aead().cloned();
    sa.compression = attrs.comp().cloned();
    sa.encap = attrs.encap().copied();
    sa.mark = attrs.mark();
    sa.output_mark = attrs.output_mark();
    sa.if_id = attrs.if_id();
    Ok((sa, attrs))
}

fn usersa_id(id: &SaId) -> XfrmUsersaId {
    XfrmUsersaId {
        daddr: XfrmAddress::from_ip(id.dst),
        spi: U32::new(id.spi),
        family: id.family().number(),
        proto: id.protocol.number(),
        _pad: 0,
    }
}

impl Connection<Xfrm> {
    /// Install a new SA.
    ///
    /// Fails with [`ErrorKind::AlreadyExists`] if an SA with the same id is
    /// installed, and with [`ErrorKind::InvalidAlgorithm`] if a descriptor is
    /// malformed or the kernel lacks the algorithm.
    pub async fn add_sa(&self, sa: &SecurityAssociation) -> Result<()> {
        let builder = sa_request(NlMsgType::XFRM_NEWSA, sa)?;
        self.request_ack(builder)
            .await
            .map_err(|e| e.with_context(format!("adding SA spi 0x{:08x}", sa.spi())))
    }

    /// Install an SA, replacing any SA with the same id.
    pub async fn update_sa(&self, sa: &SecurityAssociation) -> Result<()> {
        let builder = sa_request(NlMsgType::XFRM_UPDSA, sa)?;
        self.request_ack(builder)
            .await
            .map_err(|e| e.with_context(format!("updating SA spi 0x{:08x}", sa.spi())))
    }

    /// Remove an SA. Fails with [`ErrorKind::NotFound`] if absent.
    pub async fn delete_sa(&self, id: &SaId) -> Result<()> {
        self.delete_sa_with_mark(id, None).await
    }

    /// Remove an SA installed with a mark.
    pub async fn delete_sa_with_mark(&self, id: &SaId, mark: Option<Mark>) -> Result<()> {
        let mut builder = ack_request(NlMsgType::XFRM_DELSA);
        builder.append_struct(&usersa_id(id));
        if let Some(mark) = mark {
            XfrmAttr::Mark(mark).encode(&mut builder)?;
        }
        self.request_ack(builder)
            .await
            .map_err(|e| e.with_context(format!("deleting SA spi 0x{:08x}", id.spi)))
    }

    /// Stream every installed SA with its raw attributes.
    pub async fn dump_sa(&self) -> Result<DumpStream<'_, Xfrm, (SecurityAssociation, XfrmAttrs)>> {
        let mut builder = dump_request(NlMsgType::XFRM_GETSA);
        builder.append_struct(&XfrmUsersaInfo::default());
        self.dump(builder, parse_sa).await
    }

    /// Collect a full SA dump.
    pub async fn dump_sa_all(&self) -> Result<Vec<(SecurityAssociation, XfrmAttrs)>> {
        self.dump_sa().await?.try_collect().await
    }

    /// Find the SA with the given SPI in a fresh dump.
    pub async fn find_sa(&self, spi: u32) -> Result<Option<SecurityAssociation>> {
        let mut stream = self.dump_sa().await?;
        let mut found = None;
        // Drain the dump so the socket holds no stale replies.
        while let Some(entry) = stream.next().await {
            let (sa, _) = entry?;
            if found.is_none() && sa.spi() == spi {
                found = Some(sa);
            }
        }
        Ok(found)
    }

    /// Remove every SA of every protocol. Succeeds on an empty table.
    pub async fn flush_sa(&self) -> Result<()> {
        self.flush_sa_proto(IPSEC_PROTO_ANY).await
    }

    /// Remove every SA of one protocol.
    pub async fn flush_sa_proto(&self, proto: u8) -> Result<()> {
        let mut builder = ack_request(NlMsgType::XFRM_FLUSHSA);
        builder.append_struct(&XfrmUsersaFlush { proto });
        self.request_ack(builder)
            .await
            .map_err(|e| e.with_context("flushing SAs"))
    }

    /// Reserve a free SPI in `min..=max` for an SA towards `dst`.
    ///
    /// The kernel installs a larval SA holding the SPI until it is updated
    /// or expires, and answers with that SA. Only its id, family and mode are
    /// meaningful. Fails with [`ErrorKind::RangeExhausted`] if every SPI in
    /// the range is taken.
    pub async fn alloc_spi(
        &self,
        dst: IpAddr,
        proto: IpsecProtocol,
        min: u32,
        max: u32,
    ) -> Result<SecurityAssociation> {
        let info = spi_request(dst, proto, min, max)?;
        let mut builder = reply_request(NlMsgType::XFRM_ALLOCSPI);
        builder.append_struct(&info);

        let payload = self.request(builder).await.map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                Error::RangeExhausted { min, max }
            } else {
                e.with_context("allocating SPI")
            }
        })?;
        let shell = sa_shell(&payload)?;
        tracing::debug!(spi = shell.spi(), min, max, "allocated SPI");
        Ok(shell)
    }
}

/// ALLOCSPI body for an SA towards `dst`.
fn spi_request(dst: IpAddr, proto: IpsecProtocol, min: u32, max: u32) -> Result<XfrmUserspiInfo> {
    if min > max {
        return Err(Error::InvalidMessage(format!(
            "empty SPI range 0x{:08x}-0x{:08x}",
            min, max
        )));
    }
    let family = Family::of(&dst);
    let mut info = XfrmUserspiInfo::default();
    info.info.id.daddr = XfrmAddress::from_ip(dst);
    info.info.id.proto = proto.number();
    info.info.saddr = XfrmAddress::from_ip(family.any_addr());
    info.info.family = family.number();
    info.min = min;
    info.max = max;
    Ok(info)
}

/// The larval SA the kernel returns for ALLOCSPI.
fn sa_shell(payload: &[u8]) -> Result<SecurityAssociation> {
    let (reply, _) = XfrmUsersaInfo::decode(payload)?;
    Ok(reply.to_sa())
}
