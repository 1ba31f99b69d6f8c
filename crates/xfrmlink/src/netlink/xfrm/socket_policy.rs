//! Per-socket IPsec policies and UDP encapsulation.
//!
//! A socket policy overrides the global policy database for one socket. The
//! kernel drops the socket's cached route whenever one is set or cleared, so
//! the next send re-resolves through XFRM.

use std::io;
use std::net::IpAddr;
use std::os::unix::io::AsRawFd;

use zerocopy::IntoBytes;

use super::types::{XfrmUserTmpl, XfrmUserpolicyInfo};
use crate::ipsec::Family;
use crate::ipsec::policy::{PolicyDirection, PolicyTemplate, SecurityPolicy};
use crate::ipsec::sa::Selector;
use crate::netlink::error::{Error, Result};

const IP_XFRM_POLICY: libc::c_int = 17;
const IPV6_XFRM_POLICY: libc::c_int = 35;
const UDP_ENCAP: libc::c_int = 100;
const UDP_ENCAP_ESPINUDP: libc::c_int = 2;

fn policy_option(family: Family) -> Result<(libc::c_int, libc::c_int)> {
    match family {
        Family::Inet => Ok((libc::IPPROTO_IP, IP_XFRM_POLICY)),
        Family::Inet6 => Ok((libc::IPPROTO_IPV6, IPV6_XFRM_POLICY)),
        other => Err(Error::InvalidMessage(format!(
            "no socket policy option for family {:?}",
            other
        ))),
    }
}

fn setsockopt(fd: libc::c_int, level: libc::c_int, name: libc::c_int, value: &[u8]) -> Result<()> {
    let ptr = if value.is_empty() {
        std::ptr::null()
    } else {
        value.as_ptr() as *const libc::c_void
    };
    // SAFETY: ptr is null with a zero length or points to value.len() bytes.
    let ret = unsafe { libc::setsockopt(fd, level, name, ptr, value.len() as libc::socklen_t) };
    if ret < 0 {
        return Err(Error::Io(io::Error::last_os_error()));
    }
    Ok(())
}

/// Socket policy payload: policy info followed by one template.
pub(crate) fn socket_policy_bytes(
    family: Family,
    direction: PolicyDirection,
    spi: u32,
    reqid: u32,
    tunnel: Option<(IpAddr, IpAddr)>,
) -> Vec<u8> {
    let policy = SecurityPolicy::new(direction, Selector::any(family));
    let tmpl = PolicyTemplate::new(family, spi, reqid, tunnel);

    let mut buf = XfrmUserpolicyInfo::from(&policy).as_bytes().to_vec();
    buf.extend_from_slice(XfrmUserTmpl::from(&tmpl).as_bytes());
    buf
}

/// Require ESP with the given SPI and reqid for traffic on `socket`.
///
/// Transport mode unless `tunnel` names the outer endpoints.
pub fn apply_socket_policy(
    socket: &impl AsRawFd,
    family: Family,
    direction: PolicyDirection,
    spi: u32,
    reqid: u32,
    tunnel: Option<(IpAddr, IpAddr)>,
) -> Result<()> {
    let (level, name) = policy_option(family)?;
    let payload = socket_policy_bytes(family, direction, spi, reqid, tunnel);
    setsockopt(socket.as_raw_fd(), level, name, &payload)?;
    tracing::debug!(fd = socket.as_raw_fd(), %direction, spi, reqid, "socket policy applied");
    Ok(())
}

/// Remove any socket policy. Safe to call when none is set.
pub fn clear_socket_policy(socket: &impl AsRawFd, family: Family) -> Result<()> {
    let (level, name) = policy_option(family)?;
    setsockopt(socket.as_raw_fd(), level, name, &[])
}

/// Mark a UDP socket as an ESP-in-UDP encapsulation endpoint.
pub fn enable_udp_encap(socket: &impl AsRawFd) -> Result<()> {
    setsockopt(
        socket.as_raw_fd(),
        libc::IPPROTO_UDP,
        UDP_ENCAP,
        &UDP_ENCAP_ESPINUDP.to_ne_bytes(),
    )
}
