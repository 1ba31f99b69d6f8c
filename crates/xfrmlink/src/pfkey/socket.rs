//! Async PF_KEY v2 raw socket.

use std::io::{Read, Write};
use std::os::unix::io::{AsRawFd, RawFd};
use std::path::Path;

use socket2::{Domain, Protocol, Socket, Type};
use tokio::io::Interest;
use tokio::io::unix::AsyncFd;

use super::message::PF_KEY_V2;
use crate::netlink::Result;
use crate::netlink::namespace;

const PF_KEY: libc::c_int = 15;

/// Largest message the kernel sends in one datagram.
const RECV_BUF_SIZE: usize = 65536;

/// Async PF_KEY socket.
pub struct PfKeySocket {
    fd: AsyncFd<Socket>,
}

impl PfKeySocket {
    pub fn new() -> Result<Self> {
        let socket = Socket::new(
            Domain::from(PF_KEY),
            Type::RAW,
            Some(Protocol::from(PF_KEY_V2 as libc::c_int)),
        )?;
        socket.set_nonblocking(true)?;
        let fd = AsyncFd::new(socket)?;
        tracing::debug!(fd = fd.as_raw_fd(), "PF_KEY socket opened");
        Ok(Self { fd })
    }

    /// Create a socket that operates in the namespace referred to by `ns_fd`.
    pub fn new_in_namespace(ns_fd: RawFd) -> Result<Self> {
        namespace::run_in_namespace_fd(ns_fd, Self::new)
    }

    /// Create a socket that operates in the namespace at `ns_path`.
    pub fn new_in_namespace_path<P: AsRef<Path>>(ns_path: P) -> Result<Self> {
        namespace::run_in_namespace_path(ns_path, Self::new)
    }

    /// Send one message.
    pub async fn send(&self, msg: &[u8]) -> Result<()> {
        self.fd
            .async_io(Interest::WRITABLE, |sock| (&*sock).write(msg))
            .await?;
        Ok(())
    }

    /// Receive one datagram.
    pub async fn recv_msg(&self) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; RECV_BUF_SIZE];
        let n = self
            .fd
            .async_io(Interest::READABLE, |sock| (&*sock).read(&mut buf))
            .await?;
        buf.truncate(n);
        Ok(buf)
    }
}

impl AsRawFd for PfKeySocket {
    fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }
}
