//! PF_KEY v2 SA management.
//!
//! PF_KEY broadcasts replies, so every message read is matched against this
//! connection's pid and, outside dumps, the request's sequence number.

use std::os::unix::io::RawFd;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use tokio::sync::Mutex;

use super::message::{
    PfKeyMessage, SADB_DUMP, SADB_FLUSH, SADB_SATYPE_UNSPEC, SadbMsg, add_message, delete_message,
};
use super::socket::PfKeySocket;
use crate::ipsec::lifecycle::SaLifecycle;
use crate::ipsec::sa::{SaId, SecurityAssociation};
use crate::netlink::{Error, Result};

/// A PF_KEY control connection.
///
/// # Example
///
/// ```ignore
/// use xfrmlink::PfKeyConnection;
///
/// let pfkey = PfKeyConnection::new()?;
/// pfkey.add_sa(&sa).await?;
/// for msg in pfkey.dump_sa().await? {
///     println!("{}", msg.to_sa()?);
/// }
/// ```
pub struct PfKeyConnection {
    socket: PfKeySocket,
    pid: u32,
    seq: AtomicU32,
    exchange: Mutex<()>,
    timeout: Option<Duration>,
}

impl PfKeyConnection {
    pub fn new() -> Result<Self> {
        Ok(Self::from_socket(PfKeySocket::new()?))
    }

    /// Create a connection that operates in the namespace referred to by an
    /// open namespace file descriptor.
    pub fn new_in_namespace(ns_fd: RawFd) -> Result<Self> {
        Ok(Self::from_socket(PfKeySocket::new_in_namespace(ns_fd)?))
    }

    /// Create a connection that operates in the namespace at `ns_path`.
    pub fn new_in_namespace_path<P: AsRef<Path>>(ns_path: P) -> Result<Self> {
        Ok(Self::from_socket(PfKeySocket::new_in_namespace_path(ns_path)?))
    }

    fn from_socket(socket: PfKeySocket) -> Self {
        Self {
            socket,
            pid: std::process::id(),
            seq: AtomicU32::new(1),
            exchange: Mutex::new(()),
            timeout: None,
        }
    }

    /// Fail any exchange whose reply takes longer than `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn socket(&self) -> &PfKeySocket {
        &self.socket
    }

    fn next_seq(&self) -> u32 {
        self.seq.fetch_add(1, Ordering::Relaxed)
    }

    async fn send(&self, msg: &PfKeyMessage) -> Result<()> {
        let bytes = msg.encode();
        tracing::trace!(
            msg_type = msg.header.msg_type,
            seq = msg.header.seq,
            len = bytes.len(),
            "PF_KEY request"
        );
        self.socket.send(&bytes).await
    }

    async fn recv(&self) -> Result<PfKeyMessage> {
        let data = match self.timeout {
            Some(timeout) => tokio::time::timeout(timeout, self.socket.recv_msg())
                .await
                .map_err(|_| Error::Timeout(timeout))??,
            None => self.socket.recv_msg().await?,
        };
        let msg = PfKeyMessage::decode(&data)?;
        tracing::trace!(
            msg_type = msg.header.msg_type,
            seq = msg.header.seq,
            pid = msg.header.pid,
            errno = msg.header.errno,
            "PF_KEY reply"
        );
        Ok(msg)
    }

    /// Send a request and wait for the kernel's answer to it.
    async fn request(&self, msg: PfKeyMessage) -> Result<PfKeyMessage> {
        let _guard = self.exchange.lock().await;
        self.send(&msg).await?;

        loop {
            let reply = self.recv().await?;
            let hdr = &reply.header;
            if hdr.pid != self.pid
                || hdr.seq != msg.header.seq
                || hdr.msg_type != msg.header.msg_type
            {
                continue;
            }
            if hdr.errno != 0 {
                return Err(Error::from_errno(-(hdr.errno as i32)));
            }
            return Ok(reply);
        }
    }

    /// Install a new SA.
    ///
    /// Algorithm descriptors without a PF_KEY identifier fail with
    /// `InvalidAlgorithm` before anything is sent.
    pub async fn add_sa(&self, sa: &SecurityAssociation) -> Result<()> {
        let msg = add_message(sa, self.next_seq(), self.pid)?;
        self.request(msg)
            .await
            .map_err(|e| e.with_context(format!("adding SA spi 0x{:08x}", sa.spi())))?;
        Ok(())
    }

    /// Remove an SA. Fails with `NotFound` if absent.
    pub async fn delete_sa(&self, id: &SaId) -> Result<()> {
        let msg = delete_message(id, self.next_seq(), self.pid)?;
        self.request(msg)
            .await
            .map_err(|e| e.with_context(format!("deleting SA spi 0x{:08x}", id.spi)))?;
        Ok(())
    }

    /// Remove every SA of every type.
    pub async fn flush_sa(&self) -> Result<()> {
        let header = SadbMsg::new(SADB_FLUSH, SADB_SATYPE_UNSPEC, self.next_seq(), self.pid);
        self.request(PfKeyMessage::new(header))
            .await
            .map_err(|e| e.with_context("flushing SAs"))?;
        Ok(())
    }

    /// Dump every SA as raw PF_KEY messages.
    ///
    /// The kernel numbers dump replies downwards; the one with sequence 0 is
    /// the last. An empty table is reported as `ENOENT` and yields nothing.
    pub async fn dump_sa(&self) -> Result<Vec<PfKeyMessage>> {
        let _guard = self.exchange.lock().await;
        let header = SadbMsg::new(SADB_DUMP, SADB_SATYPE_UNSPEC, self.next_seq(), self.pid);
        self.send(&PfKeyMessage::new(header)).await?;

        let mut entries = Vec::new();
        loop {
            let reply = self.recv().await?;
            let hdr = reply.header;
            if hdr.pid != self.pid || hdr.msg_type != SADB_DUMP {
                continue;
            }
            if hdr.errno as i32 == libc::ENOENT {
                break;
            }
            if hdr.errno != 0 {
                return Err(Error::from_errno(-(hdr.errno as i32)).with_context("dumping SAs"));
            }
            entries.push(reply);
            if hdr.seq == 0 {
                break;
            }
        }
        tracing::debug!(entries = entries.len(), "PF_KEY dump complete");
        Ok(entries)
    }
}

impl SaLifecycle for PfKeyConnection {
    async fn add_sa(&self, sa: &SecurityAssociation) -> Result<()> {
        PfKeyConnection::add_sa(self, sa).await
    }

    async fn delete_sa(&self, id: &SaId) -> Result<()> {
        PfKeyConnection::delete_sa(self, id).await
    }

    async fn dump_sas(&self) -> Result<Vec<SecurityAssociation>> {
        self.dump_sa().await?.iter().map(PfKeyMessage::to_sa).collect()
    }

    async fn flush_sa(&self) -> Result<()> {
        PfKeyConnection::flush_sa(self).await
    }
}
