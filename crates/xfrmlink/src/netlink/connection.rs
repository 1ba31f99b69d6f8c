//! High-level netlink connection with request/response handling.
//!
//! One request is in flight per connection at a time: every exchange,
//! including a whole dump, holds the connection's exchange lock, so
//! responses are never interleaved on the socket.

use std::os::unix::io::RawFd;
use std::path::Path;
use std::time::Duration;

use tokio::sync::Mutex;

use super::builder::MessageBuilder;
use super::error::{Error, Result};
use super::message::{MessageIter, NLM_F_ACK, NLM_F_DUMP, NLM_F_REQUEST, NlMsgError};
use super::protocol::ProtocolState;
use super::socket::NetlinkSocket;
use super::stream::DumpStream;

/// Parses one dump entry from its message type and payload.
pub type ParseFn<T> = fn(u16, &[u8]) -> Result<T>;

/// Netlink connection typed by protocol state.
pub struct Connection<P: ProtocolState> {
    socket: NetlinkSocket,
    #[allow(dead_code)]
    state: P,
    exchange: Mutex<()>,
    timeout: Option<Duration>,
}

impl<P: ProtocolState> Connection<P> {
    /// Create a new connection.
    pub fn new() -> Result<Self> {
        Ok(Self::from_socket(NetlinkSocket::new(P::PROTOCOL)?))
    }

    /// Create a connection that operates in the namespace referred to by an
    /// open namespace file descriptor.
    pub fn new_in_namespace(ns_fd: RawFd) -> Result<Self> {
        Ok(Self::from_socket(NetlinkSocket::new_in_namespace(
            P::PROTOCOL,
            ns_fd,
        )?))
    }

    /// Create a connection that operates in the namespace at `ns_path`
    /// (`/var/run/netns/<name>` or `/proc/<pid>/ns/net`).
    pub fn new_in_namespace_path<Q: AsRef<Path>>(ns_path: Q) -> Result<Self> {
        Ok(Self::from_socket(NetlinkSocket::new_in_namespace_path(
            P::PROTOCOL,
            ns_path,
        )?))
    }

    fn from_socket(socket: NetlinkSocket) -> Self {
        Self {
            socket,
            state: P::default(),
            exchange: Mutex::new(()),
            timeout: None,
        }
    }

    /// Fail any exchange whose reply takes longer than `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Configured receive timeout.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Get the underlying socket.
    pub fn socket(&self) -> &NetlinkSocket {
        &self.socket
    }

    async fn send(&self, mut builder: MessageBuilder) -> Result<u32> {
        let seq = self.socket.next_seq();
        builder.set_seq(seq);
        builder.set_pid(self.socket.pid());

        let msg_type = builder.msg_type();
        let msg = builder.finish();
        tracing::trace!(msg_type, seq, len = msg.len(), "netlink request");
        self.socket.send(&msg).await?;
        Ok(seq)
    }

    async fn recv(&self) -> Result<Vec<u8>> {
        let data = match self.timeout {
            Some(timeout) => tokio::time::timeout(timeout, self.socket.recv_msg())
                .await
                .map_err(|_| Error::Timeout(timeout))??,
            None => self.socket.recv_msg().await?,
        };
        tracing::trace!(len = data.len(), "netlink datagram");
        Ok(data)
    }

    /// Send a request and return the payload of its reply message.
    ///
    /// The request should not ask for an ACK: the first message carrying the
    /// request's sequence number is the reply.
    pub async fn request(&self, builder: MessageBuilder) -> Result<Vec<u8>> {
        let _guard = self.exchange.lock().await;
        let seq = self.send(builder).await?;

        loop {
            let data = self.recv().await?;
            for result in MessageIter::new(&data) {
                let (header, payload) = result?;

                if header.nlmsg_seq != seq {
                    continue;
                }

                if header.is_error() {
                    let err = NlMsgError::from_bytes(payload)?;
                    if !err.is_ack() {
                        return Err(Error::from_errno(err.error));
                    }
                    return Err(Error::InvalidMessage(
                        "expected a reply message, got ACK".into(),
                    ));
                }

                return Ok(payload.to_vec());
            }
        }
    }

    /// Send a request that expects an ACK only (no data response).
    pub async fn request_ack(&self, builder: MessageBuilder) -> Result<()> {
        let _guard = self.exchange.lock().await;
        let seq = self.send(builder).await?;

        loop {
            let data = self.recv().await?;
            for result in MessageIter::new(&data) {
                let (header, payload) = result?;

                if header.nlmsg_seq != seq || !header.is_error() {
                    continue;
                }

                let err = NlMsgError::from_bytes(payload)?;
                if !err.is_ack() {
                    return Err(Error::from_errno(err.error));
                }
                return Ok(());
            }
        }
    }

    /// Send a dump request and return a stream of parsed entries.
    ///
    /// The connection is held exclusively until the stream is dropped.
    pub async fn dump<T>(
        &self,
        builder: MessageBuilder,
        parse: ParseFn<T>,
    ) -> Result<DumpStream<'_, P, T>> {
        let guard = self.exchange.lock().await;
        let seq = self.send(builder).await?;
        Ok(DumpStream::new(self, guard, seq, parse, self.timeout))
    }
}

/// Helper to build a dump request.
pub fn dump_request(msg_type: u16) -> MessageBuilder {
    MessageBuilder::new(msg_type, NLM_F_REQUEST | NLM_F_DUMP)
}

/// Helper to build a request expecting ACK.
pub fn ack_request(msg_type: u16) -> MessageBuilder {
    MessageBuilder::new(msg_type, NLM_F_REQUEST | NLM_F_ACK)
}

/// Helper to build a request answered by a data message.
pub fn reply_request(msg_type: u16) -> MessageBuilder {
    MessageBuilder::new(msg_type, NLM_F_REQUEST)
}
