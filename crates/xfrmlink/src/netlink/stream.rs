//! Lazy dump results.
//!
//! A dump reply may span many datagrams. [`DumpStream`] reads them on demand
//! and yields one parsed entry at a time until the kernel's `NLMSG_DONE`.
//!
//! # Example
//!
//! ```ignore
//! use xfrmlink::{Connection, Xfrm};
//! use tokio_stream::StreamExt;
//!
//! let conn = Connection::<Xfrm>::new()?;
//! let mut sas = conn.dump_sa().await?;
//! while let Some((sa, _attrs)) = sas.try_next().await? {
//!     println!("{}", sa);
//! }
//! ```

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::sync::MutexGuard;
use tokio::time::{Instant, Sleep};
use tokio_stream::{Stream, StreamExt};

use super::connection::{Connection, ParseFn};
use super::error::{Error, Result};
use super::message::{MessageIter, NlMsgError, NlMsgType};
use super::protocol::ProtocolState;

/// A single-use stream over the entries of one dump.
///
/// Holds the connection's exchange lock until dropped. Any error ends the
/// stream, including a malformed entry.
pub struct DumpStream<'a, P: ProtocolState, T> {
    conn: &'a Connection<P>,
    _guard: MutexGuard<'a, ()>,
    seq: u32,
    parse: ParseFn<T>,
    pending: VecDeque<T>,
    done: bool,
    count: usize,
    timeout: Option<Duration>,
    deadline: Option<Pin<Box<Sleep>>>,
}

impl<'a, P: ProtocolState, T> DumpStream<'a, P, T> {
    pub(crate) fn new(
        conn: &'a Connection<P>,
        guard: MutexGuard<'a, ()>,
        seq: u32,
        parse: ParseFn<T>,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            conn,
            _guard: guard,
            seq,
            parse,
            pending: VecDeque::new(),
            done: false,
            count: 0,
            timeout,
            deadline: timeout.map(|t| Box::pin(tokio::time::sleep(t))),
        }
    }

    /// Drain the stream into a vector, failing on the first error.
    pub async fn try_collect(mut self) -> Result<Vec<T>> {
        let mut out = Vec::new();
        while let Some(item) = self.next().await {
            out.push(item?);
        }
        Ok(out)
    }

    /// Parse one datagram into pending entries.
    fn absorb(&mut self, data: &[u8]) -> Result<()> {
        for result in MessageIter::new(data) {
            let (header, payload) = result?;

            if header.nlmsg_seq != self.seq {
                continue;
            }

            match header.nlmsg_type {
                NlMsgType::DONE => {
                    self.done = true;
                    tracing::debug!(seq = self.seq, entries = self.count, "dump complete");
                    return Ok(());
                }
                NlMsgType::ERROR => {
                    let err = NlMsgError::from_bytes(payload)?;
                    if !err.is_ack() {
                        return Err(Error::from_errno(err.error));
                    }
                }
                NlMsgType::NOOP => {}
                msg_type => {
                    self.pending.push_back((self.parse)(msg_type, payload)?);
                    self.count += 1;
                }
            }
        }
        Ok(())
    }

    fn fail(&mut self, err: Error) -> Poll<Option<Result<T>>> {
        self.done = true;
        self.pending.clear();
        Poll::Ready(Some(Err(err)))
    }
}

impl<P: ProtocolState, T> Stream for DumpStream<'_, P, T> {
    type Item = Result<T>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        loop {
            if let Some(item) = this.pending.pop_front() {
                return Poll::Ready(Some(Ok(item)));
            }
            if this.done {
                return Poll::Ready(None);
            }

            match this.conn.socket().poll_recv(cx) {
                Poll::Ready(Ok(data)) => {
                    tracing::trace!(len = data.len(), "netlink dump datagram");
                    if let Err(e) = this.absorb(&data) {
                        return this.fail(e);
                    }
                    if let (Some(timeout), Some(deadline)) = (this.timeout, this.deadline.as_mut())
                    {
                        deadline.as_mut().reset(Instant::now() + timeout);
                    }
                }
                Poll::Ready(Err(e)) => return this.fail(e),
                Poll::Pending => {
                    if let (Some(timeout), Some(deadline)) = (this.timeout, this.deadline.as_mut())
                        && deadline.as_mut().poll(cx).is_ready()
                    {
                        return this.fail(Error::Timeout(timeout));
                    }
                    return Poll::Pending;
                }
            }
        }
    }
}

impl<P: ProtocolState, T> Unpin for DumpStream<'_, P, T> {}
