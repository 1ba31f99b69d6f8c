//! Protocol state types for strongly-typed connections.
//!
//! Each netlink family served by [`Connection`](super::Connection) gets a
//! state type, and family-specific operations are implemented on
//! `Connection<State>` only. The [`ProtocolState`] trait is sealed.
//!
//! ```ignore
//! use xfrmlink::{Connection, Xfrm};
//!
//! let conn = Connection::<Xfrm>::new()?;
//! conn.flush_sa().await?;
//! ```

use super::socket::Protocol;

/// Sealed trait module to prevent external implementations.
mod private {
    pub trait Sealed {}
}

/// Protocol state trait for typed connections.
pub trait ProtocolState: private::Sealed + Default {
    /// The netlink protocol for this state type.
    const PROTOCOL: Protocol;
}

/// XFRM protocol state (NETLINK_XFRM).
///
/// Used for SA and policy database operations. Zero-sized.
#[derive(Debug, Default, Clone, Copy)]
pub struct Xfrm;

impl private::Sealed for Xfrm {}

impl ProtocolState for Xfrm {
    const PROTOCOL: Protocol = Protocol::Xfrm;
}
