//! Async netlink transport and the XFRM family.
//!
//! # Quick Start
//!
//! ```ignore
//! use xfrmlink::netlink::{Connection, Xfrm};
//!
//! let conn = Connection::<Xfrm>::new()?;
//!
//! for (sa, _attrs) in conn.dump_sa_all().await? {
//!     println!("{}", sa);
//! }
//! conn.flush_sa().await?;
//! ```

pub mod attr;
mod builder;
pub mod connection;
mod error;
pub mod message;
pub mod namespace;
mod protocol;
mod socket;
pub mod stream;
pub mod xfrm;

pub use attr::{AttrIter, AttrMap, NlAttr};
pub use builder::MessageBuilder;
pub use connection::Connection;
pub use error::{Error, ErrorKind, Result};
pub use message::{MessageIter, NLMSG_HDRLEN, NlMsgHdr, NlMsgType};
pub use protocol::{ProtocolState, Xfrm};
pub use socket::{NetlinkSocket, Protocol};
pub use stream::DumpStream;
pub use xfrm::{XfrmAttr, XfrmAttrs};
