//! PF_KEY v2 control client.
//!
//! A second, independent way to manage the kernel SA table. Useful for
//! cross-checking XFRM netlink results and for software that still speaks
//! PF_KEY.

mod connection;
pub mod message;
mod socket;

pub use connection::PfKeyConnection;
pub use message::{PfKeyMessage, SadbExt, SadbMsg};
pub use socket::PfKeySocket;
