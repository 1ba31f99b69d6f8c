//! XFRM implementation for `Connection<Xfrm>`.
//!
//! This module provides methods for managing IPsec Security Associations
//! (SAs) and Security Policies (SPs) via the NETLINK_XFRM protocol.
//!
//! # Example
//!
//! ```ignore
//! use xfrmlink::netlink::{Connection, Xfrm};
//! use xfrmlink::ipsec::{Algorithm, AuthAlgorithm, SaId, SecurityAssociation};
//!
//! let conn = Connection::<Xfrm>::new()?;
//!
//! let sa = SecurityAssociation::new(SaId::esp(src, dst, 0x1234))
//!     .encryption(Algorithm::cbc_aes(enc_key))
//!     .auth(AuthAlgorithm::hmac_sha1(auth_key));
//! conn.add_sa(&sa).await?;
//!
//! for (sa, _attrs) in conn.dump_sa_all().await? {
//!     println!("{}", sa);
//! }
//! ```

mod attrs;
mod policy;
mod sa;
mod socket_policy;
pub mod types;

pub use attrs::{XfrmAttr, XfrmAttrs};
pub use socket_policy::{apply_socket_policy, clear_socket_policy, enable_udp_encap};

use crate::ipsec::lifecycle::SaLifecycle;
use crate::ipsec::sa::{SaId, SecurityAssociation};
use crate::netlink::connection::Connection;
use crate::netlink::error::Result;
use crate::netlink::protocol::Xfrm;

impl SaLifecycle for Connection<Xfrm> {
    async fn add_sa(&self, sa: &SecurityAssociation) -> Result<()> {
        Connection::<Xfrm>::add_sa(self, sa).await
    }

    async fn delete_sa(&self, id: &SaId) -> Result<()> {
        Connection::<Xfrm>::delete_sa(self, id).await
    }

    async fn dump_sas(&self) -> Result<Vec<SecurityAssociation>> {
        Ok(self
            .dump_sa_all()
            .await?
            .into_iter()
            .map(|(sa, _)| sa)
            .collect())
    }

    async fn flush_sa(&self) -> Result<()> {
        Connection::<Xfrm>::flush_sa(self).await
    }
}
