//! The SA lifecycle shared by both control protocols.

use super::sa::{SaId, SecurityAssociation};
use crate::netlink::Result;

/// Add, delete, list and flush SAs.
///
/// Implemented by the XFRM netlink client and the PF_KEY client so a caller
/// can drive either one, or cross-check one against the other on the same
/// kernel SA table.
///
/// ```ignore
/// use xfrmlink::{Connection, PfKeyConnection, SaLifecycle, Xfrm};
///
/// async fn count(client: &impl SaLifecycle) -> xfrmlink::Result<usize> {
///     Ok(client.dump_sas().await?.len())
/// }
///
/// let pfkey = PfKeyConnection::new()?;
/// pfkey.add_sa(&sa).await?;
/// assert_eq!(count(&Connection::<Xfrm>::new()?).await?, 1);
/// ```
#[allow(async_fn_in_trait)]
pub trait SaLifecycle {
    /// Install a new SA. Fails if the id is taken.
    async fn add_sa(&self, sa: &SecurityAssociation) -> Result<()>;

    /// Remove an SA. Fails with a not-found error if absent.
    async fn delete_sa(&self, id: &SaId) -> Result<()>;

    /// Fresh listing of all SAs.
    async fn dump_sas(&self) -> Result<Vec<SecurityAssociation>>;

    /// Remove all SAs.
    async fn flush_sa(&self) -> Result<()>;
}
