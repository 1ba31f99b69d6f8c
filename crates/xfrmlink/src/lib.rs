//! Async IPsec control plane for Linux.
//!
//! This crate talks to the kernel's IPsec subsystem over both control
//! protocols it offers, XFRM netlink and the legacy PF_KEY v2 socket, and
//! builds and parses ESP packets with the null transform so the resulting
//! data path can be checked by hand.
//!
//! # Features
//!
//! - `output` - JSON/text output formatting
//! - `integration` - Kernel integration tests (need root)
//!
//! # Example
//!
//! ```ignore
//! use xfrmlink::ipsec::{Algorithm, AuthAlgorithm, SaId, SecurityAssociation};
//! use xfrmlink::{Connection, Xfrm};
//!
//! #[tokio::main]
//! async fn main() -> xfrmlink::Result<()> {
//!     let conn = Connection::<Xfrm>::new()?;
//!
//!     let id = SaId::esp("192.0.2.1".parse()?, "192.0.2.2".parse()?, 0x1234);
//!     let sa = SecurityAssociation::new(id)
//!         .reqid(3320)
//!         .encryption(Algorithm::cbc_aes([0u8; 32]))
//!         .auth(AuthAlgorithm::hmac_sha1([0u8; 20]));
//!     conn.add_sa(&sa).await?;
//!
//!     for (sa, _attrs) in conn.dump_sa_all().await? {
//!         println!("{}", sa);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Null-transform ESP
//!
//! ```ignore
//! use xfrmlink::esp::{EspMode, NullTransform, decapsulate_null, encapsulate_null};
//! use xfrmlink::ipsec::Mode;
//!
//! let esp = encapsulate_null(&packet, 0xabcd, 1, EspMode::Transport, &NullTransform::new())?;
//! let dec = decapsulate_null(&esp, Mode::Transport, &NullTransform::new())?;
//! assert!(dec.inner_checksum_ok());
//! ```

// Core modules (always available)
pub mod codec;
pub mod esp;
pub mod ipsec;
pub mod netlink;
pub mod pfkey;

// Feature-gated modules
#[cfg(feature = "output")]
pub mod output;

// Re-export common types at crate root for convenience
pub use codec::WireStruct;
pub use ipsec::SaLifecycle;
pub use netlink::{Connection, Error, ErrorKind, Result, Xfrm};
pub use pfkey::PfKeyConnection;
