//! ESP packet codec.
//!
//! Builds and parses ESP packets with the null transform, with optional
//! ESP-in-UDP framing. Everything here is a pure function over byte buffers.
//!
//! # Example
//!
//! ```ignore
//! use xfrmlink::esp::{EspMode, NullTransform, decapsulate_null, encapsulate_null};
//! use xfrmlink::ipsec::Mode;
//!
//! let esp = encapsulate_null(&packet, 0xabcd, 1, EspMode::Transport, &NullTransform::new())?;
//! let dec = decapsulate_null(&esp, Mode::Transport, &NullTransform::new())?;
//! assert_eq!(dec.packet, packet);
//! ```

mod header;
pub mod ip;
mod null;
mod udp;

pub use header::EspHeader;
pub use ip::{IpPacket, udp_packet};
pub use null::{
    Decapsulated, EspMode, EspTransform, NullTransform, decapsulate_null, encapsulate_null,
    esp_packet_length,
};
pub use udp::{
    NAT_T_PORT, UdpHeader, decap_ip_packet, encap_ip_packet, unwrap_udp_encap, wrap_udp_encap,
    wrap_udp_encap_with,
};
