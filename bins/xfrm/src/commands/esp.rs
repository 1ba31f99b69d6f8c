//! xfrm esp command implementation.
//!
//! Offline helpers for the null-transform ESP codec. No kernel access.

use clap::{Args, Subcommand, ValueEnum};
use xfrmlink::Result;
use xfrmlink::esp::{EspHeader, EspTransform, esp_packet_length};

use super::parse_u32;

#[derive(Args)]
pub struct EspCmd {
    #[command(subcommand)]
    action: EspAction,
}

#[derive(Subcommand)]
enum EspAction {
    /// Print an ESP header as hex.
    Header {
        /// SPI, decimal or 0x-prefixed hex.
        #[arg(long, value_parser = parse_u32)]
        spi: u32,

        /// Sequence number.
        #[arg(long, value_parser = parse_u32, default_value = "1")]
        seq: u32,
    },

    /// Print the ESP payload length for an inner packet length.
    Length {
        /// Cipher and auth combination.
        #[arg(long, value_enum, default_value = "aes-sha1")]
        transform: TransformArg,

        /// Bytes protected by ESP (transport payload or whole inner packet).
        #[arg(long)]
        inner_len: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum TransformArg {
    /// cbc(aes) with hmac(sha1) truncated to 96 bits.
    AesSha1,
    /// ecb(cipher_null) with digest_null.
    Null,
}

impl EspCmd {
    pub fn run(&self) -> Result<()> {
        match &self.action {
            EspAction::Header { spi, seq } => {
                let hdr = EspHeader::new(*spi, *seq);
                let hex: String = hdr.pack().iter().map(|b| format!("{:02x}", b)).collect();
                println!("{}", hex);
            }
            EspAction::Length {
                transform,
                inner_len,
            } => {
                let transform = match transform {
                    TransformArg::AesSha1 => EspTransform::cbc_aes_hmac_sha1_96(),
                    TransformArg::Null => EspTransform::null(),
                };
                println!("{}", esp_packet_length(&transform, *inner_len));
            }
        }
        Ok(())
    }
}
