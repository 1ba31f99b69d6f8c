//! xfrm state command implementation.

use std::net::IpAddr;

use clap::{Args, Subcommand};
use tokio_stream::StreamExt;
use xfrmlink::ipsec::{IPSEC_PROTO_ANY, IpsecProtocol, SaId, SecurityAssociation};
use xfrmlink::output::{OutputFormat, OutputOptions, Printable, print_all};
use xfrmlink::{Connection, Result, Xfrm};

use super::{ProtoArg, parse_u32};

#[derive(Args)]
pub struct StateCmd {
    #[command(subcommand)]
    action: Option<StateAction>,
}

#[derive(Subcommand)]
enum StateAction {
    /// List XFRM states.
    #[command(visible_alias = "ls", visible_alias = "show")]
    List,

    /// Show the state with the given SPI.
    Get {
        /// SPI, decimal or 0x-prefixed hex.
        #[arg(long, value_parser = parse_u32)]
        spi: u32,
    },

    /// Flush XFRM states.
    Flush {
        /// Only flush states of this protocol.
        #[arg(long, value_enum)]
        proto: Option<ProtoArg>,
    },

    /// Delete one state.
    #[command(visible_alias = "del")]
    Delete {
        /// Source address.
        #[arg(long)]
        src: IpAddr,

        /// Destination address.
        #[arg(long)]
        dst: IpAddr,

        /// SPI, decimal or 0x-prefixed hex.
        #[arg(long, value_parser = parse_u32)]
        spi: u32,

        /// IPsec protocol.
        #[arg(long, value_enum, default_value = "esp")]
        proto: ProtoArg,
    },

    /// Reserve a free SPI.
    AllocSpi {
        /// Destination address.
        #[arg(long)]
        dst: IpAddr,

        /// IPsec protocol.
        #[arg(long, value_enum, default_value = "esp")]
        proto: ProtoArg,

        /// Lowest acceptable SPI.
        #[arg(long, value_parser = parse_u32, default_value = "0x100")]
        min: u32,

        /// Highest acceptable SPI.
        #[arg(long, value_parser = parse_u32, default_value = "0xffffffff")]
        max: u32,
    },

    /// Print the number of states.
    Count,
}

impl StateCmd {
    pub async fn run(
        &self,
        conn: &Connection<Xfrm>,
        format: OutputFormat,
        opts: &OutputOptions,
    ) -> Result<()> {
        match self.action.as_ref().unwrap_or(&StateAction::List) {
            StateAction::List => {
                let states: Vec<SecurityAssociation> = conn
                    .dump_sa_all()
                    .await?
                    .into_iter()
                    .map(|(sa, _)| sa)
                    .collect();
                print_all(&states, &mut std::io::stdout().lock(), format, opts)
            }
            StateAction::Get { spi } => match conn.find_sa(*spi).await? {
                Some(sa) => sa.print(&mut std::io::stdout().lock(), format, opts),
                None => Err(xfrmlink::Error::InvalidMessage(format!(
                    "no state with spi 0x{:08x}",
                    spi
                ))),
            },
            StateAction::Flush { proto } => match proto {
                Some(proto) => {
                    conn.flush_sa_proto(IpsecProtocol::from(*proto).number())
                        .await
                }
                None => conn.flush_sa_proto(IPSEC_PROTO_ANY).await,
            },
            StateAction::Delete {
                src,
                dst,
                spi,
                proto,
            } => {
                let id = SaId::new((*proto).into(), *src, *dst, *spi);
                conn.delete_sa(&id).await
            }
            StateAction::AllocSpi {
                dst,
                proto,
                min,
                max,
            } => {
                let shell = conn.alloc_spi(*dst, (*proto).into(), *min, *max).await?;
                println!("0x{:08x}", shell.id.spi);
                Ok(())
            }
            StateAction::Count => {
                let mut stream = conn.dump_sa().await?;
                let mut count = 0usize;
                while let Some(entry) = stream.next().await {
                    entry?;
                    count += 1;
                }
                println!("{}", count);
                Ok(())
            }
        }
    }
}
