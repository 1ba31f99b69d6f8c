//! xfrm pfkey command implementation.
//!
//! Same SA table as `xfrm state`, read through the legacy PF_KEY socket.

use clap::{Args, Subcommand};
use xfrmlink::ipsec::SecurityAssociation;
use xfrmlink::output::{OutputFormat, OutputOptions, print_all};
use xfrmlink::{PfKeyConnection, Result};

#[derive(Args)]
pub struct PfKeyCmd {
    #[command(subcommand)]
    action: PfKeyAction,
}

#[derive(Subcommand)]
enum PfKeyAction {
    /// Dump all SAs.
    Dump,
    /// Remove all SAs.
    Flush,
}

impl PfKeyCmd {
    pub async fn run(
        &self,
        conn: &PfKeyConnection,
        format: OutputFormat,
        opts: &OutputOptions,
    ) -> Result<()> {
        match self.action {
            PfKeyAction::Dump => {
                let states = conn
                    .dump_sa()
                    .await?
                    .iter()
                    .map(|msg| msg.to_sa())
                    .collect::<Result<Vec<SecurityAssociation>>>()?;
                print_all(&states, &mut std::io::stdout().lock(), format, opts)
            }
            PfKeyAction::Flush => conn.flush_sa().await,
        }
    }
}
