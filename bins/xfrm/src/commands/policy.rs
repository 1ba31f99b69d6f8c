//! xfrm policy command implementation.

use clap::{Args, Subcommand};
use xfrmlink::ipsec::SecurityPolicy;
use xfrmlink::output::{OutputFormat, OutputOptions, print_all};
use xfrmlink::{Connection, Result, Xfrm};

#[derive(Args)]
pub struct PolicyCmd {
    #[command(subcommand)]
    action: Option<PolicyAction>,
}

#[derive(Subcommand)]
enum PolicyAction {
    /// List XFRM policies.
    #[command(visible_alias = "ls", visible_alias = "show")]
    List,
    /// Flush all XFRM policies.
    Flush,
    /// Print the number of policies.
    Count,
}

impl PolicyCmd {
    pub async fn run(
        &self,
        conn: &Connection<Xfrm>,
        format: OutputFormat,
        opts: &OutputOptions,
    ) -> Result<()> {
        match self.action.as_ref().unwrap_or(&PolicyAction::List) {
            PolicyAction::List => {
                let policies: Vec<SecurityPolicy> = conn
                    .dump_policy_all()
                    .await?
                    .into_iter()
                    .map(|(policy, _)| policy)
                    .collect();
                print_all(&policies, &mut std::io::stdout().lock(), format, opts)
            }
            PolicyAction::Flush => conn.flush_policy().await,
            PolicyAction::Count => {
                println!("{}", conn.dump_policy_all().await?.len());
                Ok(())
            }
        }
    }
}
