//! xfrm command - IPsec SA and policy management.

mod commands;

use std::time::Duration;

use clap::{Parser, Subcommand};
use xfrmlink::netlink::namespace;
use xfrmlink::output::{OutputFormat, OutputOptions};
use xfrmlink::{Connection, PfKeyConnection, Xfrm};

#[derive(Parser)]
#[command(name = "xfrm", version, about = "IPsec SA and policy tool")]
struct Cli {
    /// Output JSON.
    #[arg(short = 'j', long)]
    json: bool,

    /// Pretty print JSON.
    #[arg(short = 'p', long)]
    pretty: bool,

    /// Show statistics.
    #[arg(short = 's', long)]
    stats: bool,

    /// Operate inside the named network namespace.
    #[arg(short = 'n', long, value_name = "NAME")]
    netns: Option<String>,

    /// Fail if the kernel does not answer within this many milliseconds.
    #[arg(long, value_name = "MS")]
    timeout: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

impl Cli {
    fn xfrm(&self) -> xfrmlink::Result<Connection<Xfrm>> {
        let conn = match &self.netns {
            Some(name) => Connection::<Xfrm>::new_in_namespace_path(namespace::netns_path(name))?,
            None => Connection::<Xfrm>::new()?,
        };
        Ok(match self.timeout {
            Some(ms) => conn.with_timeout(Duration::from_millis(ms)),
            None => conn,
        })
    }

    fn pfkey(&self) -> xfrmlink::Result<PfKeyConnection> {
        let conn = match &self.netns {
            Some(name) => PfKeyConnection::new_in_namespace_path(namespace::netns_path(name))?,
            None => PfKeyConnection::new()?,
        };
        Ok(match self.timeout {
            Some(ms) => conn.with_timeout(Duration::from_millis(ms)),
            None => conn,
        })
    }
}

#[derive(Subcommand)]
enum Command {
    /// Manage XFRM state (Security Associations).
    #[command(visible_alias = "sa")]
    State(commands::state::StateCmd),

    /// Manage XFRM policy (Security Policies).
    #[command(visible_alias = "sp")]
    Policy(commands::policy::PolicyCmd),

    /// Manage SAs through the PF_KEY v2 socket.
    Pfkey(commands::pfkey::PfKeyCmd),

    /// Build and inspect null-transform ESP framing.
    Esp(commands::esp::EspCmd),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .init();

    let cli = Cli::parse();

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };

    let opts = OutputOptions {
        stats: cli.stats,
        pretty: cli.pretty,
    };

    let result = match &cli.command {
        Command::State(cmd) => cmd.run(&cli.xfrm()?, format, &opts).await,
        Command::Policy(cmd) => cmd.run(&cli.xfrm()?, format, &opts).await,
        Command::Pfkey(cmd) => cmd.run(&cli.pfkey()?, format, &opts).await,
        Command::Esp(cmd) => cmd.run(),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    Ok(())
}
