//! Output formatting (JSON/text) for SAs and policies.
//!
//! Text follows `ip xfrm state` / `ip xfrm policy`; JSON is the serde form of
//! the same types.

use std::io::Write;

use serde::Serialize;

use crate::ipsec::policy::SecurityPolicy;
use crate::ipsec::sa::SecurityAssociation;
use crate::netlink::Result;

/// Output format options.
#[derive(Debug, Clone, Copy, Default)]
pub struct OutputOptions {
    /// Show lifetime counters and statistics.
    pub stats: bool,
    /// Pretty print (for JSON).
    pub pretty: bool,
}

/// Output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Plain text output.
    #[default]
    Text,
    /// JSON output.
    Json,
}

fn write_json<W: Write>(w: &mut W, value: &serde_json::Value, opts: &OutputOptions) -> Result<()> {
    if opts.pretty {
        serde_json::to_writer_pretty(&mut *w, value)?;
    } else {
        serde_json::to_writer(&mut *w, value)?;
    }
    writeln!(w)?;
    Ok(())
}

/// Trait for types that can be printed.
pub trait Printable: Serialize {
    /// Print as plain text.
    fn print_text<W: Write>(&self, w: &mut W, opts: &OutputOptions) -> std::io::Result<()>;

    /// Convert to JSON value.
    fn to_json(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Print in the specified format.
    fn print<W: Write>(&self, w: &mut W, format: OutputFormat, opts: &OutputOptions) -> Result<()> {
        match format {
            OutputFormat::Text => Ok(self.print_text(w, opts)?),
            OutputFormat::Json => write_json(w, &self.to_json()?, opts),
        }
    }
}

/// Print a list: one entry after another as text, or a single JSON array.
pub fn print_all<T: Printable, W: Write>(
    items: &[T],
    w: &mut W,
    format: OutputFormat,
    opts: &OutputOptions,
) -> Result<()> {
    match format {
        OutputFormat::Text => {
            for item in items {
                item.print_text(w, opts)?;
            }
            Ok(())
        }
        OutputFormat::Json => {
            let values = items
                .iter()
                .map(Printable::to_json)
                .collect::<Result<Vec<_>>>()?;
            write_json(w, &serde_json::Value::Array(values), opts)
        }
    }
}

impl Printable for SecurityAssociation {
    fn print_text<W: Write>(&self, w: &mut W, opts: &OutputOptions) -> std::io::Result<()> {
        write!(w, "{}", self)?;
        if opts.stats {
            writeln!(w, "\tlifetime current:")?;
            writeln!(
                w,
                "\t  {}(bytes), {}(packets)",
                self.current.bytes, self.current.packets
            )?;
            writeln!(
                w,
                "\t  add {} use {}",
                self.current.add_time, self.current.use_time
            )?;
            writeln!(w, "\tstats:")?;
            writeln!(
                w,
                "\t  replay-window {} replay {} failed {}",
                self.stats.replay_window, self.stats.replay, self.stats.integrity_failed
            )?;
        }
        Ok(())
    }
}

impl Printable for SecurityPolicy {
    fn print_text<W: Write>(&self, w: &mut W, _opts: &OutputOptions) -> std::io::Result<()> {
        write!(w, "{}", self)
    }
}
