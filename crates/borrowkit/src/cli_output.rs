//! CLI output. Results go to stdout as JSON; logs stay on stderr.

use std::io::Write as _;

use eyre::Context as _;
use serde::Serialize;

pub fn print_json<T: Serialize>(value: &T) -> eyre::Result<()> {
    let s = serde_json::to_string_pretty(value).context("serialize output")?;
    writeln!(std::io::stdout().lock(), "{s}").context("write output")?;
    Ok(())
}

