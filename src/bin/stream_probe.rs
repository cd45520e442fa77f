//! Binary entry point for the stream probe.
//!
//! The runtime logic lives in `render_stream::probe`, so this binary only
//! parses arguments and delegates to the shared library code.

use anyhow::Result;
use clap::Parser;
use cli_defs::Cli;

#[tokio::main]
async fn main() -> Result<()> { render_stream::probe::run(Cli::parse()).await }
