//! Procwatch - run child processes and wait for all of them to exit.
//!
//! Each subcommand runs through a shared process registry; the binary
//! only exits once that registry reports no live children.

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;

use procwatch::cli::{execute, Cli};
use procwatch::logging::init_tracing;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    init_tracing();
    let cli = Cli::parse();
    execute(cli).await
}
