//! Command-line driver for dot search spaces.

use anyhow::Result;
use clap::Parser;
use dotspace_compiler::cli::{run_cli, Cli};

fn main() -> Result<()> {
    let cli = Cli::parse();
    run_cli(cli)
}
