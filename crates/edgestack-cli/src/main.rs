//! # edgestack
//!
//! Synthesizes the certificate and service stacks of one stage into a
//! cloud assembly for the provisioning engine.

// Command results go to stdout; logs go to stderr.
#![allow(clippy::print_stdout)]

mod commands;
mod output;

use clap::Parser;

use crate::commands::Cli;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    commands::execute(cli)
}
