//! anisource - maintenance CLI for the anisource engine.
//!
//! Resolves titles to AniList ids and inspects or prunes the shared cache.

mod cli;

use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();

    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env().add_directive("anisource=info".parse()?))
        .init();

    cli::run_command(&args)
}
