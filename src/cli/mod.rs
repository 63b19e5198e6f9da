//! Command-line interface for anisource.
//!
//! The binary is a thin maintenance shell over the engine: identity lookups,
//! cache inspection and config checks. Searching needs source plugins, which
//! only an embedding application registers.

mod commands;

pub use commands::{Cli, run_command};
