//! CLI command definitions and dispatch.
//!
//! Each subcommand group is implemented in its own submodule:
//! - `identify`: Title to AniList id resolution
//! - `cache`: Cache statistics and maintenance
//! - `config`: Config file location and validation

mod cache;
mod config;
mod identify;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tokio::runtime::Runtime;

use anisource::config::Config;

pub use cache::{cmd_cache_invalidate, cmd_cache_purge, cmd_cache_stats};
pub use config::{cmd_config_check, cmd_config_path};
pub use identify::cmd_identify;

/// anisource CLI
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file to use instead of the default location
    #[arg(long, global = true, env = "ANISOURCE_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand)]
pub enum Commands {
    /// Resolve a title to its AniList id
    Identify {
        /// Title as shown by a source site
        title: String,
        /// Minimum confidence (0.0-1.0), overriding the config
        #[arg(long)]
        min_confidence: Option<f32>,
    },
    /// Inspect or maintain the cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
    /// Inspect the configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
pub enum CacheAction {
    /// Show entry counts per shard and namespace
    Stats,
    /// Delete expired entries
    Purge,
    /// Delete entries of a namespace by key prefix
    Invalidate {
        /// search, episodes or identity
        namespace: String,
        /// Key prefix; omit to clear the whole namespace
        #[arg(default_value = "")]
        prefix: String,
    },
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Validate the config file
    Check,
    /// Print the config file location
    Path,
}

/// Run the specified CLI command.
pub fn run_command(cli: &Cli) -> anyhow::Result<()> {
    match &cli.command {
        Commands::Identify {
            title,
            min_confidence,
        } => {
            let rt = Runtime::new()?;
            cmd_identify(&rt, load_config(cli)?, title, *min_confidence)
        }
        Commands::Cache { action } => {
            let rt = Runtime::new()?;
            let config = load_config(cli)?;
            match action {
                CacheAction::Stats => cmd_cache_stats(&rt, &config),
                CacheAction::Purge => cmd_cache_purge(&rt, &config),
                CacheAction::Invalidate { namespace, prefix } => {
                    cmd_cache_invalidate(&rt, &config, namespace, prefix)
                }
            }
        }
        Commands::Config { action } => match action {
            ConfigAction::Check => cmd_config_check(cli.config.as_deref()),
            ConfigAction::Path => cmd_config_path(cli.config.as_deref()),
        },
    }
}

/// Config from `--config` (errors are fatal) or the default location.
fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    match &cli.config {
        Some(path) => Ok(anisource::config::load_from(path)?),
        None => Ok(anisource::config::load()),
    }
}
