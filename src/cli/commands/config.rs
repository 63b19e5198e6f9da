//! Config inspection commands.

use std::path::Path;

use anisource::config;

/// Validate the config file, exiting non-zero on any problem
pub fn cmd_config_check(path: Option<&Path>) -> anyhow::Result<()> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => config::config_path()
            .ok_or_else(|| anyhow::anyhow!("could not determine config directory"))?,
    };

    let config = if path.exists() {
        config::load_from(&path)?
    } else {
        println!("No config file at {:?}; checking defaults", path);
        config::Config::default()
    };

    config.validate()?;
    println!("✓ {:?} is valid", path);
    Ok(())
}

/// Print the config file location
pub fn cmd_config_path(path: Option<&Path>) -> anyhow::Result<()> {
    match path.map(Path::to_path_buf).or_else(config::config_path) {
        Some(path) => {
            println!("{}", path.display());
            Ok(())
        }
        None => anyhow::bail!("could not determine config directory"),
    }
}
