//! Configuration commands.

use std::path::Path;

use crate::config::RelayConfig;
use crate::error::{CliError, CliResult};

/// Dump the effective configuration to stdout.
pub fn dump(config: &RelayConfig, source: &Path) -> CliResult<()> {
    let toml_str = toml::to_string_pretty(config)
        .map_err(|e| CliError::Config(format!("failed to serialize config: {}", e)))?;
    println!("# config.toml ({})", source.display());
    println!("{}", toml_str);
    println!("# appointments: {}", config.catalog_path().display());
    println!("# users: {}", config.users_path().display());

    Ok(())
}

/// Show the configuration file path.
pub fn path(source: &Path) -> CliResult<()> {
    println!("config: {}", source.display());
    Ok(())
}
