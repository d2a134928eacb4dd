//! Command-line front end for the consultation relay.
//!
//! This crate provides the `consultrelay` binary: configuration loading,
//! logging setup and the `serve`, `appointments` and `config` commands.

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;

pub use cli::Cli;
pub use config::RelayConfig;
pub use error::{CliError, CliResult};
