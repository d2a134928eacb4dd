//! Command-line interface definition.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

use consultrelay_core::DEFAULT_HASH_COST;

/// consultrelay - signaling relay for video consultations
#[derive(Debug, Parser)]
#[command(name = "consultrelay")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, short, env = "CONSULTRELAY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable debug output
    #[arg(long, short = 'v')]
    pub debug: bool,

    /// Emit logs as JSON lines
    #[arg(long, conflicts_with = "debug")]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the relay in the foreground (default)
    Serve {
        /// Address to listen on, overriding the configuration file
        #[arg(long, short)]
        listen: Option<SocketAddr>,
    },

    /// List a user's appointments from the catalog
    Appointments {
        /// Username of the doctor or patient
        #[arg(long, short)]
        user: String,
    },

    /// Print the bcrypt hash of a password for the users file
    HashPassword {
        /// Password to hash; read from stdin when omitted
        password: Option<String>,

        /// bcrypt cost factor (4-31)
        #[arg(long, default_value_t = DEFAULT_HASH_COST)]
        cost: u32,
    },

    /// Configuration commands
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Configuration actions.
#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Dump current configuration
    Dump,

    /// Show configuration file path
    Path,
}
