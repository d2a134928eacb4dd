//! Subcommand implementations.

pub mod appointments;
pub mod config;
pub mod hash_password;
pub mod serve;
