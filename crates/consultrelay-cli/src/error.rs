//! CLI error types.

use std::fmt;

use consultrelay_core::{CoreError, TracingError};
use consultrelay_server::ServerError;

/// Result type for CLI operations.
pub type CliResult<T> = Result<T, CliError>;

/// Errors that can occur in the command-line front end.
#[derive(Debug)]
pub enum CliError {
    /// Configuration error.
    Config(String),
    /// Invalid command-line or stdin input.
    Input(String),
    /// IO error.
    Io(std::io::Error),
    /// The relay failed to start or stopped with an error.
    Server(ServerError),
    /// Catalog or user directory could not be loaded.
    Core(CoreError),
    /// Logging could not be initialized.
    Tracing(TracingError),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "configuration error: {}", msg),
            Self::Input(msg) => write!(f, "invalid input: {}", msg),
            Self::Io(err) => write!(f, "IO error: {}", err),
            Self::Server(err) => write!(f, "server error: {}", err),
            Self::Core(err) => write!(f, "{}", err),
            Self::Tracing(err) => write!(f, "logging setup failed: {}", err),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Server(err) => Some(err),
            Self::Core(err) => Some(err),
            Self::Tracing(err) => Some(err),
            Self::Config(_) | Self::Input(_) => None,
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<ServerError> for CliError {
    fn from(err: ServerError) -> Self {
        Self::Server(err)
    }
}

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        Self::Core(err)
    }
}

impl From<TracingError> for CliError {
    fn from(err: TracingError) -> Self {
        Self::Tracing(err)
    }
}
