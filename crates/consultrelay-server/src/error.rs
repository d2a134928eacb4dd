//! Server error types.

use std::io;
use std::net::SocketAddr;
use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur in the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// IO error on an accepted socket.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Handshake, framing or message error.
    #[error("Protocol error: {0}")]
    Protocol(#[from] consultrelay_protocol::ProtocolError),

    /// Catalog or credential store error.
    #[error("Core error: {0}")]
    Core(#[from] consultrelay_core::CoreError),

    /// The listener could not be bound.
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    /// Configuration error.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Shutdown requested.
    #[error("Server shutdown requested")]
    Shutdown,
}

impl ServerError {
    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn bind(addr: SocketAddr, source: io::Error) -> Self {
        Self::Bind { addr, source }
    }
}
