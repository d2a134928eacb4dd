//! Core error types.

use std::path::PathBuf;

use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors raised while building or loading appointment and user data.
#[derive(Debug, Error)]
pub enum CoreError {
    /// An appointment record violates a model invariant.
    #[error("invalid appointment '{id}': {reason}")]
    InvalidAppointment { id: String, reason: String },

    /// Two appointments share the same identifier.
    #[error("duplicate appointment id: {id}")]
    DuplicateAppointment { id: String },

    /// Two user records share the same username.
    #[error("duplicate user: {username}")]
    DuplicateUser { username: String },

    /// A user record's password is not a bcrypt hash.
    #[error("password for user '{username}' is not a bcrypt hash")]
    InvalidPasswordHash { username: String },

    /// bcrypt refused to hash a password.
    #[error("password hashing failed: {0}")]
    Hashing(#[from] bcrypt::BcryptError),

    /// A data file could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A data file is not valid JSON for the expected shape.
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl CoreError {
    /// Creates an invalid appointment error.
    pub fn invalid_appointment(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidAppointment {
            id: id.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
