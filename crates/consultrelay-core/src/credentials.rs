//! Username/password authentication.
//!
//! The relay trusts the `username` a client presents in its `join` message;
//! that name is obtained beforehand from an [`Authenticator`]. The bundled
//! [`StaticUserDirectory`] checks credentials against a user file loaded at
//! startup. Stored passwords are bcrypt hashes; plaintext entries are
//! rejected when the file is loaded.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::appointment::Party;
use crate::error::{CoreError, CoreResult};

/// Login request body.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

/// bcrypt cost used when hashing new passwords.
pub const DEFAULT_HASH_COST: u32 = bcrypt::DEFAULT_COST;

/// Hashes `password` with bcrypt at the given cost (4 to 31).
pub fn hash_password(password: &str, cost: u32) -> CoreResult<String> {
    Ok(bcrypt::hash(password, cost)?)
}

/// Stored user entry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UserRecord {
    pub username: String,
    /// bcrypt hash (`$2b$10$...`).
    pub password: String,
    pub role: Party,
}

impl UserRecord {
    /// Creates a record, hashing `password` at `cost`.
    pub fn hashed(
        username: impl Into<String>,
        password: &str,
        role: Party,
        cost: u32,
    ) -> CoreResult<Self> {
        Ok(Self {
            username: username.into(),
            password: hash_password(password, cost)?,
            role,
        })
    }
}

/// Identity returned on successful authentication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthenticatedUser {
    pub username: String,
    pub role: Party,
}

/// Result of an authentication attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    Success(AuthenticatedUser),
    Failure { message: String },
}

impl AuthOutcome {
    pub fn failure(message: impl Into<String>) -> Self {
        Self::Failure {
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

/// Verifies credentials and resolves them to an identity.
pub trait Authenticator: Send + Sync {
    fn authenticate(&self, credentials: &Credentials) -> AuthOutcome;
}

/// In-memory user directory keyed by username.
#[derive(Debug, Clone, Default)]
pub struct StaticUserDirectory {
    users: HashMap<String, UserRecord>,
}

impl StaticUserDirectory {
    /// Builds a directory, rejecting duplicate usernames and passwords
    /// that are not bcrypt hashes.
    pub fn from_records(records: Vec<UserRecord>) -> CoreResult<Self> {
        let mut users = HashMap::with_capacity(records.len());
        for record in records {
            if record.password.parse::<bcrypt::HashParts>().is_err() {
                return Err(CoreError::InvalidPasswordHash {
                    username: record.username,
                });
            }
            if users.contains_key(&record.username) {
                return Err(CoreError::DuplicateUser {
                    username: record.username,
                });
            }
            users.insert(record.username.clone(), record);
        }
        Ok(Self { users })
    }

    /// Parses a JSON array of `{ username, password, role }` records.
    pub fn from_json(json: &str) -> CoreResult<Self> {
        let records: Vec<UserRecord> = serde_json::from_str(json)?;
        Self::from_records(records)
    }

    /// Loads a user directory from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> CoreResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| CoreError::io(path, e))?;
        let directory = Self::from_json(&content)?;
        debug!(path = %path.display(), count = directory.len(), "Loaded user directory");
        Ok(directory)
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

impl Authenticator for StaticUserDirectory {
    fn authenticate(&self, credentials: &Credentials) -> AuthOutcome {
        let Some(user) = self.users.get(&credentials.username) else {
            return AuthOutcome::failure("invalid username or password");
        };

        let matches = match bcrypt::verify(&credentials.password, &user.password) {
            Ok(matches) => matches,
            Err(e) => {
                warn!(username = %user.username, error = %e, "Stored password hash unusable");
                false
            }
        };
        if !matches {
            return AuthOutcome::failure("invalid username or password");
        }

        AuthOutcome::Success(AuthenticatedUser {
            username: user.username.clone(),
            role: user.role,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const COST: u32 = 4;

    fn directory() -> StaticUserDirectory {
        StaticUserDirectory::from_records(vec![
            UserRecord::hashed("dr.sari", "dokter123", Party::Doctor, COST).unwrap(),
            UserRecord::hashed("budi", "pasien123", Party::Patient, COST).unwrap(),
        ])
        .unwrap()
    }

    #[test]
    fn authenticates_valid_credentials() {
        let outcome = directory().authenticate(&Credentials::new("dr.sari", "dokter123"));
        assert_eq!(
            outcome,
            AuthOutcome::Success(AuthenticatedUser {
                username: "dr.sari".into(),
                role: Party::Doctor,
            })
        );
    }

    #[test]
    fn rejects_wrong_password() {
        let outcome = directory().authenticate(&Credentials::new("budi", "dokter123"));
        assert!(!outcome.is_success());
    }

    #[test]
    fn rejects_unknown_user() {
        let outcome = directory().authenticate(&Credentials::new("eve", "pasien123"));
        assert!(matches!(outcome, AuthOutcome::Failure { .. }));
    }

    #[test]
    fn rejects_password_prefix() {
        let outcome = directory().authenticate(&Credentials::new("budi", "pasien"));
        assert!(!outcome.is_success());
    }

    #[test]
    fn stored_value_is_a_hash() {
        let record = UserRecord::hashed("budi", "pasien123", Party::Patient, COST).unwrap();
        assert_ne!(record.password, "pasien123");
        assert!(record.password.starts_with("$2b$04$"), "{}", record.password);
        assert!(bcrypt::verify("pasien123", &record.password).unwrap());
    }

    #[test]
    fn loads_hashed_json() {
        let json = format!(
            r#"[{{ "username": "budi", "password": "{}", "role": "patient" }}]"#,
            hash_password("pasien123", COST).unwrap()
        );
        let directory = StaticUserDirectory::from_json(&json).unwrap();
        assert_eq!(directory.len(), 1);
        assert!(
            directory
                .authenticate(&Credentials::new("budi", "pasien123"))
                .is_success()
        );
    }

    #[test]
    fn rejects_plaintext_passwords() {
        let json = r#"[{ "username": "budi", "password": "pasien123", "role": "patient" }]"#;
        let err = StaticUserDirectory::from_json(json).unwrap_err();
        assert!(matches!(err, CoreError::InvalidPasswordHash { ref username } if username == "budi"));
    }

    #[test]
    fn rejects_duplicate_usernames() {
        let err = StaticUserDirectory::from_records(vec![
            UserRecord::hashed("a", "x", Party::Doctor, COST).unwrap(),
            UserRecord::hashed("a", "y", Party::Patient, COST).unwrap(),
        ])
        .unwrap_err();
        assert!(matches!(err, CoreError::DuplicateUser { .. }));
    }

    #[test]
    fn cost_out_of_range_is_an_error() {
        assert!(matches!(hash_password("x", 3), Err(CoreError::Hashing(_))));
    }

    #[test]
    fn authenticated_user_shape() {
        let user = AuthenticatedUser {
            username: "budi".into(),
            role: Party::Patient,
        };
        insta::assert_json_snapshot!(user, @r#"
        {
          "username": "budi",
          "role": "patient"
        }
        "#);
    }
}
