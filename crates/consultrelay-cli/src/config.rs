//! Relay configuration.
//!
//! All settings live in a single `config.toml` file at
//! `~/.config/consultrelay/config.toml` by default. Every key is optional:
//!
//! ```toml
//! [server]
//! listen_addr = "0.0.0.0:8080"
//! max_frame_size = 1048576
//! handshake_timeout_secs = 10
//! join_timeout_secs = 30
//! write_timeout_secs = 10
//! shutdown_grace_secs = 5
//! max_connections = 100
//!
//! [catalog]
//! path = "/etc/consultrelay/appointments.json"
//!
//! [auth]
//! users = "/etc/consultrelay/users.json"
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use consultrelay_server::ServerConfig;

use crate::error::{CliError, CliResult};

const APPOINTMENTS_FILE: &str = "appointments.json";
const USERS_FILE: &str = "users.json";

/// Configuration for the relay daemon.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Listener and connection settings.
    pub server: ServerSettings,

    /// Appointment catalog settings.
    pub catalog: CatalogSettings,

    /// Login settings.
    pub auth: AuthSettings,
}

/// Listener and connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub listen_addr: SocketAddr,

    /// Largest accepted frame payload, in bytes.
    pub max_frame_size: u64,

    pub handshake_timeout_secs: u64,

    /// Time allowed between the upgrade and the `join` message.
    pub join_timeout_secs: u64,

    pub write_timeout_secs: u64,

    /// Time open sessions get to close after a shutdown signal. Zero aborts
    /// them at once.
    pub shutdown_grace_secs: u64,

    pub max_connections: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        let defaults = ServerConfig::default();
        Self {
            listen_addr: defaults.listen_addr,
            max_frame_size: defaults.max_frame_size,
            handshake_timeout_secs: defaults.handshake_timeout.as_secs(),
            join_timeout_secs: defaults.join_timeout.as_secs(),
            write_timeout_secs: defaults.write_timeout.as_secs(),
            shutdown_grace_secs: defaults.shutdown_grace.as_secs(),
            max_connections: defaults.max_connections,
        }
    }
}

/// Appointment catalog settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogSettings {
    /// Path to the appointments JSON file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

/// Login settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthSettings {
    /// Path to the users JSON file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub users: Option<PathBuf>,
}

impl RelayConfig {
    /// Loads configuration from the default path.
    pub fn load() -> Result<Self, String> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Loads configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self, String> {
        let content =
            std::fs::read_to_string(path).map_err(|e| format!("failed to read config: {}", e))?;
        toml::from_str(&content).map_err(|e| format!("failed to parse config: {}", e))
    }

    /// Returns the default configuration file path.
    pub fn default_path() -> PathBuf {
        Self::default_config_dir().join("config.toml")
    }

    /// Returns the default configuration directory.
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("consultrelay")
    }

    /// Appointments file, falling back to the configuration directory.
    pub fn catalog_path(&self) -> PathBuf {
        self.catalog
            .path
            .clone()
            .unwrap_or_else(|| Self::default_config_dir().join(APPOINTMENTS_FILE))
    }

    /// Users file, falling back to the configuration directory.
    pub fn users_path(&self) -> PathBuf {
        self.auth
            .users
            .clone()
            .unwrap_or_else(|| Self::default_config_dir().join(USERS_FILE))
    }

    /// Builds the server configuration, rejecting zero limits.
    pub fn to_server_config(&self) -> CliResult<ServerConfig> {
        let s = &self.server;
        let nonzero = [
            ("max_frame_size", s.max_frame_size),
            ("handshake_timeout_secs", s.handshake_timeout_secs),
            ("join_timeout_secs", s.join_timeout_secs),
            ("write_timeout_secs", s.write_timeout_secs),
            ("max_connections", s.max_connections as u64),
        ];
        if let Some((key, _)) = nonzero.iter().find(|(_, value)| *value == 0) {
            return Err(CliError::Config(format!(
                "[server] {} must be greater than zero",
                key
            )));
        }

        Ok(ServerConfig::new(s.listen_addr)
            .with_max_frame_size(s.max_frame_size)
            .with_handshake_timeout(Duration::from_secs(s.handshake_timeout_secs))
            .with_join_timeout(Duration::from_secs(s.join_timeout_secs))
            .with_write_timeout(Duration::from_secs(s.write_timeout_secs))
            .with_shutdown_grace(Duration::from_secs(s.shutdown_grace_secs))
            .with_max_connections(s.max_connections))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn empty_file_uses_defaults() {
        let file = write_config("");
        let config = RelayConfig::load_from(file.path()).unwrap();

        assert_eq!(config.server, ServerSettings::default());
        assert_eq!(config.server.listen_addr.to_string(), "127.0.0.1:8080");
        assert!(config.catalog.path.is_none());
        assert!(config.catalog_path().ends_with("consultrelay/appointments.json"));
        assert!(config.users_path().ends_with("consultrelay/users.json"));
    }

    #[test]
    fn partial_server_section() {
        let file = write_config(
            r#"
[server]
listen_addr = "0.0.0.0:9000"
join_timeout_secs = 5
shutdown_grace_secs = 0

[catalog]
path = "/srv/appointments.json"
"#,
        );
        let config = RelayConfig::load_from(file.path()).unwrap();

        assert_eq!(config.server.listen_addr.port(), 9000);
        assert_eq!(config.server.join_timeout_secs, 5);
        assert_eq!(config.server.max_connections, 100);
        assert_eq!(config.catalog_path(), PathBuf::from("/srv/appointments.json"));

        let server = config.to_server_config().unwrap();
        assert_eq!(server.join_timeout, Duration::from_secs(5));
        assert_eq!(server.handshake_timeout, Duration::from_secs(10));
        assert_eq!(server.shutdown_grace, Duration::ZERO);
    }

    #[test]
    fn invalid_toml_is_reported() {
        let file = write_config("[server\nlisten_addr = 1");
        let err = RelayConfig::load_from(file.path()).unwrap_err();
        assert!(err.starts_with("failed to parse config"));
    }

    #[test]
    fn invalid_listen_addr_is_reported() {
        let file = write_config("[server]\nlisten_addr = \"not an address\"\n");
        assert!(RelayConfig::load_from(file.path()).is_err());
    }

    #[test]
    fn missing_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let err = RelayConfig::load_from(&dir.path().join("absent.toml")).unwrap_err();
        assert!(err.starts_with("failed to read config"));
    }

    #[test]
    fn zero_limits_rejected() {
        let mut config = RelayConfig::default();
        config.server.join_timeout_secs = 0;

        let err = config.to_server_config().unwrap_err();
        assert!(err.to_string().contains("join_timeout_secs"));
    }

    #[test]
    fn dump_round_trips() {
        let mut config = RelayConfig::default();
        config.auth.users = Some(PathBuf::from("/srv/users.json"));

        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: RelayConfig = toml::from_str(&text).unwrap();

        assert_eq!(parsed.server, config.server);
        assert_eq!(parsed.auth.users, config.auth.users);
        assert!(parsed.catalog.path.is_none());
    }
}
