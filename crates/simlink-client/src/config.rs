//! Client configuration.
//!
//! All settings live in a single `config.toml` file at
//! `~/.config/simlink/config.toml` by default. Every key is optional:
//!
//! ```toml
//! [relay]
//! port = 4444
//! delimiter = ":"
//! handshake_timeout_secs = 30
//!
//! [simulation]
//! client_id = "trainer-3"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use simlink_server::RelayConfig;

use crate::error::{ClientError, ClientResult};

/// Configuration for the simlink command.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Debug mode.
    pub debug: bool,

    /// Relay endpoint and wire format, shared by `serve` and `simulate`.
    pub relay: RelayConfig,

    /// Settings for the scripted simulation client.
    pub simulation: SimulationSettings,
}

/// Settings for `simlink simulate`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationSettings {
    /// Sender id announced in the handshake.
    pub client_id: String,

    /// Seconds to wait for the connect and the handshake reply.
    pub timeout: u64,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            client_id: "simulation".to_string(),
            timeout: 5,
        }
    }
}

impl SimulationSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }
}

impl ClientConfig {
    /// Loads configuration from the default path, or defaults if the file
    /// does not exist.
    pub fn load() -> ClientResult<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Loads configuration from a specific path.
    pub fn load_from(path: &Path) -> ClientResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ClientError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::parse(&content)
    }

    /// Parses and validates a TOML document.
    pub fn parse(content: &str) -> ClientResult<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| ClientError::Config(format!("failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that the relay settings describe a usable wire format.
    pub fn validate(&self) -> ClientResult<()> {
        self.relay
            .validate()
            .map_err(|e| ClientError::Config(e.to_string()))?;
        if self.simulation.client_id.is_empty() {
            return Err(ClientError::Config(
                "simulation.client_id must not be empty".into(),
            ));
        }
        Ok(())
    }

    /// Renders the configuration as TOML.
    pub fn to_toml(&self) -> ClientResult<String> {
        toml::to_string_pretty(self)
            .map_err(|e| ClientError::Config(format!("failed to serialize config: {}", e)))
    }

    /// Returns the default configuration file path.
    pub fn default_path() -> PathBuf {
        Self::default_config_dir().join("config.toml")
    }

    /// Returns the default configuration directory.
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("simlink")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_file_gives_defaults() {
        let config = ClientConfig::parse("").unwrap();
        assert_eq!(config, ClientConfig::default());
        assert_eq!(config.relay.port, 4444);
        assert_eq!(config.simulation.timeout(), Duration::from_secs(5));
    }

    #[test]
    fn load_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
debug = true

[relay]
port = 5555
delimiter = "|"
handshake_timeout_secs = 2

[simulation]
client_id = "trainer-3"
"#
        )
        .unwrap();

        let config = ClientConfig::load_from(file.path()).unwrap();
        assert!(config.debug);
        assert_eq!(config.relay.port, 5555);
        assert_eq!(config.relay.delimiter, '|');
        assert_eq!(config.relay.end_of_message, '\n');
        assert_eq!(config.relay.handshake_timeout(), Some(Duration::from_secs(2)));
        assert_eq!(config.simulation.client_id, "trainer-3");
        assert_eq!(config.simulation.timeout, 5);
    }

    #[test]
    fn rejects_clashing_markers() {
        let err = ClientConfig::parse("[relay]\ndelimiter = \"\\n\"\n").unwrap_err();
        assert!(matches!(err, ClientError::Config(_)));
    }

    #[test]
    fn rejects_empty_client_id() {
        let err = ClientConfig::parse("[simulation]\nclient_id = \"\"\n").unwrap_err();
        insta::assert_snapshot!(
            err.to_string(),
            @"configuration error: simulation.client_id must not be empty"
        );
    }

    #[test]
    fn missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = ClientConfig::load_from(&dir.path().join("absent.toml"));
        assert!(matches!(result, Err(ClientError::Config(_))));
    }

    #[test]
    fn dump_parses_back() {
        let mut config = ClientConfig::default();
        config.relay.port = 6000;
        config.simulation.client_id = "sim-9".into();

        let dumped = config.to_toml().unwrap();
        assert!(dumped.contains("port = 6000"));
        assert_eq!(ClientConfig::parse(&dumped).unwrap(), config);
    }

    #[test]
    fn default_path_ends_in_simlink() {
        let path = ClientConfig::default_path();
        assert!(path.ends_with("simlink/config.toml"));
    }
}
