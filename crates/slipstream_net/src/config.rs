//! # Configuration
//!
//! Server and client settings, loaded once at startup from TOML.
//!
//! ```toml
//! tick_rate = 60
//! max_clients = 16
//! controlled_entity_type = "RACE_CAR"
//! release_policy = "idle_pool"
//! event_dedup_window = 1024
//! refresh_interval = 30
//! ```
//!
//! Every field has a default, so an empty document is a valid config.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};
use crate::events::DEFAULT_DEDUP_WINDOW;

/// Default server tick rate (updates per second).
pub const DEFAULT_TICK_RATE: u32 = 60;

/// Default maximum number of simultaneous clients.
pub const DEFAULT_MAX_CLIENTS: usize = 32;

/// Default number of ticks between full resends of update components.
pub const DEFAULT_REFRESH_INTERVAL: u32 = 30;

/// What happens to a peer's controlled entity when the peer leaves.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReleasePolicy {
    /// Destroy it and broadcast the delete.
    #[default]
    Destroy,
    /// Keep it in the world and hand it to the next peer that connects.
    IdlePool,
}

/// Server configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Server tick rate (updates per second).
    pub tick_rate: u32,
    /// Maximum number of concurrent clients.
    pub max_clients: usize,
    /// Entity type instantiated for each connecting peer.
    pub controlled_entity_type: String,
    /// What to do with a leaving peer's entity.
    pub release_policy: ReleasePolicy,
    /// Recent event sequences remembered by clients.
    pub event_dedup_window: usize,
    /// Ticks between resends of every delivered entity's update components,
    /// which repairs lost unreliable updates. Zero disables it.
    pub refresh_interval: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            tick_rate: DEFAULT_TICK_RATE,
            max_clients: DEFAULT_MAX_CLIENTS,
            controlled_entity_type: "RACE_CAR".to_owned(),
            release_policy: ReleasePolicy::Destroy,
            event_dedup_window: DEFAULT_DEDUP_WINDOW,
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
        }
    }
}

impl ServerConfig {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] on syntax errors, unknown fields or invalid
    /// values.
    pub fn from_toml_str(text: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, otherwise as
    /// [`from_toml_str`](Self::from_toml_str).
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        Self::from_toml_str(&read(path.as_ref())?)
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] for the first bad field.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.tick_rate == 0 || self.tick_rate > 1000 {
            return Err(ConfigError::InvalidValue {
                field: "tick_rate",
                reason: format!("{} is outside 1..=1000", self.tick_rate),
            });
        }
        if self.max_clients == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_clients",
                reason: "must allow at least one client".to_owned(),
            });
        }
        if self.controlled_entity_type.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "controlled_entity_type",
                reason: "must name an entity type".to_owned(),
            });
        }
        if self.event_dedup_window == 0 {
            return Err(ConfigError::InvalidValue {
                field: "event_dedup_window",
                reason: "must remember at least one sequence".to_owned(),
            });
        }
        Ok(())
    }
}

/// Client configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClientConfig {
    /// Recent event sequences remembered for duplicate suppression.
    pub event_dedup_window: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            event_dedup_window: DEFAULT_DEDUP_WINDOW,
        }
    }
}

impl ClientConfig {
    /// Parses a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] on syntax errors or unknown fields.
    pub fn from_toml_str(text: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        if config.event_dedup_window == 0 {
            return Err(ConfigError::InvalidValue {
                field: "event_dedup_window",
                reason: "must remember at least one sequence".to_owned(),
            });
        }
        Ok(config)
    }

    /// Reads and parses a TOML file.
    ///
    /// # Errors
    ///
    /// As [`from_toml_str`](Self::from_toml_str), plus [`ConfigError::Io`].
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        Self::from_toml_str(&read(path.as_ref())?)
    }
}

/// Reads a config file to a string.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] with the path and OS error text.
pub fn read(path: &Path) -> ConfigResult<String> {
    std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
        path: path.display().to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_is_default() {
        assert_eq!(ServerConfig::from_toml_str(""), Ok(ServerConfig::default()));
        assert_eq!(ClientConfig::from_toml_str(""), Ok(ClientConfig::default()));
    }

    #[test]
    fn test_parse_server_config() {
        let config = ServerConfig::from_toml_str(
            r#"
            tick_rate = 30
            max_clients = 4
            controlled_entity_type = "SIMPLE_ROCKET"
            release_policy = "idle_pool"
            "#,
        )
        .unwrap();

        assert_eq!(config.tick_rate, 30);
        assert_eq!(config.max_clients, 4);
        assert_eq!(config.controlled_entity_type, "SIMPLE_ROCKET");
        assert_eq!(config.release_policy, ReleasePolicy::IdlePool);
        assert_eq!(config.event_dedup_window, DEFAULT_DEDUP_WINDOW);
        assert_eq!(config.refresh_interval, DEFAULT_REFRESH_INTERVAL);

        let config = ServerConfig::from_toml_str("refresh_interval = 0").unwrap();
        assert_eq!(config.refresh_interval, 0);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(matches!(
            ServerConfig::from_toml_str("tick_rate = 0"),
            Err(ConfigError::InvalidValue {
                field: "tick_rate",
                ..
            })
        ));
        assert!(matches!(
            ServerConfig::from_toml_str("port = 7777"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        let result = ServerConfig::load("/nonexistent/slipstream.toml");
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }
}
