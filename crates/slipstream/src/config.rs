//! # Demo Configuration
//!
//! One TOML document drives a headless match: how many drivers, how many
//! ticks, the server and client settings, and the faults the loopback link
//! injects.
//!
//! ```toml
//! clients = 3
//! ticks = 600
//! blueprints = "config/blueprints.toml"   # optional, stock content otherwise
//!
//! [server]
//! release_policy = "idle_pool"
//!
//! [link]
//! drop_every_nth_unreliable = 7
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use slipstream_net::config::read;
use slipstream_net::{ClientConfig, ConfigError, ConfigResult, LinkConditions, ServerConfig};
use slipstream_shared::BlueprintConfig;

/// Loopback fault injection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LinkConfig {
    /// Drop every N-th unreliable message; 0 never drops.
    pub drop_every_nth_unreliable: u32,
    /// Deliver every reliable message twice.
    pub duplicate_reliable: bool,
    /// Deliver every N-th reliable message after later traffic; 0 never does.
    pub hold_back_every_nth_reliable: u32,
}

impl LinkConfig {
    /// The loopback conditions this describes.
    #[must_use]
    pub const fn conditions(&self) -> LinkConditions {
        LinkConditions {
            drop_every_nth_unreliable: if self.drop_every_nth_unreliable == 0 {
                None
            } else {
                Some(self.drop_every_nth_unreliable)
            },
            duplicate_reliable: self.duplicate_reliable,
            hold_back_every_nth_reliable: if self.hold_back_every_nth_reliable == 0 {
                None
            } else {
                Some(self.hold_back_every_nth_reliable)
            },
        }
    }
}

/// Headless match settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DemoConfig {
    /// Number of simulated drivers.
    pub clients: usize,
    /// Server ticks to run.
    pub ticks: u64,
    /// Pace ticks at the server tick rate instead of running flat out.
    pub realtime: bool,
    /// Blueprint file; the stock content when absent.
    pub blueprints: Option<PathBuf>,
    /// Server settings.
    pub server: ServerConfig,
    /// Settings shared by every driver.
    pub client: ClientConfig,
    /// Loopback faults.
    pub link: LinkConfig,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            clients: 2,
            ticks: 300,
            realtime: false,
            blueprints: None,
            server: ServerConfig::default(),
            client: ClientConfig::default(),
            link: LinkConfig::default(),
        }
    }
}

impl DemoConfig {
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
    /// As [`from_toml_str`](Self::from_toml_str), plus [`ConfigError::Io`].
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        Self::from_toml_str(&read(path.as_ref())?)
    }

    /// Checks value ranges, including the nested server settings.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] for the first bad field.
    pub fn validate(&self) -> ConfigResult<()> {
        self.server.validate()?;
        if self.client.event_dedup_window == 0 {
            return Err(ConfigError::InvalidValue {
                field: "client.event_dedup_window",
                reason: "must remember at least one sequence".to_owned(),
            });
        }
        if self.ticks == 0 {
            return Err(ConfigError::InvalidValue {
                field: "ticks",
                reason: "must run at least one tick".to_owned(),
            });
        }
        Ok(())
    }

    /// Loads the configured blueprint file, or the stock content.
    ///
    /// # Errors
    ///
    /// Returns the blueprint file's [`ConfigError`].
    pub fn blueprints(&self) -> ConfigResult<BlueprintConfig> {
        match &self.blueprints {
            Some(path) => BlueprintConfig::load(path),
            None => Ok(BlueprintConfig::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slipstream_net::ReleasePolicy;

    #[test]
    fn test_bundled_demo_config_parses() {
        let config = DemoConfig::from_toml_str(include_str!("../config/demo.toml")).unwrap();
        assert_eq!(config.clients, 3);
        assert_eq!(config.server.release_policy, ReleasePolicy::IdlePool);
        assert_eq!(
            config.link.conditions(),
            LinkConditions {
                drop_every_nth_unreliable: Some(7),
                duplicate_reliable: true,
                hold_back_every_nth_reliable: None,
            }
        );
        assert!(config.blueprints.is_none());
    }

    #[test]
    fn test_empty_document_is_default() {
        let config = DemoConfig::from_toml_str("").unwrap();
        assert_eq!(config, DemoConfig::default());
        assert_eq!(config.link.conditions(), LinkConditions::perfect());

        let config = DemoConfig::from_toml_str("[link]\nhold_back_every_nth_reliable = 4").unwrap();
        assert_eq!(config.link.conditions().hold_back_every_nth_reliable, Some(4));
    }

    #[test]
    fn test_nested_server_values_validated() {
        assert!(matches!(
            DemoConfig::from_toml_str("[server]\ntick_rate = 0"),
            Err(ConfigError::InvalidValue { field: "tick_rate", .. })
        ));
        assert!(matches!(
            DemoConfig::from_toml_str("ticks = 0"),
            Err(ConfigError::InvalidValue { field: "ticks", .. })
        ));
    }

    #[test]
    fn test_missing_blueprint_file() {
        let config = DemoConfig {
            blueprints: Some(PathBuf::from("/nonexistent/blueprints.toml")),
            ..DemoConfig::default()
        };
        assert!(matches!(config.blueprints(), Err(ConfigError::Io { .. })));
    }
}
