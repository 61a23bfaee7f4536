//! TOML-based configuration system for Standings.

use crate::error::{Result, StandingsError};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level Standings configuration, deserialized from a TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StandingsConfig {
    pub standings: StandingsSection,
    #[serde(default)]
    pub portal: PortalConfig,
}

/// Core instance settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StandingsSection {
    pub instance_name: String,
    pub data_dir: String,
    #[serde(default)]
    pub database: DatabaseConfig,
}

/// Database backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite file path.
    #[serde(default)]
    pub path: Option<String>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: Some("/var/lib/standings/standings.db".into()),
        }
    }
}

/// External certification portal configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortalConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Base URL of the portal, without a trailing slash.
    #[serde(default)]
    pub base_url: String,
    /// Per-request timeout applied to every portal call.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Delay between students during a reconciliation sweep. The portal is
    /// fragile; pacing bounds the load we put on it.
    #[serde(default = "default_pace_ms")]
    pub pace_ms: u64,
    #[serde(default)]
    pub tracks: TrackConfig,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: String::new(),
            request_timeout_secs: default_request_timeout_secs(),
            pace_ms: default_pace_ms(),
            tracks: TrackConfig::default(),
        }
    }
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_pace_ms() -> u64 {
    1000
}

/// Department track names the portal login form expects. First-grade
/// students share a common track; from the second grade on, the class
/// number decides the department.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackConfig {
    #[serde(default = "default_track_common")]
    pub common: String,
    #[serde(default = "default_track_software")]
    pub software: String,
    #[serde(default = "default_track_embedded")]
    pub embedded: String,
}

impl Default for TrackConfig {
    fn default() -> Self {
        Self {
            common: default_track_common(),
            software: default_track_software(),
            embedded: default_track_embedded(),
        }
    }
}

fn default_track_common() -> String {
    "공통과정".into()
}

fn default_track_software() -> String {
    "소프트웨어개발과".into()
}

fn default_track_embedded() -> String {
    "임베디드소프트웨어과".into()
}

impl StandingsConfig {
    /// Load configuration from a TOML file at the given path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| StandingsError::Config(format!("failed to parse config: {e}")))?;
        Ok(config)
    }

    /// Validate the configuration, returning an error for invalid combinations.
    pub fn validate(&self) -> Result<()> {
        if self.standings.instance_name.is_empty() {
            return Err(StandingsError::Config(
                "standings.instance_name must not be empty".into(),
            ));
        }

        if self.standings.data_dir.is_empty() {
            return Err(StandingsError::Config(
                "standings.data_dir must not be empty".into(),
            ));
        }

        if self.standings.database.path.is_none() {
            return Err(StandingsError::Config(
                "standings.database.path is required".into(),
            ));
        }

        if self.portal.enabled && self.portal.base_url.is_empty() {
            return Err(StandingsError::Config(
                "portal.base_url is required when the portal is enabled".into(),
            ));
        }

        if self.portal.request_timeout_secs == 0 {
            return Err(StandingsError::Config(
                "portal.request_timeout_secs must be at least 1".into(),
            ));
        }

        Ok(())
    }

    /// Generate a sensible default configuration.
    pub fn generate_default() -> Self {
        Self {
            standings: StandingsSection {
                instance_name: "My School".into(),
                data_dir: "/var/lib/standings".into(),
                database: DatabaseConfig::default(),
            },
            portal: PortalConfig::default(),
        }
    }
}
