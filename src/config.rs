// src/config.rs

//! Loads and validates the shared configuration each `Client` reads under
//! the shared-context lock: flush/polling cadences, the streaming/offline/
//! background-updating toggles, and the mobile keys routing a client to its
//! environment.

use crate::core::errors::FlagsError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

fn default_events_flush_interval_millis() -> u64 {
    5_000
}
fn default_polling_interval_millis() -> u64 {
    30_000
}
fn default_background_polling_interval_millis() -> u64 {
    3_600_000
}
fn default_streaming() -> bool {
    true
}
fn default_stream_base_url() -> String {
    "https://stream.flagcore.example".to_string()
}
fn default_polling_base_url() -> String {
    "https://client.flagcore.example".to_string()
}
fn default_events_base_url() -> String {
    "https://events.flagcore.example".to_string()
}

/// Shared, read-only configuration for one or more `Client`s, guarded (per
/// spec §5's lock hierarchy) by a reader-writer lock separate from any
/// per-client lock.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ClientConfig {
    /// Routing credential for the primary environment.
    pub mobile_key: String,

    /// Additional environment name -> mobile key pairs, each surfaced through
    /// the registry (§4.7) as a secondary `Client`.
    #[serde(default)]
    pub secondary_mobile_keys: HashMap<String, String>,

    #[serde(default = "default_events_flush_interval_millis")]
    pub events_flush_interval_millis: u64,

    #[serde(default = "default_polling_interval_millis")]
    pub polling_interval_millis: u64,

    #[serde(default = "default_background_polling_interval_millis")]
    pub background_polling_interval_millis: u64,

    #[serde(default)]
    pub disable_background_updating: bool,

    #[serde(default = "default_streaming")]
    pub streaming: bool,

    #[serde(default)]
    pub offline: bool,

    #[serde(default = "default_stream_base_url")]
    pub stream_base_url: String,

    #[serde(default = "default_polling_base_url")]
    pub polling_base_url: String,

    #[serde(default = "default_events_base_url")]
    pub events_base_url: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            mobile_key: String::new(),
            secondary_mobile_keys: HashMap::new(),
            events_flush_interval_millis: default_events_flush_interval_millis(),
            polling_interval_millis: default_polling_interval_millis(),
            background_polling_interval_millis: default_background_polling_interval_millis(),
            disable_background_updating: false,
            streaming: default_streaming(),
            offline: false,
            stream_base_url: default_stream_base_url(),
            polling_base_url: default_polling_base_url(),
            events_base_url: default_events_base_url(),
        }
    }
}

impl ClientConfig {
    /// Builds a config programmatically for a single mobile key, the common
    /// path for an embedding mobile/client SDK rather than a TOML file on disk.
    pub fn for_mobile_key(mobile_key: impl Into<String>) -> Self {
        Self {
            mobile_key: mobile_key.into(),
            ..Self::default()
        }
    }

    /// Reads and validates a `ClientConfig` from a TOML file, mirroring
    /// `spineldb::config::Config::from_file`'s read-parse-validate shape.
    pub fn from_file(path: &str) -> Result<Self, FlagsError> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .build()?;
        let cfg: ClientConfig = settings.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<(), FlagsError> {
        if self.mobile_key.is_empty() {
            return Err(FlagsError::InvalidConfig(
                "mobileKey must not be empty".to_string(),
            ));
        }
        if self.events_flush_interval_millis == 0 {
            return Err(FlagsError::InvalidConfig(
                "eventsFlushIntervalMillis must be greater than zero".to_string(),
            ));
        }
        if self.polling_interval_millis == 0 {
            return Err(FlagsError::InvalidConfig(
                "pollingIntervalMillis must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn events_flush_interval(&self) -> Duration {
        Duration::from_millis(self.events_flush_interval_millis)
    }

    pub fn polling_interval(&self) -> Duration {
        Duration::from_millis(self.polling_interval_millis)
    }

    pub fn background_polling_interval(&self) -> Duration {
        Duration::from_millis(self.background_polling_interval_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = ClientConfig::for_mobile_key("mob-123");
        assert!(cfg.streaming);
        assert!(!cfg.offline);
        assert_eq!(cfg.events_flush_interval(), Duration::from_millis(5_000));
    }

    #[test]
    fn validate_rejects_empty_mobile_key() {
        let cfg = ClientConfig::default();
        assert!(cfg.validate().is_err());
    }
}
