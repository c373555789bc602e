use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_DEBOUNCE_MS: u64 = 500;
pub const DEFAULT_REMOTE_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_SLUG_LENGTH: usize = 10;
/// Waypoint limit of the routing provider the shell draws directions with.
pub const DEFAULT_MAX_ROUTING_LOCATIONS: usize = 25;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid config: {0}")]
    Invalid(String),

    #[error("config parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Quiet period before a coalesced text edit is written.
    pub debounce_ms: u64,
    /// Upper bound on any single remote call; `None` waits indefinitely.
    pub remote_timeout_ms: Option<u64>,
    pub slug_length: usize,
    pub max_routing_locations: usize,
    pub failure_channel_capacity: usize,
    pub image_bucket: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            remote_timeout_ms: Some(DEFAULT_REMOTE_TIMEOUT_MS),
            slug_length: DEFAULT_SLUG_LENGTH,
            max_routing_locations: DEFAULT_MAX_ROUTING_LOCATIONS,
            failure_channel_capacity: 64,
            image_bucket: "TripImage".to_string(),
        }
    }
}

impl EngineConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.remote_timeout_ms == Some(0) {
            return Err(ConfigError::Invalid(
                "remote_timeout_ms must be > 0 (use null to disable)".into(),
            ));
        }
        if self.slug_length < 6 {
            return Err(ConfigError::Invalid("slug_length should be at least 6".into()));
        }
        if self.failure_channel_capacity == 0 {
            return Err(ConfigError::Invalid(
                "failure_channel_capacity must be > 0".into(),
            ));
        }
        if self.image_bucket.trim().is_empty() {
            return Err(ConfigError::Invalid("image_bucket cannot be empty".into()));
        }
        Ok(())
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn remote_timeout(&self) -> Option<Duration> {
        self.remote_timeout_ms.map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = EngineConfig::default();
        config.validate().unwrap();
        assert_eq!(config.debounce(), Duration::from_millis(500));
        assert_eq!(config.remote_timeout(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let config = EngineConfig::from_json(r#"{ "debounce_ms": 250, "remote_timeout_ms": null }"#)
            .unwrap();
        assert_eq!(config.debounce_ms, 250);
        assert_eq!(config.remote_timeout(), None);
        assert_eq!(config.slug_length, DEFAULT_SLUG_LENGTH);
    }

    #[test]
    fn rejects_zero_timeout_and_short_slugs() {
        assert!(EngineConfig::from_json(r#"{ "remote_timeout_ms": 0 }"#).is_err());
        assert!(EngineConfig::from_json(r#"{ "slug_length": 3 }"#).is_err());
        assert!(matches!(
            EngineConfig::from_json("not json"),
            Err(ConfigError::Parse(_))
        ));
    }
}
