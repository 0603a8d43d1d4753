//! Publishing configuration: schedule, topic layout and device identity.
//!
//! ```toml
//! [publish]
//! interval = 60
//! align_to_interval = true
//! mode = "discovery"
//! discovery_prefix = "homeassistant"
//! object_id = "BME280"
//! ```

use std::fs;

use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

/// How readings are laid out on the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PublishMode {
    /// Home Assistant MQTT Discovery: retained config documents plus one JSON state topic.
    Discovery,

    /// One scalar topic per measurement under `<base_topic>/<location>`.
    Fixed,
}

impl Default for PublishMode {
    fn default() -> Self {
        PublishMode::Discovery
    }
}

/// `[publish]` section.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct PublishConfig {
    /// Seconds between cycles.
    #[validate(range(
        min = 1,
        max = 86400,
        message = "Interval must be between 1 and 86400 seconds"
    ))]
    pub interval: u64,

    /// Start cycles on wall-clock multiples of `interval` (e.g. every full minute).
    pub align_to_interval: bool,

    pub mode: PublishMode,

    /// QoS for readings and discovery documents. Defaults to 1 (at least once).
    #[validate(range(max = 2, message = "QoS must be 0, 1 or 2"))]
    pub qos: u8,

    #[validate(custom(function = "validate_topic_segment"))]
    pub discovery_prefix: String,

    /// Discovery node id; the host name when absent.
    #[validate(custom(function = "validate_topic_segment"))]
    pub node_id: Option<String>,

    /// Prefix for entity keys, e.g. `BME280_temperature`.
    #[validate(custom(function = "validate_topic_segment"))]
    pub object_id: String,

    /// Device name shown in Home Assistant; `"<node_id> Sensor"` when absent.
    #[validate(length(min = 1, message = "Device name must not be empty"))]
    pub device_name: Option<String>,

    /// Root of the fixed topic layout.
    #[validate(custom(function = "validate_topic_segment"))]
    pub base_topic: String,

    /// Second level of the fixed topic layout; the node id when absent.
    #[validate(custom(function = "validate_topic_segment"))]
    pub location: Option<String>,
}

/// Topic levels may not be empty or contain wildcards.
fn validate_topic_segment(segment: &str) -> Result<(), ValidationError> {
    let trimmed = segment.trim_matches('/');
    if trimmed.is_empty() || trimmed.contains(['+', '#']) {
        let mut err = ValidationError::new("invalid_topic");
        err.message = Some(format!("Invalid topic segment: '{}'", segment).into());
        return Err(err);
    }
    Ok(())
}

impl Default for PublishConfig {
    fn default() -> Self {
        PublishConfig {
            interval: 60,
            align_to_interval: false,
            mode: PublishMode::default(),
            qos: 1,
            discovery_prefix: "homeassistant".to_string(),
            node_id: None,
            object_id: "BME280".to_string(),
            device_name: None,
            base_topic: "sensors".to_string(),
            location: None,
        }
    }
}

impl PublishConfig {
    /// Effective node id.
    pub fn node_id(&self) -> String {
        self.node_id.clone().unwrap_or_else(hostname)
    }

    pub fn device_name(&self) -> String {
        self.device_name
            .clone()
            .unwrap_or_else(|| format!("{} Sensor", self.node_id()))
    }

    pub fn location(&self) -> String {
        self.location.clone().unwrap_or_else(|| self.node_id())
    }

    /// Fills `node_id` with the host name so later lookups are stable.
    pub(crate) fn resolve_identity(&mut self) {
        if self.node_id.is_none() {
            self.node_id = Some(hostname());
        }
    }
}

/// Kernel host name, `localhost` if it cannot be read.
pub fn hostname() -> String {
    fs::read_to_string("/proc/sys/kernel/hostname")
        .ok()
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "localhost".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_publish_config_is_valid() {
        let config = PublishConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.interval, 60);
        assert_eq!(config.mode, PublishMode::Discovery);
        assert_eq!(config.discovery_prefix, "homeassistant");
        assert_eq!(config.qos, 1);
    }

    #[test]
    fn test_interval_bounds() {
        for interval in [0, 86401] {
            let config = PublishConfig {
                interval,
                ..Default::default()
            };
            assert!(config.validate().is_err(), "interval {interval} accepted");
        }
    }

    #[test]
    fn test_qos_bounds() {
        let config = PublishConfig {
            qos: 3,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_wildcards_rejected_in_topics() {
        let config = PublishConfig {
            base_topic: "sensors/#".into(),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = PublishConfig {
            node_id: Some("pi+".into()),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_identity_fallbacks() {
        let config = PublishConfig {
            node_id: Some("garage".into()),
            ..Default::default()
        };
        assert_eq!(config.node_id(), "garage");
        assert_eq!(config.device_name(), "garage Sensor");
        assert_eq!(config.location(), "garage");

        let config = PublishConfig {
            node_id: Some("garage".into()),
            device_name: Some("Garage climate".into()),
            location: Some("attic".into()),
            ..Default::default()
        };
        assert_eq!(config.device_name(), "Garage climate");
        assert_eq!(config.location(), "attic");
    }

    #[test]
    fn test_resolve_identity_uses_hostname() {
        let mut config = PublishConfig::default();
        config.resolve_identity();
        assert_eq!(config.node_id.as_deref(), Some(hostname().as_str()));
        assert!(!hostname().is_empty());
    }
}
