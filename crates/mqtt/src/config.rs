//! Configuration structures for the MQTT connection.
//!
//! All types deserialize with serde and are checked with the `validator`
//! crate, so a bad value fails at load time instead of at connect time.
//!
//! ```toml
//! [transport]
//! host = "mqtt.home.local"
//! port = 1883
//! username = "sensors"
//! password = "secret"
//! keep_alive = 60
//! reconnect_delay = 1
//! max_reconnect_delay = 60
//! ```
//!
//! `host` is the only required key.

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Main MQTT connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct Config {
    /// Broker hostname or IP address. DNS resolution happens at connect time.
    #[validate(length(
        min = 1,
        max = 255,
        message = "Host must be between 1 and 255 characters"
    ))]
    pub host: String,

    /// Broker port (1883 plain MQTT).
    #[serde(default = "default_port")]
    #[validate(range(min = 1, message = "Port must be between 1 and 65535"))]
    pub port: u16,

    /// Client identifier. Empty means "generate one" (UUID v4).
    #[serde(default)]
    #[validate(length(max = 36, message = "Client ID must not exceed 36 characters"))]
    pub client_id: String,

    /// Username for broker authentication.
    #[serde(default)]
    #[validate(length(min = 1, message = "Username must not be empty"))]
    pub username: Option<String>,

    /// Password for broker authentication. Ignored without `username`.
    #[serde(default)]
    pub password: Option<String>,

    /// Keep-alive interval in seconds.
    #[serde(default = "default_keep_alive")]
    #[validate(range(
        min = 5,
        max = 3600,
        message = "Keep alive must be between 5 and 3600 seconds"
    ))]
    pub keep_alive: u64,

    /// Whether to request a clean session from the broker.
    #[serde(default = "default_clean_session")]
    pub clean_session: bool,

    /// Seconds to wait for the first successful connection at startup.
    #[serde(default = "default_connection_timeout")]
    #[validate(range(
        min = 1,
        max = 300,
        message = "Connection timeout must be between 1 and 300 seconds"
    ))]
    pub connection_timeout: u64,

    /// Capacity of the request channel between client and event loop.
    ///
    /// Must hold one full publishing burst without the event loop draining
    /// it: every discovery document, the state message and both availability
    /// messages.
    #[serde(default = "default_request_channel_capacity")]
    #[validate(range(
        min = 8,
        max = 1000,
        message = "Request channel capacity must be between 8 and 1000"
    ))]
    pub request_channel_capacity: usize,

    /// Initial delay before the first reconnection attempt (seconds).
    #[serde(default = "default_reconnect_delay")]
    #[validate(range(
        min = 1,
        max = 60,
        message = "Reconnect delay must be between 1 and 60 seconds"
    ))]
    pub reconnect_delay: u64,

    /// Upper bound for the reconnection delay (seconds).
    #[serde(default = "default_max_reconnect_delay")]
    #[validate(range(
        min = 1,
        max = 3600,
        message = "Max reconnect delay must be between 1 and 3600 seconds"
    ))]
    pub max_reconnect_delay: u64,

    /// Growth factor applied to the reconnection delay after each failure.
    #[serde(default = "default_reconnect_multiplier")]
    #[validate(range(
        min = 1.0,
        max = 30.0,
        message = "Reconnect multiplier must be between 1 and 30"
    ))]
    pub reconnect_multiplier: f64,

    /// Give up after this many consecutive failed attempts. `0` retries forever.
    #[serde(default)]
    pub max_reconnect_attempts: u32,

    /// Topic for retained `online`/`offline` announcements and the Last Will.
    ///
    /// Derived from the publishing layout by the application, not read from
    /// the config file.
    #[serde(skip)]
    #[validate(length(min = 1, message = "Availability topic must not be empty"))]
    pub availability_topic: Option<String>,
}

fn default_port() -> u16 {
    1883
}

fn default_keep_alive() -> u64 {
    60
}

fn default_clean_session() -> bool {
    true
}

fn default_connection_timeout() -> u64 {
    30
}

fn default_request_channel_capacity() -> usize {
    10
}

fn default_reconnect_delay() -> u64 {
    1
}

fn default_max_reconnect_delay() -> u64 {
    60
}

fn default_reconnect_multiplier() -> f64 {
    2.0
}

impl Default for Config {
    /// Local broker, no authentication, no availability topic.
    fn default() -> Self {
        Config {
            host: "localhost".to_string(),
            port: default_port(),
            client_id: String::new(),
            username: None,
            password: None,
            keep_alive: default_keep_alive(),
            clean_session: default_clean_session(),
            connection_timeout: default_connection_timeout(),
            request_channel_capacity: default_request_channel_capacity(),
            reconnect_delay: default_reconnect_delay(),
            max_reconnect_delay: default_max_reconnect_delay(),
            reconnect_multiplier: default_reconnect_multiplier(),
            max_reconnect_attempts: 0,
            availability_topic: None,
        }
    }
}

/// Metadata for a single publish: topic, QoS and retain flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct EndpointMetadata {
    /// 0 (at most once), 1 (at least once) or 2 (exactly once).
    #[validate(range(min = 0, max = 2, message = "Invalid QoS value, must be 0, 1, or 2"))]
    pub qos: u8,

    /// Concrete publish topic (no wildcards).
    #[validate(length(min = 1, message = "Topic must not be empty"))]
    pub topic: String,

    /// Whether the broker keeps the message for new subscribers.
    pub retain: bool,
}

impl EndpointMetadata {
    pub fn new(topic: impl Into<String>, qos: u8, retain: bool) -> Self {
        Self {
            qos,
            topic: topic.into(),
            retain,
        }
    }

    /// Maps the numeric QoS onto `rumqttc::QoS`.
    pub fn qos_level(&self) -> Option<rumqttc::QoS> {
        match self.qos {
            0 => Some(rumqttc::QoS::AtMostOnce),
            1 => Some(rumqttc::QoS::AtLeastOnce),
            2 => Some(rumqttc::QoS::ExactlyOnce),
            _ => None,
        }
    }
}
