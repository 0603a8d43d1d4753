//! MQTT client builder.
//!
//! `ClientBuilder` turns a [`Config`] into rumqttc's `AsyncClient` and
//! `EventLoop`. The two must be used together: the client queues requests,
//! the event loop (driven by the connection kernel) performs the I/O.
//!
//! ```ignore
//! let (client, event_loop) = ClientBuilder::from_config(&config)?.build();
//!
//! let (client, event_loop) = ClientBuilder::new("pi-sensor", "localhost", 1883, 10)
//!     .credentials("user", "password")
//!     .last_will("homeassistant/sensor/pi/status")
//!     .build();
//! ```

use std::time::Duration;

use rumqttc::{AsyncClient, EventLoop, LastWill, MqttOptions, QoS};
use validator::Validate;

use super::{config::Config, error::TransferError};

/// Payload announced on the availability topic while the daemon is up.
pub const ONLINE_PAYLOAD: &str = "online";

/// Payload announced on clean shutdown and registered as Last Will.
pub const OFFLINE_PAYLOAD: &str = "offline";

/// Builder for constructing MQTT clients with a fluent API.
pub struct ClientBuilder {
    /// MQTT protocol options (host, port, keep-alive, credentials, ...)
    opts: MqttOptions,

    /// Capacity of the request channel between client and event loop.
    cap: usize,
}

impl ClientBuilder {
    /// Creates a builder with rumqttc defaults.
    ///
    /// An empty `client_id` is replaced with a UUID.
    pub fn new(
        client_id: impl Into<String>,
        host: impl Into<String>,
        port: u16,
        cap: usize,
    ) -> Self {
        let client_id = client_id.into();
        let client_id = if client_id.is_empty() {
            uuid::Uuid::new_v4().to_string()
        } else {
            client_id
        };

        Self {
            opts: MqttOptions::new(client_id, host, port),
            cap,
        }
    }

    /// Creates a builder from a validated `Config`.
    ///
    /// # Errors
    ///
    /// Returns `TransferError::ConfigError` if the configuration fails validation.
    pub fn from_config(config: &Config) -> Result<Self, TransferError> {
        config.validate()?;

        let mut builder = Self::new(
            config.client_id.clone(),
            config.host.clone(),
            config.port,
            config.request_channel_capacity,
        )
        .keep_alive(config.keep_alive)
        .clean_session(config.clean_session);

        if let Some(username) = &config.username {
            let password = config.password.clone().unwrap_or_default();
            builder = builder.credentials(username.clone(), password);
        }

        if let Some(topic) = &config.availability_topic {
            builder = builder.last_will(topic);
        }

        Ok(builder)
    }

    /// Sets the keep-alive interval (in seconds).
    pub fn keep_alive(mut self, secs: u64) -> Self {
        self.opts.set_keep_alive(Duration::from_secs(secs));
        self
    }

    /// Configures whether to request a clean session.
    pub fn clean_session(mut self, clean: bool) -> Self {
        self.opts.set_clean_session(clean);
        self
    }

    /// Sets broker authentication credentials.
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.opts.set_credentials(username, password);
        self
    }

    /// Registers a retained `offline` Last Will on `topic`.
    ///
    /// The broker publishes it if the connection drops without a DISCONNECT.
    pub fn last_will(mut self, topic: &str) -> Self {
        let last_will = LastWill::new(topic, OFFLINE_PAYLOAD, QoS::AtLeastOnce, true);
        self.opts.set_last_will(last_will);
        self
    }

    /// Client identifier that will be sent in CONNECT.
    pub fn client_id(&self) -> String {
        self.opts.client_id()
    }

    /// Constructs the client and its event loop.
    pub fn build(self) -> (AsyncClient, EventLoop) {
        AsyncClient::new(self.opts, self.cap)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_creation() {
        let builder = ClientBuilder::new("test_client", "localhost", 1883, 100);
        assert_eq!(builder.cap, 100);
        assert_eq!(builder.client_id(), "test_client");
    }

    #[test]
    fn test_empty_client_id_gets_uuid() {
        let builder = ClientBuilder::new("", "localhost", 1883, 10);
        assert_eq!(builder.client_id().len(), 36);
    }

    #[test]
    fn test_builder_with_chain_methods() {
        let builder = ClientBuilder::new("test_client", "localhost", 1883, 10)
            .keep_alive(30)
            .clean_session(true)
            .credentials("user", "pass")
            .last_will("sensors/pi/status");

        assert_eq!(builder.opts.keep_alive(), Duration::from_secs(30));
        assert_eq!(
            builder.opts.credentials(),
            Some(("user".to_string(), "pass".to_string()))
        );
        let will = builder.opts.last_will().expect("last will set");
        assert_eq!(will.topic, "sensors/pi/status");
        assert!(will.retain);
    }

    #[tokio::test]
    async fn test_build_from_config() {
        let config = Config {
            client_id: "pi-1234".into(),
            username: Some("sensors".into()),
            password: Some("secret".into()),
            availability_topic: Some("homeassistant/sensor/pi/status".into()),
            ..Default::default()
        };

        let builder = ClientBuilder::from_config(&config).unwrap();
        assert_eq!(builder.client_id(), "pi-1234");
        assert_eq!(builder.cap, 10);
        assert!(builder.opts.last_will().is_some());

        let (_client, _event_loop) = builder.build();
    }

    #[test]
    fn test_build_from_config_invalid() {
        let config = Config {
            host: String::new(),
            ..Default::default()
        };

        assert!(matches!(
            ClientBuilder::from_config(&config),
            Err(TransferError::ConfigError(_))
        ));
    }

    #[test]
    fn test_password_without_username_is_ignored() {
        let config = Config {
            password: Some("secret".into()),
            ..Default::default()
        };
        let builder = ClientBuilder::from_config(&config).unwrap();
        assert_eq!(builder.opts.credentials(), None);
    }
}
