//! # bmebridge-mqtt: MQTT transport with automatic reconnection
//!
//! A small async MQTT publishing layer built on top of `rumqttc`. It adds what a
//! long-running sensor daemon needs around the raw client:
//!
//! - **Automatic reconnection** with exponential backoff
//! - **State monitoring** through a `watch` channel of [`ConnectionState`]
//! - **Connection epochs** so callers can re-announce retained data after a reconnect
//! - **Availability** (`online`/`offline`) announcements plus a Last Will
//! - **Clean shutdown** that flushes the DISCONNECT packet before returning
//!
//! # Quick Start
//!
//! ```ignore
//! use std::time::Duration;
//! use bmebridge_mqtt::{Config, EndpointMetadata, MqttManager};
//!
//! let config = Config {
//!     host: "mqtt.local".into(),
//!     availability_topic: Some("homeassistant/sensor/pi/status".into()),
//!     ..Default::default()
//! };
//! let instance = MqttManager::from_config(config)?.build_and_start().await?;
//! instance.wait_connected(Duration::from_secs(30)).await?;
//!
//! let meta = EndpointMetadata::new("home/attic/BME280_temperature", 0, false);
//! instance.publish("21.4", &meta)?;
//!
//! instance.shutdown().await;
//! ```
//!
//! # Publishing semantics
//!
//! Publishing never blocks on a stalled broker: while the connection is down,
//! [`MqttInstance::publish`] fails with [`TransferError::NotConnected`] and
//! nothing is queued for later replay.

pub mod backoff;
pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod manager;
pub mod state;
pub mod supervisor;

pub use backoff::{Backoff, BackoffError};
pub use client::ClientBuilder;
pub use config::{Config, EndpointMetadata};
pub use connection::ConnectionKernel;
pub use error::TransferError;
pub use manager::{MqttInstance, MqttManager};
pub use state::ConnectionState;
pub use supervisor::Supervisor;
