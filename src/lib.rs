//! bmebridge: BME280 environmental sensor to MQTT bridge
//!
//! Reads temperature, humidity and pressure from a Bosch BME280 on a Linux
//! I2C bus at a fixed interval and publishes the values to an MQTT broker,
//! either under a fixed topic layout or as Home Assistant discovery entities.
//! Built for unattended operation under systemd: the broker connection is
//! supervised and re-established with backoff, sensor faults skip a cycle
//! instead of stopping the daemon, and shutdown announces `offline` before
//! disconnecting.
//!
//! ## Modules
//!
//! * `config`: TOML configuration, validated with the `validator` crate.
//!
//! * `core`: Runtime components:
//!   - Sensor sources and the reader applying calibration
//!   - Reading types and sea-level correction
//!   - Home Assistant discovery documents
//!   - The reading publisher and the scheduler loop
//!
//! * `logger`: `tracing` subscriber setup with console output (compact,
//!   pretty, JSON) and optional systemd journald integration.
//!
//! ## Features
//!
//! * `bme280-i2c`: Real BME280 access via `linux-embedded-hal` (default: enabled).

pub mod config;
pub mod core;
pub mod logger;
