//! Home Assistant MQTT Discovery.
//!
//! Each channel gets a retained config document at
//! `<prefix>/sensor/<node_id>/<object_id>_<channel>/config`. All channels
//! share one JSON state topic; each document's `value_template` picks its key.
//!
//! ```text
//! homeassistant/sensor/pi/BME280_temperature/config  {"name":"Temperature",...}
//! homeassistant/sensor/pi/state                      {"BME280_temperature":21.4,...}
//! homeassistant/sensor/pi/status                     online | offline
//! ```

use serde::Serialize;
use serde_json::{Map, Value};

use super::reading::{Channel, Reading};
use crate::config::{sensor::TemperatureUnit, Config};

const MODEL: &str = "BME280";
const MANUFACTURER: &str = "Bosch Sensortec";

/// Device block shared by every entity of this node.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceInfo {
    pub identifiers: Vec<String>,
    pub name: String,
    pub model: &'static str,
    pub manufacturer: &'static str,
}

/// One `sensor` entity config document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiscoveryDocument {
    pub name: &'static str,
    pub unique_id: String,
    pub device_class: &'static str,
    pub unit_of_measurement: &'static str,
    pub state_class: &'static str,
    pub state_topic: String,
    pub availability_topic: String,
    pub value_template: String,
    pub enabled_by_default: bool,
    pub device: DeviceInfo,
}

/// Topic names and identity for the discovery layout.
#[derive(Debug, Clone)]
pub struct DiscoveryLayout {
    prefix: String,
    node_id: String,
    object_id: String,
    device_name: String,
    unit: TemperatureUnit,
    channels: Vec<Channel>,
}

impl DiscoveryLayout {
    pub fn from_config(config: &Config) -> Self {
        let publish = &config.publish;
        let channels = Channel::ALL
            .into_iter()
            .filter(|c| *c != Channel::SeaLevel || config.sensor.elevation.is_some())
            .collect();

        Self {
            prefix: publish.discovery_prefix.trim_end_matches('/').to_string(),
            node_id: publish.node_id(),
            object_id: publish.object_id.clone(),
            device_name: publish.device_name(),
            unit: config.sensor.temperature_unit,
            channels,
        }
    }

    fn node_topic(&self) -> String {
        format!("{}/sensor/{}", self.prefix, self.node_id)
    }

    pub fn state_topic(&self) -> String {
        format!("{}/state", self.node_topic())
    }

    pub fn availability_topic(&self) -> String {
        format!("{}/status", self.node_topic())
    }

    /// Key of `channel` inside the state document, e.g. `BME280_humidity`.
    pub fn state_key(&self, channel: Channel) -> String {
        format!("{}_{}", self.object_id, channel.key())
    }

    pub fn config_topic(&self, channel: Channel) -> String {
        format!("{}/{}/config", self.node_topic(), self.state_key(channel))
    }

    /// Channels announced for this node.
    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    pub fn document(&self, channel: Channel) -> DiscoveryDocument {
        DiscoveryDocument {
            name: channel.label(),
            unique_id: format!("{}_{}", self.node_id, channel.key()).to_lowercase(),
            device_class: channel.device_class(),
            unit_of_measurement: channel.unit(self.unit),
            state_class: "measurement",
            state_topic: self.state_topic(),
            availability_topic: self.availability_topic(),
            value_template: format!("{{{{ value_json.{} }}}}", self.state_key(channel)),
            enabled_by_default: true,
            device: DeviceInfo {
                identifiers: vec![self.node_id.clone()],
                name: self.device_name.clone(),
                model: MODEL,
                manufacturer: MANUFACTURER,
            },
        }
    }

    /// `(config topic, JSON document)` for every announced channel.
    pub fn announcements(&self) -> serde_json::Result<Vec<(String, String)>> {
        self.channels
            .iter()
            .map(|&channel| {
                let payload = serde_json::to_string(&self.document(channel))?;
                Ok((self.config_topic(channel), payload))
            })
            .collect()
    }

    /// JSON state document for `reading`, values rounded per channel.
    pub fn state_payload(&self, reading: &Reading) -> String {
        let mut state = Map::new();
        for (channel, value) in reading.channels() {
            if let Some(number) = serde_json::Number::from_f64(channel.round(value)) {
                state.insert(self.state_key(channel), Value::Number(number));
            }
        }
        Value::Object(state).to_string()
    }
}
