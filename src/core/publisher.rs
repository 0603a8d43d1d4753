//! Formats readings and sends them through a [`Transport`].
//!
//! In discovery mode the config documents are (re)announced whenever the
//! transport reports a connection epoch that has not been announced yet, i.e.
//! before the first reading and after every reconnect. A failed announcement
//! stays pending and is retried with the next reading.

use std::sync::Arc;

use bmebridge_mqtt::{EndpointMetadata, TransferError};
use thiserror::Error;
use tracing::{debug, info};

use super::{
    discovery::DiscoveryLayout,
    reading::{Channel, Reading},
    transport::Transport,
};
use crate::config::{publish::PublishMode, Config};

#[derive(Error, Debug)]
pub enum PublishError {
    #[error("Failed to publish to {topic}: {source}")]
    Transfer {
        topic: String,
        #[source]
        source: TransferError,
    },

    #[error("Failed to encode discovery document: {0}")]
    Encode(#[from] serde_json::Error),
}

/// `<base_topic>/<location>/<object_id>_<measurement>` with scalar payloads.
#[derive(Debug, Clone)]
pub struct FixedLayout {
    root: String,
    object_id: String,
}

impl FixedLayout {
    pub fn from_config(config: &Config) -> Self {
        let publish = &config.publish;
        Self {
            root: format!(
                "{}/{}",
                publish.base_topic.trim_end_matches('/'),
                publish.location()
            ),
            object_id: publish.object_id.clone(),
        }
    }

    pub fn topic(&self, channel: Channel) -> String {
        format!("{}/{}_{}", self.root, self.object_id, channel.key())
    }

    pub fn availability_topic(&self) -> String {
        format!("{}/status", self.root)
    }
}

/// Where and how readings land on the broker.
#[derive(Debug, Clone)]
pub enum TopicLayout {
    Discovery(DiscoveryLayout),
    Fixed(FixedLayout),
}

impl TopicLayout {
    pub fn from_config(config: &Config) -> Self {
        match config.publish.mode {
            PublishMode::Discovery => TopicLayout::Discovery(DiscoveryLayout::from_config(config)),
            PublishMode::Fixed => TopicLayout::Fixed(FixedLayout::from_config(config)),
        }
    }

    pub fn availability_topic(&self) -> String {
        match self {
            TopicLayout::Discovery(layout) => layout.availability_topic(),
            TopicLayout::Fixed(layout) => layout.availability_topic(),
        }
    }
}

/// What a successful [`ReadingPublisher::publish`] sent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    /// Discovery documents sent before the reading.
    pub announced: usize,

    /// Messages carrying measurement values.
    pub measurements: usize,
}

pub struct ReadingPublisher {
    transport: Arc<dyn Transport>,
    layout: TopicLayout,
    qos: u8,

    /// Connection epoch the discovery documents were last announced for.
    announced_epoch: Option<u64>,
}

impl ReadingPublisher {
    pub fn new(transport: Arc<dyn Transport>, layout: TopicLayout, qos: u8) -> Self {
        Self {
            transport,
            layout,
            qos,
            announced_epoch: None,
        }
    }

    pub fn from_config(transport: Arc<dyn Transport>, config: &Config) -> Self {
        Self::new(
            transport,
            TopicLayout::from_config(config),
            config.publish.qos,
        )
    }

    /// Publishes one reading, announcing discovery documents first if needed.
    ///
    /// # Errors
    ///
    /// Stops at the first failed message and returns `PublishError`.
    pub async fn publish(&mut self, reading: &Reading) -> Result<PublishReport, PublishError> {
        let mut report = PublishReport::default();

        match &self.layout {
            TopicLayout::Discovery(layout) => {
                let epoch = self.transport.connection_epoch();
                if self.announced_epoch != Some(epoch) {
                    report.announced = self.announce(layout, epoch).await?;
                    self.announced_epoch = Some(epoch);
                }

                let payload = layout.state_payload(reading);
                self.send(&layout.state_topic(), payload.into_bytes(), false)
                    .await?;
                report.measurements = 1;
            }
            TopicLayout::Fixed(layout) => {
                for (channel, value) in reading.channels() {
                    let payload = channel.format(value);
                    self.send(&layout.topic(channel), payload.into_bytes(), false)
                        .await?;
                    report.measurements += 1;
                }
            }
        }

        debug!("Published reading: {}", reading);
        Ok(report)
    }

    async fn announce(&self, layout: &DiscoveryLayout, epoch: u64) -> Result<usize, PublishError> {
        let announcements = layout.announcements()?;
        for (topic, document) in &announcements {
            self.send(topic, document.clone().into_bytes(), true).await?;
        }

        info!(
            "Announced {} discovery entities (connection epoch {})",
            announcements.len(),
            epoch
        );
        Ok(announcements.len())
    }

    async fn send(&self, topic: &str, payload: Vec<u8>, retain: bool) -> Result<(), PublishError> {
        let endpoint = EndpointMetadata::new(topic, self.qos, retain);
        self.transport
            .publish(payload, &endpoint)
            .await
            .map_err(|source| PublishError::Transfer {
                topic: topic.to_string(),
                source,
            })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Mutex,
    };

    use super::*;
    use crate::config::sensor::TemperatureUnit;

    #[derive(Debug, Clone, PartialEq)]
    pub(crate) struct Sent {
        pub topic: String,
        pub payload: String,
        pub retain: bool,
    }

    /// Records every publish; can be told to fail.
    #[derive(Default)]
    pub(crate) struct RecordingTransport {
        pub sent: Mutex<Vec<Sent>>,
        pub epoch: AtomicU64,
        pub failing: AtomicBool,
    }

    impl RecordingTransport {
        pub(crate) fn connected() -> Arc<Self> {
            let transport = Self::default();
            transport.epoch.store(1, Ordering::SeqCst);
            Arc::new(transport)
        }

        pub(crate) fn take(&self) -> Vec<Sent> {
            std::mem::take(&mut *self.sent.lock().unwrap())
        }
    }

    #[async_trait::async_trait]
    impl Transport for RecordingTransport {
        async fn publish(
            &self,
            payload: Vec<u8>,
            endpoint: &EndpointMetadata,
        ) -> Result<(), TransferError> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(TransferError::NotConnected);
            }
            self.sent.lock().unwrap().push(Sent {
                topic: endpoint.topic.clone(),
                payload: String::from_utf8(payload).unwrap(),
                retain: endpoint.retain,
            });
            Ok(())
        }

        fn connection_epoch(&self) -> u64 {
            self.epoch.load(Ordering::SeqCst)
        }
    }

    pub(crate) fn test_config(mode: &str, elevation: Option<f64>) -> Config {
        let mut config: Config = format!(
            r#"
            [transport]
            host = "mqtt.local"
            [publish]
            mode = "{mode}"
            node_id = "pi"
            base_topic = "home"
            location = "attic"
            "#
        )
        .parse()
        .unwrap();
        config.sensor.elevation = elevation;
        config
    }

    fn reading() -> Reading {
        Reading {
            temperature: 21.44,
            unit: TemperatureUnit::Celsius,
            humidity: 48.06,
            pressure: 1003.456,
            sea_level_pressure: Some(1015.5),
        }
    }

    #[tokio::test]
    async fn test_fixed_mode_publishes_measurement_topics_only() {
        let transport = RecordingTransport::connected();
        let mut publisher =
            ReadingPublisher::from_config(transport.clone(), &test_config("fixed", Some(100.0)));

        let report = publisher.publish(&reading()).await.unwrap();
        assert_eq!(
            report,
            PublishReport {
                announced: 0,
                measurements: 4
            }
        );

        let sent = transport.take();
        let topics: Vec<_> = sent.iter().map(|s| s.topic.as_str()).collect();
        assert_eq!(
            topics,
            [
                "home/attic/BME280_temperature",
                "home/attic/BME280_humidity",
                "home/attic/BME280_pressure",
                "home/attic/BME280_sealevel",
            ]
        );
        assert_eq!(sent[0].payload, "21.4");
        assert_eq!(sent[2].payload, "1003.46");
        assert!(sent.iter().all(|s| !s.retain));
        assert!(sent.iter().all(|s| !s.topic.ends_with("/config")));
    }

    #[tokio::test]
    async fn test_discovery_announced_once_before_first_reading() {
        let transport = RecordingTransport::connected();
        let mut publisher =
            ReadingPublisher::from_config(transport.clone(), &test_config("discovery", None));

        let report = publisher.publish(&reading()).await.unwrap();
        assert_eq!(report.announced, 3);

        let sent = transport.take();
        assert_eq!(sent.len(), 4);
        assert!(sent[..3]
            .iter()
            .all(|s| s.topic.ends_with("/config") && s.retain));
        assert_eq!(sent[3].topic, "homeassistant/sensor/pi/state");
        assert!(!sent[3].retain);

        let report = publisher.publish(&reading()).await.unwrap();
        assert_eq!(report.announced, 0);
        let sent = transport.take();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].topic, "homeassistant/sensor/pi/state");
    }

    #[tokio::test]
    async fn test_discovery_reannounced_after_reconnect() {
        let transport = RecordingTransport::connected();
        let mut publisher =
            ReadingPublisher::from_config(transport.clone(), &test_config("discovery", None));

        publisher.publish(&reading()).await.unwrap();
        transport.take();

        transport.epoch.store(2, Ordering::SeqCst);
        let report = publisher.publish(&reading()).await.unwrap();
        assert_eq!(report.announced, 3);
        assert_eq!(transport.take().len(), 4);
    }

    #[tokio::test]
    async fn test_failed_announcement_is_retried() {
        let transport = RecordingTransport::connected();
        transport.failing.store(true, Ordering::SeqCst);
        let mut publisher =
            ReadingPublisher::from_config(transport.clone(), &test_config("discovery", None));

        let err = publisher.publish(&reading()).await.unwrap_err();
        assert!(matches!(
            err,
            PublishError::Transfer {
                source: TransferError::NotConnected,
                ..
            }
        ));

        transport.failing.store(false, Ordering::SeqCst);
        let report = publisher.publish(&reading()).await.unwrap();
        assert_eq!(report.announced, 3);
    }

    #[tokio::test]
    async fn test_state_payload_content() {
        let transport = RecordingTransport::connected();
        let mut publisher =
            ReadingPublisher::from_config(transport.clone(), &test_config("discovery", Some(100.0)));

        publisher.publish(&reading()).await.unwrap();
        let sent = transport.take();
        let state: serde_json::Value = serde_json::from_str(&sent.last().unwrap().payload).unwrap();

        assert_eq!(state["BME280_temperature"], 21.4);
        assert_eq!(state["BME280_humidity"], 48.1);
        assert_eq!(state["BME280_pressure"], 1003.46);
        assert_eq!(state["BME280_sealevel"], 1015.5);
    }

    #[test]
    fn test_availability_topic_matches_layout() {
        let fixed = TopicLayout::from_config(&test_config("fixed", None));
        assert_eq!(fixed.availability_topic(), "home/attic/status");

        let config = test_config("discovery", None);
        let discovery = TopicLayout::from_config(&config);
        assert_eq!(
            discovery.availability_topic(),
            "homeassistant/sensor/pi/status"
        );
        assert_eq!(
            config.transport.availability_topic.as_deref(),
            Some(discovery.availability_topic().as_str())
        );
    }
}
