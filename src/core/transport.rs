//! The broker-facing capability used by the publisher.

use bmebridge_mqtt::{EndpointMetadata, MqttInstance, TransferError};

/// Something readings can be published through.
///
/// Object safe; the publisher holds an `Arc<dyn Transport>` so tests can
/// record traffic instead of talking to a broker.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Sends `payload` to the topic described by `endpoint`.
    async fn publish(&self, payload: Vec<u8>, endpoint: &EndpointMetadata)
        -> Result<(), TransferError>;

    /// Counter of successful broker connections; changes on every reconnect.
    fn connection_epoch(&self) -> u64;
}

#[async_trait::async_trait]
impl Transport for MqttInstance {
    async fn publish(
        &self,
        payload: Vec<u8>,
        endpoint: &EndpointMetadata,
    ) -> Result<(), TransferError> {
        MqttInstance::publish(self, payload, endpoint)
    }

    fn connection_epoch(&self) -> u64 {
        MqttInstance::connection_epoch(self)
    }
}
