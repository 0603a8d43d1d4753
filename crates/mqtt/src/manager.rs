//! High-level MQTT manager that wires all components together.
//!
//! `MqttManager::build_and_start` creates the client, spawns the connection
//! kernel and the supervisor, and hands back an [`MqttInstance`]: the only
//! handle the application needs.
//!
//! ```ignore
//! let instance = MqttManager::from_config(config)?.build_and_start().await?;
//! instance.wait_connected(Duration::from_secs(30)).await?;
//!
//! let endpoint = EndpointMetadata::new("sensors/pi/BME280_temperature", 1, false);
//! instance.publish("21.4", &endpoint)?;
//!
//! instance.shutdown().await;
//! ```

use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use rumqttc::AsyncClient;
use tokio::{sync::watch, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use validator::Validate;

use super::{
    backoff::Backoff, client::ClientBuilder, config::Config, config::EndpointMetadata,
    connection::ConnectionKernel, error::TransferError, state::ConnectionState,
    supervisor::Supervisor,
};

/// Entry point for building the MQTT infrastructure.
pub struct MqttManager {
    config: Config,
}

impl MqttManager {
    /// Creates a manager from an existing configuration struct.
    ///
    /// # Errors
    ///
    /// Returns `TransferError::ConfigError` if the configuration is invalid.
    pub fn from_config(config: Config) -> Result<Self, TransferError> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Creates a manager with default settings for the given broker.
    pub fn new(host: impl Into<String>, port: u16) -> Result<Self, TransferError> {
        Self::from_config(Config {
            host: host.into(),
            port,
            ..Default::default()
        })
    }

    fn backoff(&self) -> Backoff {
        let mut backoff = Backoff::new(
            Duration::from_secs(self.config.reconnect_delay),
            Duration::from_secs(self.config.max_reconnect_delay),
            self.config.reconnect_multiplier,
        );
        if self.config.max_reconnect_attempts > 0 {
            backoff.set_max_attempts(self.config.max_reconnect_attempts);
        }
        backoff
    }

    /// Builds the client and spawns the connection kernel and supervisor.
    ///
    /// The connection itself is established asynchronously; use
    /// [`MqttInstance::wait_connected`] to block until the broker accepts it.
    ///
    /// # Errors
    ///
    /// Returns `TransferError::ConfigError` if the client cannot be built.
    pub async fn build_and_start(self) -> Result<MqttInstance, TransferError> {
        info!(
            "Building MQTT infrastructure for {}:{}",
            self.config.host, self.config.port
        );

        let builder = ClientBuilder::from_config(&self.config)?;
        let client_id = builder.client_id();
        let (client, event_loop) = builder.build();

        let connection_cancel = CancellationToken::new();
        let mut kernel = ConnectionKernel::new(
            client.clone(),
            event_loop,
            self.backoff(),
            connection_cancel.clone(),
        );
        let state_rx = kernel.subscribe_state();
        let epoch = kernel.epoch();

        let supervisor_cancel = CancellationToken::new();
        let supervisor = Supervisor::new(
            self.config.availability_topic.clone(),
            state_rx.clone(),
            client.clone(),
            supervisor_cancel.clone(),
        );
        supervisor.monitor();

        // Cancelled when the kernel exits for any reason
        let terminated = CancellationToken::new();
        let failure = Arc::new(Mutex::new(None));

        let kernel_handle = tokio::spawn({
            let terminated = terminated.clone();
            let failure = failure.clone();
            async move {
                if let Err(e) = kernel.run().await {
                    error!("MQTT connection kernel exited with error: {}", e);
                    if let Ok(mut slot) = failure.lock() {
                        *slot = Some(e.to_string());
                    }
                }
                terminated.cancel();
            }
        });

        info!("MQTT infrastructure built, client id '{}'", client_id);

        Ok(MqttInstance {
            client,
            supervisor,
            supervisor_cancel,
            state_rx,
            epoch,
            connection_cancel,
            terminated,
            failure,
            kernel_handle: Mutex::new(Some(kernel_handle)),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

/// Running MQTT connection.
///
/// Publishing never blocks: a message either lands in the request channel
/// immediately or the call fails.
pub struct MqttInstance {
    client: AsyncClient,
    supervisor: Supervisor,
    supervisor_cancel: CancellationToken,
    state_rx: watch::Receiver<ConnectionState>,
    epoch: Arc<AtomicU64>,

    /// Stops the connection kernel
    connection_cancel: CancellationToken,

    /// Cancelled once the kernel task has exited
    terminated: CancellationToken,

    /// Reason the kernel gave up, if it did
    failure: Arc<Mutex<Option<String>>>,

    kernel_handle: Mutex<Option<JoinHandle<()>>>,
}

impl MqttInstance {
    /// Queues `payload` for publishing according to `endpoint`.
    ///
    /// # Errors
    ///
    /// - `TransferError::NotConnected` while the broker connection is down
    /// - `TransferError::InvalidMetadata` for an empty topic or a bad QoS
    /// - `TransferError::ClientTransfer` if the request channel is full
    pub fn publish(
        &self,
        payload: impl Into<Vec<u8>>,
        endpoint: &EndpointMetadata,
    ) -> Result<(), TransferError> {
        if !self.state_rx.borrow().is_connected() {
            return Err(TransferError::NotConnected);
        }

        endpoint
            .validate()
            .map_err(|e| TransferError::InvalidMetadata(e.to_string()))?;
        let qos = endpoint.qos_level().ok_or_else(|| {
            TransferError::InvalidMetadata(format!("unsupported QoS {}", endpoint.qos))
        })?;

        self.client
            .try_publish(endpoint.topic.as_str(), qos, endpoint.retain, payload)?;
        debug!("Queued publish to {}", endpoint.topic);
        Ok(())
    }

    /// Number of successful connections so far. Changes on every reconnect.
    pub fn connection_epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    pub fn state(&self) -> ConnectionState {
        self.state_rx.borrow().clone()
    }

    pub fn is_connected(&self) -> bool {
        self.state_rx.borrow().is_connected()
    }

    /// Waits until the broker accepts the connection.
    ///
    /// # Errors
    ///
    /// - `TransferError::ConnectTimeout` if `timeout` elapses first
    /// - `TransferError::KernelStopped` if the connection kernel gave up
    pub async fn wait_connected(&self, timeout: Duration) -> Result<(), TransferError> {
        let mut state_rx = self.state_rx.clone();

        let wait = async {
            loop {
                if state_rx.borrow_and_update().is_connected() {
                    return Ok(());
                }

                tokio::select! {
                    changed = state_rx.changed() => {
                        if changed.is_err() {
                            return Err(self.stopped_error());
                        }
                    }
                    _ = self.terminated.cancelled() => {
                        return Err(self.stopped_error());
                    }
                }
            }
        };

        tokio::time::timeout(timeout, wait)
            .await
            .map_err(|_| TransferError::ConnectTimeout(timeout.as_secs()))?
    }

    fn stopped_error(&self) -> TransferError {
        let reason = self
            .failure
            .lock()
            .ok()
            .and_then(|slot| slot.clone())
            .unwrap_or_else(|| "connection kernel stopped".to_string());
        TransferError::KernelStopped(reason)
    }

    /// Resolves once the connection kernel has exited.
    pub async fn terminated(&self) {
        self.terminated.cancelled().await
    }

    /// The error the kernel exited with, if any.
    pub fn failure(&self) -> Option<String> {
        self.failure.lock().ok().and_then(|slot| slot.clone())
    }

    /// Announces `offline`, disconnects and waits for the kernel to finish.
    ///
    /// Safe to call more than once.
    pub async fn shutdown(&self) {
        if let Err(e) = self.supervisor.announce_offline() {
            warn!("Failed to queue offline status: {}", e);
        }

        self.supervisor_cancel.cancel();
        self.connection_cancel.cancel();

        let handle = self
            .kernel_handle
            .lock()
            .ok()
            .and_then(|mut slot| slot.take());
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!("Connection kernel task failed: {}", e);
            }
        }

        info!("MQTT connection closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unreachable_config() -> Config {
        Config {
            // TEST-NET-1, never routed
            host: "192.0.2.1".into(),
            client_id: "manager-test".into(),
            availability_topic: Some("ha/sensor/test/status".into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_manager_creation() {
        let manager = MqttManager::new("localhost", 1883).unwrap();
        assert_eq!(manager.config().host, "localhost");
        assert_eq!(manager.config().port, 1883);
    }

    #[test]
    fn test_manager_rejects_invalid_config() {
        let config = Config {
            host: String::new(),
            ..Default::default()
        };
        assert!(matches!(
            MqttManager::from_config(config),
            Err(TransferError::ConfigError(_))
        ));
    }

    #[test]
    fn test_backoff_from_config() {
        let manager = MqttManager::from_config(Config {
            reconnect_delay: 2,
            max_reconnect_delay: 10,
            max_reconnect_attempts: 3,
            ..Default::default()
        })
        .unwrap();

        let backoff = manager.backoff();
        assert_eq!(backoff.current_delay(), Duration::from_secs(2));
        assert_eq!(backoff.max_delay(), Duration::from_secs(10));
        assert_eq!(backoff.max_attempts(), Some(3));

        let unlimited = MqttManager::from_config(Config::default()).unwrap().backoff();
        assert_eq!(unlimited.max_attempts(), None);
    }

    #[tokio::test]
    async fn test_publish_fails_fast_when_not_connected() {
        let instance = MqttManager::from_config(unreachable_config())
            .unwrap()
            .build_and_start()
            .await
            .unwrap();

        let endpoint = EndpointMetadata::new("sensors/test/BME280_temperature", 1, false);
        assert!(matches!(
            instance.publish("21.5", &endpoint),
            Err(TransferError::NotConnected)
        ));
        assert_eq!(instance.connection_epoch(), 0);

        instance.shutdown().await;
    }

    #[tokio::test]
    async fn test_wait_connected_times_out() {
        let instance = MqttManager::from_config(unreachable_config())
            .unwrap()
            .build_and_start()
            .await
            .unwrap();

        let result = instance.wait_connected(Duration::from_millis(50)).await;
        assert!(matches!(result, Err(TransferError::ConnectTimeout(_))));

        instance.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_terminates_kernel() {
        let instance = MqttManager::from_config(unreachable_config())
            .unwrap()
            .build_and_start()
            .await
            .unwrap();

        instance.shutdown().await;
        tokio::time::timeout(Duration::from_secs(1), instance.terminated())
            .await
            .expect("kernel terminated");
        assert!(instance.failure().is_none());
        assert!(!instance.is_connected());

        // Second call is a no-op
        instance.shutdown().await;
    }
}
