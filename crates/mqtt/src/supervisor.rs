//! Availability announcements.
//!
//! The `Supervisor` watches the connection state and publishes a retained
//! `online` to the availability topic every time the broker accepts a
//! connection. The matching `offline` comes either from [`Supervisor::announce_offline`]
//! on clean shutdown or from the broker via the Last Will.

use rumqttc::{AsyncClient, QoS};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{
    client::{OFFLINE_PAYLOAD, ONLINE_PAYLOAD},
    error::TransferError,
    state::ConnectionState,
};

/// Monitors connection state and keeps the availability topic current.
#[derive(Debug, Clone)]
pub struct Supervisor {
    /// Watch channel for connection state (from connection kernel)
    state_rx: watch::Receiver<ConnectionState>,

    /// Retained `online`/`offline` topic; `None` disables announcements
    availability_topic: Option<String>,

    client: AsyncClient,

    cancel_token: CancellationToken,
}

impl Supervisor {
    pub fn new(
        availability_topic: Option<String>,
        state_rx: watch::Receiver<ConnectionState>,
        client: AsyncClient,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            state_rx,
            availability_topic,
            client,
            cancel_token,
        }
    }

    /// Publishes the retained "online" status message.
    async fn publish_online_status(&self) -> Result<(), TransferError> {
        let Some(topic) = &self.availability_topic else {
            return Ok(());
        };

        self.client
            .publish(topic.as_str(), QoS::AtLeastOnce, true, ONLINE_PAYLOAD)
            .await?;
        info!("Published online status to {}", topic);
        Ok(())
    }

    /// Queues the retained "offline" status message without waiting.
    ///
    /// # Errors
    ///
    /// Returns `TransferError::ClientTransfer` if the request channel is full
    /// or closed.
    pub fn announce_offline(&self) -> Result<(), TransferError> {
        let Some(topic) = &self.availability_topic else {
            return Ok(());
        };

        if !self.state_rx.borrow().is_connected() {
            debug!("Not connected, leaving offline announcement to the Last Will");
            return Ok(());
        }

        self.client
            .try_publish(topic.as_str(), QoS::AtLeastOnce, true, OFFLINE_PAYLOAD)?;
        info!("Published offline status to {}", topic);
        Ok(())
    }

    /// Spawns the monitoring task and returns immediately.
    pub fn monitor(&self) {
        let supervisor = self.clone();
        tokio::spawn(async move {
            supervisor.run_monitor_loop().await;
        });
    }

    async fn run_monitor_loop(mut self) {
        debug!("Supervisor monitoring started");

        // Already connected before the task got scheduled
        if self.state_rx.borrow_and_update().is_connected() {
            self.on_connect().await;
        }

        loop {
            tokio::select! {
                _ = self.cancel_token.cancelled() => {
                    debug!("Supervisor shutting down due to cancellation");
                    break;
                }

                changed = self.state_rx.changed() => {
                    if changed.is_err() {
                        debug!("State channel closed, supervisor exiting");
                        break;
                    }

                    let state = self.state_rx.borrow_and_update().clone();
                    match state {
                        ConnectionState::Connected => self.on_connect().await,
                        ConnectionState::Disconnected(reason) => {
                            warn!("Disconnected from broker: {}", reason);
                        }
                        _ => {}
                    }
                }
            }
        }

        debug!("Supervisor monitoring stopped");
    }

    async fn on_connect(&self) {
        if let Err(e) = self.publish_online_status().await {
            warn!("Failed to publish online status: {}", e);
        }
    }

    pub fn availability_topic(&self) -> Option<&str> {
        self.availability_topic.as_deref()
    }
}
