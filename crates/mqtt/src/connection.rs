//! Connection kernel: drives the rumqttc event loop and reconnects.
//!
//! ```text
//! MqttInstance::publish ──> AsyncClient ──(request channel)──> EventLoop
//!                                                                 ↑
//!                                     ConnectionKernel::run polls ┘
//! ```
//!
//! rumqttc reconnects on the next `poll()` after an error; the kernel decides
//! whether that is worth doing (fatal vs. transient), waits according to the
//! backoff, and broadcasts every transition as a [`ConnectionState`].

use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use rumqttc::{
    AsyncClient, ConnectReturnCode, ConnectionError, Event, EventLoop, Outgoing, Packet,
};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use super::{backoff::Backoff, error::TransferError, state::ConnectionState};

/// Upper bound for flushing DISCONNECT during shutdown.
const DISCONNECT_FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

/// Owns the event loop and keeps the broker connection alive.
///
/// Runs on a single task; the `AsyncClient` it shares is cloneable.
pub struct ConnectionKernel {
    client: AsyncClient,
    event_loop: EventLoop,
    backoff: Backoff,
    cancel: CancellationToken,
    state_tx: watch::Sender<ConnectionState>,
    state_rx: watch::Receiver<ConnectionState>,

    /// Incremented on every accepted CONNACK.
    epoch: Arc<AtomicU64>,
}

impl ConnectionKernel {
    pub fn new(
        client: AsyncClient,
        event_loop: EventLoop,
        backoff: Backoff,
        cancel: CancellationToken,
    ) -> Self {
        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);
        Self {
            client,
            event_loop,
            backoff,
            cancel,
            state_tx,
            state_rx,
            epoch: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Receiver for connection state changes; sees the current state immediately.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// Shared counter of successful connections.
    pub fn epoch(&self) -> Arc<AtomicU64> {
        self.epoch.clone()
    }

    /// Broadcasts `state` if it differs from the current one.
    fn update_state(&self, state: ConnectionState) {
        let changed = self.state_tx.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state.clone();
                true
            }
        });

        if changed {
            info!("Connection state changed to: {}", state);
        }
    }

    /// Main loop. Runs until cancellation, a fatal error, or an exhausted
    /// retry policy.
    ///
    /// # Errors
    ///
    /// Returns the fatal connection error or `TransferError::RetriesPolicy`.
    pub async fn run(&mut self) -> Result<(), TransferError> {
        self.update_state(ConnectionState::Connecting);
        self.backoff.reset();

        info!("Starting connection event loop...");
        loop {
            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => {
                    info!("Shutdown signal received, closing broker connection...");
                    self.flush_disconnect().await;
                    self.update_state(ConnectionState::Disconnected("shutdown".into()));
                    info!("Connection kernel shutdown completed");
                    return Ok(());
                }

                event_result = self.event_loop.poll() => {
                    match event_result {
                        Ok(event) => self.handle_event(event),
                        Err(e) => {
                            if is_fatal_error(&e) {
                                error!("Fatal connection error: {}", get_error_message(&e));
                                self.update_state(ConnectionState::Disconnected(e.to_string()));
                                return Err(TransferError::from(e));
                            }

                            self.update_state(ConnectionState::Disconnected(get_error_message(&e)));

                            let delay = match self.backoff.next_sleep() {
                                Ok(delay) => delay,
                                Err(backoff_err) => {
                                    error!("Maximum retry attempts exceeded: {}", backoff_err);
                                    self.update_state(ConnectionState::Disconnected(backoff_err.to_string()));
                                    return Err(backoff_err.into());
                                }
                            };

                            warn!(
                                "Reconnecting in {:.2} seconds (attempt {}) due to error: {}",
                                delay.as_secs_f64(),
                                self.backoff.attempt(),
                                get_error_message(&e)
                            );
                            self.update_state(ConnectionState::Reconnecting(delay.as_secs_f64()));

                            tokio::select! {
                                _ = tokio::time::sleep(delay) => {}
                                _ = self.cancel.cancelled() => {
                                    debug!("Cancelled during reconnect delay");
                                }
                            }
                        }
                    }
                }
            }
        }
    }

    /// Updates flags and state from a single MQTT event.
    fn handle_event(&mut self, event: Event) {
        match event {
            Event::Incoming(Packet::ConnAck(conn_ack)) => {
                if conn_ack.code == ConnectReturnCode::Success {
                    let epoch = self.epoch.fetch_add(1, Ordering::AcqRel) + 1;
                    info!("Connection established (epoch {})", epoch);
                    self.backoff.reset();
                    self.update_state(ConnectionState::Connected);
                }
            }
            Event::Incoming(Packet::Disconnect) => {
                warn!("Disconnected by broker");
                self.update_state(ConnectionState::Disconnected(
                    "Disconnected by broker".into(),
                ));
            }
            Event::Incoming(Packet::PingResp) | Event::Incoming(Packet::PingReq) => {}
            Event::Incoming(packet) => {
                trace!("Incoming packet: {:?}", packet);
            }
            Event::Outgoing(outgoing) => {
                trace!("Outgoing packet: {:?}", outgoing);
            }
        }
    }

    /// Queues DISCONNECT and polls until it has been written.
    ///
    /// Best effort: gives up after `DISCONNECT_FLUSH_TIMEOUT` or on any error.
    async fn flush_disconnect(&mut self) {
        if !self.state_rx.borrow().is_connected() {
            return;
        }

        if let Err(e) = self.client.try_disconnect() {
            warn!("Error queueing disconnect packet: {}", e);
            return;
        }

        let flush = async {
            loop {
                match self.event_loop.poll().await {
                    Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                        debug!("DISCONNECT sent to broker");
                        break;
                    }
                    Ok(event) => trace!("Draining event during shutdown: {:?}", event),
                    Err(e) => {
                        debug!("Event loop closed during shutdown: {}", get_error_message(&e));
                        break;
                    }
                }
            }
        };

        if tokio::time::timeout(DISCONNECT_FLUSH_TIMEOUT, flush).await.is_err() {
            warn!("Timed out flushing DISCONNECT to broker");
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Disposition {
    // Reconnecting cannot help
    Fatal,
    // Worth another attempt after backoff
    Reconnect,
}

fn classify_connection_error(err: &ConnectionError) -> Disposition {
    use Disposition::*;

    match err {
        // Certificates or crypto setup; retrying won't fix it
        ConnectionError::Tls(_) => Fatal,

        ConnectionError::MqttState(_) => Reconnect,

        ConnectionError::NotConnAck(_) => Fatal,

        // The client side of the request channel was dropped
        ConnectionError::RequestsDone => Fatal,

        ConnectionError::Io(e) => match e.kind() {
            std::io::ErrorKind::PermissionDenied | std::io::ErrorKind::InvalidInput => Fatal,
            _ => Reconnect,
        },

        ConnectionError::NetworkTimeout | ConnectionError::FlushTimeout => Reconnect,

        ConnectionError::ConnectionRefused(code) => match code {
            ConnectReturnCode::RefusedProtocolVersion
            | ConnectReturnCode::BadClientId
            | ConnectReturnCode::BadUserNamePassword
            | ConnectReturnCode::NotAuthorized => Fatal,
            _ => Reconnect,
        },

        #[allow(unreachable_patterns)]
        _ => Reconnect,
    }
}

fn is_fatal_error(err: &ConnectionError) -> bool {
    matches!(classify_connection_error(err), Disposition::Fatal)
}

/// Innermost message of an error chain, without surrounding quotes.
fn get_error_message(e: &dyn std::error::Error) -> String {
    let mut current = e;
    while let Some(source) = current.source() {
        current = source;
    }
    current.to_string().trim_matches('"').to_string()
}
