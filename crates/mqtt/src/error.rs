//! Error handling for MQTT transfer operations.
//!
//! `TransferError` is the single error type returned by this crate. Variants
//! fall into three groups:
//!
//! **Startup** (configuration or client construction, fail fast):
//! - `InvalidMetadata`, `ConfigError`, `ConnectTimeout`
//!
//! **Runtime** (usually transient, the connection kernel keeps retrying):
//! - `NotConnected`, `ClientTransfer`, `ClientConnection`, `ConnectionState`
//!
//! **Terminal**:
//! - `RetriesPolicy`: reconnection attempts exhausted
//! - `KernelStopped`: the connection kernel exited and will not come back

use thiserror::Error;

/// The unified error type for MQTT transfer operations.
#[derive(Debug, Error)]
pub enum TransferError {
    /// Endpoint metadata is invalid (QoS outside 0..=2, empty topic).
    #[error("Invalid metadata: {0}")]
    InvalidMetadata(String),

    /// Configuration validation failed.
    #[error("Configuration error: {0}")]
    ConfigError(#[from] validator::ValidationErrors),

    /// The broker did not accept a connection within the startup window.
    #[error("No connection to broker within {0} seconds")]
    ConnectTimeout(u64),

    /// A publish was attempted while the broker connection is down.
    ///
    /// Nothing is queued; the caller decides whether to try again later.
    #[error("Not connected to broker")]
    NotConnected,

    /// The local client could not queue the request (channel full or closed).
    #[error("Client transfer error: {0}")]
    ClientTransfer(#[from] rumqttc::ClientError),

    /// The connection to the broker failed or was lost.
    ///
    /// Boxed because `rumqttc::ConnectionError` is large.
    #[error("Client connection error: {0}")]
    ClientConnection(#[from] Box<rumqttc::ConnectionError>),

    /// The MQTT state machine rejected a transition.
    #[error("Client connection state error: {0}")]
    ConnectionState(#[from] rumqttc::StateError),

    /// Reconnection attempts exhausted.
    #[error("Retry policy error: {0}")]
    RetriesPolicy(#[from] super::backoff::BackoffError),

    /// The connection kernel has exited; the instance is unusable.
    #[error("Connection kernel stopped: {0}")]
    KernelStopped(String),
}

impl From<rumqttc::ConnectionError> for TransferError {
    fn from(err: rumqttc::ConnectionError) -> Self {
        TransferError::ClientConnection(Box::new(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transfer_error_display() {
        let err = TransferError::InvalidMetadata("QoS must be 0-2".into());
        assert_eq!(err.to_string(), "Invalid metadata: QoS must be 0-2");
    }

    #[test]
    fn test_not_connected_display() {
        assert_eq!(
            TransferError::NotConnected.to_string(),
            "Not connected to broker"
        );
    }

    #[test]
    fn test_connect_timeout_mentions_seconds() {
        let err = TransferError::ConnectTimeout(30);
        assert!(err.to_string().contains("30 seconds"));
    }

    #[test]
    fn test_from_connection_error_is_boxed() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err: TransferError = rumqttc::ConnectionError::Io(io).into();
        assert!(matches!(err, TransferError::ClientConnection(_)));
        assert!(err.to_string().contains("refused"));
    }

    #[test]
    fn test_transfer_error_is_std_error() {
        let err: Box<dyn std::error::Error> = Box::new(TransferError::KernelStopped("bye".into()));
        assert_eq!(err.to_string(), "Connection kernel stopped: bye");
    }
}
