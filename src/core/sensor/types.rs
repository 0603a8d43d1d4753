use super::error::SensorError;

/// Result type for every sensor operation.
pub type SensorResult<T> = std::result::Result<T, SensorError>;
