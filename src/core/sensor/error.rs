use thiserror::Error;

/// Errors raised while opening or reading the sensor.
#[derive(Error, Debug)]
pub enum SensorError {
    /// The I2C character device could not be opened.
    #[error("Failed to open I2C bus {path}: {reason}")]
    BusOpen { path: String, reason: String },

    /// The chip did not answer or answered with an unexpected chip id.
    #[error("Sensor not responding on {location}: {reason}")]
    NotResponding { location: String, reason: String },

    /// A bus transfer or measurement failed.
    #[error("Measurement failed: {0}")]
    Measurement(String),

    /// The sensor produced a value outside the physically plausible range.
    #[error("Implausible {metric} reading: {value:.2} (minimum {minimum:.2})")]
    Implausible {
        metric: &'static str,
        value: f64,
        minimum: f64,
    },

    /// The sensor returned NaN or infinity for a channel.
    #[error("Sensor returned a non-finite {metric} value: {value}")]
    NonFinite { metric: &'static str, value: f64 },

    /// The blocking I/O task panicked or was cancelled.
    #[error("Sensor task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
