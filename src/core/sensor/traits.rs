use super::types::SensorResult;
use crate::core::reading::RawMeasurement;

/// A source of raw environmental measurements.
///
/// Implementations own the underlying device handle. The trait is object safe
/// so the reader can hold a `Box<dyn SensorSource>` and tests can substitute
/// a scripted source.
#[async_trait::async_trait]
pub trait SensorSource: Send + Sync + 'static {
    /// Performs one measurement and returns the uncorrected values.
    async fn read_raw(&self) -> SensorResult<RawMeasurement>;

    /// Re-initialises the device after a suspected fault.
    async fn reset(&self) -> SensorResult<()>;

    /// Short description for log messages, e.g. `/dev/i2c-1@0x76`.
    fn describe(&self) -> String;
}
