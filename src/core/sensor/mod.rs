//! Sensor access: the `SensorSource` capability, the BME280 driver adapter
//! and the `SensorReader` that turns raw values into corrected readings.

#[cfg(feature = "bme280-i2c")]
pub mod bme280;
pub mod error;
pub mod reader;
pub mod traits;
pub mod types;

#[cfg(feature = "bme280-i2c")]
pub use self::bme280::Bme280Source;
pub use error::SensorError;
pub use reader::SensorReader;
pub use traits::SensorSource;
pub use types::SensorResult;
