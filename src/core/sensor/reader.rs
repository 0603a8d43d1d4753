//! Turns raw sensor output into corrected readings.

use tracing::{debug, warn};

use super::{error::SensorError, traits::SensorSource, types::SensorResult};
use crate::{
    config::sensor::SensorConfig,
    core::reading::{RawMeasurement, Reading},
};

/// Reads the sensor and applies plausibility checks and calibration.
pub struct SensorReader {
    source: Box<dyn SensorSource>,
    config: SensorConfig,
}

impl SensorReader {
    pub fn new(source: Box<dyn SensorSource>, config: SensorConfig) -> Self {
        Self { source, config }
    }

    /// Takes a fresh measurement and returns the corrected reading.
    ///
    /// A station pressure below `min_plausible_pressure` is treated as a
    /// sensor fault: the device is re-initialised and the reading discarded.
    ///
    /// # Errors
    ///
    /// Any `SensorError` from the source, `SensorError::NonFinite` for NaN or
    /// infinite values, or `SensorError::Implausible`.
    pub async fn read(&self) -> SensorResult<Reading> {
        let raw = self.source.read_raw().await?;
        debug!("Raw measurement from {}: {:?}", self.source.describe(), raw);

        check_finite(&raw)?;
        self.check_plausible(&raw).await?;

        Ok(Reading::from_raw(raw, &self.config))
    }

    async fn check_plausible(&self, raw: &RawMeasurement) -> SensorResult<()> {
        let minimum = self.config.min_plausible_pressure;
        if raw.pressure_hpa >= minimum {
            return Ok(());
        }

        warn!(
            "Sensor fault on {}: pressure {:.2} hPa below {:.2} hPa, resetting",
            self.source.describe(),
            raw.pressure_hpa,
            minimum
        );
        if let Err(e) = self.source.reset().await {
            warn!("Sensor reset failed: {}", e);
        }

        Err(SensorError::Implausible {
            metric: "pressure",
            value: raw.pressure_hpa,
            minimum,
        })
    }

    pub fn describe(&self) -> String {
        self.source.describe()
    }
}

fn check_finite(raw: &RawMeasurement) -> SensorResult<()> {
    for (metric, value) in [
        ("temperature", raw.temperature_c),
        ("humidity", raw.humidity),
        ("pressure", raw.pressure_hpa),
    ] {
        if !value.is_finite() {
            return Err(SensorError::NonFinite { metric, value });
        }
    }
    Ok(())
}
