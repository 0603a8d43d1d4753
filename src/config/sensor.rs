//! Sensor configuration: bus location, calibration offsets and elevation.

use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

/// Unit used for reported temperatures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemperatureUnit {
    Celsius,
    Fahrenheit,
}

impl TemperatureUnit {
    /// Unit string as Home Assistant expects it.
    pub fn symbol(&self) -> &'static str {
        match self {
            TemperatureUnit::Celsius => "°C",
            TemperatureUnit::Fahrenheit => "°F",
        }
    }

    /// Converts a Celsius value into this unit.
    pub fn from_celsius(&self, celsius: f64) -> f64 {
        match self {
            TemperatureUnit::Celsius => celsius,
            TemperatureUnit::Fahrenheit => celsius * 9.0 / 5.0 + 32.0,
        }
    }
}

impl Default for TemperatureUnit {
    fn default() -> Self {
        TemperatureUnit::Celsius
    }
}

/// `[sensor]` section.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct SensorConfig {
    /// I2C character device.
    #[validate(length(min = 1, message = "I2C bus path must not be empty"))]
    pub bus: String,

    /// 7-bit I2C address; the BME280 answers on 0x76 (SDO to GND) or 0x77.
    #[validate(custom(function = "validate_address"))]
    pub address: u8,

    pub temperature_unit: TemperatureUnit,

    /// Added to the temperature after conversion, in `temperature_unit`.
    #[validate(range(min = -50.0, max = 50.0, message = "Temperature offset out of range"))]
    pub temperature_offset: f64,

    /// Relative humidity offset, %RH.
    #[validate(range(min = -50.0, max = 50.0, message = "Humidity offset out of range"))]
    pub humidity_offset: f64,

    /// Station pressure offset, hPa.
    #[validate(range(min = -100.0, max = 100.0, message = "Pressure offset out of range"))]
    pub pressure_offset: f64,

    /// Station elevation above sea level in meters. Enables the sea-level channel.
    #[validate(range(
        min = -500.0,
        max = 9000.0,
        message = "Elevation must be between -500 and 9000 meters"
    ))]
    pub elevation: Option<f64>,

    /// Station pressure (hPa) below which a reading is treated as a sensor fault.
    #[validate(range(
        min = 0.0,
        max = 1100.0,
        message = "Minimum plausible pressure must be between 0 and 1100 hPa"
    ))]
    pub min_plausible_pressure: f64,
}

fn validate_address(address: u8) -> Result<(), ValidationError> {
    if (0x08..=0x77).contains(&address) {
        Ok(())
    } else {
        let mut err = ValidationError::new("invalid_i2c_address");
        err.message = Some(format!("I2C address 0x{:02x} is outside 0x08..=0x77", address).into());
        Err(err)
    }
}

impl Default for SensorConfig {
    fn default() -> Self {
        SensorConfig {
            bus: "/dev/i2c-1".to_string(),
            address: 0x76,
            temperature_unit: TemperatureUnit::default(),
            temperature_offset: 0.0,
            humidity_offset: 0.0,
            pressure_offset: 0.0,
            elevation: None,
            min_plausible_pressure: 800.0,
        }
    }
}
