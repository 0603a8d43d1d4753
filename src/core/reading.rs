//! Measurement types and the corrections applied between sensor and broker.

use std::fmt;

use crate::config::sensor::{SensorConfig, TemperatureUnit};

/// Barometric exponent of the international standard atmosphere formula.
const BAROMETRIC_EXPONENT: f64 = 5.255;

/// Scale height term (m) of the same formula.
const BAROMETRIC_SCALE_HEIGHT: f64 = 44_330.0;

/// Uncorrected values as the sensor reports them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawMeasurement {
    pub temperature_c: f64,

    /// Relative humidity, %.
    pub humidity: f64,

    pub pressure_hpa: f64,
}

/// One corrected reading, ready for publishing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    /// In `unit`, offset applied.
    pub temperature: f64,
    pub unit: TemperatureUnit,
    pub humidity: f64,

    /// Station pressure, hPa.
    pub pressure: f64,

    /// Present only when an elevation is configured.
    pub sea_level_pressure: Option<f64>,
}

impl Reading {
    /// Applies unit conversion, offsets and the optional sea-level correction.
    pub fn from_raw(raw: RawMeasurement, config: &SensorConfig) -> Self {
        let unit = config.temperature_unit;
        let pressure = raw.pressure_hpa + config.pressure_offset;

        Reading {
            temperature: unit.from_celsius(raw.temperature_c) + config.temperature_offset,
            unit,
            humidity: raw.humidity + config.humidity_offset,
            pressure,
            sea_level_pressure: config
                .elevation
                .map(|elevation| sea_level_pressure(pressure, elevation)),
        }
    }

    /// Value of a single channel, if the reading carries it.
    pub fn value(&self, channel: Channel) -> Option<f64> {
        match channel {
            Channel::Temperature => Some(self.temperature),
            Channel::Humidity => Some(self.humidity),
            Channel::Pressure => Some(self.pressure),
            Channel::SeaLevel => self.sea_level_pressure,
        }
    }

    /// Channels present in this reading, in publishing order.
    pub fn channels(&self) -> impl Iterator<Item = (Channel, f64)> + '_ {
        Channel::ALL
            .iter()
            .filter_map(|&channel| self.value(channel).map(|value| (channel, value)))
    }
}

impl fmt::Display for Reading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "temperature: {:.1}{}, humidity: {:.1} %RH, pressure: {:.2} hPa",
            self.temperature,
            self.unit.symbol(),
            self.humidity,
            self.pressure
        )?;
        if let Some(sea_level) = self.sea_level_pressure {
            write!(f, ", sealevel: {:.2} hPa", sea_level)?;
        }
        Ok(())
    }
}

/// A published measurement channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Temperature,
    Humidity,
    Pressure,
    SeaLevel,
}

impl Channel {
    pub const ALL: [Channel; 4] = [
        Channel::Temperature,
        Channel::Humidity,
        Channel::Pressure,
        Channel::SeaLevel,
    ];

    /// Topic and key suffix, e.g. `BME280_sealevel`.
    pub fn key(&self) -> &'static str {
        match self {
            Channel::Temperature => "temperature",
            Channel::Humidity => "humidity",
            Channel::Pressure => "pressure",
            Channel::SeaLevel => "sealevel",
        }
    }

    /// Human readable entity name.
    pub fn label(&self) -> &'static str {
        match self {
            Channel::Temperature => "Temperature",
            Channel::Humidity => "Humidity",
            Channel::Pressure => "Pressure",
            Channel::SeaLevel => "Sealevel",
        }
    }

    /// Home Assistant device class.
    pub fn device_class(&self) -> &'static str {
        match self {
            Channel::Temperature => "temperature",
            Channel::Humidity => "humidity",
            Channel::Pressure | Channel::SeaLevel => "pressure",
        }
    }

    pub fn unit(&self, temperature_unit: TemperatureUnit) -> &'static str {
        match self {
            Channel::Temperature => temperature_unit.symbol(),
            Channel::Humidity => "%",
            Channel::Pressure | Channel::SeaLevel => "hPa",
        }
    }

    /// Decimal places used when publishing.
    pub fn precision(&self) -> usize {
        match self {
            Channel::Temperature | Channel::Humidity => 1,
            Channel::Pressure | Channel::SeaLevel => 2,
        }
    }

    /// Rounds `value` to this channel's precision.
    pub fn round(&self, value: f64) -> f64 {
        let factor = 10f64.powi(self.precision() as i32);
        (value * factor).round() / factor
    }

    /// Scalar text payload, e.g. `"1013.25"`.
    pub fn format(&self, value: f64) -> String {
        format!("{:.*}", self.precision(), value)
    }
}

/// Reduces station pressure (hPa) at `elevation` meters to sea level.
///
/// `P0 = P / (1 - h / 44330)^5.255`
pub fn sea_level_pressure(station_hpa: f64, elevation: f64) -> f64 {
    station_hpa / (1.0 - elevation / BAROMETRIC_SCALE_HEIGHT).powf(BAROMETRIC_EXPONENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw() -> RawMeasurement {
        RawMeasurement {
            temperature_c: 21.0,
            humidity: 45.0,
            pressure_hpa: 1000.0,
        }
    }

    #[test]
    fn test_sea_level_at_zero_elevation_is_station_pressure() {
        assert_eq!(sea_level_pressure(1013.25, 0.0), 1013.25);
    }

    #[test]
    fn test_sea_level_formula() {
        let expected = 950.0 / (1.0f64 - 500.0 / 44_330.0).powf(5.255);
        assert!((sea_level_pressure(950.0, 500.0) - expected).abs() < 1e-9);
        // Roughly 1 hPa per 8 m near the ground
        let p0 = sea_level_pressure(1000.0, 100.0);
        assert!((p0 - 1011.93).abs() < 0.05, "got {p0}");
    }

    #[test]
    fn test_offsets_are_added() {
        for offset in [-1.5, 0.0, 2.25] {
            let config = SensorConfig {
                temperature_offset: offset,
                humidity_offset: offset,
                pressure_offset: offset,
                ..Default::default()
            };
            let reading = Reading::from_raw(raw(), &config);
            assert_eq!(reading.temperature, 21.0 + offset);
            assert_eq!(reading.humidity, 45.0 + offset);
            assert_eq!(reading.pressure, 1000.0 + offset);
        }
    }

    #[test]
    fn test_fahrenheit_offset_applies_after_conversion() {
        let config = SensorConfig {
            temperature_unit: TemperatureUnit::Fahrenheit,
            temperature_offset: -1.0,
            ..Default::default()
        };
        let reading = Reading::from_raw(raw(), &config);
        assert!((reading.temperature - 68.8).abs() < 1e-9);
        assert_eq!(reading.unit, TemperatureUnit::Fahrenheit);
    }

    #[test]
    fn test_sea_level_present_iff_elevation() {
        let reading = Reading::from_raw(raw(), &SensorConfig::default());
        assert_eq!(reading.sea_level_pressure, None);
        assert_eq!(reading.channels().count(), 3);

        let config = SensorConfig {
            elevation: Some(100.0),
            pressure_offset: 1.0,
            ..Default::default()
        };
        let reading = Reading::from_raw(raw(), &config);
        assert_eq!(
            reading.sea_level_pressure,
            Some(sea_level_pressure(1001.0, 100.0))
        );
        assert_eq!(reading.channels().count(), 4);
    }

    #[test]
    fn test_channel_formatting() {
        assert_eq!(Channel::Temperature.format(21.456), "21.5");
        assert_eq!(Channel::Pressure.format(1013.254), "1013.25");
        assert_eq!(Channel::Humidity.round(45.06), 45.1);
        assert_eq!(Channel::SeaLevel.round(1013.256), 1013.26);
    }

    #[test]
    fn test_display() {
        let config = SensorConfig {
            elevation: Some(0.0),
            ..Default::default()
        };
        let text = Reading::from_raw(raw(), &config).to_string();
        assert_eq!(
            text,
            "temperature: 21.0°C, humidity: 45.0 %RH, pressure: 1000.00 hPa, sealevel: 1000.00 hPa"
        );
    }
}
