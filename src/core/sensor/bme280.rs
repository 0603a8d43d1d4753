//! BME280 over Linux I2C.
//!
//! The `bme280` driver is blocking, so every bus transaction runs on tokio's
//! blocking pool. The device sits behind a `std::sync::Mutex`; only one
//! measurement is ever in flight.

use std::sync::{Arc, Mutex};

use bme280::i2c::BME280;
use linux_embedded_hal::{Delay, I2cdev};
use tracing::{debug, info};

use super::{error::SensorError, traits::SensorSource, types::SensorResult};
use crate::{config::sensor::SensorConfig, core::reading::RawMeasurement};

struct Device {
    sensor: BME280<I2cdev>,
    delay: Delay,
}

impl Device {
    fn init(&mut self, location: &str) -> SensorResult<()> {
        self.sensor
            .init(&mut self.delay)
            .map_err(|e| SensorError::NotResponding {
                location: location.to_string(),
                reason: format!("{:?}", e),
            })
    }

    fn measure(&mut self) -> SensorResult<RawMeasurement> {
        let m = self
            .sensor
            .measure(&mut self.delay)
            .map_err(|e| SensorError::Measurement(format!("{:?}", e)))?;

        Ok(RawMeasurement {
            temperature_c: f64::from(m.temperature),
            humidity: f64::from(m.humidity),
            // Pa -> hPa
            pressure_hpa: f64::from(m.pressure) / 100.0,
        })
    }
}

/// A BME280 attached to a Linux I2C bus.
pub struct Bme280Source {
    device: Arc<Mutex<Device>>,
    location: String,
}

impl Bme280Source {
    /// Opens the bus, initialises the chip and discards one warm-up measurement.
    ///
    /// # Errors
    ///
    /// `SensorError::BusOpen` if the device node cannot be opened,
    /// `SensorError::NotResponding` if the chip does not initialise.
    pub async fn open(config: &SensorConfig) -> SensorResult<Self> {
        let bus = config.bus.clone();
        let address = config.address;
        let location = format!("{}@0x{:02x}", bus, address);

        let device = tokio::task::spawn_blocking({
            let location = location.clone();
            move || -> SensorResult<Device> {
                let i2c = I2cdev::new(&bus).map_err(|e| SensorError::BusOpen {
                    path: bus.clone(),
                    reason: e.to_string(),
                })?;

                let mut device = Device {
                    sensor: BME280::new(i2c, address),
                    delay: Delay,
                };
                device.init(&location)?;

                // First conversion after power-up is unreliable
                let warm_up = device.measure()?;
                debug!("Discarded warm-up measurement: {:?}", warm_up);

                Ok(device)
            }
        })
        .await??;

        info!("BME280 initialised on {}", location);

        Ok(Self {
            device: Arc::new(Mutex::new(device)),
            location,
        })
    }

    async fn with_device<T, F>(&self, op: F) -> SensorResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Device, &str) -> SensorResult<T> + Send + 'static,
    {
        let device = self.device.clone();
        let location = self.location.clone();

        tokio::task::spawn_blocking(move || {
            let mut guard = device
                .lock()
                .map_err(|_| SensorError::Measurement("sensor lock poisoned".to_string()))?;
            op(&mut *guard, &location)
        })
        .await?
    }
}

#[async_trait::async_trait]
impl SensorSource for Bme280Source {
    async fn read_raw(&self) -> SensorResult<RawMeasurement> {
        self.with_device(|device, _| device.measure()).await
    }

    async fn reset(&self) -> SensorResult<()> {
        self.with_device(|device, location| device.init(location))
            .await
    }

    fn describe(&self) -> String {
        self.location.clone()
    }
}
