//! Sensor subsystem: individual drivers and the aggregating [`SensorHub`].
//!
//! The hub owns the shared I²C bus (SHT4x + BMP280 on the ENV unit) and
//! the analog light sensor, and produces one [`SensorReadings`] sample per
//! telemetry tick.

pub mod bmp280;
pub mod light;
pub mod sht4x;

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;
use log::warn;

use crate::app::ports::{SensorPort, SensorReadings};
use crate::config::Capabilities;
use bmp280::Bmp280;
use light::LightSensor;
use sht4x::Sht4x;

/// Aggregates all sensor drivers and produces a unified sample.
pub struct SensorHub<I, D> {
    i2c: I,
    delay: D,
    sht4x: Option<Sht4x>,
    bmp280: Option<Bmp280>,
    light: Option<LightSensor>,
}

impl<I: I2c, D: DelayNs> SensorHub<I, D> {
    /// Build the drivers for the fitted sensors. A BMP280 that fails to
    /// initialise is retried on the next read.
    pub fn new(mut i2c: I, delay: D, caps: &Capabilities) -> Self {
        let bmp280 = caps.environment_sensor.then(|| {
            let mut bmp = Bmp280::default();
            if let Err(e) = bmp.init(&mut i2c) {
                warn!("sensors: BMP280 init failed: {}", e);
            }
            bmp
        });
        Self {
            i2c,
            delay,
            sht4x: caps.environment_sensor.then(Sht4x::default),
            bmp280,
            light: caps.light_sensor.then(LightSensor::default),
        }
    }
}

impl<I: I2c, D: DelayNs> SensorPort for SensorHub<I, D> {
    /// Individual read failures are logged and reported as `None`; a
    /// single flaky sensor never suppresses the others.
    fn read_all(&mut self) -> SensorReadings {
        let mut r = SensorReadings::default();

        if let Some(sht) = &self.sht4x {
            match sht.measure(&mut self.i2c, &mut self.delay) {
                Ok(m) => {
                    r.temperature_c = Some(m.temperature_c);
                    r.humidity_pct = Some(m.humidity_pct);
                }
                Err(e) => warn!("sensors: SHT4x read failed: {}", e),
            }
        }

        if let Some(bmp) = &mut self.bmp280 {
            match bmp.read(&mut self.i2c) {
                Ok(b) => {
                    r.pressure_pa = Some(b.pressure_pa);
                    r.altitude_m = Some(b.altitude_m);
                }
                Err(e) => warn!("sensors: BMP280 read failed: {}", e),
            }
        }

        if let Some(light) = &self.light {
            match light.read_percent() {
                Ok(pct) => r.light_pct = Some(pct),
                Err(e) => warn!("sensors: light read failed: {}", e),
            }
        }

        r
    }
}
