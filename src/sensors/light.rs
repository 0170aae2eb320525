//! Analog light sensor (LDR divider on ADC1).
//!
//! Reported as a relative level: the 12-bit reading scaled to 0–100 %.
//!
//! ## Dual-target design
//!
//! On ESP-IDF: reads ADC1_CH0 via the oneshot API (initialised by hw_init).
//! On host/test: reads from a static AtomicU16 for injection.

#[cfg(not(target_os = "espidf"))]
use core::sync::atomic::{AtomicU16, Ordering};

use crate::drivers::hw_init;
use crate::error::SensorError;

const ADC_MAX: f32 = 4095.0;

#[cfg(not(target_os = "espidf"))]
static SIM_LIGHT_ADC: AtomicU16 = AtomicU16::new(2048);

#[cfg(not(target_os = "espidf"))]
pub fn sim_set_light_adc(raw: u16) {
    SIM_LIGHT_ADC.store(raw, Ordering::Relaxed);
}

pub fn percent_for_raw(raw: u16) -> f32 {
    (f32::from(raw) / ADC_MAX * 100.0).clamp(0.0, 100.0)
}

pub struct LightSensor {
    channel: u32,
}

impl LightSensor {
    pub fn new(channel: u32) -> Self {
        Self { channel }
    }

    pub fn read_percent(&self) -> Result<f32, SensorError> {
        self.read_adc().map(percent_for_raw)
    }

    #[cfg(target_os = "espidf")]
    fn read_adc(&self) -> Result<u16, SensorError> {
        hw_init::adc1_read(self.channel).map_err(|_| SensorError::AdcReadFailed)
    }

    #[cfg(not(target_os = "espidf"))]
    fn read_adc(&self) -> Result<u16, SensorError> {
        hw_init::adc1_read(self.channel).map_err(|_| SensorError::AdcReadFailed)?;
        Ok(SIM_LIGHT_ADC.load(Ordering::Relaxed))
    }
}

impl Default for LightSensor {
    fn default() -> Self {
        Self::new(hw_init::ADC1_CH_LIGHT)
    }
}
