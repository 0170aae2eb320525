//! Mini fan driver.
//!
//! Speed is a percentage mapped linearly onto the 8-bit LEDC duty of
//! channel 0. 0 % stops the fan.
//!
//! ## Dual-target design
//!
//! On ESP-IDF: drives real PWM via hw_init helpers.
//! On host/test: tracks state in-memory only.

use log::warn;

use crate::drivers::hw_init;
use crate::error::ActuatorError;

/// 8-bit duty for a speed percentage (clamped to 100).
pub fn duty_for_percent(percent: u8) -> u32 {
    u32::from(percent.min(100)) * 255 / 100
}

pub struct FanDriver {
    percent: u8,
}

impl FanDriver {
    pub fn new() -> Self {
        Self { percent: 0 }
    }

    pub fn set_speed(&mut self, percent: u8) -> Result<(), ActuatorError> {
        let percent = percent.min(100);
        hw_init::ledc_set(hw_init::LEDC_CH_FAN, duty_for_percent(percent)).map_err(|rc| {
            warn!("fan: duty write failed (rc={})", rc);
            ActuatorError::PwmWriteFailed
        })?;
        self.percent = percent;
        Ok(())
    }

    pub fn speed(&self) -> u8 {
        self.percent
    }

    pub fn is_running(&self) -> bool {
        self.percent > 0
    }
}

impl Default for FanDriver {
    fn default() -> Self {
        Self::new()
    }
}
