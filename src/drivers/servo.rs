//! Door servo driver.
//!
//! Hobby servo on LEDC channel 1 at 50 Hz with 14-bit resolution. The
//! angle maps linearly onto a 500–2500 µs pulse; the door is closed at
//! 0° and open at 180°.

use log::warn;

use crate::drivers::hw_init;
use crate::error::ActuatorError;
use crate::pins;

pub const MIN_PULSE_US: u32 = 500;
pub const MAX_PULSE_US: u32 = 2_500;
pub const MAX_ANGLE: u8 = 180;

pub const DOOR_CLOSED_ANGLE: u8 = 0;
pub const DOOR_OPEN_ANGLE: u8 = 180;

const PERIOD_US: u32 = 1_000_000 / pins::SERVO_PWM_FREQ_HZ;

pub fn pulse_us_for_angle(angle: u8) -> u32 {
    let angle = u32::from(angle.min(MAX_ANGLE));
    MIN_PULSE_US + angle * (MAX_PULSE_US - MIN_PULSE_US) / u32::from(MAX_ANGLE)
}

/// LEDC duty for a pulse width at the configured resolution.
pub fn duty_for_pulse(pulse_us: u32) -> u32 {
    let full_scale = 1u32 << pins::SERVO_PWM_RESOLUTION_BITS;
    pulse_us.min(PERIOD_US) * full_scale / PERIOD_US
}

pub struct DoorServo {
    angle: Option<u8>,
}

impl DoorServo {
    pub fn new() -> Self {
        Self { angle: None }
    }

    pub fn set_angle(&mut self, angle: u8) -> Result<(), ActuatorError> {
        let angle = angle.min(MAX_ANGLE);
        let duty = duty_for_pulse(pulse_us_for_angle(angle));
        hw_init::ledc_set(hw_init::LEDC_CH_SERVO, duty).map_err(|rc| {
            warn!("servo: duty write failed (rc={})", rc);
            ActuatorError::PwmWriteFailed
        })?;
        self.angle = Some(angle);
        Ok(())
    }

    pub fn set_open(&mut self, open: bool) -> Result<(), ActuatorError> {
        self.set_angle(if open { DOOR_OPEN_ANGLE } else { DOOR_CLOSED_ANGLE })
    }

    /// Last commanded angle; `None` before the first command.
    pub fn angle(&self) -> Option<u8> {
        self.angle
    }
}

impl Default for DoorServo {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pulse_range() {
        assert_eq!(pulse_us_for_angle(0), 500);
        assert_eq!(pulse_us_for_angle(90), 1_500);
        assert_eq!(pulse_us_for_angle(180), 2_500);
        assert_eq!(pulse_us_for_angle(255), 2_500);
    }

    #[test]
    fn duty_at_14_bits() {
        // 20 ms period, 16384 steps.
        assert_eq!(duty_for_pulse(500), 409);
        assert_eq!(duty_for_pulse(2_500), 2_048);
        assert_eq!(duty_for_pulse(50_000), 16_384);
    }

    #[test]
    fn door_positions() {
        let mut door = DoorServo::new();
        assert_eq!(door.angle(), None);
        door.set_open(true).unwrap();
        assert_eq!(door.angle(), Some(DOOR_OPEN_ANGLE));
        door.set_open(false).unwrap();
        assert_eq!(door.angle(), Some(DOOR_CLOSED_ANGLE));
    }
}
