//! Hardware adapter: bridges the actuator drivers to [`ActuatorPort`].
//!
//! Owns the LED array, fan and door servo. A capability that is not
//! fitted reports [`ActuatorError::NotFitted`] so the reconciler skips
//! its acknowledgment. On non-espidf targets the drivers use cfg-gated
//! simulation stubs.

use crate::app::ports::ActuatorPort;
use crate::config::Capabilities;
use crate::drivers::fan::FanDriver;
use crate::drivers::led_array::LedArray;
use crate::drivers::servo::DoorServo;
use crate::error::ActuatorError;

pub struct HardwareAdapter {
    caps: Capabilities,
    leds: LedArray,
    fan: FanDriver,
    door: DoorServo,
}

impl HardwareAdapter {
    pub fn new(caps: Capabilities, leds: LedArray, fan: FanDriver, door: DoorServo) -> Self {
        Self {
            caps,
            leds,
            fan,
            door,
        }
    }

    /// Drive every fitted actuator to its power-on state.
    pub fn all_off(&mut self) -> Result<(), ActuatorError> {
        if self.caps.led {
            self.leds.set_on(false)?;
        }
        if self.caps.fan {
            self.fan.set_speed(0)?;
        }
        if self.caps.door {
            self.door.set_open(false)?;
        }
        Ok(())
    }

    pub fn leds(&self) -> &LedArray {
        &self.leds
    }

    pub fn fan(&self) -> &FanDriver {
        &self.fan
    }

    pub fn door(&self) -> &DoorServo {
        &self.door
    }
}

impl ActuatorPort for HardwareAdapter {
    fn set_led(&mut self, on: bool) -> Result<(), ActuatorError> {
        if !self.caps.led {
            return Err(ActuatorError::NotFitted);
        }
        self.leds.set_on(on)
    }

    fn set_fan_speed(&mut self, percent: u8) -> Result<(), ActuatorError> {
        if !self.caps.fan {
            return Err(ActuatorError::NotFitted);
        }
        self.fan.set_speed(percent)
    }

    fn set_door(&mut self, open: bool) -> Result<(), ActuatorError> {
        if !self.caps.door {
            return Err(ActuatorError::NotFitted);
        }
        self.door.set_open(open)
    }
}
