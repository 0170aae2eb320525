//! Actuator drivers, hardware initialisation, and task helpers.

pub mod fan;
pub mod hw_init;
pub mod led_array;
pub mod servo;
pub mod task_pin;
