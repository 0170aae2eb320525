//! GPIO / peripheral pin assignments for the YOLO UNO (ESP32-S3) node board.
//!
//! Single source of truth: every driver references this module rather than
//! hard-coding pin numbers.  Change a pin here and it propagates everywhere.

// ---------------------------------------------------------------------------
// I²C bus (Unit ENV IV: SHT40 + BMP280)
// ---------------------------------------------------------------------------

pub const I2C_SDA_GPIO: i32 = 11;
pub const I2C_SCL_GPIO: i32 = 12;
/// Standard-mode bus clock.
pub const I2C_FREQ_HZ: u32 = 100_000;

// ---------------------------------------------------------------------------
// Actuators
// ---------------------------------------------------------------------------

/// WS2812 data line for the 4-pixel LED array (RMT channel 0).
pub const LED_ARRAY_GPIO: i32 = 4;
/// Number of pixels on the LED array.
pub const LED_ARRAY_LEN: usize = 4;

/// Mini fan, low-side MOSFET driven by LEDC PWM.
pub const FAN_PWM_GPIO: i32 = 3;

/// Door servo signal (LEDC PWM at 50 Hz).
pub const SERVO_PWM_GPIO: i32 = 2;

// ---------------------------------------------------------------------------
// Sensors: Analog (ADC1)
// ---------------------------------------------------------------------------

/// Light-dependent resistor divider. ADC1 channel 0 (GPIO 1 on ESP32-S3).
pub const LIGHT_ADC_GPIO: i32 = 1;

// ---------------------------------------------------------------------------
// PWM configuration
// ---------------------------------------------------------------------------

/// LEDC base frequency for the fan (25 kHz, above audible range).
pub const FAN_PWM_FREQ_HZ: u32 = 25_000;
/// Servo frame rate.
pub const SERVO_PWM_FREQ_HZ: u32 = 50;
/// Servo timer resolution (bits). 14-bit gives ~1.2 µs steps at 50 Hz.
pub const SERVO_PWM_RESOLUTION_BITS: u32 = 14;
