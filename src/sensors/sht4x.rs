//! Sensirion SHT4x temperature / humidity sensor (I²C, address 0x44).
//!
//! One high-precision measurement: command 0xFD, ~10 ms conversion, then
//! six bytes `T_msb T_lsb CRC RH_msb RH_lsb CRC`. Each word is protected
//! by a CRC-8 (poly 0x31, init 0xFF).
//!
//! The driver borrows the bus per call so several devices can share it.

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;

use crate::error::SensorError;

pub const DEFAULT_ADDRESS: u8 = 0x44;

const CMD_MEASURE_HIGH_PRECISION: u8 = 0xFD;
const MEASURE_DELAY_MS: u32 = 10;

pub fn crc8(data: &[u8]) -> u8 {
    let mut crc: u8 = 0xFF;
    for &byte in data {
        crc ^= byte;
        for _ in 0..8 {
            crc = if crc & 0x80 != 0 {
                (crc << 1) ^ 0x31
            } else {
                crc << 1
            };
        }
    }
    crc
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Measurement {
    pub temperature_c: f32,
    pub humidity_pct: f32,
}

/// Convert a raw frame to physical units after checking both CRCs.
pub fn decode(frame: &[u8; 6]) -> Result<Measurement, SensorError> {
    if crc8(&frame[0..2]) != frame[2] || crc8(&frame[3..5]) != frame[5] {
        return Err(SensorError::CrcMismatch);
    }
    let t_raw = f32::from(u16::from_be_bytes([frame[0], frame[1]]));
    let rh_raw = f32::from(u16::from_be_bytes([frame[3], frame[4]]));
    Ok(Measurement {
        temperature_c: -45.0 + 175.0 * t_raw / 65535.0,
        humidity_pct: (-6.0 + 125.0 * rh_raw / 65535.0).clamp(0.0, 100.0),
    })
}

pub struct Sht4x {
    address: u8,
}

impl Sht4x {
    pub fn new(address: u8) -> Self {
        Self { address }
    }

    pub fn measure<I: I2c, D: DelayNs>(
        &self,
        i2c: &mut I,
        delay: &mut D,
    ) -> Result<Measurement, SensorError> {
        i2c.write(self.address, &[CMD_MEASURE_HIGH_PRECISION])
            .map_err(|_| SensorError::BusError)?;
        delay.delay_ms(MEASURE_DELAY_MS);
        let mut frame = [0u8; 6];
        i2c.read(self.address, &mut frame)
            .map_err(|_| SensorError::BusError)?;
        decode(&frame)
    }
}

impl Default for Sht4x {
    fn default() -> Self {
        Self::new(DEFAULT_ADDRESS)
    }
}
