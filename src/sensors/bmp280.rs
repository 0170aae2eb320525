//! Bosch BMP280 barometric pressure sensor (I²C, address 0x76).
//!
//! Runs in normal mode (temperature ×2, pressure ×16 oversampling, IIR
//! filter ×16, 500 ms standby). Factory trimming words are read once at
//! [`Bmp280::init`]; readings use the datasheet floating-point
//! compensation. Altitude follows the international barometric formula
//! against standard sea-level pressure.

use embedded_hal::i2c::I2c;

use crate::error::SensorError;

pub const DEFAULT_ADDRESS: u8 = 0x76;
pub const CHIP_ID: u8 = 0x58;
pub const SEA_LEVEL_PA: f32 = 101_325.0;

const REG_CALIBRATION: u8 = 0x88;
const REG_CHIP_ID: u8 = 0xD0;
const REG_CTRL_MEAS: u8 = 0xF4;
const REG_CONFIG: u8 = 0xF5;
const REG_DATA: u8 = 0xF7;

/// osrs_t ×2, osrs_p ×16, normal mode.
const CTRL_MEAS: u8 = (0b010 << 5) | (0b101 << 2) | 0b11;
/// t_sb 500 ms, filter ×16.
const CONFIG: u8 = (0b100 << 5) | (0b100 << 2);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Calibration {
    pub t1: u16,
    pub t2: i16,
    pub t3: i16,
    pub p1: u16,
    pub p2: i16,
    pub p3: i16,
    pub p4: i16,
    pub p5: i16,
    pub p6: i16,
    pub p7: i16,
    pub p8: i16,
    pub p9: i16,
}

impl Calibration {
    /// Parse the 24 little-endian trimming bytes starting at 0x88.
    pub fn from_bytes(b: &[u8; 24]) -> Self {
        let u = |i: usize| u16::from_le_bytes([b[i], b[i + 1]]);
        let s = |i: usize| i16::from_le_bytes([b[i], b[i + 1]]);
        Self {
            t1: u(0),
            t2: s(2),
            t3: s(4),
            p1: u(6),
            p2: s(8),
            p3: s(10),
            p4: s(12),
            p5: s(14),
            p6: s(16),
            p7: s(18),
            p8: s(20),
            p9: s(22),
        }
    }

    /// Returns `(t_fine, °C)`.
    pub fn compensate_temperature(&self, adc_t: i32) -> (f64, f64) {
        let adc_t = f64::from(adc_t);
        let t1 = f64::from(self.t1);
        let var1 = (adc_t / 16_384.0 - t1 / 1_024.0) * f64::from(self.t2);
        let d = adc_t / 131_072.0 - t1 / 8_192.0;
        let var2 = d * d * f64::from(self.t3);
        let t_fine = var1 + var2;
        (t_fine, t_fine / 5_120.0)
    }

    /// Pressure in Pa; `None` when the trimming words would divide by zero.
    pub fn compensate_pressure(&self, adc_p: i32, t_fine: f64) -> Option<f64> {
        let mut var1 = t_fine / 2.0 - 64_000.0;
        let mut var2 = var1 * var1 * f64::from(self.p6) / 32_768.0;
        var2 += var1 * f64::from(self.p5) * 2.0;
        var2 = var2 / 4.0 + f64::from(self.p4) * 65_536.0;
        var1 = (f64::from(self.p3) * var1 * var1 / 524_288.0 + f64::from(self.p2) * var1)
            / 524_288.0;
        var1 = (1.0 + var1 / 32_768.0) * f64::from(self.p1);
        if var1 == 0.0 {
            return None;
        }
        let mut p = 1_048_576.0 - f64::from(adc_p);
        p = (p - var2 / 4_096.0) * 6_250.0 / var1;
        let var1 = f64::from(self.p9) * p * p / 2_147_483_648.0;
        let var2 = p * f64::from(self.p8) / 32_768.0;
        Some(p + (var1 + var2 + f64::from(self.p7)) / 16.0)
    }
}

/// Altitude in metres for a pressure reading.
pub fn altitude_m(pressure_pa: f32, sea_level_pa: f32) -> f32 {
    44_330.0 * (1.0 - (pressure_pa / sea_level_pa).powf(1.0 / 5.255))
}

fn raw20(msb: u8, lsb: u8, xlsb: u8) -> i32 {
    (i32::from(msb) << 12) | (i32::from(lsb) << 4) | (i32::from(xlsb) >> 4)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    pub pressure_pa: f32,
    pub altitude_m: f32,
    pub temperature_c: f32,
}

pub struct Bmp280 {
    address: u8,
    calibration: Option<Calibration>,
}

impl Bmp280 {
    pub fn new(address: u8) -> Self {
        Self {
            address,
            calibration: None,
        }
    }

    pub fn is_initialised(&self) -> bool {
        self.calibration.is_some()
    }

    /// Check the chip id, load trimming words and start normal mode.
    pub fn init<I: I2c>(&mut self, i2c: &mut I) -> Result<(), SensorError> {
        let bus = |_| SensorError::BusError;
        let mut id = [0u8; 1];
        i2c.write_read(self.address, &[REG_CHIP_ID], &mut id).map_err(bus)?;
        if id[0] != CHIP_ID {
            return Err(SensorError::BusError);
        }
        let mut trim = [0u8; 24];
        i2c.write_read(self.address, &[REG_CALIBRATION], &mut trim).map_err(bus)?;
        i2c.write(self.address, &[REG_CONFIG, CONFIG]).map_err(bus)?;
        i2c.write(self.address, &[REG_CTRL_MEAS, CTRL_MEAS]).map_err(bus)?;
        self.calibration = Some(Calibration::from_bytes(&trim));
        Ok(())
    }

    pub fn read<I: I2c>(&mut self, i2c: &mut I) -> Result<Reading, SensorError> {
        if self.calibration.is_none() {
            self.init(i2c)?;
        }
        let cal = self.calibration.ok_or(SensorError::BusError)?;
        let mut data = [0u8; 6];
        i2c.write_read(self.address, &[REG_DATA], &mut data)
            .map_err(|_| SensorError::BusError)?;
        let adc_p = raw20(data[0], data[1], data[2]);
        let adc_t = raw20(data[3], data[4], data[5]);

        let (t_fine, temperature_c) = cal.compensate_temperature(adc_t);
        let pressure_pa = cal
            .compensate_pressure(adc_p, t_fine)
            .ok_or(SensorError::BusError)? as f32;
        Ok(Reading {
            pressure_pa,
            altitude_m: altitude_m(pressure_pa, SEA_LEVEL_PA),
            temperature_c: temperature_c as f32,
        })
    }
}

impl Default for Bmp280 {
    fn default() -> Self {
        Self::new(DEFAULT_ADDRESS)
    }
}
