//! WS2812 LED array driver.
//!
//! Four pixels on one data line, driven by an RMT channel. The array is
//! either fully lit in the ambient colour or dark.
//!
//! ## Dual-target design
//!
//! On ESP-IDF: encodes each frame as an RMT pulse train and transmits it.
//! On host/test: tracks the last frame in-memory only.

use crate::error::ActuatorError;
use crate::pins::LED_ARRAY_LEN;

#[cfg(target_os = "espidf")]
use esp_idf_hal::rmt::{FixedLengthSignal, PinState, Pulse, TxRmtDriver};
#[cfg(target_os = "espidf")]
use log::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

pub const ON_COLOUR: Rgb = Rgb::new(255, 102, 0);
pub const OFF: Rgb = Rgb::new(0, 0, 0);

pub type Frame = [Rgb; LED_ARRAY_LEN];

pub fn frame(on: bool) -> Frame {
    [if on { ON_COLOUR } else { OFF }; LED_ARRAY_LEN]
}

/// 24-bit word in wire order (green, red, blue), MSB first.
pub fn grb_word(c: Rgb) -> u32 {
    (u32::from(c.g) << 16) | (u32::from(c.r) << 8) | u32::from(c.b)
}

const BITS_PER_PIXEL: usize = 24;

#[cfg(target_os = "espidf")]
const SIGNAL_LEN: usize = BITS_PER_PIXEL * LED_ARRAY_LEN;

/// Bits of a frame in transmission order.
pub fn frame_bits(frame: &Frame) -> impl Iterator<Item = bool> + '_ {
    frame.iter().flat_map(|&c| {
        let word = grb_word(c);
        (0..BITS_PER_PIXEL).rev().map(move |i| word & (1 << i) != 0)
    })
}

pub struct LedArray {
    current: Frame,
    #[cfg(target_os = "espidf")]
    tx: TxRmtDriver<'static>,
}

impl LedArray {
    #[cfg(target_os = "espidf")]
    pub fn new(tx: TxRmtDriver<'static>) -> Self {
        Self { current: frame(false), tx }
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn new() -> Self {
        Self { current: frame(false) }
    }

    pub fn set_on(&mut self, on: bool) -> Result<(), ActuatorError> {
        let next = frame(on);
        self.transmit(&next)?;
        self.current = next;
        Ok(())
    }

    pub fn current(&self) -> &Frame {
        &self.current
    }

    pub fn is_on(&self) -> bool {
        self.current.iter().any(|&c| c != OFF)
    }

    #[cfg(target_os = "espidf")]
    fn transmit(&mut self, frame: &Frame) -> Result<(), ActuatorError> {
        use core::time::Duration;

        let encode = || -> Result<FixedLengthSignal<SIGNAL_LEN>, esp_idf_svc::sys::EspError> {
            let ticks_hz = self.tx.counter_clock()?;
            let t0h = Pulse::new_with_duration(ticks_hz, PinState::High, &Duration::from_nanos(350))?;
            let t0l = Pulse::new_with_duration(ticks_hz, PinState::Low, &Duration::from_nanos(800))?;
            let t1h = Pulse::new_with_duration(ticks_hz, PinState::High, &Duration::from_nanos(700))?;
            let t1l = Pulse::new_with_duration(ticks_hz, PinState::Low, &Duration::from_nanos(600))?;
            let mut signal = FixedLengthSignal::<SIGNAL_LEN>::new();
            for (i, bit) in frame_bits(frame).enumerate() {
                let pair = if bit { (t1h, t1l) } else { (t0h, t0l) };
                signal.set(i, &pair)?;
            }
            Ok(signal)
        };
        let signal = encode().map_err(|e| {
            warn!("led: frame encode failed: {}", e);
            ActuatorError::PixelWriteFailed
        })?;
        self.tx.start_blocking(&signal).map_err(|e| {
            warn!("led: RMT transmit failed: {}", e);
            ActuatorError::PixelWriteFailed
        })
    }

    #[cfg(not(target_os = "espidf"))]
    fn transmit(&mut self, _frame: &Frame) -> Result<(), ActuatorError> {
        Ok(())
    }
}

#[cfg(not(target_os = "espidf"))]
impl Default for LedArray {
    fn default() -> Self {
        Self::new()
    }
}
