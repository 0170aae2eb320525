//! Device state store: the synchronised device-facing truth.
//!
//! Each field is one `AtomicU16`: the low byte carries the value and bit 15
//! the pending-change flag. Handlers write value and flag in a single store;
//! the reconciler takes both in a single `fetch_and`, so it can never see a
//! cleared flag next to a stale value.
//!
//! ```text
//!   bit 15        bits 8..14   bits 0..7
//!  ┌─────────┬─────────────┬──────────┐
//!  │ CHANGED │  (reserved) │  value   │
//!  └─────────┴─────────────┴──────────┘
//! ```

use core::sync::atomic::{AtomicU16, Ordering};

const CHANGED: u16 = 1 << 15;
const VALUE_MASK: u16 = 0x00FF;

/// Upper bound of the fan speed percentage.
pub const FAN_SPEED_MAX: u8 = 100;

/// Synchronised attribute slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Led,
    FanSpeed,
    Door,
}

impl Field {
    pub const ALL: [Field; 3] = [Field::Led, Field::FanSpeed, Field::Door];

    /// Client attribute key used when acknowledging this field.
    pub fn attribute_key(self) -> &'static str {
        match self {
            Field::Led => "ledState",
            Field::FanSpeed => "fanSpeed",
            Field::Door => "doorState",
        }
    }
}

/// A typed value for one field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldValue {
    Led(bool),
    /// Percentage, always within `0..=100`.
    FanSpeed(u8),
    Door(bool),
}

impl FieldValue {
    /// Fan speed from an untrusted integer; clamps to `0..=100`.
    pub fn fan_speed(raw: i64) -> Self {
        Self::FanSpeed(raw.clamp(0, FAN_SPEED_MAX as i64) as u8)
    }

    pub fn field(self) -> Field {
        match self {
            Self::Led(_) => Field::Led,
            Self::FanSpeed(_) => Field::FanSpeed,
            Self::Door(_) => Field::Door,
        }
    }

    fn encode(self) -> u16 {
        match self {
            Self::Led(on) | Self::Door(on) => u16::from(on),
            Self::FanSpeed(pct) => u16::from(pct.min(FAN_SPEED_MAX)),
        }
    }

    fn decode(field: Field, word: u16) -> Self {
        let raw = (word & VALUE_MASK) as u8;
        match field {
            Field::Led => Self::Led(raw != 0),
            Field::FanSpeed => Self::FanSpeed(raw),
            Field::Door => Self::Door(raw != 0),
        }
    }
}

/// Point-in-time copy of every field (flags excluded).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeviceState {
    pub led_on: bool,
    pub fan_speed_percent: u8,
    pub door_open: bool,
}

/// Lock-free per-field state cells.
pub struct DeviceStateStore {
    led: AtomicU16,
    fan: AtomicU16,
    door: AtomicU16,
}

impl DeviceStateStore {
    /// All fields off/closed/0, nothing pending.
    pub const fn new() -> Self {
        Self {
            led: AtomicU16::new(0),
            fan: AtomicU16::new(0),
            door: AtomicU16::new(0),
        }
    }

    fn cell(&self, field: Field) -> &AtomicU16 {
        match field {
            Field::Led => &self.led,
            Field::FanSpeed => &self.fan,
            Field::Door => &self.door,
        }
    }

    /// Write a desired value and mark it pending. Repeated writes of the
    /// same value leave exactly one pending change.
    pub fn set_desired(&self, value: FieldValue) {
        self.cell(value.field())
            .store(value.encode() | CHANGED, Ordering::Release);
    }

    /// Take every pending change, clearing each flag atomically with the
    /// read of its value.
    pub fn drain_changes(&self) -> heapless::Vec<FieldValue, 3> {
        let mut out = heapless::Vec::new();
        for field in Field::ALL {
            let prev = self.cell(field).fetch_and(!CHANGED, Ordering::AcqRel);
            if prev & CHANGED != 0 {
                // Capacity equals Field::ALL.len().
                let _ = out.push(FieldValue::decode(field, prev));
            }
        }
        out
    }

    /// Re-arm a drained change that could not be applied. Only takes effect
    /// while the cell still holds that value with no newer write pending.
    pub fn retry(&self, change: FieldValue) -> bool {
        let idle = change.encode();
        self.cell(change.field())
            .compare_exchange(idle, idle | CHANGED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn get(&self, field: Field) -> FieldValue {
        FieldValue::decode(field, self.cell(field).load(Ordering::Acquire))
    }

    pub fn is_pending(&self, field: Field) -> bool {
        self.cell(field).load(Ordering::Acquire) & CHANGED != 0
    }

    pub fn snapshot(&self) -> DeviceState {
        let led_on = matches!(self.get(Field::Led), FieldValue::Led(true));
        let door_open = matches!(self.get(Field::Door), FieldValue::Door(true));
        let fan_speed_percent = match self.get(Field::FanSpeed) {
            FieldValue::FanSpeed(pct) => pct,
            _ => 0,
        };
        DeviceState {
            led_on,
            fan_speed_percent,
            door_open,
        }
    }
}

impl Default for DeviceStateStore {
    fn default() -> Self {
        Self::new()
    }
}
