//! Port traits: the hexagonal boundary between the sync engine and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ sync engine (domain)
//! ```
//!
//! Driven adapters (broker client, sensors, actuators, flash writer, NVS)
//! implement these traits. The engine consumes them via generics or trait
//! objects, so the domain core never touches hardware or sockets directly
//! and every collaborator can be replaced by a recording mock in tests.

use core::fmt;

use crate::config::{BrokerConfig, NodeConfig};
use crate::error::{ActuatorError, TransportError};
use crate::sync::ota::{OtaError, OtaStage};

use super::commands::Inbound;
use super::events::Outbound;

// ───────────────────────────────────────────────────────────────
// Cloud transport (driven adapter: domain ↔ broker)
// ───────────────────────────────────────────────────────────────

/// Inbound message families the session subscribes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subscription {
    Rpc,
    SharedAttributes,
    AttributeResponses,
    FirmwareChunks,
}

/// Single-owner broker session.
///
/// Only the connection supervisor and the session loop call this; every
/// other component enqueues [`Outbound`] intents instead.
pub trait CloudTransport {
    /// Establish the session. Must not block longer than the client's own
    /// connect timeout.
    fn connect(&mut self, broker: &BrokerConfig) -> Result<(), TransportError>;

    fn is_connected(&self) -> bool;

    fn subscribe(&mut self, subscription: Subscription) -> Result<(), TransportError>;

    /// Hand one intent to the client. Non-blocking.
    fn send(&mut self, message: &Outbound) -> Result<(), TransportError>;

    /// Next decoded inbound message, if any. Non-blocking.
    fn poll(&mut self) -> Option<Inbound>;
}

// ───────────────────────────────────────────────────────────────
// Sensor port (driven adapter: hardware → domain)
// ───────────────────────────────────────────────────────────────

/// One telemetry sample. `None` means "not fitted or read failed".
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SensorReadings {
    pub temperature_c: Option<f32>,
    pub humidity_pct: Option<f32>,
    /// Barometric pressure, Pa.
    pub pressure_pa: Option<f32>,
    pub altitude_m: Option<f32>,
    /// Relative light level, 0–100 %.
    pub light_pct: Option<f32>,
}

pub trait SensorPort {
    fn read_all(&mut self) -> SensorReadings;
}

// ───────────────────────────────────────────────────────────────
// Actuator port (driven adapter: domain → hardware)
// ───────────────────────────────────────────────────────────────

pub trait ActuatorPort {
    /// Switch the LED array fully on or off.
    fn set_led(&mut self, on: bool) -> Result<(), ActuatorError>;

    /// Fan duty as a percentage (0–100).
    fn set_fan_speed(&mut self, percent: u8) -> Result<(), ActuatorError>;

    /// Drive the door servo open or closed.
    fn set_door(&mut self, open: bool) -> Result<(), ActuatorError>;
}

// ───────────────────────────────────────────────────────────────
// Link information (driven adapter: Wi-Fi → domain)
// ───────────────────────────────────────────────────────────────

/// Static network descriptors published once per session.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LinkInfo {
    pub local_ip: String,
    pub ssid: String,
    pub bssid: String,
    pub mac_address: String,
    pub channel: u8,
}

pub trait LinkInfoPort {
    fn link_info(&self) -> Option<LinkInfo>;

    /// Received signal strength of the current association, dBm.
    fn rssi(&self) -> Option<i8>;
}

// ───────────────────────────────────────────────────────────────
// Firmware writer & OTA observer (driven adapters: OTA → flash / device)
// ───────────────────────────────────────────────────────────────

/// Flash-write side of an OTA session. The controller owns ordering and
/// retries; the writer only stores bytes and validates the finished image.
pub trait FirmwareWriter {
    /// Prepare an inactive partition for `size` bytes.
    fn begin(&mut self, size: u32) -> Result<(), OtaError>;

    fn write(&mut self, data: &[u8]) -> Result<(), OtaError>;

    /// Validate the complete image.
    fn finalize(&mut self) -> Result<(), OtaError>;

    /// Make the validated image the next boot target.
    fn apply(&mut self) -> Result<(), OtaError>;

    /// Discard a partially written image.
    fn abort(&mut self);
}

/// Lifecycle notifications of an OTA session.
pub trait OtaObserver {
    /// Called on every increase of the received-chunk count.
    fn on_progress(&mut self, received: u32, total: u32);

    fn on_failure(&mut self, stage: OtaStage, error: OtaError);

    /// The new image is committed. On hardware this restarts the device
    /// and does not return.
    fn on_success(&mut self);
}

// ───────────────────────────────────────────────────────────────
// Clock
// ───────────────────────────────────────────────────────────────

/// Monotonic milliseconds since boot.
pub trait Clock {
    fn now_ms(&self) -> u64;
}

// ───────────────────────────────────────────────────────────────
// Configuration port (driven adapter: domain ↔ persistent config)
// ───────────────────────────────────────────────────────────────

/// Loads and persists node configuration.
///
/// Implementations MUST validate before persisting; invalid values are
/// rejected with [`ConfigError::ValidationFailed`], never clamped.
pub trait ConfigPort {
    /// Returns [`NodeConfig::default()`] if nothing is stored.
    fn load(&self) -> Result<NodeConfig, ConfigError>;

    fn save(&self, config: &NodeConfig) -> Result<(), ConfigError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// Stored blob failed deserialisation.
    Corrupted,
    /// A field failed range validation.
    ValidationFailed(&'static str),
    /// Generic I/O error from the storage backend.
    IoError,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Corrupted => write!(f, "config corrupted"),
            Self::ValidationFailed(msg) => write!(f, "validation failed: {}", msg),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}
