//! Unified error types for the smart-home node firmware.
//!
//! A single `Error` enum that every subsystem converts into, keeping the
//! task loops' error handling uniform. All variants are `Copy` so they can
//! be passed across task boundaries and into log lines without allocation.
//!
//! OTA session errors live next to the controller in
//! [`sync::ota`](crate::sync::ota) and fold into [`Error::Ota`].

use core::fmt;

use crate::sync::ota::OtaError;

// ---------------------------------------------------------------------------
// Top-level firmware error
// ---------------------------------------------------------------------------

/// Every fallible operation in the firmware funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The broker session is missing or an I/O call on it failed.
    Transport(TransportError),
    /// Attribute/RPC synchronisation bookkeeping failed.
    Sync(SyncError),
    /// An OTA session failed.
    Ota(OtaError),
    /// An actuator command failed.
    Actuator(ActuatorError),
    /// A sensor could not be read.
    Sensor(SensorError),
    /// Configuration is invalid or could not be loaded.
    Config(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport(e) => write!(f, "transport: {e}"),
            Self::Sync(e) => write!(f, "sync: {e}"),
            Self::Ota(e) => write!(f, "ota: {e}"),
            Self::Actuator(e) => write!(f, "actuator: {e}"),
            Self::Sensor(e) => write!(f, "sensor: {e}"),
            Self::Config(msg) => write!(f, "config: {msg}"),
        }
    }
}

impl core::error::Error for Error {}

// ---------------------------------------------------------------------------
// Transport errors
// ---------------------------------------------------------------------------

/// Failures of the pub/sub broker session.
///
/// All of these are recovered by the next supervision cycle; none escalate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    /// No broker session (never connected, or the link dropped).
    Unavailable,
    /// Session establishment was refused or timed out.
    ConnectFailed,
    /// A topic subscription was rejected.
    SubscribeFailed,
    /// A publish could not be queued by the client.
    PublishFailed,
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable => write!(f, "broker session unavailable"),
            Self::ConnectFailed => write!(f, "broker connect failed"),
            Self::SubscribeFailed => write!(f, "subscribe failed"),
            Self::PublishFailed => write!(f, "publish failed"),
        }
    }
}

impl From<TransportError> for Error {
    fn from(e: TransportError) -> Self {
        Self::Transport(e)
    }
}

// ---------------------------------------------------------------------------
// Synchronisation errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncError {
    /// The outstanding-request table is full.
    CapacityExceeded,
    /// A request named more keys than `MAX_ATTRIBUTES`.
    TooManyKeys,
    /// An attribute request passed its deadline without a response.
    RequestTimeout,
    /// An RPC named a method with no binding.
    UnknownRpcMethod,
    /// The outbound intent queue is full.
    OutboxFull,
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CapacityExceeded => write!(f, "outstanding request table full"),
            Self::TooManyKeys => write!(f, "too many attribute keys in one request"),
            Self::RequestTimeout => write!(f, "attribute request timed out"),
            Self::UnknownRpcMethod => write!(f, "unknown RPC method"),
            Self::OutboxFull => write!(f, "outbound queue full"),
        }
    }
}

impl From<SyncError> for Error {
    fn from(e: SyncError) -> Self {
        Self::Sync(e)
    }
}

impl From<OtaError> for Error {
    fn from(e: OtaError) -> Self {
        Self::Ota(e)
    }
}

// ---------------------------------------------------------------------------
// Actuator errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActuatorError {
    /// PWM duty-cycle write failed.
    PwmWriteFailed,
    /// Pixel data could not be shifted out to the LED array.
    PixelWriteFailed,
    /// The actuator is not fitted on this board.
    NotFitted,
}

impl ActuatorError {
    /// Whether the same write may succeed on a later attempt.
    pub fn is_transient(self) -> bool {
        !matches!(self, Self::NotFitted)
    }
}

impl fmt::Display for ActuatorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PwmWriteFailed => write!(f, "PWM write failed"),
            Self::PixelWriteFailed => write!(f, "pixel write failed"),
            Self::NotFitted => write!(f, "actuator not fitted"),
        }
    }
}

impl From<ActuatorError> for Error {
    fn from(e: ActuatorError) -> Self {
        Self::Actuator(e)
    }
}

// ---------------------------------------------------------------------------
// Sensor errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorError {
    /// I2C transaction failed.
    BusError,
    /// Frame checksum mismatch.
    CrcMismatch,
    /// ADC read returned an error.
    AdcReadFailed,
}

impl fmt::Display for SensorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BusError => write!(f, "I2C bus error"),
            Self::CrcMismatch => write!(f, "CRC mismatch"),
            Self::AdcReadFailed => write!(f, "ADC read failed"),
        }
    }
}

impl From<SensorError> for Error {
    fn from(e: SensorError) -> Self {
        Self::Sensor(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Firmware-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
