//! Application core: message types, port traits and the shared context.
//!
//! The synchronisation engine in [`crate::sync`] talks to the broker,
//! sensors, actuators and firmware storage only through the **port
//! traits** defined in [`ports`], so every rule is testable without real
//! peripherals or a network.

pub mod commands;
pub mod context;
pub mod events;
pub mod ports;
