//! Smart-home node firmware library.
//!
//! Exposes the synchronisation engine and its adapters for integration
//! testing. All ESP-IDF-specific code is guarded by
//! `#[cfg(target_os = "espidf")]` within each module.

#![deny(unused_must_use)]

pub mod app;
pub mod config;
pub mod error;
pub mod state;
pub mod sync;

pub mod adapters;
pub mod drivers;
pub mod pins;
pub mod sensors;
