//! Node configuration.
//!
//! Every tunable of the synchronisation engine lives here: broker
//! credentials, firmware identity, OTA retry policy, request timeouts,
//! task cadences and the set of fitted capabilities. Defaults mirror the
//! reference board; secrets are injected at build time and may be
//! overridden by a blob stored in NVS (see [`adapters::nvs`](crate::adapters::nvs)).

use serde::{Deserialize, Serialize};

/// Largest chunk the MQTT client buffer is sized for.
pub const MAX_CHUNK_SIZE: u16 = 16 * 1024;

/// Broker endpoint and device credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokerConfig {
    pub host: String,
    pub port: u16,
    /// Device access token (used as the MQTT username).
    pub token: String,
}

/// Firmware title announced to the cloud and matched against adverts.
pub const FIRMWARE_TITLE: &str = "SMART_HOME";
/// Version of the image this build produces.
pub const FIRMWARE_VERSION: &str = env!("CARGO_PKG_VERSION");

fn running_title() -> String {
    FIRMWARE_TITLE.into()
}

fn running_version() -> String {
    FIRMWARE_VERSION.into()
}

/// Identity of the running firmware and the OTA transfer policy.
///
/// Title and version belong to the image, not to the stored blob: they are
/// never persisted and always load as the build-time values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirmwareConfig {
    #[serde(skip, default = "running_title")]
    pub title: String,
    #[serde(skip, default = "running_version")]
    pub version: String,
    /// Bytes requested per firmware chunk.
    pub chunk_size: u16,
    /// Failures tolerated on a single chunk before the session fails.
    pub chunk_retries: u8,
    /// A requested chunk not delivered within this window counts as a failure.
    pub chunk_timeout_ms: u32,
}

/// Loop periods for each task, in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cadence {
    /// Connection supervision period while connected.
    pub supervise_ms: u32,
    /// First delay after a failed connect attempt.
    pub connect_retry_ms: u32,
    /// Upper bound for the doubling reconnect delay. Equal to
    /// `connect_retry_ms` for a fixed delay.
    pub reconnect_backoff_max_ms: u32,
    /// Transport processing loop period.
    pub session_poll_ms: u32,
    /// Actuation reconciler period.
    pub reconcile_ms: u32,
    /// Telemetry publication period.
    pub telemetry_ms: u32,
}

/// Fitted peripherals and enabled subsystems.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub led: bool,
    pub fan: bool,
    pub door: bool,
    pub ota: bool,
    pub telemetry: bool,
    /// ENV unit on I2C (SHT4x temperature/humidity, BMP280 pressure).
    pub environment_sensor: bool,
    /// Analog light sensor.
    pub light_sensor: bool,
}

/// Wi-Fi station credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WifiConfig {
    pub ssid: String,
    pub password: String,
}

/// Complete node configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeConfig {
    pub broker: BrokerConfig,
    pub wifi: WifiConfig,
    pub firmware: FirmwareConfig,
    /// Deadline applied to every attribute request.
    pub request_timeout_ms: u32,
    pub cadence: Cadence,
    pub capabilities: Capabilities,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            broker: BrokerConfig {
                host: "app.coreiot.io".into(),
                port: 1883,
                token: option_env!("SMARTHOME_DEVICE_TOKEN").unwrap_or("").into(),
            },
            wifi: WifiConfig {
                ssid: option_env!("SMARTHOME_WIFI_SSID").unwrap_or("").into(),
                password: option_env!("SMARTHOME_WIFI_PASSWORD").unwrap_or("").into(),
            },
            firmware: FirmwareConfig {
                title: running_title(),
                version: running_version(),
                chunk_size: 4096,
                chunk_retries: 12,
                chunk_timeout_ms: 15_000,
            },
            request_timeout_ms: 15_000,
            cadence: Cadence {
                supervise_ms: 5_000,
                connect_retry_ms: 1_000,
                reconnect_backoff_max_ms: 30_000,
                session_poll_ms: 50,
                reconcile_ms: 10,
                telemetry_ms: 30_000,
            },
            capabilities: Capabilities {
                led: true,
                fan: true,
                door: true,
                ota: true,
                telemetry: true,
                environment_sensor: true,
                light_sensor: true,
            },
        }
    }
}

impl NodeConfig {
    /// Range-check every field. Invalid values are rejected, never clamped.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.broker.host.is_empty() {
            return Err("broker.host must not be empty");
        }
        if self.broker.port == 0 {
            return Err("broker.port must be non-zero");
        }
        if self.firmware.title.is_empty() || self.firmware.version.is_empty() {
            return Err("firmware title and version must not be empty");
        }
        if self.firmware.chunk_size == 0 || self.firmware.chunk_size > MAX_CHUNK_SIZE {
            return Err("firmware.chunk_size must be 1-16384");
        }
        if self.firmware.chunk_retries == 0 {
            return Err("firmware.chunk_retries must be at least 1");
        }
        if self.firmware.chunk_timeout_ms == 0 || self.request_timeout_ms == 0 {
            return Err("timeouts must be non-zero");
        }
        let c = &self.cadence;
        if [
            c.supervise_ms,
            c.connect_retry_ms,
            c.session_poll_ms,
            c.reconcile_ms,
            c.telemetry_ms,
        ]
        .contains(&0)
        {
            return Err("cadences must be non-zero");
        }
        if c.reconnect_backoff_max_ms < c.connect_retry_ms {
            return Err("reconnect_backoff_max_ms must be >= connect_retry_ms");
        }
        Ok(())
    }
}

impl BrokerConfig {
    /// `mqtt://host:port` form used by the MQTT client.
    pub fn url(&self) -> String {
        format!("mqtt://{}:{}", self.host, self.port)
    }
}
