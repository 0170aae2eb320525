//! WiFi station-mode link.
//!
//! Implements [`LinkInfoPort`] for the sync engine and keeps the station
//! associated: [`WifiLink::maintain`] runs on the link task, detects loss
//! and retries with an exponential backoff (2 s → 4 s → 8 s … capped at
//! 60 s).
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: [`Radio`] is the blocking ESP-IDF WiFi driver.
//! - **all other targets**: [`Radio`] is a scriptable simulation for host tests.

use core::fmt;
use std::sync::Mutex;
use std::time::Duration;

use log::{error, info, warn};

use crate::app::ports::{Clock, LinkInfo, LinkInfoPort};
use crate::config::WifiConfig;
use crate::sync::lock;

#[cfg(target_os = "espidf")]
use esp_idf_svc::wifi::{AuthMethod, BlockingWifi, ClientConfiguration, Configuration, EspWifi};

// ───────────────────────────────────────────────────────────────
// Errors
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityError {
    NoCredentials,
    InvalidSsid,
    InvalidPassword,
    ConnectionFailed,
}

impl fmt::Display for ConnectivityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoCredentials => write!(f, "no WiFi credentials configured"),
            Self::InvalidSsid => write!(f, "SSID invalid (must be 1-32 printable ASCII bytes)"),
            Self::InvalidPassword => write!(f, "password invalid (must be 8-64 bytes for WPA2, or empty for open)"),
            Self::ConnectionFailed => write!(f, "WiFi connection failed"),
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Connection state
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WifiState {
    Disconnected,
    Connected,
    Reconnecting { attempt: u32, next_attempt_ms: u64 },
}

const INITIAL_BACKOFF_MS: u64 = 2_000;
const MAX_BACKOFF_MS: u64 = 60_000;
const MAINTAIN_PERIOD: Duration = Duration::from_secs(1);

// ───────────────────────────────────────────────────────────────
// Validation
// ───────────────────────────────────────────────────────────────

fn is_printable_ascii(s: &str) -> bool {
    s.bytes().all(|b| (0x20..=0x7E).contains(&b))
}

fn validate_ssid(ssid: &str) -> Result<(), ConnectivityError> {
    if ssid.is_empty() {
        return Err(ConnectivityError::NoCredentials);
    }
    if ssid.len() > 32 || !is_printable_ascii(ssid) {
        return Err(ConnectivityError::InvalidSsid);
    }
    Ok(())
}

fn validate_password(password: &str) -> Result<(), ConnectivityError> {
    if password.is_empty() {
        return Ok(());
    }
    if password.len() < 8 || password.len() > 64 {
        return Err(ConnectivityError::InvalidPassword);
    }
    Ok(())
}

/// `AA:BB:CC:DD:EE:FF`
pub fn format_mac(mac: &[u8; 6]) -> String {
    mac.iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(":")
}

fn backoff_for(attempt: u32) -> u64 {
    INITIAL_BACKOFF_MS
        .saturating_mul(1u64 << attempt.min(16))
        .min(MAX_BACKOFF_MS)
}

// ───────────────────────────────────────────────────────────────
// Radio
// ───────────────────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
pub type Radio = BlockingWifi<EspWifi<'static>>;

/// Simulated station for host builds.
#[cfg(not(target_os = "espidf"))]
#[derive(Debug, Clone)]
pub struct Radio {
    associated: bool,
    failures_pending: u32,
    rssi: i8,
}

#[cfg(not(target_os = "espidf"))]
impl Radio {
    pub fn simulated() -> Self {
        Self {
            associated: false,
            failures_pending: 0,
            rssi: -60,
        }
    }

    /// Make the next `n` association attempts fail.
    pub fn fail_next(&mut self, n: u32) {
        self.failures_pending = n;
    }

    /// Drop the association as if the AP went away.
    pub fn drop_link(&mut self) {
        self.associated = false;
    }
}

// ───────────────────────────────────────────────────────────────
// WiFi link
// ───────────────────────────────────────────────────────────────

struct Inner {
    radio: Radio,
    state: WifiState,
}

pub struct WifiLink {
    ssid: heapless::String<32>,
    inner: Mutex<Inner>,
}

impl WifiLink {
    /// Validate credentials and configure the station. Does not associate.
    pub fn new(radio: Radio, config: &WifiConfig) -> Result<Self, ConnectivityError> {
        validate_ssid(&config.ssid)?;
        validate_password(&config.password)?;
        let mut ssid = heapless::String::new();
        ssid.push_str(&config.ssid)
            .map_err(|_| ConnectivityError::InvalidSsid)?;

        #[cfg(target_os = "espidf")]
        let radio = {
            let mut radio = radio;
            let auth_method = if config.password.is_empty() {
                AuthMethod::None
            } else {
                AuthMethod::WPA2Personal
            };
            radio
                .set_configuration(&Configuration::Client(ClientConfiguration {
                    ssid: config
                        .ssid
                        .as_str()
                        .try_into()
                        .map_err(|_| ConnectivityError::InvalidSsid)?,
                    password: config
                        .password
                        .as_str()
                        .try_into()
                        .map_err(|_| ConnectivityError::InvalidPassword)?,
                    auth_method,
                    ..Default::default()
                }))
                .map_err(|_| ConnectivityError::ConnectionFailed)?;
            radio
                .start()
                .map_err(|_| ConnectivityError::ConnectionFailed)?;
            radio
        };

        Ok(Self {
            ssid,
            inner: Mutex::new(Inner {
                radio,
                state: WifiState::Disconnected,
            }),
        })
    }

    pub fn state(&self) -> WifiState {
        lock(&self.inner).state
    }

    pub fn is_connected(&self) -> bool {
        lock(&self.inner).state == WifiState::Connected
    }

    /// Access the radio (tests script the simulation through this).
    pub fn with_radio<R>(&self, f: impl FnOnce(&mut Radio) -> R) -> R {
        f(&mut lock(&self.inner).radio)
    }

    /// First association attempt. On failure the link enters the
    /// reconnect schedule.
    pub fn connect(&self, now_ms: u64) -> Result<(), ConnectivityError> {
        let mut inner = lock(&self.inner);
        info!("WiFi: connecting to '{}'", self.ssid);
        match platform_connect(&mut inner.radio) {
            Ok(()) => {
                inner.state = WifiState::Connected;
                info!("WiFi: connected");
                Ok(())
            }
            Err(e) => {
                error!("WiFi: connection failed: {}", e);
                inner.state = WifiState::Reconnecting {
                    attempt: 0,
                    next_attempt_ms: now_ms + backoff_for(0),
                };
                Err(e)
            }
        }
    }

    /// One supervision step: detect loss, retry when the backoff expires.
    pub fn maintain(&self, now_ms: u64) {
        let mut inner = lock(&self.inner);
        match inner.state {
            WifiState::Connected => {
                if !platform_is_connected(&inner.radio) {
                    warn!("WiFi: connection lost, entering reconnect");
                    inner.state = WifiState::Reconnecting {
                        attempt: 0,
                        next_attempt_ms: now_ms,
                    };
                }
            }
            WifiState::Reconnecting {
                attempt,
                next_attempt_ms,
            } if now_ms >= next_attempt_ms => {
                info!("WiFi: reconnect attempt {}", attempt);
                inner.state = match platform_connect(&mut inner.radio) {
                    Ok(()) => {
                        info!("WiFi: reconnected");
                        WifiState::Connected
                    }
                    Err(_) => {
                        let next = attempt.saturating_add(1);
                        WifiState::Reconnecting {
                            attempt: next,
                            next_attempt_ms: now_ms + backoff_for(next),
                        }
                    }
                };
            }
            WifiState::Disconnected => {
                inner.state = WifiState::Reconnecting {
                    attempt: 0,
                    next_attempt_ms: now_ms,
                };
            }
            WifiState::Reconnecting { .. } => {}
        }
    }

    pub fn run(&self, clock: &impl Clock) -> ! {
        loop {
            self.maintain(clock.now_ms());
            std::thread::sleep(MAINTAIN_PERIOD);
        }
    }
}

impl LinkInfoPort for WifiLink {
    fn link_info(&self) -> Option<LinkInfo> {
        let inner = lock(&self.inner);
        if inner.state != WifiState::Connected {
            return None;
        }
        platform_link_info(&inner.radio, &self.ssid)
    }

    fn rssi(&self) -> Option<i8> {
        let inner = lock(&self.inner);
        if inner.state != WifiState::Connected {
            return None;
        }
        platform_rssi(&inner.radio)
    }
}

// ── Platform-specific ─────────────────────────────────────────

#[cfg(target_os = "espidf")]
fn platform_connect(radio: &mut Radio) -> Result<(), ConnectivityError> {
    let _ = radio.disconnect();
    radio
        .connect()
        .and_then(|()| radio.wait_netif_up())
        .map_err(|e| {
            warn!("WiFi: {}", e);
            ConnectivityError::ConnectionFailed
        })
}

#[cfg(target_os = "espidf")]
fn platform_is_connected(radio: &Radio) -> bool {
    radio.is_connected().unwrap_or(false)
}

#[cfg(target_os = "espidf")]
fn ap_record() -> Option<esp_idf_svc::sys::wifi_ap_record_t> {
    let mut ap = esp_idf_svc::sys::wifi_ap_record_t::default();
    // SAFETY: plain out-parameter query on an initialised station.
    let rc = unsafe { esp_idf_svc::sys::esp_wifi_sta_get_ap_info(&mut ap) };
    (rc == esp_idf_svc::sys::ESP_OK as i32).then_some(ap)
}

#[cfg(target_os = "espidf")]
fn platform_link_info(radio: &Radio, ssid: &str) -> Option<LinkInfo> {
    let netif = radio.wifi().sta_netif();
    let ip = netif.get_ip_info().ok()?.ip;
    let mac = netif.get_mac().ok()?;
    let ap = ap_record()?;
    Some(LinkInfo {
        local_ip: ip.to_string(),
        ssid: ssid.to_string(),
        bssid: format_mac(&ap.bssid),
        mac_address: format_mac(&mac),
        channel: ap.primary,
    })
}

#[cfg(target_os = "espidf")]
fn platform_rssi(_radio: &Radio) -> Option<i8> {
    ap_record().map(|ap| ap.rssi)
}

#[cfg(not(target_os = "espidf"))]
fn platform_connect(radio: &mut Radio) -> Result<(), ConnectivityError> {
    if radio.failures_pending > 0 {
        radio.failures_pending -= 1;
        warn!("WiFi(sim): simulated association failure");
        return Err(ConnectivityError::ConnectionFailed);
    }
    radio.associated = true;
    Ok(())
}

#[cfg(not(target_os = "espidf"))]
fn platform_is_connected(radio: &Radio) -> bool {
    radio.associated
}

#[cfg(not(target_os = "espidf"))]
fn platform_link_info(_radio: &Radio, ssid: &str) -> Option<LinkInfo> {
    Some(LinkInfo {
        local_ip: "192.168.4.2".into(),
        ssid: ssid.to_string(),
        bssid: format_mac(&[0x02, 0, 0, 0, 0, 0x01]),
        mac_address: format_mac(&[0x02, 0, 0, 0, 0, 0x02]),
        channel: 6,
    })
}

#[cfg(not(target_os = "espidf"))]
fn platform_rssi(radio: &Radio) -> Option<i8> {
    Some(radio.rssi)
}

// ───────────────────────────────────────────────────────────────
// Tests
// ───────────────────────────────────────────────────────────────
