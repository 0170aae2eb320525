//! Device identity derived from the ESP32 factory MAC address.
//!
//! The MQTT client id is `smarthome-xxyyzz` (last 3 bytes of the eFuse
//! MAC, lowercase hex): stable across reboots and unique per board, so the
//! broker never sees two sessions with the same id.

use core::fmt::Write;

/// Full 6-byte MAC address.
pub type MacAddress = [u8; 6];

/// Read the factory MAC address from eFuse.
#[cfg(target_os = "espidf")]
pub fn read_mac() -> MacAddress {
    let mut mac: MacAddress = [0u8; 6];
    // SAFETY: writes exactly 6 bytes into the provided buffer.
    unsafe {
        esp_idf_svc::sys::esp_efuse_mac_get_default(mac.as_mut_ptr());
    }
    mac
}

/// Simulation: returns a deterministic fake MAC.
#[cfg(not(target_os = "espidf"))]
pub fn read_mac() -> MacAddress {
    [0xDE, 0xAD, 0xBE, 0xEF, 0xCA, 0xFE]
}

pub fn client_id(mac: &MacAddress) -> heapless::String<24> {
    let mut id = heapless::String::<24>::new();
    let _ = write!(id, "smarthome-{:02x}{:02x}{:02x}", mac[3], mac[4], mac[5]);
    id
}
