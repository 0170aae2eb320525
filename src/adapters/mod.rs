//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter           | Implements      | Connects to                   |
//! |-------------------|-----------------|-------------------------------|
//! | `thingsboard`     | (codec)         | ThingsBoard MQTT device API   |
//! | `mqtt`            | CloudTransport  | ESP-IDF MQTT client           |
//! | `firmware_writer` | FirmwareWriter  | Inactive OTA app partition    |
//! | `ota_observer`    | OtaObserver     | Progress log, restart         |
//! | `hardware`        | ActuatorPort    | LED array, fan PWM, servo     |
//! | `wifi`            | LinkInfoPort    | ESP-IDF WiFi STA              |
//! | `nvs`             | ConfigPort      | NVS / in-memory store         |
//! | `time`            | Clock           | ESP32 system timer            |
//! | `device_id`       | (identity)      | eFuse MAC                     |

pub mod device_id;
pub mod firmware_writer;
pub mod hardware;
#[cfg(target_os = "espidf")]
pub mod mqtt;
pub mod nvs;
pub mod ota_observer;
pub mod thingsboard;
pub mod time;
pub mod wifi;
