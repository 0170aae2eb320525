//! Smart-home node firmware: main entry point.
//!
//! Builds every adapter once, wires them into a shared [`NodeContext`] and
//! spawns the synchronisation tasks. The main thread then stays behind as
//! the Wi-Fi supervisor.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  MqttTransport     HardwareAdapter   SensorHub    WifiLink     │
//! │  (CloudTransport)  (ActuatorPort)    (Sensors)    (LinkInfo)   │
//! │  OtaPartitionWriter  RestartingObserver  NvsConfigStore        │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │  supervisor · session · reconciler · telemetry         │    │
//! │  │  (one FreeRTOS task each, sharing Arc<NodeContext>)    │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! └────────────────────────────────────────────────────────────────┘
//! ```
#![deny(unused_must_use)]

use std::sync::{Arc, Mutex};

use anyhow::{Result, anyhow};
use esp_idf_hal::delay::Delay;
use esp_idf_hal::i2c::{I2cConfig, I2cDriver};
use esp_idf_hal::peripherals::Peripherals;
use esp_idf_hal::rmt::TxRmtDriver;
use esp_idf_hal::rmt::config::TransmitConfig;
use esp_idf_hal::units::Hertz;
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use esp_idf_svc::wifi::{BlockingWifi, EspWifi};
use log::{error, info, warn};

use smarthome::adapters::device_id;
use smarthome::adapters::firmware_writer::{self, OtaPartitionWriter};
use smarthome::adapters::hardware::HardwareAdapter;
use smarthome::adapters::mqtt::MqttTransport;
use smarthome::adapters::nvs::NvsConfigStore;
use smarthome::adapters::ota_observer::RestartingObserver;
use smarthome::adapters::time::MonotonicClock;
use smarthome::adapters::wifi::WifiLink;
use smarthome::app::context::NodeContext;
use smarthome::app::ports::{Clock, ConfigPort};
use smarthome::config::NodeConfig;
use smarthome::drivers::fan::FanDriver;
use smarthome::drivers::hw_init;
use smarthome::drivers::led_array::LedArray;
use smarthome::drivers::servo::DoorServo;
use smarthome::drivers::task_pin::{Core, TaskSpec, spawn_on_core};
use smarthome::pins;
use smarthome::sensors::SensorHub;
use smarthome::sync::reconciler::ActuationReconciler;
use smarthome::sync::session::SessionLoop;
use smarthome::sync::supervisor::ConnectionSupervisor;
use smarthome::sync::telemetry::TelemetryPublisher;

/// Upper bound on one MQTT connect handshake.
const MQTT_CONNECT_TIMEOUT_MS: u32 = 10_000;
/// Log OTA progress every this many chunks.
const OTA_LOG_EVERY: u32 = 16;

const SUPERVISOR_TASK: TaskSpec = TaskSpec {
    name: "supervisor\0",
    core: Core::Pro,
    priority: 5,
    stack_kb: 8,
};
const SESSION_TASK: TaskSpec = TaskSpec {
    name: "session\0",
    core: Core::Pro,
    priority: 6,
    stack_kb: 12,
};
const RECONCILER_TASK: TaskSpec = TaskSpec {
    name: "reconciler\0",
    core: Core::App,
    priority: 4,
    stack_kb: 4,
};
const TELEMETRY_TASK: TaskSpec = TaskSpec {
    name: "telemetry\0",
    core: Core::App,
    priority: 3,
    stack_kb: 6,
};

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("╔══════════════════════════════════════╗");
    info!("║  Smart Home Node v{}              ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    // ── 1b. OTA rollback check ────────────────────────────────
    firmware_writer::check_rollback();

    // ── 1c. Raw peripherals (ADC, LEDC) ───────────────────────
    if let Err(e) = hw_init::init_peripherals() {
        error!("HAL init failed: {}", e);
        return Err(e.into());
    }

    let peripherals = Peripherals::take()?;
    let sysloop = EspSystemEventLoop::take()?;
    let nvs_partition = EspDefaultNvsPartition::take()?;
    let clock = MonotonicClock::new();

    // ── 2. Load config from NVS (or defaults) ─────────────────
    let config = match NvsConfigStore::new(nvs_partition.clone()).and_then(|s| s.load()) {
        Ok(cfg) => {
            info!("Config loaded from NVS");
            cfg
        }
        Err(e) => {
            warn!("NVS config load failed ({}), using defaults", e);
            NodeConfig::default()
        }
    };
    let caps = config.capabilities;

    // ── 3. Wi-Fi station ──────────────────────────────────────
    let radio = BlockingWifi::wrap(
        EspWifi::new(peripherals.modem, sysloop.clone(), Some(nvs_partition))?,
        sysloop,
    )?;
    let link = Arc::new(WifiLink::new(radio, &config.wifi).map_err(|e| anyhow!("WiFi: {}", e))?);
    if let Err(e) = link.connect(clock.now_ms()) {
        warn!("WiFi: initial connect failed ({}), retrying in background", e);
    }

    // ── 4. Sensors (ENV unit on I2C0, LDR on ADC1) ────────────
    let i2c = I2cDriver::new(
        peripherals.i2c0,
        peripherals.pins.gpio11,
        peripherals.pins.gpio12,
        &I2cConfig::new().baudrate(Hertz(pins::I2C_FREQ_HZ)),
    )?;
    let sensors = SensorHub::new(i2c, Delay::new_default(), &caps);

    // ── 5. Actuators ──────────────────────────────────────────
    let rmt = TxRmtDriver::new(
        peripherals.rmt.channel0,
        peripherals.pins.gpio4,
        &TransmitConfig::new().clock_divider(1),
    )?;
    let mut hardware = HardwareAdapter::new(
        caps,
        LedArray::new(rmt),
        FanDriver::new(),
        DoorServo::new(),
    );
    if let Err(e) = hardware.all_off() {
        warn!("Actuator reset failed: {}", e);
    }

    // ── 6. Sync engine context ────────────────────────────────
    let client_id = device_id::client_id(&device_id::read_mac());
    info!("MQTT client id: {}", client_id);
    let transport = Arc::new(Mutex::new(MqttTransport::new(
        client_id.as_str().into(),
        config.firmware.chunk_size,
        MQTT_CONNECT_TIMEOUT_MS,
    )));
    let ctx = Arc::new(NodeContext::new(
        config,
        Box::new(OtaPartitionWriter::new()),
        Box::new(RestartingObserver::new(OTA_LOG_EVERY)),
    ));

    // ── 7. Tasks ──────────────────────────────────────────────
    {
        let supervisor = ConnectionSupervisor::new(ctx.clone(), transport.clone(), link.clone());
        spawn_on_core(SUPERVISOR_TASK, move || {
            supervisor.run(&MonotonicClock::new())
        })?;
    }
    {
        let session = SessionLoop::new(ctx.clone(), transport);
        spawn_on_core(SESSION_TASK, move || session.run(&MonotonicClock::new()))?;
    }
    {
        let reconciler = ActuationReconciler::new(ctx.clone(), hardware);
        spawn_on_core(RECONCILER_TASK, move || reconciler.run())?;
    }
    if caps.telemetry {
        let telemetry = TelemetryPublisher::new(ctx.clone(), sensors, link.clone());
        spawn_on_core(TELEMETRY_TASK, move || telemetry.run())?;
    } else {
        info!("Telemetry disabled");
    }

    info!("System ready. Supervising Wi-Fi.");

    // ── 8. Wi-Fi reconnect loop (never returns) ───────────────
    link.run(&clock)
}
