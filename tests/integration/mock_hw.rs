//! Mock adapters for integration tests.
//!
//! Every mock records the calls it receives so tests can assert on the full
//! history without a broker, flash or real GPIO/PWM registers.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use smarthome::app::commands::Inbound;
use smarthome::app::context::NodeContext;
use smarthome::app::events::Outbound;
use smarthome::app::ports::{
    ActuatorPort, CloudTransport, FirmwareWriter, LinkInfo, LinkInfoPort, OtaObserver,
    SensorPort, SensorReadings, Subscription,
};
use smarthome::config::{BrokerConfig, NodeConfig};
use smarthome::error::{ActuatorError, TransportError};
use smarthome::sync::ota::{OtaError, OtaStage};

// ── Transport ─────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum TransportCall {
    Connect,
    Subscribe(Subscription),
    Send(Outbound),
}

#[derive(Default)]
pub struct MockTransport {
    pub calls: Vec<TransportCall>,
    pub connected: bool,
    /// Number of upcoming connect attempts that fail.
    pub fail_connects: u32,
    pub fail_subscribe: Option<Subscription>,
    pub inbound: VecDeque<Inbound>,
}

#[allow(dead_code)]
impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connects(&self) -> usize {
        self.calls
            .iter()
            .filter(|c| matches!(c, TransportCall::Connect))
            .count()
    }

    pub fn subscriptions(&self) -> Vec<Subscription> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                TransportCall::Subscribe(s) => Some(*s),
                _ => None,
            })
            .collect()
    }

    pub fn sent(&self) -> Vec<&Outbound> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                TransportCall::Send(m) => Some(m),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&mut self) {
        self.calls.clear();
    }
}

impl CloudTransport for MockTransport {
    fn connect(&mut self, _broker: &BrokerConfig) -> Result<(), TransportError> {
        self.calls.push(TransportCall::Connect);
        if self.fail_connects > 0 {
            self.fail_connects -= 1;
            return Err(TransportError::ConnectFailed);
        }
        self.connected = true;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn subscribe(&mut self, subscription: Subscription) -> Result<(), TransportError> {
        self.calls.push(TransportCall::Subscribe(subscription));
        if self.fail_subscribe == Some(subscription) {
            return Err(TransportError::SubscribeFailed);
        }
        Ok(())
    }

    fn send(&mut self, message: &Outbound) -> Result<(), TransportError> {
        if !self.connected {
            return Err(TransportError::PublishFailed);
        }
        self.calls.push(TransportCall::Send(message.clone()));
        Ok(())
    }

    fn poll(&mut self) -> Option<Inbound> {
        self.inbound.pop_front()
    }
}

// ── Actuators ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActuatorCall {
    Led(bool),
    Fan(u8),
    Door(bool),
}

#[derive(Default)]
pub struct MockActuators {
    pub calls: Vec<ActuatorCall>,
    pub fail_door: bool,
}

impl MockActuators {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ActuatorPort for MockActuators {
    fn set_led(&mut self, on: bool) -> Result<(), ActuatorError> {
        self.calls.push(ActuatorCall::Led(on));
        Ok(())
    }

    fn set_fan_speed(&mut self, percent: u8) -> Result<(), ActuatorError> {
        self.calls.push(ActuatorCall::Fan(percent));
        Ok(())
    }

    fn set_door(&mut self, open: bool) -> Result<(), ActuatorError> {
        if self.fail_door {
            return Err(ActuatorError::PwmWriteFailed);
        }
        self.calls.push(ActuatorCall::Door(open));
        Ok(())
    }
}

// ── Sensors and link ──────────────────────────────────────────

pub struct MockSensors {
    pub readings: SensorReadings,
}

impl SensorPort for MockSensors {
    fn read_all(&mut self) -> SensorReadings {
        self.readings
    }
}

pub struct MockLink {
    pub info: Option<LinkInfo>,
    pub rssi: Option<i8>,
}

impl MockLink {
    pub fn up() -> Self {
        Self {
            info: Some(LinkInfo {
                local_ip: "192.168.1.42".into(),
                ssid: "home".into(),
                bssid: "AA:BB:CC:DD:EE:FF".into(),
                mac_address: "DE:AD:BE:EF:CA:FE".into(),
                channel: 6,
            }),
            rssi: Some(-61),
        }
    }
}

impl LinkInfoPort for MockLink {
    fn link_info(&self) -> Option<LinkInfo> {
        self.info.clone()
    }

    fn rssi(&self) -> Option<i8> {
        self.rssi
    }
}

// ── Firmware writer and OTA observer ──────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum OtaCall {
    Begin(u32),
    Write(usize),
    Finalize,
    Apply,
    Abort,
    Progress(u32, u32),
    Failure(OtaStage, OtaError),
    Success,
}

pub type OtaLog = Arc<Mutex<Vec<OtaCall>>>;

pub struct MockWriter(pub OtaLog);

impl FirmwareWriter for MockWriter {
    fn begin(&mut self, size: u32) -> Result<(), OtaError> {
        self.0.lock().unwrap().push(OtaCall::Begin(size));
        Ok(())
    }

    fn write(&mut self, data: &[u8]) -> Result<(), OtaError> {
        self.0.lock().unwrap().push(OtaCall::Write(data.len()));
        Ok(())
    }

    fn finalize(&mut self) -> Result<(), OtaError> {
        self.0.lock().unwrap().push(OtaCall::Finalize);
        Ok(())
    }

    fn apply(&mut self) -> Result<(), OtaError> {
        self.0.lock().unwrap().push(OtaCall::Apply);
        Ok(())
    }

    fn abort(&mut self) {
        self.0.lock().unwrap().push(OtaCall::Abort);
    }
}

pub struct MockObserver(pub OtaLog);

impl OtaObserver for MockObserver {
    fn on_progress(&mut self, received: u32, total: u32) {
        self.0.lock().unwrap().push(OtaCall::Progress(received, total));
    }

    fn on_failure(&mut self, stage: OtaStage, error: OtaError) {
        self.0.lock().unwrap().push(OtaCall::Failure(stage, error));
    }

    fn on_success(&mut self) {
        self.0.lock().unwrap().push(OtaCall::Success);
    }
}

// ── Fixture ───────────────────────────────────────────────────

pub struct Node {
    pub ctx: Arc<NodeContext>,
    pub transport: Arc<Mutex<MockTransport>>,
    pub link: Arc<MockLink>,
    pub ota_log: OtaLog,
}

#[allow(dead_code)]
impl Node {
    pub fn new() -> Self {
        Self::with_config(NodeConfig::default())
    }

    pub fn with_config(config: NodeConfig) -> Self {
        let ota_log = OtaLog::default();
        let ctx = Arc::new(NodeContext::new(
            config,
            Box::new(MockWriter(Arc::clone(&ota_log))),
            Box::new(MockObserver(Arc::clone(&ota_log))),
        ));
        Self {
            ctx,
            transport: Arc::new(Mutex::new(MockTransport::new())),
            link: Arc::new(MockLink::up()),
            ota_log,
        }
    }

    /// Take everything currently queued in the outbox.
    pub fn drain_outbox(&self) -> Vec<Outbound> {
        let mut out = Vec::new();
        while let Ok(m) = self.ctx.outbox.try_receive() {
            out.push(m);
        }
        out
    }

    pub fn push_inbound(&self, message: Inbound) {
        self.transport.lock().unwrap().inbound.push_back(message);
    }

    pub fn ota_calls(&self) -> Vec<OtaCall> {
        self.ota_log.lock().unwrap().clone()
    }
}
