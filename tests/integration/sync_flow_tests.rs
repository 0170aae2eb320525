//! End-to-end flows through the session loop: RPC round trip, attribute
//! responses and timeouts, reconciliation and telemetry.

use std::sync::Arc;

use serde_json::json;
use smarthome::adapters::hardware::HardwareAdapter;
use smarthome::app::commands::Inbound;
use smarthome::app::context::NodeContext;
use smarthome::app::events::{Outbound, single};
use smarthome::app::ports::{ActuatorPort, SensorReadings};
use smarthome::config::{Capabilities, NodeConfig};
use smarthome::drivers::fan::FanDriver;
use smarthome::drivers::led_array::LedArray;
use smarthome::drivers::servo::DoorServo;
use smarthome::error::ActuatorError;
use smarthome::state::{DeviceState, Field, FieldValue};
use smarthome::sync::reconciler::ActuationReconciler;
use smarthome::sync::session::SessionLoop;
use smarthome::sync::supervisor::ConnectionSupervisor;
use smarthome::sync::telemetry::TelemetryPublisher;

use crate::mock_hw::{ActuatorCall, MockActuators, MockSensors, MockTransport, Node};

/// Node with an established session and an empty transport log.
fn established() -> Node {
    let node = Node::new();
    ConnectionSupervisor::new(
        Arc::clone(&node.ctx),
        Arc::clone(&node.transport),
        Arc::clone(&node.link),
    )
    .ensure_connected(0)
    .unwrap();
    node.transport.lock().unwrap().clear();
    node
}

fn session(node: &Node) -> SessionLoop<MockTransport> {
    SessionLoop::new(Arc::clone(&node.ctx), Arc::clone(&node.transport))
}

fn rpc(request_id: u32, method: &str, params: serde_json::Value) -> Inbound {
    Inbound::Rpc {
        request_id,
        method: method.into(),
        params,
    }
}

fn rpc_response(node: &Node, request_id: u32) -> Option<serde_json::Value> {
    node.transport
        .lock()
        .unwrap()
        .sent()
        .into_iter()
        .find_map(|m| match m {
            Outbound::RpcResponse { request_id: id, body } if *id == request_id => {
                Some(body.clone())
            }
            _ => None,
        })
}

// ── RPC ───────────────────────────────────────────────────────

#[test]
fn rpc_is_answered_then_reconciled_and_acknowledged() {
    let node = established();
    let mut session = session(&node);
    let mut reconciler = ActuationReconciler::new(Arc::clone(&node.ctx), MockActuators::new());

    node.push_inbound(rpc(7, "setLedValue", json!(true)));
    let report = session.tick(10);
    assert_eq!(report.routed, 1);
    // Two startup attribute requests, then the RPC reply.
    assert_eq!(report.sent, 3);
    assert_eq!(rpc_response(&node, 7), Some(json!({"newState": true})));
    assert!(node.ctx.store.is_pending(Field::Led));

    assert_eq!(reconciler.reconcile(), 1);
    assert_eq!(reconciler.actuators().calls, [ActuatorCall::Led(true)]);
    assert!(!node.ctx.store.is_pending(Field::Led));

    node.transport.lock().unwrap().clear();
    assert_eq!(session.tick(20).sent, 1);
    let transport = node.transport.lock().unwrap();
    assert_eq!(
        transport.sent(),
        [&Outbound::Attributes(single("ledState", true))]
    );
}

#[test]
fn unknown_method_gets_error_response() {
    let node = established();
    node.push_inbound(rpc(3, "reboot", json!({})));
    session(&node).tick(10);

    assert_eq!(rpc_response(&node, 3), Some(json!({"error": "unknown method"})));
    assert_eq!(node.ctx.store.snapshot(), DeviceState::default());
}

#[test]
fn unparseable_params_leave_state_unchanged() {
    let node = established();
    node.push_inbound(rpc(4, "setDoorState", json!([1, 2])));
    session(&node).tick(10);

    assert_eq!(rpc_response(&node, 4), Some(json!({"error": "invalid params"})));
    assert!(!node.ctx.store.is_pending(Field::Door));
}

#[test]
fn outbox_is_held_while_disconnected() {
    let node = established();
    let mut session = session(&node);
    node.transport.lock().unwrap().connected = false;

    node.push_inbound(rpc(9, "setDoorState", json!("on")));
    assert_eq!(session.tick(10).sent, 0);
    assert_eq!(rpc_response(&node, 9), None);

    node.transport.lock().unwrap().connected = true;
    session.tick(60);
    assert_eq!(rpc_response(&node, 9), Some(json!({"newState": true})));
}

// ── Attributes ────────────────────────────────────────────────

#[test]
fn startup_responses_update_the_store() {
    let node = established();
    node.drain_outbox();

    node.push_inbound(Inbound::AttributeResponse {
        correlation_id: 1,
        payload: json!({"shared": {"fanSpeed": 150}}).as_object().unwrap().clone(),
    });
    node.push_inbound(Inbound::AttributeResponse {
        correlation_id: 2,
        payload: json!({"client": {"ledState": true, "doorState": "1"}})
            .as_object()
            .unwrap()
            .clone(),
    });
    assert_eq!(session(&node).tick(100).routed, 2);
    assert_eq!(node.ctx.attributes().outstanding(), 0);

    let state = node.ctx.store.snapshot();
    assert_eq!(state.fan_speed_percent, 100);
    assert!(state.led_on);
    assert!(state.door_open);

    let mut reconciler = ActuationReconciler::new(Arc::clone(&node.ctx), MockActuators::new());
    assert_eq!(reconciler.reconcile(), 3);
    assert_eq!(
        reconciler.actuators().calls,
        [
            ActuatorCall::Led(true),
            ActuatorCall::Fan(100),
            ActuatorCall::Door(true),
        ]
    );
}

#[test]
fn unanswered_requests_time_out_and_late_replies_are_ignored() {
    let node = established();
    let mut session = session(&node);

    assert_eq!(session.tick(14_999).expired, 0);
    assert_eq!(session.tick(15_000).expired, 2);
    assert_eq!(node.ctx.attributes().outstanding(), 0);

    node.push_inbound(Inbound::AttributeResponse {
        correlation_id: 1,
        payload: single("fanSpeed", 80),
    });
    session.tick(15_050);
    assert!(!node.ctx.store.is_pending(Field::FanSpeed));
    assert_eq!(node.ctx.store.snapshot().fan_speed_percent, 0);
}

#[test]
fn shared_push_applies_fan_and_door() {
    let node = established();
    node.push_inbound(Inbound::SharedAttributes(
        json!({"fanSpeed": -20, "doorState": true, "unrelated": 1})
            .as_object()
            .unwrap()
            .clone(),
    ));
    session(&node).tick(10);

    let state = node.ctx.store.snapshot();
    assert_eq!(state.fan_speed_percent, 0);
    assert!(node.ctx.store.is_pending(Field::FanSpeed));
    assert!(state.door_open);
}

// ── Reconciliation ────────────────────────────────────────────

#[test]
fn failed_actuation_is_retried_until_applied() {
    let node = established();
    node.drain_outbox();
    node.ctx.store.set_desired(FieldValue::Door(true));

    let mut broken = MockActuators::new();
    broken.fail_door = true;
    let mut reconciler = ActuationReconciler::new(Arc::clone(&node.ctx), broken);
    assert_eq!(reconciler.reconcile(), 0);
    assert!(node.drain_outbox().is_empty());
    assert!(node.ctx.store.is_pending(Field::Door));

    let mut reconciler = ActuationReconciler::new(Arc::clone(&node.ctx), MockActuators::new());
    assert_eq!(reconciler.reconcile(), 1);
    assert_eq!(reconciler.actuators().calls, [ActuatorCall::Door(true)]);
    assert_eq!(
        node.drain_outbox(),
        [Outbound::Attributes(single("doorState", true))]
    );
    assert_eq!(reconciler.reconcile(), 0);
}

/// Fails the door write while a newer desired value lands in the store.
struct RacingDoor {
    store_writer: Arc<NodeContext>,
}

impl ActuatorPort for RacingDoor {
    fn set_led(&mut self, _on: bool) -> Result<(), ActuatorError> {
        Ok(())
    }

    fn set_fan_speed(&mut self, _percent: u8) -> Result<(), ActuatorError> {
        Ok(())
    }

    fn set_door(&mut self, _open: bool) -> Result<(), ActuatorError> {
        self.store_writer.store.set_desired(FieldValue::Door(false));
        Err(ActuatorError::PwmWriteFailed)
    }
}

#[test]
fn newer_write_replaces_a_failed_change() {
    let node = established();
    node.drain_outbox();
    node.ctx.store.set_desired(FieldValue::Door(true));

    let racing = RacingDoor {
        store_writer: Arc::clone(&node.ctx),
    };
    assert_eq!(ActuationReconciler::new(Arc::clone(&node.ctx), racing).reconcile(), 0);
    assert_eq!(node.ctx.store.get(Field::Door), FieldValue::Door(false));

    let mut reconciler = ActuationReconciler::new(Arc::clone(&node.ctx), MockActuators::new());
    assert_eq!(reconciler.reconcile(), 1);
    assert_eq!(reconciler.actuators().calls, [ActuatorCall::Door(false)]);
}

#[test]
fn unfitted_actuator_is_not_retried() {
    let node = established();
    node.drain_outbox();
    node.ctx.store.set_desired(FieldValue::Door(true));

    let caps = Capabilities {
        door: false,
        ..NodeConfig::default().capabilities
    };
    let hardware = HardwareAdapter::new(caps, LedArray::new(), FanDriver::new(), DoorServo::new());
    let mut reconciler = ActuationReconciler::new(Arc::clone(&node.ctx), hardware);

    assert_eq!(reconciler.reconcile(), 0);
    assert!(!node.ctx.store.is_pending(Field::Door));
    assert!(node.drain_outbox().is_empty());
}

// ── Telemetry ─────────────────────────────────────────────────

fn sensors() -> MockSensors {
    MockSensors {
        readings: SensorReadings {
            temperature_c: Some(24.5),
            humidity_pct: Some(51.0),
            pressure_pa: Some(101_325.0),
            altitude_m: Some(12.0),
            light_pct: Some(40.0),
        },
    }
}

#[test]
fn telemetry_waits_for_an_established_session() {
    let node = Node::new();
    let mut publisher =
        TelemetryPublisher::new(Arc::clone(&node.ctx), sensors(), Arc::clone(&node.link));

    assert_eq!(publisher.publish(), Ok(false));
    assert!(node.drain_outbox().is_empty());
}

#[test]
fn telemetry_sample_is_followed_by_rssi() {
    let node = established();
    node.drain_outbox();
    let mut publisher =
        TelemetryPublisher::new(Arc::clone(&node.ctx), sensors(), Arc::clone(&node.link));

    assert_eq!(publisher.publish(), Ok(true));
    let queued = node.drain_outbox();
    assert_eq!(queued.len(), 2);
    match &queued[0] {
        Outbound::Telemetry(map) => {
            let keys: Vec<&str> = map.keys().map(String::as_str).collect();
            assert_eq!(
                keys,
                ["altitude", "humidity", "illuminance", "pressure", "temperature"]
            );
            assert_eq!(map["temperature"], 24.5);
        }
        other => panic!("expected telemetry, got {:?}", other),
    }
    assert_eq!(queued[1], Outbound::Attributes(single("rssi", -61)));
}
