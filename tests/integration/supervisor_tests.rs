//! Connection supervision against the mock transport: startup ordering,
//! abort-on-failure, reconnect backoff and session-loss recovery.

use std::sync::Arc;

use smarthome::app::events::{AttributeScope, Outbound};
use smarthome::app::ports::Subscription;
use smarthome::error::{Error, TransportError};
use smarthome::sync::supervisor::{ConnectionSupervisor, link_attributes};

use crate::mock_hw::{MockLink, MockTransport, Node, TransportCall};

fn supervisor(node: &Node) -> ConnectionSupervisor<MockTransport, MockLink> {
    ConnectionSupervisor::new(
        Arc::clone(&node.ctx),
        Arc::clone(&node.transport),
        Arc::clone(&node.link),
    )
}

fn firmware_info_sends(transport: &MockTransport) -> usize {
    transport
        .sent()
        .iter()
        .filter(|m| matches!(m, Outbound::Telemetry(map) if map.contains_key("current_fw_version")))
        .count()
}

#[test]
fn startup_sequence_runs_in_order() {
    let node = Node::new();
    let mut sup = supervisor(&node);

    sup.ensure_connected(0).unwrap();

    let info = node.link.info.clone().unwrap();
    let transport = node.transport.lock().unwrap();
    assert_eq!(transport.calls.len(), 7);
    assert_eq!(transport.calls[0], TransportCall::Connect);
    assert_eq!(
        transport.calls[1],
        TransportCall::Send(Outbound::Attributes(link_attributes(&info, Some(-61))))
    );
    match &transport.calls[1] {
        TransportCall::Send(Outbound::Attributes(map)) => assert_eq!(map["rssi"], -61),
        other => panic!("expected link attributes, got {:?}", other),
    }
    assert_eq!(
        transport.subscriptions(),
        [
            Subscription::Rpc,
            Subscription::SharedAttributes,
            Subscription::AttributeResponses,
            Subscription::FirmwareChunks,
        ]
    );
    match &transport.calls[6] {
        TransportCall::Send(Outbound::Telemetry(map)) => {
            assert_eq!(map["current_fw_title"], "SMART_HOME");
            assert_eq!(map["current_fw_version"], "1.0.0");
        }
        other => panic!("expected firmware info, got {:?}", other),
    }
    drop(transport);

    assert!(node.ctx.session.is_established());
    assert_eq!(node.ctx.attributes().outstanding(), 2);

    let queued = node.drain_outbox();
    assert_eq!(queued.len(), 2);
    match &queued[0] {
        Outbound::AttributeRequest { scope, keys, .. } => {
            assert_eq!(*scope, AttributeScope::Shared);
            assert!(keys.iter().any(|k| k == "fanSpeed"));
            assert!(keys.iter().any(|k| k == "fw_version"));
        }
        other => panic!("expected shared request, got {:?}", other),
    }
    match &queued[1] {
        Outbound::AttributeRequest { scope, keys, .. } => {
            assert_eq!(*scope, AttributeScope::Client);
            assert_eq!(keys, &["ledState", "doorState"]);
        }
        other => panic!("expected client request, got {:?}", other),
    }
}

#[test]
fn established_session_is_left_alone() {
    let node = Node::new();
    let mut sup = supervisor(&node);
    sup.ensure_connected(0).unwrap();
    node.transport.lock().unwrap().clear();

    sup.ensure_connected(5_000).unwrap();
    assert!(node.transport.lock().unwrap().calls.is_empty());
}

#[test]
fn failed_step_aborts_the_rest_and_retries_without_reconnecting() {
    let node = Node::new();
    node.transport.lock().unwrap().fail_subscribe = Some(Subscription::SharedAttributes);
    let mut sup = supervisor(&node);

    let err = sup.ensure_connected(0).unwrap_err();
    assert_eq!(err, Error::Transport(TransportError::SubscribeFailed));
    assert!(node.ctx.session.is_connected());
    assert!(!node.ctx.session.is_established());
    {
        let transport = node.transport.lock().unwrap();
        assert_eq!(
            transport.subscriptions(),
            [Subscription::Rpc, Subscription::SharedAttributes]
        );
        assert_eq!(firmware_info_sends(&transport), 0);
    }
    assert_eq!(node.ctx.attributes().outstanding(), 0);

    node.transport.lock().unwrap().fail_subscribe = None;
    sup.ensure_connected(5_000).unwrap();

    let transport = node.transport.lock().unwrap();
    assert_eq!(transport.connects(), 1);
    assert_eq!(firmware_info_sends(&transport), 1);
    assert!(node.ctx.session.is_established());
}

#[test]
fn connect_failure_backs_off_exponentially() {
    let node = Node::new();
    node.transport.lock().unwrap().fail_connects = 3;
    let mut sup = supervisor(&node);

    let mut delays = Vec::new();
    for _ in 0..3 {
        assert_eq!(
            sup.ensure_connected(0),
            Err(Error::Transport(TransportError::Unavailable))
        );
        delays.push(sup.next_delay_ms());
    }
    assert_eq!(delays, [1_000, 2_000, 4_000]);
    assert!(!node.ctx.session.is_connected());

    sup.ensure_connected(0).unwrap();
    assert_eq!(sup.next_delay_ms(), 5_000);
}

#[test]
fn backoff_is_capped() {
    let node = Node::new();
    node.transport.lock().unwrap().fail_connects = u32::MAX;
    let mut sup = supervisor(&node);

    let mut last = 0;
    for _ in 0..10 {
        let _ = sup.ensure_connected(0);
        last = sup.next_delay_ms();
    }
    assert_eq!(last, 30_000);
}

#[test]
fn lost_session_reruns_startup_but_announces_firmware_once() {
    let node = Node::new();
    let mut sup = supervisor(&node);
    sup.ensure_connected(0).unwrap();

    node.transport.lock().unwrap().connected = false;
    sup.ensure_connected(5_000).unwrap();

    let transport = node.transport.lock().unwrap();
    assert_eq!(transport.connects(), 2);
    assert_eq!(transport.subscriptions().len(), 8);
    assert_eq!(firmware_info_sends(&transport), 1);
    assert!(node.ctx.session.is_established());
}

#[test]
fn missing_link_info_does_not_block_startup() {
    let mut node = Node::new();
    node.link = Arc::new(MockLink {
        info: None,
        rssi: None,
    });
    let mut sup = supervisor(&node);

    sup.ensure_connected(0).unwrap();

    let transport = node.transport.lock().unwrap();
    assert_eq!(transport.calls[1], TransportCall::Subscribe(Subscription::Rpc));
}
