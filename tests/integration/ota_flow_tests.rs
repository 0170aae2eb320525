//! Firmware updates driven through shared-attribute pushes and chunk
//! deliveries on the session loop.

use std::sync::Arc;

use serde_json::{Value, json};
use smarthome::app::commands::Inbound;
use smarthome::app::events::{AttributeMap, Outbound};
use smarthome::sync::ota::{OtaError, OtaStage, OtaState};
use smarthome::sync::session::SessionLoop;
use smarthome::sync::supervisor::ConnectionSupervisor;

use crate::mock_hw::{MockTransport, Node, OtaCall};

const CHUNK: usize = 4096;

fn established() -> (Node, SessionLoop<MockTransport>) {
    let node = Node::new();
    ConnectionSupervisor::new(
        Arc::clone(&node.ctx),
        Arc::clone(&node.transport),
        Arc::clone(&node.link),
    )
    .ensure_connected(0)
    .unwrap();
    let session = SessionLoop::new(Arc::clone(&node.ctx), Arc::clone(&node.transport));
    (node, session)
}

fn advert(attrs: Value) -> Inbound {
    let mut map: AttributeMap = json!({"fw_title": "SMART_HOME"}).as_object().unwrap().clone();
    map.extend(attrs.as_object().unwrap().clone());
    Inbound::SharedAttributes(map)
}

fn chunk(index: u32, data: Vec<u8>) -> Inbound {
    Inbound::FirmwareChunk {
        request_id: 1,
        chunk: index,
        data,
    }
}

fn image(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

fn sha256_hex(data: &[u8]) -> String {
    hmac_sha256::Hash::hash(data)
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

fn fw_states(node: &Node) -> Vec<String> {
    node.transport
        .lock()
        .unwrap()
        .sent()
        .into_iter()
        .filter_map(|m| match m {
            Outbound::Telemetry(map) => {
                map.get("fw_state").and_then(Value::as_str).map(str::to_owned)
            }
            _ => None,
        })
        .collect()
}

fn chunk_requests(node: &Node) -> Vec<u32> {
    node.transport
        .lock()
        .unwrap()
        .sent()
        .into_iter()
        .filter_map(|m| match m {
            Outbound::FirmwareChunkRequest { chunk, .. } => Some(*chunk),
            _ => None,
        })
        .collect()
}

#[test]
fn older_advert_is_ignored_and_newer_starts_download() {
    let (node, mut session) = established();

    node.push_inbound(advert(json!({"fw_version": "0.9.0", "fw_size": 8192})));
    session.tick(10);
    assert_eq!(node.ctx.ota().state(), OtaState::Idle);
    assert!(node.ota_calls().is_empty());

    node.push_inbound(advert(json!({"fw_version": "2.0.0", "fw_size": 8192})));
    session.tick(20);
    assert_eq!(node.ctx.ota().state(), OtaState::Downloading);
    assert_eq!(node.ctx.ota().progress(), Some((0, 2)));
    assert_eq!(node.ota_calls(), [OtaCall::Begin(8192)]);
    assert_eq!(fw_states(&node), ["DOWNLOADING"]);
    assert!(node.transport.lock().unwrap().sent().contains(
        &&Outbound::FirmwareChunkRequest {
            request_id: 1,
            chunk: 0,
            size: 4096,
        }
    ));
}

#[test]
fn twelve_bad_chunks_fail_the_session() {
    let (node, mut session) = established();
    node.push_inbound(advert(json!({"fw_version": "2.0.0", "fw_size": 8192})));
    session.tick(10);

    for attempt in 0..12 {
        assert_eq!(node.ctx.ota().state(), OtaState::Downloading, "attempt {}", attempt);
        node.push_inbound(chunk(0, vec![0; 10]));
        session.tick(20);
    }

    let ota = node.ctx.ota();
    assert_eq!(ota.state(), OtaState::Idle);
    assert_eq!(
        ota.last_failure(),
        Some((OtaStage::Downloading, OtaError::ChunkTransferFailure))
    );
    drop(ota);

    assert_eq!(chunk_requests(&node), vec![0; 12]);
    assert_eq!(fw_states(&node), ["DOWNLOADING", "FAILED"]);
    assert_eq!(
        node.ota_calls(),
        [
            OtaCall::Begin(8192),
            OtaCall::Abort,
            OtaCall::Failure(OtaStage::Downloading, OtaError::ChunkTransferFailure),
        ]
    );
}

#[test]
fn verified_image_is_applied_and_restart_signalled() {
    let (node, mut session) = established();
    let fw = image(6000);
    node.push_inbound(advert(json!({
        "fw_version": "2.0.0",
        "fw_size": 6000,
        "fw_checksum": sha256_hex(&fw),
        "fw_checksum_algorithm": "SHA256",
    })));
    session.tick(10);

    node.push_inbound(chunk(0, fw[..CHUNK].to_vec()));
    session.tick(20);
    assert_eq!(node.ctx.ota().progress(), Some((1, 2)));

    node.push_inbound(chunk(1, fw[CHUNK..].to_vec()));
    session.tick(30);

    assert_eq!(node.ctx.ota().state(), OtaState::Rebooting);
    assert_eq!(chunk_requests(&node), [0, 1]);
    assert_eq!(
        fw_states(&node),
        ["DOWNLOADING", "DOWNLOADED", "VERIFIED", "UPDATING"]
    );
    assert_eq!(
        node.ota_calls(),
        [
            OtaCall::Begin(6000),
            OtaCall::Write(4096),
            OtaCall::Progress(1, 2),
            OtaCall::Write(1904),
            OtaCall::Progress(2, 2),
            OtaCall::Finalize,
            OtaCall::Apply,
            OtaCall::Success,
        ]
    );

    // Restart is signalled once.
    session.tick(40);
    let successes = node
        .ota_calls()
        .into_iter()
        .filter(|c| *c == OtaCall::Success)
        .count();
    assert_eq!(successes, 1);
}

#[test]
fn checksum_mismatch_fails_verification() {
    let (node, mut session) = established();
    let fw = image(100);
    node.push_inbound(advert(json!({
        "fw_version": "1.0.1",
        "fw_size": 100,
        "fw_checksum": "00".repeat(32),
        "fw_checksum_algorithm": "SHA256",
    })));
    session.tick(10);
    node.push_inbound(chunk(0, fw));
    session.tick(20);

    assert_eq!(node.ctx.ota().state(), OtaState::Idle);
    let calls = node.ota_calls();
    assert!(!calls.contains(&OtaCall::Apply));
    assert_eq!(
        calls.last(),
        Some(&OtaCall::Failure(
            OtaStage::Verifying,
            OtaError::FirmwareVerificationFailure
        ))
    );
}

#[test]
fn stale_chunks_are_ignored() {
    let (node, mut session) = established();
    node.push_inbound(advert(json!({"fw_version": "2.0.0", "fw_size": 8192})));
    session.tick(10);

    node.push_inbound(chunk(1, image(CHUNK)));
    node.push_inbound(Inbound::FirmwareChunk {
        request_id: 99,
        chunk: 0,
        data: image(CHUNK),
    });
    session.tick(20);

    let ota = node.ctx.ota();
    assert_eq!(ota.progress(), Some((0, 2)));
    assert_eq!(ota.retries_remaining(), Some(12));
}

#[test]
fn silent_chunk_times_out_and_is_requested_again() {
    let (node, mut session) = established();
    node.push_inbound(advert(json!({"fw_version": "2.0.0", "fw_size": 8192})));
    session.tick(10);

    session.tick(15_009);
    assert_eq!(node.ctx.ota().retries_remaining(), Some(12));

    session.tick(15_010);
    assert_eq!(node.ctx.ota().retries_remaining(), Some(11));
    assert_eq!(chunk_requests(&node), [0, 0]);
}

#[test]
fn advert_during_download_only_updates_other_fields() {
    let (node, mut session) = established();
    node.push_inbound(advert(json!({"fw_version": "2.0.0", "fw_size": 8192})));
    session.tick(10);

    node.push_inbound(advert(json!({
        "fw_version": "3.0.0",
        "fw_size": 100,
        "fanSpeed": 40,
    })));
    session.tick(20);

    assert_eq!(node.ctx.ota().progress(), Some((0, 2)));
    assert_eq!(node.ota_calls(), [OtaCall::Begin(8192)]);
    assert_eq!(node.ctx.store.snapshot().fan_speed_percent, 40);
}
