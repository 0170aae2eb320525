//! Outbound intents.
//!
//! Components never touch the broker session. They describe what should be
//! sent as an [`Outbound`] and enqueue it on the
//! [`Outbox`](crate::sync::channels::Outbox); the session loop performs the
//! actual I/O while connected.

use serde_json::{Map, Value};

/// Structured attribute or telemetry payload (`key → value`).
pub type AttributeMap = Map<String, Value>;

/// Which attribute scope a request targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeScope {
    /// Device-reported (client) attributes.
    Client,
    /// Cloud-owned (shared) attributes.
    Shared,
}

impl AttributeScope {
    /// Key of the sub-object carrying this scope in a combined response.
    pub fn response_key(self) -> &'static str {
        match self {
            Self::Client => "client",
            Self::Shared => "shared",
        }
    }
}

/// Something the device wants the broker to receive.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    /// Publish client attributes.
    Attributes(AttributeMap),
    /// Publish a telemetry sample.
    Telemetry(AttributeMap),
    /// Reply to an RPC.
    RpcResponse { request_id: u32, body: Value },
    /// Ask the server for the current value of `keys` in `scope`.
    AttributeRequest {
        correlation_id: u32,
        scope: AttributeScope,
        keys: Vec<String>,
    },
    /// Ask for block `chunk` of the firmware image, `size` bytes long.
    FirmwareChunkRequest {
        request_id: u32,
        chunk: u32,
        size: u16,
    },
}

/// Build a one-entry attribute map.
pub fn single(key: &str, value: impl Into<Value>) -> AttributeMap {
    let mut map = AttributeMap::new();
    map.insert(key.into(), value.into());
    map
}
