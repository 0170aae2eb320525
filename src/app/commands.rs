//! Inbound cloud messages.
//!
//! The transport adapter decodes broker traffic into these before handing
//! it to the session loop, so nothing past the adapter sees topics or raw
//! bytes.

use serde_json::Value;

use super::events::AttributeMap;

/// A decoded message received from the broker.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// Server-initiated remote procedure call.
    Rpc {
        request_id: u32,
        method: String,
        params: Value,
    },
    /// Reply to an attribute request previously issued with `correlation_id`.
    AttributeResponse {
        correlation_id: u32,
        payload: AttributeMap,
    },
    /// Unrequested shared-attribute push.
    SharedAttributes(AttributeMap),
    /// One block of a firmware image.
    FirmwareChunk {
        request_id: u32,
        chunk: u32,
        data: Vec<u8>,
    },
}
