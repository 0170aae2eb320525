//! ThingsBoard device API topic mapping.
//!
//! Pure translation between [`Outbound`]/[`Inbound`] and `(topic, payload)`
//! pairs. The MQTT adapter owns the socket; everything here is host-tested.
//!
//! | Direction | Topic                                      | Payload                     |
//! |-----------|--------------------------------------------|-----------------------------|
//! | out       | `v1/devices/me/attributes`                 | attribute map               |
//! | out       | `v1/devices/me/telemetry`                  | telemetry map               |
//! | out       | `v1/devices/me/attributes/request/{id}`    | `{"clientKeys":"a,b"}`      |
//! | out       | `v1/devices/me/rpc/response/{id}`          | response body               |
//! | out       | `v2/fw/request/{req}/chunk/{n}`            | chunk size, decimal         |
//! | in        | `v1/devices/me/attributes`                 | shared-attribute push       |
//! | in        | `v1/devices/me/attributes/response/{id}`   | `{"client":{..},"shared":{..}}` |
//! | in        | `v1/devices/me/rpc/request/{id}`           | `{"method":..,"params":..}` |
//! | in        | `v2/fw/response/{req}/chunk/{n}`           | raw image bytes             |

use log::debug;
use serde_json::Value;

use crate::app::commands::Inbound;
use crate::app::events::{AttributeMap, AttributeScope, Outbound};
use crate::app::ports::Subscription;
use crate::error::TransportError;

pub const ATTRIBUTES_TOPIC: &str = "v1/devices/me/attributes";
pub const TELEMETRY_TOPIC: &str = "v1/devices/me/telemetry";
const ATTRIBUTE_REQUEST_PREFIX: &str = "v1/devices/me/attributes/request/";
const ATTRIBUTE_RESPONSE_PREFIX: &str = "v1/devices/me/attributes/response/";
const RPC_REQUEST_PREFIX: &str = "v1/devices/me/rpc/request/";
const RPC_RESPONSE_PREFIX: &str = "v1/devices/me/rpc/response/";
const FW_REQUEST_PREFIX: &str = "v2/fw/request/";
const FW_RESPONSE_PREFIX: &str = "v2/fw/response/";

/// One message ready for the MQTT client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Publication {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// Topic filter for a subscription.
pub fn subscription_filter(subscription: Subscription) -> &'static str {
    match subscription {
        Subscription::Rpc => "v1/devices/me/rpc/request/+",
        Subscription::SharedAttributes => ATTRIBUTES_TOPIC,
        Subscription::AttributeResponses => "v1/devices/me/attributes/response/+",
        Subscription::FirmwareChunks => "v2/fw/response/+/chunk/+",
    }
}

fn json(value: &impl serde::Serialize) -> Result<Vec<u8>, TransportError> {
    serde_json::to_vec(value).map_err(|_| TransportError::PublishFailed)
}

pub fn encode(message: &Outbound) -> Result<Publication, TransportError> {
    let (topic, payload) = match message {
        Outbound::Attributes(map) => (ATTRIBUTES_TOPIC.to_string(), json(map)?),
        Outbound::Telemetry(map) => (TELEMETRY_TOPIC.to_string(), json(map)?),
        Outbound::RpcResponse { request_id, body } => {
            (format!("{RPC_RESPONSE_PREFIX}{request_id}"), json(body)?)
        }
        Outbound::AttributeRequest {
            correlation_id,
            scope,
            keys,
        } => {
            let field = match scope {
                AttributeScope::Client => "clientKeys",
                AttributeScope::Shared => "sharedKeys",
            };
            let mut body = AttributeMap::new();
            body.insert(field.into(), keys.join(",").into());
            (
                format!("{ATTRIBUTE_REQUEST_PREFIX}{correlation_id}"),
                json(&body)?,
            )
        }
        Outbound::FirmwareChunkRequest {
            request_id,
            chunk,
            size,
        } => (
            format!("{FW_REQUEST_PREFIX}{request_id}/chunk/{chunk}"),
            size.to_string().into_bytes(),
        ),
    };
    Ok(Publication { topic, payload })
}

fn object(payload: &[u8]) -> Option<AttributeMap> {
    match serde_json::from_slice(payload).ok()? {
        Value::Object(map) => Some(map),
        _ => None,
    }
}

/// Decode one received message. Anything malformed or on an unknown topic
/// yields `None`.
pub fn decode(topic: &str, payload: &[u8]) -> Option<Inbound> {
    let decoded = decode_inner(topic, payload);
    if decoded.is_none() {
        debug!("TB: dropped message on '{}' ({} bytes)", topic, payload.len());
    }
    decoded
}

fn decode_inner(topic: &str, payload: &[u8]) -> Option<Inbound> {
    if topic == ATTRIBUTES_TOPIC {
        return object(payload).map(Inbound::SharedAttributes);
    }
    if let Some(id) = topic.strip_prefix(ATTRIBUTE_RESPONSE_PREFIX) {
        return Some(Inbound::AttributeResponse {
            correlation_id: id.parse().ok()?,
            payload: object(payload)?,
        });
    }
    if let Some(id) = topic.strip_prefix(RPC_REQUEST_PREFIX) {
        let request_id = id.parse().ok()?;
        let mut body = object(payload)?;
        let method = match body.remove("method")? {
            Value::String(m) => m,
            _ => return None,
        };
        let params = body.remove("params").unwrap_or(Value::Null);
        return Some(Inbound::Rpc {
            request_id,
            method,
            params,
        });
    }
    if let Some(rest) = topic.strip_prefix(FW_RESPONSE_PREFIX) {
        let (request_id, chunk) = rest.split_once("/chunk/")?;
        return Some(Inbound::FirmwareChunk {
            request_id: request_id.parse().ok()?,
            chunk: chunk.parse().ok()?,
            data: payload.to_vec(),
        });
    }
    None
}
