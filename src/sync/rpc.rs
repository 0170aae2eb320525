//! Remote procedure call dispatch.
//!
//! The binding table is a closed set of [`RpcMethod`] variants built once
//! from the enabled capabilities. Every handler writes exactly one store
//! field (value and pending flag together) and echoes the new value as
//! `{"newState": <bool>}`. Failures are answered in-band so the session
//! stays usable:
//!
//! | Condition        | Response                          |
//! |------------------|-----------------------------------|
//! | unknown method   | `{"error":"unknown method"}`      |
//! | params not bool  | `{"error":"invalid params"}`      |
//! | inbound overflow | `{"error":"busy"}`                |

use log::{info, warn};
use serde_json::{Value, json};

use crate::config::Capabilities;
use crate::state::{DeviceStateStore, FieldValue};
use crate::sync::attributes::decode_bool;

/// Methods this node can bind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RpcMethod {
    SetLedValue,
    SetDoorState,
}

impl RpcMethod {
    pub const ALL: [RpcMethod; 2] = [RpcMethod::SetLedValue, RpcMethod::SetDoorState];

    pub fn name(self) -> &'static str {
        match self {
            Self::SetLedValue => "setLedValue",
            Self::SetDoorState => "setDoorState",
        }
    }

    fn apply(self, on: bool) -> FieldValue {
        match self {
            Self::SetLedValue => FieldValue::Led(on),
            Self::SetDoorState => FieldValue::Door(on),
        }
    }
}

/// Why a call produced an error response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RpcFault {
    UnknownMethod,
    InvalidParams,
    /// Shed before dispatch because the inbound queue was full.
    Busy,
}

impl From<RpcFault> for Value {
    fn from(fault: RpcFault) -> Self {
        let msg = match fault {
            RpcFault::UnknownMethod => "unknown method",
            RpcFault::InvalidParams => "invalid params",
            RpcFault::Busy => "busy",
        };
        json!({ "error": msg })
    }
}

/// Static method table.
pub struct RpcDispatcher {
    bindings: heapless::Vec<RpcMethod, 2>,
}

impl RpcDispatcher {
    /// Bind the methods whose actuator is fitted.
    pub fn new(caps: &Capabilities) -> Self {
        let mut bindings = heapless::Vec::new();
        for method in RpcMethod::ALL {
            let fitted = match method {
                RpcMethod::SetLedValue => caps.led,
                RpcMethod::SetDoorState => caps.door,
            };
            if fitted {
                // Capacity equals RpcMethod::ALL.len().
                let _ = bindings.push(method);
            }
        }
        Self { bindings }
    }

    /// Exact-match lookup of a method name.
    pub fn resolve(&self, name: &str) -> Option<RpcMethod> {
        self.bindings.iter().copied().find(|m| m.name() == name)
    }

    /// Run one call against the store.
    pub fn call(
        &self,
        method: &str,
        params: &Value,
        store: &DeviceStateStore,
    ) -> Result<Value, RpcFault> {
        let Some(bound) = self.resolve(method) else {
            warn!("RPC: unknown method '{}'", method);
            return Err(RpcFault::UnknownMethod);
        };
        let Some(on) = decode_bool(params) else {
            warn!("RPC: {} rejected params {}", method, params);
            return Err(RpcFault::InvalidParams);
        };
        store.set_desired(bound.apply(on));
        info!("RPC: {}({})", method, on);
        Ok(json!({ "newState": on }))
    }

    /// [`call`](Self::call) with faults rendered as response bodies.
    pub fn dispatch(&self, method: &str, params: &Value, store: &DeviceStateStore) -> Value {
        self.call(method, params, store).unwrap_or_else(Value::from)
    }
}
