//! Attribute synchronisation.
//!
//! [`AttributeSyncManager`] issues attribute requests and matches their
//! responses against a bounded table of outstanding entries. Each entry
//! ends exactly once: on its matching response (`on_success`) or when a
//! sweep finds it past its deadline (`on_timeout`). Both paths remove the
//! entry before invoking the callback, so the two can never both fire.
//!
//! Server-initiated shared-attribute pushes never touch the table; they go
//! straight to [`apply_shared_attributes`] through the same decoders.

use log::{debug, info, warn};
use serde_json::Value;

use crate::app::context::NodeContext;
use crate::app::events::{AttributeMap, AttributeScope, Outbound};
use crate::error::SyncError;
use crate::state::{DeviceStateStore, FieldValue};
use crate::sync::channels::{Outbox, enqueue};
use crate::sync::ota::{FW_TITLE_KEY, FW_VERSION_KEY, FirmwareAdvert};

/// Most keys a single request may name.
pub const MAX_ATTRIBUTES: usize = 10;

/// Most requests that may be in flight at once.
pub const MAX_OUTSTANDING_REQUESTS: usize = 4;

pub const LED_STATE_KEY: &str = "ledState";
pub const FAN_SPEED_KEY: &str = "fanSpeed";
pub const DOOR_STATE_KEY: &str = "doorState";

pub type SuccessFn = Box<dyn FnOnce(&AttributeMap) + Send>;
pub type TimeoutFn = Box<dyn FnOnce() + Send>;

/// One in-flight attribute request.
pub struct OutstandingRequest {
    pub correlation_id: u32,
    pub scope: AttributeScope,
    pub keys: Vec<String>,
    pub deadline_ms: u64,
    on_success: SuccessFn,
    on_timeout: TimeoutFn,
}

pub struct AttributeSyncManager {
    pending: heapless::Vec<OutstandingRequest, MAX_OUTSTANDING_REQUESTS>,
    next_id: u32,
    timeout_ms: u32,
}

impl AttributeSyncManager {
    pub fn new(timeout_ms: u32) -> Self {
        Self {
            pending: heapless::Vec::new(),
            next_id: 0,
            timeout_ms,
        }
    }

    /// Issue a request for `keys` in `scope`. The deadline is fixed now.
    pub fn request(
        &mut self,
        scope: AttributeScope,
        keys: &[&str],
        now_ms: u64,
        on_success: SuccessFn,
        on_timeout: TimeoutFn,
        outbox: &Outbox,
    ) -> Result<u32, SyncError> {
        if keys.len() > MAX_ATTRIBUTES {
            return Err(SyncError::TooManyKeys);
        }
        if self.pending.is_full() {
            return Err(SyncError::CapacityExceeded);
        }

        self.next_id = self.next_id.wrapping_add(1);
        let correlation_id = self.next_id;
        let keys: Vec<String> = keys.iter().map(|k| (*k).to_owned()).collect();
        enqueue(
            outbox,
            Outbound::AttributeRequest {
                correlation_id,
                scope,
                keys: keys.clone(),
            },
        )?;

        let entry = OutstandingRequest {
            correlation_id,
            scope,
            keys,
            deadline_ms: now_ms + u64::from(self.timeout_ms),
            on_success,
            on_timeout,
        };
        if self.pending.push(entry).is_err() {
            return Err(SyncError::CapacityExceeded);
        }
        debug!("ATTR: request {} ({:?}) issued", correlation_id, scope);
        Ok(correlation_id)
    }

    /// Route a response. Returns `false` for unknown ids (late or duplicate
    /// delivery), which are otherwise ignored.
    pub fn on_message(&mut self, correlation_id: u32, payload: &AttributeMap) -> bool {
        let Some(idx) = self
            .pending
            .iter()
            .position(|r| r.correlation_id == correlation_id)
        else {
            debug!("ATTR: response {} matches nothing", correlation_id);
            return false;
        };
        let entry = self.pending.swap_remove(idx);
        match payload.get(entry.scope.response_key()) {
            Some(Value::Object(scoped)) => (entry.on_success)(scoped),
            _ => (entry.on_success)(payload),
        }
        true
    }

    /// Expire every entry whose deadline has passed. Returns how many.
    pub fn sweep(&mut self, now_ms: u64) -> usize {
        let mut expired = 0;
        let mut i = 0;
        while i < self.pending.len() {
            if now_ms >= self.pending[i].deadline_ms {
                let entry = self.pending.swap_remove(i);
                warn!("ATTR: request {} timed out", entry.correlation_id);
                (entry.on_timeout)();
                expired += 1;
            } else {
                i += 1;
            }
        }
        expired
    }

    pub fn outstanding(&self) -> usize {
        self.pending.len()
    }
}

// ── Value decoding ────────────────────────────────────────────

/// Coerce a truthy representation to a bool.
///
/// Numbers are true when non-zero; strings when they read `true`, `1`,
/// `on` or `yes` (any case). Other shapes do not decode.
pub fn decode_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_f64().map(|f| f != 0.0),
        Value::String(s) => {
            let s = s.trim();
            Some(["true", "1", "on", "yes"].iter().any(|t| s.eq_ignore_ascii_case(t)))
        }
        _ => None,
    }
}

/// Decode a fan speed, clamping to `0..=100`. Accepts integers, floats
/// (truncated) and numeric strings.
pub fn decode_fan_speed(value: &Value) -> Option<FieldValue> {
    let raw = match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_u64().map(|_| i64::MAX))
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f as i64))?,
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().filter(|f| f.is_finite()).map(|f| f as i64))?
        }
        _ => return None,
    };
    Some(FieldValue::fan_speed(raw))
}

// ── Attribute handlers ────────────────────────────────────────

/// Apply a shared-attribute map (push or requested). Unknown keys are
/// ignored. A firmware advertisement is offered to the OTA controller; if
/// a session is already running the advert is dropped, the other fields
/// still apply.
pub fn apply_shared_attributes(ctx: &NodeContext, attrs: &AttributeMap) {
    if let Some(v) = attrs.get(FAN_SPEED_KEY) {
        match decode_fan_speed(v) {
            Some(speed) => {
                info!("ATTR: fan speed -> {:?}", speed);
                ctx.store.set_desired(speed);
            }
            None => debug!("ATTR: undecodable fanSpeed {}", v),
        }
    }
    if let Some(open) = attrs.get(DOOR_STATE_KEY).and_then(decode_bool) {
        info!("ATTR: door -> {}", if open { "open" } else { "closed" });
        ctx.store.set_desired(FieldValue::Door(open));
    }

    if !ctx.config.capabilities.ota {
        return;
    }
    if attrs.contains_key(FW_TITLE_KEY) || attrs.contains_key(FW_VERSION_KEY) {
        match FirmwareAdvert::from_attributes(attrs) {
            Some(advert) => {
                if let Err(reason) = ctx.ota().offer(&advert, &ctx.outbox) {
                    debug!("ATTR: firmware advert not taken: {:?}", reason);
                }
            }
            None => debug!("ATTR: incomplete firmware advert"),
        }
    }
}

/// Apply the last-known client attributes recovered at startup.
pub fn apply_client_attributes(store: &DeviceStateStore, attrs: &AttributeMap) {
    if let Some(on) = attrs.get(LED_STATE_KEY).and_then(decode_bool) {
        store.set_desired(FieldValue::Led(on));
    }
    if let Some(open) = attrs.get(DOOR_STATE_KEY).and_then(decode_bool) {
        store.set_desired(FieldValue::Door(open));
    }
}
