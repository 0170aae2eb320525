//! Actuation reconciler.
//!
//! Drains pending store changes on a short period, drives the matching
//! actuator, then acknowledges the applied value back to the cloud as a
//! client attribute. A transient actuator failure skips the acknowledgment
//! and re-arms the change for the next pass, unless a newer value has
//! arrived meanwhile. An acknowledgment that cannot be queued is logged and
//! the hardware keeps its new state.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use serde_json::Value;

use crate::app::context::NodeContext;
use crate::app::events::{Outbound, single};
use crate::app::ports::ActuatorPort;
use crate::error::ActuatorError;
use crate::state::FieldValue;
use crate::sync::channels::enqueue;

fn actuate<A: ActuatorPort>(actuators: &mut A, change: FieldValue) -> Result<(), ActuatorError> {
    match change {
        FieldValue::Led(on) => actuators.set_led(on),
        FieldValue::FanSpeed(pct) => actuators.set_fan_speed(pct),
        FieldValue::Door(open) => actuators.set_door(open),
    }
}

fn ack_value(change: FieldValue) -> Value {
    match change {
        FieldValue::Led(b) | FieldValue::Door(b) => b.into(),
        FieldValue::FanSpeed(pct) => pct.into(),
    }
}

pub struct ActuationReconciler<A> {
    ctx: Arc<NodeContext>,
    actuators: A,
}

impl<A: ActuatorPort> ActuationReconciler<A> {
    pub fn new(ctx: Arc<NodeContext>, actuators: A) -> Self {
        Self { ctx, actuators }
    }

    /// Apply every pending change. Returns how many reached the hardware.
    pub fn reconcile(&mut self) -> usize {
        let mut applied = 0;
        for change in self.ctx.store.drain_changes() {
            let field = change.field();
            if let Err(e) = actuate(&mut self.actuators, change) {
                if e.is_transient() && self.ctx.store.retry(change) {
                    warn!("RECON: {:?} not applied ({}), retrying", field, e);
                } else {
                    warn!("RECON: {:?} not applied: {}", field, e);
                }
                continue;
            }
            applied += 1;
            debug!("RECON: applied {:?}", change);

            let ack = Outbound::Attributes(single(field.attribute_key(), ack_value(change)));
            if let Err(e) = enqueue(&self.ctx.outbox, ack) {
                warn!("RECON: ack for {:?} dropped: {}", field, e);
            }
        }
        applied
    }

    pub fn actuators(&self) -> &A {
        &self.actuators
    }

    pub fn run(mut self) -> ! {
        let period = Duration::from_millis(u64::from(self.ctx.config.cadence.reconcile_ms));
        loop {
            self.reconcile();
            std::thread::sleep(period);
        }
    }
}
