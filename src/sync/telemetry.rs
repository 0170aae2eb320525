//! Periodic telemetry publication.
//!
//! Readings go out as one telemetry message; the link RSSI follows as a
//! client attribute. Nothing is queued while the session is not
//! established.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};

use crate::app::context::NodeContext;
use crate::app::events::{AttributeMap, Outbound, single};
use crate::app::ports::{LinkInfoPort, SensorPort, SensorReadings};
use crate::error::Result;
use crate::sync::channels::enqueue;

fn valid(v: Option<f32>) -> Option<f32> {
    v.filter(|x| x.is_finite())
}

/// Telemetry payload for one sample. Temperature/humidity and
/// pressure/altitude are only sent as complete pairs.
pub fn telemetry_map(r: &SensorReadings) -> AttributeMap {
    let mut map = AttributeMap::new();
    if let (Some(t), Some(h)) = (valid(r.temperature_c), valid(r.humidity_pct)) {
        map.insert("temperature".into(), t.into());
        map.insert("humidity".into(), h.into());
    }
    if let (Some(p), Some(a)) = (valid(r.pressure_pa), valid(r.altitude_m)) {
        map.insert("pressure".into(), p.into());
        map.insert("altitude".into(), a.into());
    }
    if let Some(pct) = valid(r.light_pct) {
        map.insert("illuminance".into(), pct.into());
    }
    map
}

pub struct TelemetryPublisher<S, L> {
    ctx: Arc<NodeContext>,
    sensors: S,
    link: Arc<L>,
}

impl<S: SensorPort, L: LinkInfoPort> TelemetryPublisher<S, L> {
    pub fn new(ctx: Arc<NodeContext>, sensors: S, link: Arc<L>) -> Self {
        Self { ctx, sensors, link }
    }

    /// Sample and queue one publication. Returns `false` when skipped
    /// because the session is not established.
    pub fn publish(&mut self) -> Result<bool> {
        if !self.ctx.session.is_established() {
            debug!("TELEM: session not established, skipped");
            return Ok(false);
        }
        let map = telemetry_map(&self.sensors.read_all());
        if !map.is_empty() {
            enqueue(&self.ctx.outbox, Outbound::Telemetry(map))?;
        }
        if let Some(rssi) = self.link.rssi() {
            enqueue(&self.ctx.outbox, Outbound::Attributes(single("rssi", rssi)))?;
        }
        Ok(true)
    }

    pub fn run(mut self) -> ! {
        let period = Duration::from_millis(u64::from(self.ctx.config.cadence.telemetry_ms));
        loop {
            if let Err(e) = self.publish() {
                warn!("TELEM: {}", e);
            }
            std::thread::sleep(period);
        }
    }
}
