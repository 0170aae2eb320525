//! Broker session supervision.
//!
//! [`ConnectionSupervisor::ensure_connected`] runs on a fixed cadence and is
//! the only place a session is ever established. On a fresh session it
//! performs, in order:
//!
//! 1. publish link attributes (`localIp`, `ssid`, `bssid`, `macAddress`,
//!    `channel`, `rssi`)
//! 2. subscribe to RPC requests
//! 3. subscribe to shared-attribute pushes, attribute responses and
//!    firmware chunks
//! 4. request shared attributes and client attributes, each with its own
//!    timeout handler
//! 5. announce the running firmware, once per boot
//!
//! The first failing step aborts the rest. The session stays connected but
//! not established, so the next tick retries the sequence.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::{info, warn};

use crate::app::context::NodeContext;
use crate::app::events::{AttributeMap, AttributeScope, Outbound};
use crate::app::ports::{Clock, CloudTransport, LinkInfo, LinkInfoPort, Subscription};
use crate::error::{Error, TransportError};
use crate::sync::attributes::{
    DOOR_STATE_KEY, FAN_SPEED_KEY, LED_STATE_KEY, apply_client_attributes,
    apply_shared_attributes,
};
use crate::sync::lock;
use crate::sync::ota::{
    FW_CHECKSUM_ALGORITHM_KEY, FW_CHECKSUM_KEY, FW_SIZE_KEY, FW_TITLE_KEY, FW_VERSION_KEY,
};

const SHARED_KEYS: [&str; 6] = [
    FAN_SPEED_KEY,
    FW_TITLE_KEY,
    FW_VERSION_KEY,
    FW_SIZE_KEY,
    FW_CHECKSUM_KEY,
    FW_CHECKSUM_ALGORITHM_KEY,
];
const CLIENT_KEYS: [&str; 2] = [LED_STATE_KEY, DOOR_STATE_KEY];

/// Link descriptors as client attributes. `rssi` is left out when the
/// radio cannot report it.
pub fn link_attributes(info: &LinkInfo, rssi: Option<i8>) -> AttributeMap {
    let mut map = AttributeMap::new();
    map.insert("localIp".into(), info.local_ip.clone().into());
    map.insert("ssid".into(), info.ssid.clone().into());
    map.insert("bssid".into(), info.bssid.clone().into());
    map.insert("macAddress".into(), info.mac_address.clone().into());
    map.insert("channel".into(), info.channel.into());
    if let Some(dbm) = rssi {
        map.insert("rssi".into(), dbm.into());
    }
    map
}

pub struct ConnectionSupervisor<T, L> {
    ctx: Arc<NodeContext>,
    transport: Arc<Mutex<T>>,
    link: Arc<L>,
    backoff_ms: u32,
    last_attempt_failed: bool,
}

impl<T: CloudTransport, L: LinkInfoPort> ConnectionSupervisor<T, L> {
    pub fn new(ctx: Arc<NodeContext>, transport: Arc<Mutex<T>>, link: Arc<L>) -> Self {
        let backoff_ms = ctx.config.cadence.connect_retry_ms;
        Self {
            ctx,
            transport,
            link,
            backoff_ms,
            last_attempt_failed: false,
        }
    }

    /// Connect if needed and run the startup sequence on a session that has
    /// not completed it. No-op on an established session.
    pub fn ensure_connected(&mut self, now_ms: u64) -> Result<(), Error> {
        let mut transport = lock(&self.transport);

        if !transport.is_connected() {
            if self.ctx.session.is_connected() {
                warn!("SUP: broker session lost");
            }
            self.ctx.session.set_connected(false);

            let broker = &self.ctx.config.broker;
            info!("SUP: connecting to {}:{}", broker.host, broker.port);
            if let Err(e) = transport.connect(broker) {
                warn!("SUP: connect failed: {}", e);
                self.last_attempt_failed = true;
                return Err(TransportError::Unavailable.into());
            }
            self.last_attempt_failed = false;
            self.backoff_ms = self.ctx.config.cadence.connect_retry_ms;
            self.ctx.session.set_connected(true);
            info!("SUP: connected");
        } else if !self.ctx.session.is_connected() {
            self.ctx.session.set_connected(true);
        }

        if self.ctx.session.is_established() {
            return Ok(());
        }

        self.start_session(&mut *transport, now_ms)?;
        self.ctx.session.set_established(true);
        info!("SUP: session established");
        Ok(())
    }

    /// Delay before the next tick: the doubling backoff after a failed
    /// connect, the supervision period otherwise.
    pub fn next_delay_ms(&mut self) -> u32 {
        if !self.last_attempt_failed {
            return self.ctx.config.cadence.supervise_ms;
        }
        let delay = self.backoff_ms;
        self.backoff_ms = delay
            .saturating_mul(2)
            .min(self.ctx.config.cadence.reconnect_backoff_max_ms);
        delay
    }

    pub fn run(mut self, clock: &impl Clock) -> ! {
        loop {
            if let Err(e) = self.ensure_connected(clock.now_ms()) {
                warn!("SUP: {}", e);
            }
            let delay = self.next_delay_ms();
            std::thread::sleep(Duration::from_millis(u64::from(delay)));
        }
    }

    fn start_session(&self, transport: &mut T, now_ms: u64) -> Result<(), Error> {
        let ctx = &self.ctx;
        let caps = &ctx.config.capabilities;

        match self.link.link_info() {
            Some(info) => {
                let attrs = link_attributes(&info, self.link.rssi());
                transport.send(&Outbound::Attributes(attrs))?;
            }
            None => warn!("SUP: link info unavailable, skipped"),
        }

        transport.subscribe(Subscription::Rpc)?;
        transport.subscribe(Subscription::SharedAttributes)?;
        transport.subscribe(Subscription::AttributeResponses)?;
        if caps.ota {
            transport.subscribe(Subscription::FirmwareChunks)?;
        }

        let shared_keys: &[&str] = if caps.ota { &SHARED_KEYS } else { &SHARED_KEYS[..1] };
        let on_shared = Arc::clone(ctx);
        ctx.attributes().request(
            AttributeScope::Shared,
            shared_keys,
            now_ms,
            Box::new(move |attrs| apply_shared_attributes(&on_shared, attrs)),
            Box::new(|| warn!("SUP: shared attribute request timed out")),
            &ctx.outbox,
        )?;

        let on_client = Arc::clone(ctx);
        ctx.attributes().request(
            AttributeScope::Client,
            &CLIENT_KEYS,
            now_ms,
            Box::new(move |attrs| apply_client_attributes(&on_client.store, attrs)),
            Box::new(|| warn!("SUP: client attribute request timed out")),
            &ctx.outbox,
        )?;

        if caps.ota && !ctx.session.firmware_info_sent() {
            let announce = ctx.ota().firmware_info();
            transport.send(&announce)?;
            ctx.session.mark_firmware_info_sent();
            info!("SUP: firmware info announced");
        }
        Ok(())
    }
}
